//! One drain cycle: snapshot → decode → sink write → conditional delete.
//!
//! The snapshot taken at the start is the only set of keys this cycle may
//! delete. Anything captured while the cycle runs stays in staging for the
//! next one, and a failed sink write deletes nothing at all.

use std::sync::Arc;

use serde::Serialize;

use crate::codec;
use crate::error::DrainError;
use crate::sink::{Sink, StagedRecord};
use crate::store::StagingStore;

/// What happened to the snapshot of a completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Keys in the snapshot.
    pub snapshot: usize,
    /// Records the sink accepted.
    pub written: usize,
    pub decode_failures: usize,
    /// Undecodable payloads copied to the dead-letter store.
    pub dead_lettered: usize,
    /// Keys removed from staging.
    pub deleted: usize,
}

/// Optional collaborators of a cycle.
#[derive(Clone, Default)]
pub struct DrainOptions {
    /// Receives raw payloads that failed to decode before they are
    /// removed from staging. Without one they are simply deleted.
    pub dead_letters: Option<Arc<dyn StagingStore>>,
}

/// Run exactly one drain cycle against `sink`.
pub async fn drain_once(
    store: &dyn StagingStore,
    sink: &mut Sink,
    options: &DrainOptions,
) -> Result<DrainReport, DrainError> {
    let mut report = DrainReport::default();
    drain_into(store, sink, options, &mut report).await?;
    Ok(report)
}

/// Like [`drain_once`], but fills `report` as the cycle progresses so a
/// failed cycle still shows how far it got.
pub async fn drain_into(
    store: &dyn StagingStore,
    sink: &mut Sink,
    options: &DrainOptions,
    report: &mut DrainReport,
) -> Result<(), DrainError> {
    // ── 1. Snapshot ─────────────────────────────────────────────
    let snapshot = store.get_all().await?;
    report.snapshot = snapshot.len();
    if snapshot.is_empty() {
        return Ok(());
    }

    // ── 2. Decode ───────────────────────────────────────────────
    let mut entries: Vec<(String, Vec<u8>)> = snapshot.into_iter().collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));

    let mut keys = Vec::with_capacity(entries.len());
    let mut batch = Vec::with_capacity(entries.len());
    let mut undecodable = Vec::new();

    for (key, payload) in entries {
        match codec::decode(&payload) {
            Ok(record) => batch.push(StagedRecord {
                key: key.clone(),
                record,
            }),
            Err(source) => {
                let err = DrainError::DecodeFailed {
                    key: key.clone(),
                    source,
                };
                tracing::error!(error = %err, sink = sink.name(), "Couldn't unmarshal analytics data");
                undecodable.push((key.clone(), payload));
            }
        }
        keys.push(key);
    }
    report.decode_failures = undecodable.len();

    // ── 3. Sink write ───────────────────────────────────────────
    if !batch.is_empty() {
        report.written = sink.write_batch(&batch).await?;
    }

    // ── 4. Delete the snapshot ──────────────────────────────────
    if let Some(dead_letters) = &options.dead_letters {
        for (key, payload) in undecodable {
            match dead_letters.put(&key, payload, 0).await {
                Ok(()) => report.dead_lettered += 1,
                Err(e) => {
                    // Keep it in staging rather than lose it
                    tracing::error!(error = %e, key = %key, "Dead-letter write failed, keeping entry");
                    keys.retain(|k| k != &key);
                }
            }
        }
    }

    store.delete_many(&keys).await?;
    report.deleted = keys.len();

    Ok(())
}
