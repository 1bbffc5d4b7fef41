//! Document-store sink.
//!
//! The backend is reached through two small traits so the sink logic
//! (connect with backoff, bulk insert, reconnect after a dropped
//! connection) does not care whether it is MongoDB or a test double.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::StagedRecord;
use crate::error::DrainError;
use crate::record::AnalyticsRecord;

const SINK: &str = "mongo";

// ─── Backend seam ────────────────────────────────────────────────

/// One record as persisted: the record's fields plus its staging key as
/// `_id`, which makes a retried insert of the same snapshot a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub record: AnalyticsRecord,
}

impl From<&StagedRecord> for AnalyticsDocument {
    fn from(staged: &StagedRecord) -> Self {
        Self {
            id: staged.key.clone(),
            record: staged.record.clone(),
        }
    }
}

/// Result of a bulk insert. `duplicates` were already present from an
/// earlier, partially successful attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub inserted: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentStoreError {
    /// The connection is gone; the sink should reconnect next time.
    Connection(String),
    /// The backend rejected the insert.
    Insert(String),
}

impl std::fmt::Display for DocumentStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "connection: {msg}"),
            Self::Insert(msg) => write!(f, "insert: {msg}"),
        }
    }
}

#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// Insert all documents in one bulk call.
    async fn insert_many(
        &self,
        docs: Vec<AnalyticsDocument>,
    ) -> Result<InsertSummary, DocumentStoreError>;
}

#[async_trait]
pub trait DocumentConnector: Send + Sync {
    /// Establish (and verify) a connection to the configured collection.
    async fn connect(&self) -> Result<Arc<dyn DocumentCollection>, DocumentStoreError>;
}

// ─── Retry policy ────────────────────────────────────────────────

/// Bounded exponential backoff for connection establishment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based): doubles each time up
    /// to `max_backoff`, then ±20% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self
            .initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff);
        let jitter = rand::thread_rng().gen_range(0.8..=1.2);
        base.mul_f64(jitter)
    }
}

// ─── Sink ────────────────────────────────────────────────────────

pub struct DocumentStoreSink {
    connector: Arc<dyn DocumentConnector>,
    collection: Option<Arc<dyn DocumentCollection>>,
    retry: RetryPolicy,
}

impl DocumentStoreSink {
    pub fn new(connector: Arc<dyn DocumentConnector>, retry: RetryPolicy) -> Self {
        Self {
            connector,
            collection: None,
            retry,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.collection.is_some()
    }

    /// Connect with bounded retries. Failure is recoverable: the sink stays
    /// disconnected and the next cycle tries again.
    pub async fn connect(&mut self) -> Result<Arc<dyn DocumentCollection>, DrainError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.connector.connect().await {
                Ok(collection) => {
                    tracing::info!(attempt, "Connected to analytics document store");
                    self.collection = Some(collection.clone());
                    return Ok(collection);
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(attempt, max_attempts = attempts, error = %e, "Document store connection failed");
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.backoff(attempt)).await;
                    }
                }
            }
        }

        Err(DrainError::ConnectionFailed {
            attempts,
            reason: last_error,
        })
    }

    pub async fn write_batch(&mut self, batch: &[StagedRecord]) -> Result<usize, DrainError> {
        let collection = match &self.collection {
            Some(c) => c.clone(),
            None => {
                tracing::info!("Not connected to analytics store, connecting...");
                self.connect().await?
            }
        };

        let docs: Vec<AnalyticsDocument> = batch.iter().map(AnalyticsDocument::from).collect();
        match collection.insert_many(docs).await {
            Ok(summary) => {
                if summary.duplicates > 0 {
                    tracing::info!(
                        duplicates = summary.duplicates,
                        "Skipped documents persisted by an earlier attempt"
                    );
                }
                Ok(summary.inserted + summary.duplicates)
            }
            Err(e) => {
                if matches!(e, DocumentStoreError::Connection(_)) {
                    self.collection = None;
                }
                tracing::error!(error = %e, count = batch.len(), "Problem inserting to document collection");
                Err(DrainError::sink_write(SINK, e))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// In-memory collection keyed by `_id`, with scripted failures.
    #[derive(Default)]
    pub struct MemoryCollection {
        pub docs: Mutex<BTreeMap<String, AnalyticsDocument>>,
        /// Fail the next N inserts with an insert error.
        pub fail_inserts: AtomicU32,
        /// Of a failing insert, still persist this many docs first.
        pub partial_before_failure: AtomicU32,
        pub insert_calls: AtomicU32,
    }

    impl MemoryCollection {
        pub fn len(&self) -> usize {
            self.docs.lock().len()
        }
    }

    #[async_trait]
    impl DocumentCollection for MemoryCollection {
        async fn insert_many(
            &self,
            docs: Vec<AnalyticsDocument>,
        ) -> Result<InsertSummary, DocumentStoreError> {
            self.insert_calls.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .fail_inserts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();

            let mut stored = self.docs.lock();
            let limit = if failing {
                self.partial_before_failure.load(Ordering::SeqCst) as usize
            } else {
                docs.len()
            };

            let mut summary = InsertSummary::default();
            for doc in docs.into_iter().take(limit) {
                if stored.contains_key(&doc.id) {
                    summary.duplicates += 1;
                } else {
                    stored.insert(doc.id.clone(), doc);
                    summary.inserted += 1;
                }
            }

            if failing {
                Err(DocumentStoreError::Insert("scripted failure".into()))
            } else {
                Ok(summary)
            }
        }
    }

    /// Hands out one shared collection; fails the first N connects.
    pub struct MemoryConnector {
        pub collection: Arc<MemoryCollection>,
        pub fail_connects: AtomicU32,
        pub connect_calls: AtomicU32,
    }

    impl MemoryConnector {
        pub fn new(collection: Arc<MemoryCollection>) -> Self {
            Self {
                collection,
                fail_connects: AtomicU32::new(0),
                connect_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentConnector for MemoryConnector {
        async fn connect(&self) -> Result<Arc<dyn DocumentCollection>, DocumentStoreError> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            if self
                .fail_connects
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(DocumentStoreError::Connection("refused".into()));
            }
            let collection: Arc<dyn DocumentCollection> = self.collection.clone();
            Ok(collection)
        }
    }

    pub fn quick_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }
}
