//! Durable destinations for drained batches.
//!
//! The set of sinks is closed: configuration picks one of the variants at
//! startup and the drain cycle talks to it through `Sink::write_batch`.

pub mod csv;
pub mod document;
pub mod mongo;

use serde::Deserialize;

use crate::error::DrainError;
use crate::record::AnalyticsRecord;

pub use self::csv::FlatFileSink;
pub use document::{DocumentCollection, DocumentConnector, DocumentStoreSink, RetryPolicy};

/// A decoded record together with the staging key it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRecord {
    pub key: String,
    pub record: AnalyticsRecord,
}

/// Which sink a scheduler drains into, as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Csv,
    Mongo,
}

pub enum Sink {
    FlatFile(FlatFileSink),
    DocumentStore(DocumentStoreSink),
}

impl Sink {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FlatFile(_) => "csv",
            Self::DocumentStore(_) => "mongo",
        }
    }

    /// Persist the whole batch. `Ok` means the batch is durable and its
    /// staging keys may be deleted; the count is records written.
    pub async fn write_batch(&mut self, batch: &[StagedRecord]) -> Result<usize, DrainError> {
        match self {
            Self::FlatFile(sink) => sink.write_batch(batch).await,
            Self::DocumentStore(sink) => sink.write_batch(batch).await,
        }
    }
}
