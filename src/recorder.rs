use std::sync::Arc;

use crate::codec;
use crate::error::CaptureError;
use crate::record::{staging_key, AnalyticsRecord};
use crate::store::StagingStore;

/// Capture side of the pipeline.
///
/// Cheap to clone and free of shared mutable state: every call encodes,
/// picks a fresh key and performs exactly one staging write.
#[derive(Clone)]
pub struct Recorder {
    store: Arc<dyn StagingStore>,
}

impl Recorder {
    pub fn new(store: Arc<dyn StagingStore>) -> Self {
        Self { store }
    }

    /// Stage one hit and return the key it was written under.
    ///
    /// Encoding failures drop the hit before any store access.
    pub async fn record_hit(&self, record: &AnalyticsRecord) -> Result<String, CaptureError> {
        let payload = codec::encode(record).map_err(|e| {
            tracing::error!(error = %e, path = %record.path, "Error encoding analytics data");
            e
        })?;

        let key = staging_key(record);
        self.store.put(&key, payload, 0).await?;

        Ok(key)
    }
}
