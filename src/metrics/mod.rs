pub mod collector;
pub mod percentiles;
pub mod stream;

pub use collector::{DrainMetrics, DrainStatsSnapshot};

/// Outcome of one drain cycle as seen by a scheduler.
/// This is the "write" side: schedulers create these and push them in.
#[derive(Debug, Clone)]
pub struct CycleSample {
    /// e.g. "csv", "mongo"
    pub sink: &'static str,
    /// Wall time of the whole cycle in microseconds
    pub duration_us: u64,
    /// Keys in the cycle's snapshot
    pub snapshot: usize,
    /// Records the sink accepted
    pub written: usize,
    pub decode_failures: usize,
    /// None when the cycle succeeded
    pub error: Option<String>,
}

impl CycleSample {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
