use hdrhistogram::Histogram;
use serde::Serialize;

/// Percentile breakdown of one drain measurement (cycle time or batch size).
#[derive(Debug, Clone, Default, Serialize)]
pub struct PercentileSet {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub count: u64,
}

impl PercentileSet {
    /// Zeroed when nothing has been recorded yet.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::default();
        }

        Self {
            min: hist.min(),
            max: hist.max(),
            mean: hist.mean(),
            p50: hist.value_at_quantile(0.50),
            p90: hist.value_at_quantile(0.90),
            p99: hist.value_at_quantile(0.99),
            count: hist.len(),
        }
    }
}
