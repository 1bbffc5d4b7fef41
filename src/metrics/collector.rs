use std::collections::VecDeque;
use std::time::Instant;

use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use super::percentiles::PercentileSet;
use super::CycleSample;

// ─── Configuration ───────────────────────────────────────────────

/// How many individual cycles we keep for the live feed
const MAX_RECENT_CYCLES: usize = 100;

/// Cycle duration range: 1 μs → 1 h, 3 significant figures
const DURATION_HIGH_US: u64 = 3_600_000_000;
/// Batch size range: 1 → 100 M records
const BATCH_HIGH: u64 = 100_000_000;
const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe drain statistics.
/// Schedulers call `record()`, the HTTP layer calls `snapshot()`.
pub struct DrainMetrics {
    inner: Mutex<Inner>,
}

/// One entry in the recent-cycles feed.
#[derive(Debug, Clone, Serialize)]
pub struct CycleRecord {
    pub finished_at: DateTime<Utc>,
    pub sink: &'static str,
    pub duration_us: u64,
    pub snapshot: usize,
    pub written: usize,
    pub decode_failures: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Complete snapshot served by `/api/analytics/stats` and the SSE stream.
#[derive(Debug, Clone, Serialize)]
pub struct DrainStatsSnapshot {
    pub cycle_duration_us: PercentileSet,
    pub batch_size: PercentileSet,

    pub total_cycles: u64,
    pub failed_cycles: u64,
    pub records_written: u64,
    pub decode_failures: u64,
    pub uptime_secs: f64,
    pub last_success_at: Option<DateTime<Utc>>,

    pub recent_cycles: Vec<CycleRecord>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    duration_hist: Histogram<u64>,
    batch_hist: Histogram<u64>,

    total_cycles: u64,
    failed_cycles: u64,
    records_written: u64,
    decode_failures: u64,
    last_success_at: Option<DateTime<Utc>>,

    recent_cycles: VecDeque<CycleRecord>,
    started: Instant,
}

// ─── DrainMetrics impl ───────────────────────────────────────────

impl DrainMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn record(&self, sample: CycleSample) {
        self.inner.lock().record(sample);
    }

    pub fn snapshot(&self) -> DrainStatsSnapshot {
        self.inner.lock().snapshot()
    }
}

impl Default for DrainMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

fn histogram(high: u64) -> Histogram<u64> {
    // Bounds are compile-time constants well inside hdrhistogram's limits
    Histogram::<u64>::new_with_bounds(1, high, HIST_SIGFIG).expect("histogram creation")
}

impl Inner {
    fn new() -> Self {
        Self {
            duration_hist: histogram(DURATION_HIGH_US),
            batch_hist: histogram(BATCH_HIGH),
            total_cycles: 0,
            failed_cycles: 0,
            records_written: 0,
            decode_failures: 0,
            last_success_at: None,
            recent_cycles: VecDeque::with_capacity(MAX_RECENT_CYCLES + 1),
            started: Instant::now(),
        }
    }

    fn record(&mut self, sample: CycleSample) {
        let now = Utc::now();
        let success = sample.succeeded();

        // ── Counters ────────────────────────────────────────────
        self.total_cycles += 1;
        self.decode_failures += sample.decode_failures as u64;
        if success {
            self.records_written += sample.written as u64;
            self.last_success_at = Some(now);
        } else {
            self.failed_cycles += 1;
        }

        // ── Histograms (clamp into range) ───────────────────────
        let _ = self
            .duration_hist
            .record(sample.duration_us.clamp(1, DURATION_HIGH_US));
        if sample.snapshot > 0 {
            let _ = self
                .batch_hist
                .record((sample.snapshot as u64).min(BATCH_HIGH));
        }

        // ── Live feed ───────────────────────────────────────────
        self.recent_cycles.push_back(CycleRecord {
            finished_at: now,
            sink: sample.sink,
            duration_us: sample.duration_us,
            snapshot: sample.snapshot,
            written: sample.written,
            decode_failures: sample.decode_failures,
            success,
            error: sample.error,
        });
        if self.recent_cycles.len() > MAX_RECENT_CYCLES {
            self.recent_cycles.pop_front();
        }
    }

    fn snapshot(&self) -> DrainStatsSnapshot {
        DrainStatsSnapshot {
            cycle_duration_us: PercentileSet::from_histogram(&self.duration_hist),
            batch_size: PercentileSet::from_histogram(&self.batch_hist),
            total_cycles: self.total_cycles,
            failed_cycles: self.failed_cycles,
            records_written: self.records_written,
            decode_failures: self.decode_failures,
            uptime_secs: self.started.elapsed().as_secs_f64(),
            last_success_at: self.last_success_at,
            recent_cycles: self.recent_cycles.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(written: usize, error: Option<&str>) -> CycleSample {
        CycleSample {
            sink: "csv",
            duration_us: 1_500,
            snapshot: written + 1,
            written,
            decode_failures: 1,
            error: error.map(String::from),
        }
    }

    #[test]
    fn test_counters_split_success_and_failure() {
        let metrics = DrainMetrics::new();
        metrics.record(sample(10, None));
        metrics.record(sample(4, Some("disk full")));

        let snap = metrics.snapshot();
        assert_eq!(snap.total_cycles, 2);
        assert_eq!(snap.failed_cycles, 1);
        assert_eq!(snap.records_written, 10);
        assert_eq!(snap.decode_failures, 2);
        assert!(snap.last_success_at.is_some());
        assert_eq!(snap.cycle_duration_us.count, 2);
        assert_eq!(snap.recent_cycles[1].error.as_deref(), Some("disk full"));
    }

    #[test]
    fn test_recent_feed_is_bounded() {
        let metrics = DrainMetrics::new();
        for _ in 0..(MAX_RECENT_CYCLES + 25) {
            metrics.record(sample(1, None));
        }
        assert_eq!(metrics.snapshot().recent_cycles.len(), MAX_RECENT_CYCLES);
    }

    #[test]
    fn test_empty_snapshot_is_zeroed() {
        let snap = DrainMetrics::new().snapshot();
        assert_eq!(snap.total_cycles, 0);
        assert_eq!(snap.batch_size.count, 0);
        assert!(snap.recent_cycles.is_empty());
    }
}
