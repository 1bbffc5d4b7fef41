//! Periodic drain scheduling.
//!
//! Each sink gets one scheduler task alternating between sleeping and
//! draining. Shutdown and manual flush requests are observed only while
//! sleeping, so a running drain always completes and two drains of the
//! same sink never overlap.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::drain::{drain_into, DrainOptions, DrainReport};
use crate::error::DrainError;
use crate::metrics::{CycleSample, DrainMetrics};
use crate::sink::Sink;
use crate::store::StagingStore;

pub struct DrainScheduler {
    sink: Sink,
    store: Arc<dyn StagingStore>,
    interval: Duration,
    options: DrainOptions,
    metrics: Arc<DrainMetrics>,
    trigger: Arc<Notify>,
}

impl DrainScheduler {
    pub fn new(
        sink: Sink,
        store: Arc<dyn StagingStore>,
        interval: Duration,
        options: DrainOptions,
        metrics: Arc<DrainMetrics>,
    ) -> Self {
        Self {
            sink,
            store,
            interval,
            options,
            metrics,
            trigger: Arc::new(Notify::new()),
        }
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    /// Wakes the scheduler early. A request made mid-drain runs one more
    /// cycle right after the current one.
    pub fn trigger(&self) -> Arc<Notify> {
        self.trigger.clone()
    }

    /// One drain cycle with logging and metrics. Errors are absorbed here.
    pub async fn run_cycle(&mut self) -> Result<DrainReport, DrainError> {
        let sink = self.sink.name();
        let start = Instant::now();
        let mut progress = DrainReport::default();
        let result = drain_into(self.store.as_ref(), &mut self.sink, &self.options, &mut progress)
            .await
            .map(|()| progress);
        let duration_us = start.elapsed().as_micros() as u64;

        let sample = match &result {
            Ok(report) => {
                if report.snapshot > 0 {
                    tracing::info!(
                        sink,
                        snapshot = report.snapshot,
                        written = report.written,
                        decode_failures = report.decode_failures,
                        dead_lettered = report.dead_lettered,
                        deleted = report.deleted,
                        duration_ms = duration_us / 1_000,
                        "Drain cycle completed"
                    );
                } else {
                    tracing::debug!(sink, "Nothing to drain");
                }
                CycleSample {
                    sink,
                    duration_us,
                    snapshot: report.snapshot,
                    written: report.written,
                    decode_failures: report.decode_failures,
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(sink, error = %e, "Drain cycle failed, records kept for the next cycle");
                CycleSample {
                    sink,
                    duration_us,
                    snapshot: progress.snapshot,
                    written: 0,
                    decode_failures: progress.decode_failures,
                    error: Some(e.to_string()),
                }
            }
        };
        self.metrics.record(sample);

        result
    }

    /// Sleep, drain, repeat until `shutdown` flips to true or its sender
    /// goes away.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let sink = self.sink.name();
        tracing::info!(sink, interval_secs = self.interval.as_secs_f64(), "Drain scheduler started");

        loop {
            let stopping = *shutdown.borrow();
            if stopping {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.trigger.notified() => {
                    tracing::debug!(sink, "Flush requested");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            // Not inside select!: shutdown never cuts a drain short
            let _ = self.run_cycle().await;
        }

        tracing::info!(sink, "Drain scheduler stopped");
    }
}

// ─── Group of schedulers ─────────────────────────────────────────

/// Cloneable handle that requests an immediate drain from every scheduler.
#[derive(Clone, Default)]
pub struct FlushHandle {
    triggers: Vec<Arc<Notify>>,
}

impl FlushHandle {
    pub fn flush_now(&self) -> usize {
        for trigger in &self.triggers {
            trigger.notify_one();
        }
        self.triggers.len()
    }
}

/// Owns the scheduler tasks and their shared shutdown signal.
pub struct SchedulerGroup {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    flush: FlushHandle,
}

impl SchedulerGroup {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Vec::new(),
            flush: FlushHandle::default(),
        }
    }

    pub fn spawn(&mut self, scheduler: DrainScheduler) {
        self.flush.triggers.push(scheduler.trigger());
        let rx = self.shutdown_tx.subscribe();
        self.handles.push(tokio::spawn(scheduler.run(rx)));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn flush_handle(&self) -> FlushHandle {
        self.flush.clone()
    }

    /// Stop sleeping schedulers and wait for any in-progress drain.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Drain scheduler task panicked");
            }
        }
    }
}

impl Default for SchedulerGroup {
    fn default() -> Self {
        Self::new()
    }
}
