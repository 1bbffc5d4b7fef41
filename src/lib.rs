pub mod codec;
pub mod config;
pub mod drain;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod record;
pub mod recorder;
pub mod scheduler;
pub mod server;
pub mod sink;
pub mod store;

use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use record::AnalyticsRecord;
pub use recorder::Recorder;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Capture side; every clone writes to the same staging store.
    pub recorder: Recorder,

    /// Drain statistics. Schedulers push samples; handlers read snapshots.
    pub metrics: Arc<metrics::DrainMetrics>,

    /// Wakes the drain schedulers for an immediate cycle.
    pub flush: scheduler::FlushHandle,
}

/// Install the global tracing subscriber. `RUST_LOG` overrides `level`.
///
/// Call once, from `main`.
pub fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
