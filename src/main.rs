use std::sync::Arc;

use anyhow::Context;

use analytics_pump::config::{self, Config, StagingBackend};
use analytics_pump::drain::DrainOptions;
use analytics_pump::metrics::DrainMetrics;
use analytics_pump::scheduler::{DrainScheduler, SchedulerGroup};
use analytics_pump::sink::mongo::MongoConnector;
use analytics_pump::sink::{DocumentStoreSink, FlatFileSink, Sink, SinkKind};
use analytics_pump::store::{self, MemoryStagingStore, RedisStagingStore, StagingStore};
use analytics_pump::{init_tracing, server, AppState, Recorder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration & logging ───────────────────────────────
    let cfg = config::load_config().context("loading configuration")?;
    init_tracing(&cfg.server.log_level, cfg.server.log_format == "json");

    // ── 2. Staging store ─────────────────────────────────────────
    let (staging, dead_letters) = open_staging(&cfg).await?;

    // ── 3. Drain schedulers, one per sink ────────────────────────
    let metrics = Arc::new(DrainMetrics::new());
    let mut schedulers = SchedulerGroup::new();

    if cfg.analytics.sinks.len() > 1 {
        tracing::warn!(
            sinks = ?cfg.analytics.sinks,
            "Several sinks drain the same staging store independently; records may reach only one of them"
        );
    }
    for kind in &cfg.analytics.sinks {
        let scheduler = DrainScheduler::new(
            build_sink(*kind, &cfg),
            staging.clone(),
            cfg.analytics.flush_interval(),
            DrainOptions {
                dead_letters: dead_letters.clone(),
            },
            metrics.clone(),
        );
        schedulers.spawn(scheduler);
    }

    // ── 4. Shared state & router ─────────────────────────────────
    let state = Arc::new(AppState {
        recorder: Recorder::new(staging),
        metrics,
        flush: schedulers.flush_handle(),
    });
    let app = server::create_router(state);

    // ── 5. Bind & serve until Ctrl-C ─────────────────────────────
    let listener = tokio::net::TcpListener::bind(&cfg.server.listen_addr)
        .await
        .with_context(|| format!("binding {}", cfg.server.listen_addr))?;
    tracing::info!(addr = %cfg.server.listen_addr, "Analytics pump listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")?;

    // ── 6. Let in-flight drains finish ───────────────────────────
    tracing::info!("Stopping drain schedulers");
    schedulers.shutdown().await;

    Ok(())
}

type Stores = (Arc<dyn StagingStore>, Option<Arc<dyn StagingStore>>);

async fn open_staging(cfg: &Config) -> anyhow::Result<Stores> {
    let staging = &cfg.staging;
    match staging.backend {
        StagingBackend::Redis => {
            tracing::info!(url = %staging.redis_url, prefix = %staging.key_prefix, "Connecting to Redis");
            let conn = store::redis::connect(&staging.redis_url)
                .await
                .context("connecting to Redis")?;
            let redis_store = RedisStagingStore::new(conn, staging.key_prefix.clone());
            let dead = staging.dead_letter_prefix.as_ref().map(|prefix| {
                let dead: Arc<dyn StagingStore> = Arc::new(redis_store.with_prefix(prefix.clone()));
                dead
            });
            let main: Arc<dyn StagingStore> = Arc::new(redis_store);
            Ok((main, dead))
        }
        StagingBackend::Memory => {
            tracing::warn!("Using in-process staging store; staged hits are lost on restart");
            // Config validation rejects dead letters for this backend
            let main: Arc<dyn StagingStore> = Arc::new(MemoryStagingStore::new());
            Ok((main, None))
        }
    }
}

fn build_sink(kind: SinkKind, cfg: &Config) -> Sink {
    let a = &cfg.analytics;
    match kind {
        SinkKind::Csv => Sink::FlatFile(FlatFileSink::new(&a.csv_output_directory)),
        SinkKind::Mongo => {
            let connector = MongoConnector::new(
                a.document_store_url.clone(),
                a.document_store_database.clone(),
                a.document_store_collection.clone(),
            );
            Sink::DocumentStore(DocumentStoreSink::new(Arc::new(connector), a.retry_policy()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
