use axum::{routing::get, Router};
use backend::{build_router, config::Config, state::AppState};
use engine::history::{HistorySink, MemoryHistorySink, RedisHistorySink};
use engine::settlement_worker::{loss_channel, LoggingLossHandler};
use engine::{Broadcaster, EngineScheduler, HistoryStore, RoundEngine, SettlementWorker, SystemClock};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with JSON formatting (configurable via env)
    let use_json = std::env::var("LOG_FORMAT")
        .unwrap_or_else(|_| "text".to_string())
        .eq_ignore_ascii_case("json");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "engine=info,backend=info,tower_http=info".into());

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        service = "backend",
        version = env!("CARGO_PKG_VERSION"),
        log_format = if use_json { "json" } else { "text" },
        "Starting crash backend"
    );

    // Load configuration; invalid engine settings are fatal here
    let config = Config::load()?;
    tracing::info!(
        house_edge_bps = config.engine.house_edge_bps,
        betting_window_ms = config.engine.timing.betting_window_ms,
        cooldown_ms = config.engine.timing.cooldown_ms,
        tick_interval_ms = config.engine.timing.tick_interval_ms,
        "Configuration loaded"
    );

    // Audit log sink
    let sink: Arc<dyn HistorySink> = match config.engine.history.redis_url.as_deref() {
        Some(url) => {
            let sink = RedisHistorySink::connect(url).await?;
            tracing::info!("Redis connected, history persisted to Redis");
            Arc::new(sink)
        }
        None => {
            tracing::warn!("REDIS_URL not set, history kept in memory only");
            Arc::new(MemoryHistorySink::new())
        }
    };
    let history = Arc::new(HistoryStore::new(config.engine.history.capacity, sink));
    history.restore().await;

    let (loss_tx, loss_rx) = loss_channel();
    let engine = Arc::new(RoundEngine::new(
        config.engine.clone(),
        Arc::new(SystemClock),
        Broadcaster::default(),
        history.clone(),
        loss_tx,
    )?);
    engine.start().await?;

    let shutdown = CancellationToken::new();
    let mut handles = Vec::new();

    handles.push(tokio::spawn(
        EngineScheduler::new(engine.clone()).run(shutdown.clone()),
    ));
    handles.push(tokio::spawn(
        history
            .clone()
            .run_flusher(config.engine.history_flush_interval(), shutdown.clone()),
    ));
    // Cancelled only after the scheduler has played out the last round
    let settlement_shutdown = CancellationToken::new();
    let settlement_handle = tokio::spawn(
        SettlementWorker::new(loss_rx, Arc::new(LoggingLossHandler))
            .run(settlement_shutdown.clone()),
    );

    // Start metrics server
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = start_metrics_server(metrics_port).await {
            tracing::error!(error = %e, "Metrics server failed");
        }
    });

    let app = build_router(AppState::new(engine));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!("Backend API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    tracing::info!("HTTP server stopped, finishing background tasks");
    shutdown.cancel();
    for handle in handles {
        handle.await?;
    }
    settlement_shutdown.cancel();
    settlement_handle.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        }
        _ = shutdown.cancelled() => {}
    }
}

async fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let handle = builder.install_recorder()?;

    let app = Router::new().route("/metrics", get(|| async move { handle.render() }));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Metrics server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
