//! Vertex Market Data Handler
//!
//! Streams one instrument's order book from the Vertex gateway, keeps a
//! validated local copy and renders it to the terminal.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use market_data::feed::{FeedSession, ResyncHandle, SessionSettings, VertexTransport};
use market_data::{display, Config, Metrics, Pipeline, SnapshotPublisher};

/// State shared with the health server
#[derive(Clone)]
struct AppState {
    publisher: Arc<SnapshotPublisher>,
    registry: Registry,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout belongs to the book display
    tracing_subscriber::registry()
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting Vertex Market Data Handler");

    let config = Config::load()?;
    info!(
        product_id = config.product_id,
        ws_endpoint = %config.ws_endpoint,
        "Configuration loaded"
    );

    let registry = Registry::new();
    let metrics = Metrics::new()?;
    metrics.register(&registry)?;

    let publisher = Arc::new(SnapshotPublisher::new(config.product_id));
    let (events_tx, events_rx) = mpsc::channel(config.event_buffer);
    let (resync, resync_rx) = ResyncHandle::channel();
    let shutdown = CancellationToken::new();

    let state = AppState {
        publisher: publisher.clone(),
        registry,
    };
    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = start_health_server(state, health_port).await {
            warn!(error = %e, "Health server error");
        }
    });

    if config.display {
        tokio::spawn(display::run(
            publisher.clone(),
            config.display_depth,
            shutdown.clone(),
        ));
    }

    let pipeline = Pipeline::new(config.product_id, publisher, resync, metrics.clone());
    let pipeline_task = tokio::spawn(pipeline.run(events_rx, shutdown.clone()));

    let session = FeedSession::new(
        VertexTransport::from_config(&config),
        SessionSettings::from(&config),
        events_tx,
        resync_rx,
        shutdown.clone(),
        metrics,
    );
    let mut session_task = tokio::spawn(session.run());

    let session_result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            None
        }
        result = &mut session_task => Some(result),
    };

    shutdown.cancel();
    let deadline = config.shutdown_timeout();

    let session_result = match session_result {
        Some(result) => result,
        None => match join_with_deadline("feed session", session_task, deadline).await {
            Some(result) => result,
            None => Ok(Ok(())),
        },
    };
    join_with_deadline("book pipeline", pipeline_task, deadline).await;

    info!("Market data handler stopped");
    session_result??;
    Ok(())
}

/// Await a task for at most `deadline`, aborting it on expiry
async fn join_with_deadline<T>(
    name: &str,
    mut task: JoinHandle<T>,
    deadline: Duration,
) -> Option<Result<T, tokio::task::JoinError>> {
    match timeout(deadline, &mut task).await {
        Ok(result) => Some(result),
        Err(_) => {
            error!(task = name, "Task did not stop within shutdown timeout, aborting");
            task.abort();
            None
        }
    }
}

/// Start HTTP server for health checks and metrics
async fn start_health_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let view = state.publisher.current();
    // A live book can still be one-sided
    let healthy = view.is_live() && view.metrics.is_healthy();
    Json(serde_json::json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "component": "market-data",
        "product_id": view.product_id,
        "book_status": view.status,
        "sequence": view.sequence,
        "version": view.version,
        "best_bid": view.best_bid(),
        "best_ask": view.best_ask(),
        "metrics": view.metrics,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&state.registry.gather(), &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
