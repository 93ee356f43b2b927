//! HTTP gateway: chat page, chat endpoint and read-only session views.

pub mod error;
pub mod handlers;

pub use handlers::{parse_chat_request, ChatRequest};

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::config::Config;
use crate::orchestrator::ChatOrchestrator;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
}

/// Per-request limits applied as tower layers.
#[derive(Debug, Clone, Copy)]
pub struct GatewayLimits {
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
}

impl GatewayLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.gateway.request_timeout_secs),
            max_body_bytes: config.gateway.max_body_bytes,
        }
    }
}

pub fn build_router(state: AppState, limits: GatewayLimits) -> Router {
    Router::new()
        .route("/", get(handlers::handle_index))
        .route("/chat", post(handlers::handle_chat))
        .route(
            "/sessions/{session_id}/history",
            get(handlers::handle_history),
        )
        .route("/health", get(handlers::handle_health))
        .route("/metrics", get(handlers::handle_metrics))
        .fallback(handlers::handle_not_found)
        .layer(
            ServiceBuilder::new()
                .layer(RequestBodyLimitLayer::new(limits.max_body_bytes))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    limits.request_timeout,
                )),
        )
        .layer(middleware::map_response(error::json_error_body))
        .with_state(state)
}

/// Bind `host:port` and serve until Ctrl-C.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let orchestrator = ChatOrchestrator::from_config(&config)?;
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
    };
    let app = build_router(state.clone(), GatewayLimits::from_config(&config));

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind gateway on {addr}"))?;
    let local = listener.local_addr()?;

    tracing::info!(
        addr = %local,
        provider = state.orchestrator.provider_name(),
        sessions_backend = state.orchestrator.sessions().storage_name(),
        max_history = state.orchestrator.sessions().max_history(),
        "Gateway listening"
    );
    println!("chatrelay listening on http://{local}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Gateway server error")?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
