// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Control-plane HTTP server built on axum.
//!
//! Routes, middleware, and shared state. Handlers hold pointers into the
//! engine's components through [`AppState`]; there is no package-level
//! mutable state.

use std::sync::Arc;

use axum::middleware as axum_middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use ovhsnap_core::SnapError;
use ovhsnap_monitor::MonitorRunner;
use ovhsnap_queue::QueueScheduler;
use ovhsnap_store::Store;

use crate::auth::{auth_middleware, AuthConfig};
use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub scheduler: Arc<QueueScheduler>,
    pub monitor: Arc<MonitorRunner>,
    pub auth: AuthConfig,
}

/// Assemble the control-plane router.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/queue",
            get(handlers::list_queue).post(handlers::create_task),
        )
        .route("/queue/paged", get(handlers::paged_queue))
        .route("/queue/clear", delete(handlers::clear_queue))
        .route(
            "/queue/:id",
            put(handlers::update_task).delete(handlers::delete_task),
        )
        .route("/queue/:id/status", put(handlers::set_task_status))
        .route("/queue/:id/restart", put(handlers::restart_task))
        .route(
            "/purchase-history",
            get(handlers::list_history).delete(handlers::clear_history),
        )
        .route("/stats", get(handlers::stats))
        .route(
            "/vps-monitor/subscriptions",
            get(handlers::list_subscriptions).post(handlers::create_subscription),
        )
        .route(
            "/vps-monitor/subscriptions/:id",
            put(handlers::update_subscription).delete(handlers::delete_subscription),
        )
        .route("/vps-monitor/status", get(handlers::monitor_status))
        .route("/vps-monitor/start", post(handlers::monitor_start))
        .route("/vps-monitor/stop", post(handlers::monitor_stop))
        .route("/vps-monitor/interval", put(handlers::monitor_interval))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new().merge(api).layer(CorsLayer::permissive())
}

/// Bind and serve until the cancellation token fires.
pub async fn start_server(
    host: &str,
    port: u16,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), SnapError> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| SnapError::Internal(format!("failed to bind control plane to {addr}: {e}")))?;

    info!("control plane listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| SnapError::Internal(format!("control plane server error: {e}")))
}
