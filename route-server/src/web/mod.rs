//! Web server: axum JSON API over the live route tracker.
//!
//! Shared state holds the tracker, the event hub feeding `/api/events`, and
//! the map defaults used before a route is loaded.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use http::header::{HeaderValue, CACHE_CONTROL};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use route_core::config::MapConfig;
use route_core::tracker::RouteTracker;

use crate::events::EventHub;

pub mod routes;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub tracker: Arc<RouteTracker>,
    pub events: EventHub,
    pub map: MapConfig,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/route", axum::routing::get(routes::api_route))
        .route("/api/position", axum::routing::get(routes::api_position))
        .route("/api/viewport", axum::routing::get(routes::api_viewport))
        .route("/api/status", axum::routing::get(routes::api_status))
        .route("/api/snapshot", axum::routing::get(routes::api_snapshot))
        .route("/api/events", axum::routing::get(routes::api_events))
        .with_state(state)
        // Everything here is live state.
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(cors)
}

/// Serve the API until `shutdown` resolves.
pub async fn serve(
    state: Arc<AppState>,
    host: &str,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("route API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
