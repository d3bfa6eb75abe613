//! REST API route handlers.
//!
//! Every handler reads one immutable tracker snapshot, so a response never
//! mixes state from two routes.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::Stream;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;

use route_core::tracker::{TrackerEvent, TrackerSnapshot};
use route_core::types::RouteMarkers;
use route_core::viewport::Viewport;

use crate::events::{event_name, event_to_json};
use crate::web::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn no_route() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "no route set"})),
    )
}

fn markers_json(markers: &RouteMarkers) -> Value {
    json!({
        "start": {
            "lat": markers.start.position.lat,
            "lon": markers.start.position.lon,
            "label": markers.start_label(),
        },
        "end": {
            "lat": markers.end.position.lat,
            "lon": markers.end.position.lon,
            "label": markers.end_label(),
        },
    })
}

fn status_json(snap: &TrackerSnapshot) -> Value {
    json!({
        "generation": snap.generation,
        "has_route": snap.has_route(),
        "connection": snap.connection,
        "connectivity": snap.connectivity,
        "updates_applied": snap.updates_applied,
        "updates_discarded": snap.updates_discarded,
    })
}

// ---------------------------------------------------------------------------
// Route endpoints
// ---------------------------------------------------------------------------

/// GET /api/route: decoded polyline, markers, and bounds.
pub async fn api_route(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snap = state.tracker.snapshot();
    let (route, markers) = match (&snap.route, &snap.markers) {
        (Some(r), Some(m)) => (r, m),
        _ => return no_route(),
    };

    let points: Vec<[f64; 2]> = route.iter().map(|c| [c.lat, c.lon]).collect();
    (
        StatusCode::OK,
        Json(json!({
            "generation": snap.generation,
            "points": points,
            "markers": markers_json(markers),
            "bounds": snap.bounds,
        })),
    )
}

/// GET /api/position: the tracked entity.
pub async fn api_position(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snap = state.tracker.snapshot();
    match snap.tracked {
        Some(p) => (
            StatusCode::OK,
            Json(json!({
                "generation": snap.generation,
                "lat": p.lat,
                "lon": p.lon,
                "updates": snap.updates_applied,
                "connectivity": snap.connectivity,
            })),
        ),
        None => no_route(),
    }
}

/// GET /api/viewport: where the map should look.
///
/// Without a route, 404 carries the configured default view so a client
/// can still place the map.
pub async fn api_viewport(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.tracker.current_viewport() {
        Some(viewport) => (StatusCode::OK, Json(json!(viewport))),
        None => {
            let fallback = Viewport::Center {
                center: state.map.default_center(),
                zoom: state.map.default_zoom,
            };
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "no route set", "default": fallback})),
            )
        }
    }
}

/// GET /api/status: connection lifecycle and counters.
pub async fn api_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(status_json(&state.tracker.snapshot()))
}

/// GET /api/snapshot: everything in one read.
pub async fn api_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snap = state.tracker.snapshot();
    let points: Option<Vec<[f64; 2]>> = snap
        .route
        .as_ref()
        .map(|r| r.iter().map(|c| [c.lat, c.lon]).collect());

    Json(json!({
        "status": status_json(&snap),
        "points": points,
        "markers": snap.markers.as_ref().map(markers_json),
        "position": snap.tracked,
        "bounds": snap.bounds,
        "viewport": snap.viewport,
    }))
}

// ---------------------------------------------------------------------------
// Event stream
// ---------------------------------------------------------------------------

/// GET /api/events: server-sent tracker events. Ends after `disposed`.
pub async fn api_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();

    let stream = futures_util::stream::unfold(Some(rx), |rx| async move {
        let mut rx = rx?;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let sse = Event::default()
                        .event(event_name(&event))
                        .data(event_to_json(&event).to_string());
                    let next = if event == TrackerEvent::Disposed {
                        None
                    } else {
                        Some(rx)
                    };
                    return Some((Ok(sse), next));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream listener lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
