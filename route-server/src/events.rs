//! Tracker event fan-out.
//!
//! `EventHub` observes the tracker, logs each event, and rebroadcasts it
//! as JSON to any number of listeners (the `/api/events` stream).

use serde_json::{json, Value};
use tokio::sync::broadcast;

use route_core::tracker::{TrackerEvent, TrackerObserver};

/// Broadcasts tracker events to async listeners.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<TrackerEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        EventHub { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.tx.subscribe()
    }
}

impl TrackerObserver for EventHub {
    fn on_event(&self, event: &TrackerEvent) {
        match event {
            TrackerEvent::PositionUpdated { .. } => {
                tracing::trace!(event = event_name(event), "tracker event")
            }
            _ => tracing::debug!(event = event_name(event), "tracker event"),
        }
        // Err only means nobody is listening.
        let _ = self.tx.send(event.clone());
    }
}

/// Short name used as the SSE event type.
pub fn event_name(event: &TrackerEvent) -> &'static str {
    match event {
        TrackerEvent::RouteSet { .. } => "route_set",
        TrackerEvent::RouteCleared { .. } => "route_cleared",
        TrackerEvent::PositionUpdated { .. } => "position",
        TrackerEvent::ConnectionChanged { .. } => "connection",
        TrackerEvent::ConnectivityChanged { .. } => "connectivity",
        TrackerEvent::PlacesResolved { .. } => "places",
        TrackerEvent::Disposed => "disposed",
    }
}

/// JSON payload for an event.
pub fn event_to_json(event: &TrackerEvent) -> Value {
    match event {
        TrackerEvent::RouteSet {
            generation,
            points,
            start,
            end,
        } => json!({
            "generation": generation,
            "points": points,
            "start": start,
            "end": end,
        }),
        TrackerEvent::RouteCleared { generation } => json!({ "generation": generation }),
        TrackerEvent::PositionUpdated {
            generation,
            position,
        } => json!({
            "generation": generation,
            "lat": position.lat,
            "lon": position.lon,
        }),
        TrackerEvent::ConnectionChanged { generation, state } => json!({
            "generation": generation,
            "state": state,
        }),
        TrackerEvent::ConnectivityChanged {
            generation,
            connectivity,
            reason,
        } => json!({
            "generation": generation,
            "connectivity": connectivity,
            "reason": reason,
        }),
        TrackerEvent::PlacesResolved {
            generation,
            start,
            end,
        } => json!({
            "generation": generation,
            "start": start,
            "end": end,
        }),
        TrackerEvent::Disposed => json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use route_core::tracker::{ConnectionState, Connectivity};
    use route_core::types::Coordinate;

    #[test]
    fn test_position_event_json() {
        let event = TrackerEvent::PositionUpdated {
            generation: 3,
            position: Coordinate::new(38.5, -120.2),
        };
        let payload = event_to_json(&event);
        assert_eq!(event_name(&event), "position");
        assert_eq!(payload["generation"], 3);
        assert_eq!(payload["lat"], 38.5);
        assert_eq!(payload["lon"], -120.2);
    }

    #[test]
    fn test_status_event_json() {
        let event = TrackerEvent::ConnectionChanged {
            generation: 1,
            state: ConnectionState::Connecting,
        };
        assert_eq!(event_to_json(&event)["state"], "connecting");

        let event = TrackerEvent::ConnectivityChanged {
            generation: 1,
            connectivity: Connectivity::Degraded,
            reason: Some("refused".into()),
        };
        let payload = event_to_json(&event);
        assert_eq!(payload["connectivity"], "degraded");
        assert_eq!(payload["reason"], "refused");
    }

    #[tokio::test]
    async fn test_hub_rebroadcasts() {
        let hub = EventHub::new(8);
        let mut rx = hub.subscribe();
        hub.on_event(&TrackerEvent::Disposed);
        assert_eq!(rx.recv().await.unwrap(), TrackerEvent::Disposed);
    }

    #[test]
    fn test_hub_without_listeners() {
        let hub = EventHub::new(8);
        hub.on_event(&TrackerEvent::RouteCleared { generation: 2 });
    }
}
