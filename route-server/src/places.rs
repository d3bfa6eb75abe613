//! Reverse geocoding of the route's start and end markers.
//!
//! Lookups are best-effort: a failure is logged and the marker gets the
//! "Unknown Location" label. Route and position state never wait on them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use route_core::tracker::RouteTracker;
use route_core::types::{Coordinate, Result, RouteError, UNKNOWN_PLACE};

/// Turns a coordinate into a human-readable place name.
#[async_trait]
pub trait PlaceLookup: Send + Sync {
    async fn lookup(&self, at: Coordinate) -> Result<String>;
}

#[derive(Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
}

/// Nominatim-style reverse geocoder (`?lat=..&lon=..&format=json`).
#[derive(Clone)]
pub struct NominatimLookup {
    url: String,
    client: reqwest::Client,
}

impl NominatimLookup {
    pub fn new(url: &str) -> Self {
        // Nominatim's usage policy requires an identifying user agent.
        let client = reqwest::Client::builder()
            .user_agent(concat!("routewatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        NominatimLookup {
            url: url.to_string(),
            client,
        }
    }
}

#[async_trait]
impl PlaceLookup for NominatimLookup {
    async fn lookup(&self, at: Coordinate) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("lat", at.lat.to_string()),
                ("lon", at.lon.to_string()),
                ("format", "json".to_string()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RouteError::PlaceLookupFailed(format!("{at}: {e}")))?;

        let body = response
            .text()
            .await
            .map_err(|e| RouteError::PlaceLookupFailed(format!("{at}: {e}")))?;

        parse_display_name(&body).map_err(|e| match e {
            RouteError::PlaceLookupFailed(msg) => RouteError::PlaceLookupFailed(format!("{at}: {msg}")),
            other => other,
        })
    }
}

fn parse_display_name(body: &str) -> Result<String> {
    let parsed: ReverseResponse = serde_json::from_str(body)
        .map_err(|e| RouteError::PlaceLookupFailed(format!("invalid response: {e}")))?;
    parsed
        .display_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| RouteError::PlaceLookupFailed("no display_name in response".into()))
}

/// Place name for `at`, or [`UNKNOWN_PLACE`] if the lookup fails.
pub async fn label_or_unknown(lookup: &dyn PlaceLookup, at: Coordinate) -> String {
    match lookup.lookup(at).await {
        Ok(name) => name,
        Err(e) => {
            tracing::warn!("{e}");
            UNKNOWN_PLACE.to_string()
        }
    }
}

/// Look up both marker names for route `generation` and attach them.
///
/// Returns `false` if the route was replaced while the lookups ran.
pub async fn resolve_markers(
    tracker: Arc<RouteTracker>,
    lookup: Arc<dyn PlaceLookup>,
    generation: u64,
) -> bool {
    let markers = match tracker.markers() {
        Some(m) => m,
        None => return false,
    };

    let (start, end) = tokio::join!(
        label_or_unknown(lookup.as_ref(), markers.start.position),
        label_or_unknown(lookup.as_ref(), markers.end.position),
    );
    tracing::info!(generation, start = %start, end = %end, "resolved marker places");
    tracker.set_place_names(generation, start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use route_core::channel::ManualChannel;
    use route_core::types::END_PLACEHOLDER;

    struct FixedLookup;

    #[async_trait]
    impl PlaceLookup for FixedLookup {
        async fn lookup(&self, at: Coordinate) -> Result<String> {
            if at.lat > 40.0 {
                Err(RouteError::PlaceLookupFailed("rate limited".into()))
            } else {
                Ok(format!("Place near {:.1}", at.lat))
            }
        }
    }

    #[test]
    fn test_parse_display_name() {
        let body = r#"{"place_id": 1, "display_name": "Sacramento, California, USA"}"#;
        assert_eq!(
            parse_display_name(body).unwrap(),
            "Sacramento, California, USA"
        );
    }

    #[test]
    fn test_parse_display_name_missing() {
        assert!(parse_display_name(r#"{"error": "Unable to geocode"}"#).is_err());
        assert!(parse_display_name(r#"{"display_name": "  "}"#).is_err());
        assert!(parse_display_name("not json").is_err());
    }

    #[tokio::test]
    async fn test_label_falls_back_on_failure() {
        let lookup = FixedLookup;
        assert_eq!(
            label_or_unknown(&lookup, Coordinate::new(38.5, -120.2)).await,
            "Place near 38.5"
        );
        assert_eq!(
            label_or_unknown(&lookup, Coordinate::new(43.0, -126.0)).await,
            UNKNOWN_PLACE
        );
    }

    #[tokio::test]
    async fn test_resolve_markers() {
        let tracker = Arc::new(RouteTracker::new(ManualChannel::new()));
        let generation = tracker.set_route(Some("_p~iF~ps|U_ulLnnqC_mqNvxq`@")).unwrap();

        let lookup: Arc<dyn PlaceLookup> = Arc::new(FixedLookup);
        assert!(resolve_markers(tracker.clone(), lookup, generation).await);

        let markers = tracker.markers().unwrap();
        assert_eq!(markers.start_label(), "Place near 38.5");
        assert_eq!(markers.end_label(), UNKNOWN_PLACE);
        assert_ne!(markers.end_label(), END_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_resolve_markers_for_replaced_route() {
        let tracker = Arc::new(RouteTracker::new(ManualChannel::new()));
        let old = tracker.set_route(Some("_p~iF~ps|U")).unwrap();
        tracker.set_route(Some("_p~iF~ps|U_ulLnnqC")).unwrap();

        let lookup: Arc<dyn PlaceLookup> = Arc::new(FixedLookup);
        assert!(!resolve_markers(tracker.clone(), lookup, old).await);
        assert!(tracker.markers().unwrap().start.place.is_none());
    }
}
