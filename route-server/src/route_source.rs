//! Route source: asks the directions service for an encoded polyline.
//!
//! POSTs `{"start": ..., "end": ...}` as JSON and reads the `coordinates`
//! field of the response.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use route_core::types::{Result, RouteError};

/// Anything that can turn a start/end pair into an encoded route.
#[async_trait]
pub trait RouteSource: Send + Sync {
    async fn fetch_route(&self, start: &str, end: &str) -> Result<String>;
}

#[derive(Serialize)]
struct DirectionsRequest<'a> {
    start: &'a str,
    end: &'a str,
}

#[derive(Deserialize)]
struct DirectionsResponse {
    coordinates: Option<String>,
}

/// Directions service reached over HTTP.
#[derive(Clone)]
pub struct HttpRouteSource {
    url: String,
    client: reqwest::Client,
}

impl HttpRouteSource {
    pub fn new(url: &str) -> Self {
        HttpRouteSource {
            url: url.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RouteSource for HttpRouteSource {
    async fn fetch_route(&self, start: &str, end: &str) -> Result<String> {
        let (start, end) = validate_endpoints(start, end)?;
        tracing::debug!(url = %self.url, start, end, "requesting route");

        let response = self
            .client
            .post(&self.url)
            .json(&DirectionsRequest { start, end })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RouteError::RouteFetchFailed(e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| RouteError::RouteFetchFailed(e.to_string()))?;

        parse_directions(&body)
    }
}

/// Trim both locations; both must be non-empty.
fn validate_endpoints<'a>(start: &'a str, end: &'a str) -> Result<(&'a str, &'a str)> {
    let (start, end) = (start.trim(), end.trim());
    if start.is_empty() || end.is_empty() {
        return Err(RouteError::RouteFetchFailed(
            "both start and end locations are required".into(),
        ));
    }
    Ok((start, end))
}

/// Extract the encoded polyline from a directions response body.
fn parse_directions(body: &str) -> Result<String> {
    let parsed: DirectionsResponse = serde_json::from_str(body)
        .map_err(|e| RouteError::RouteFetchFailed(format!("invalid response: {e}")))?;
    match parsed.coordinates {
        Some(encoded) if !encoded.is_empty() => Ok(encoded),
        _ => Err(RouteError::RouteFetchFailed(
            "response has no route coordinates".into(),
        )),
    }
}
