//! Shared types and the error enum for route-core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors produced by route-core and its adapters.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("malformed polyline encoding: {0}")]
    MalformedEncoding(String),
    #[error("route fetch failed: {0}")]
    RouteFetchFailed(String),
    #[error("place lookup failed: {0}")]
    PlaceLookupFailed(String),
    #[error("live channel disconnected: {0}")]
    ChannelDisconnected(String),
    #[error("live channel failed after {attempts} attempts: {reason}")]
    ChannelFatal { attempts: u32, reason: String },
    #[error("tracker has been disposed")]
    Disposed,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RouteError>;

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// Polyline fixed-point scale (five decimal places).
pub const COORD_SCALE: f64 = 1e5;

/// A geographic point in decimal degrees.
///
/// Live feed messages may spell longitude `lng`; both deserialize here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    #[serde(alias = "lng")]
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Coordinate { lat, lon }
    }

    /// Build from fixed-point values (degrees × 1e5).
    pub fn from_e5(lat_e5: i64, lon_e5: i64) -> Self {
        Coordinate {
            lat: lat_e5 as f64 / COORD_SCALE,
            lon: lon_e5 as f64 / COORD_SCALE,
        }
    }

    /// Round to fixed-point values (degrees × 1e5).
    pub fn to_e5(&self) -> (i64, i64) {
        (
            (self.lat * COORD_SCALE).round() as i64,
            (self.lon * COORD_SCALE).round() as i64,
        )
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.5}, {:.5})", self.lat, self.lon)
    }
}

/// Parse `"lat,lon"` into a coordinate.
pub fn parse_coordinate(text: &str) -> Option<Coordinate> {
    let (lat, lon) = text.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    if !lat.is_finite() || !lon.is_finite() {
        return None;
    }
    Some(Coordinate::new(lat, lon))
}

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

/// Label shown for the start marker until a place name resolves.
pub const START_PLACEHOLDER: &str = "Start Location";

/// Label shown for the end marker until a place name resolves.
pub const END_PLACEHOLDER: &str = "End Location";

/// Label used when the place-name lookup fails.
pub const UNKNOWN_PLACE: &str = "Unknown Location";

/// A route boundary marker (first or last route point).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub position: Coordinate,
    pub place: Option<String>,
}

impl Marker {
    pub fn new(position: Coordinate) -> Self {
        Marker {
            position,
            place: None,
        }
    }

    /// Resolved place name, or the given placeholder.
    pub fn label<'a>(&'a self, placeholder: &'a str) -> &'a str {
        self.place.as_deref().unwrap_or(placeholder)
    }
}

/// Start and end markers of the current route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteMarkers {
    pub start: Marker,
    pub end: Marker,
}

impl RouteMarkers {
    /// Derive markers from a decoded route. `None` for an empty slice.
    pub fn from_route(points: &[Coordinate]) -> Option<Self> {
        let first = *points.first()?;
        let last = *points.last()?;
        Some(RouteMarkers {
            start: Marker::new(first),
            end: Marker::new(last),
        })
    }

    pub fn start_label(&self) -> &str {
        self.start.label(START_PLACEHOLDER)
    }

    pub fn end_label(&self) -> &str {
        self.end.label(END_PLACEHOLDER)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_e5() {
        let c = Coordinate::from_e5(3_850_000, -12_020_000);
        assert_eq!(c, Coordinate::new(38.5, -120.2));
    }

    #[test]
    fn test_to_e5_rounds() {
        let c = Coordinate::new(43.252004, -126.452996);
        assert_eq!(c.to_e5(), (4_325_200, -12_645_300));
    }

    #[test]
    fn test_parse_coordinate() {
        assert_eq!(
            parse_coordinate("38.5, -120.2"),
            Some(Coordinate::new(38.5, -120.2))
        );
        assert_eq!(parse_coordinate("38.5"), None);
        assert_eq!(parse_coordinate("abc,1"), None);
        assert_eq!(parse_coordinate("NaN,1"), None);
    }

    #[test]
    fn test_coordinate_deserialize_lng_alias() {
        let c: Coordinate = serde_json::from_str(r#"{"lat": 1.5, "lng": 2.5}"#).unwrap();
        assert_eq!(c, Coordinate::new(1.5, 2.5));
        let c: Coordinate = serde_json::from_str(r#"{"lat": 1.5, "lon": 2.5}"#).unwrap();
        assert_eq!(c, Coordinate::new(1.5, 2.5));
    }

    #[test]
    fn test_markers_single_point() {
        let p = Coordinate::new(10.0, 20.0);
        let markers = RouteMarkers::from_route(&[p]).unwrap();
        assert_eq!(markers.start.position, markers.end.position);
        assert!(RouteMarkers::from_route(&[]).is_none());
    }

    #[test]
    fn test_marker_labels() {
        let mut markers =
            RouteMarkers::from_route(&[Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)])
                .unwrap();
        assert_eq!(markers.start_label(), START_PLACEHOLDER);
        assert_eq!(markers.end_label(), END_PLACEHOLDER);
        markers.start.place = Some("Sacramento".into());
        assert_eq!(markers.start_label(), "Sacramento");
    }
}
