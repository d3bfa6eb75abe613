//! Viewport derivation: the map extent that fits a route.
//!
//! Routes with two or more points are fitted to their bounding box. A
//! one-point route has nothing to fit, so the map centers on the tracked
//! position at a fixed zoom instead.

use serde::Serialize;

use crate::types::Coordinate;

/// Zoom used when the map centers on a point rather than fitting bounds.
pub const DEFAULT_ZOOM: u8 = 13;

/// Minimal rectangle enclosing a set of coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewportBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl ViewportBounds {
    /// Bounding box of `points`. Needs at least two points to fit a view.
    pub fn from_points(points: &[Coordinate]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }

        let first = points[0];
        let mut bounds = ViewportBounds {
            south: first.lat,
            west: first.lon,
            north: first.lat,
            east: first.lon,
        };
        for p in &points[1..] {
            bounds.south = bounds.south.min(p.lat);
            bounds.north = bounds.north.max(p.lat);
            bounds.west = bounds.west.min(p.lon);
            bounds.east = bounds.east.max(p.lon);
        }
        Some(bounds)
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        point.lat >= self.south
            && point.lat <= self.north
            && point.lon >= self.west
            && point.lon <= self.east
    }
}

/// What the map should display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Viewport {
    /// Fit the view to the route's bounding box.
    Fit(ViewportBounds),
    /// Center on a point at a fixed zoom.
    Center { center: Coordinate, zoom: u8 },
}

impl Viewport {
    /// Viewport for a route, falling back to centering on `tracked`.
    pub fn derive(bounds: Option<ViewportBounds>, tracked: Coordinate, zoom: u8) -> Self {
        match bounds {
            Some(b) => Viewport::Fit(b),
            None => Viewport::Center {
                center: tracked,
                zoom,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> Vec<Coordinate> {
        vec![
            Coordinate::new(38.5, -120.2),
            Coordinate::new(40.7, -120.95),
            Coordinate::new(43.252, -126.453),
            Coordinate::new(39.0, -119.8),
        ]
    }

    #[test]
    fn test_bounds_are_tight() {
        let points = route();
        let b = ViewportBounds::from_points(&points).unwrap();
        assert_eq!(b.south, 38.5);
        assert_eq!(b.north, 43.252);
        assert_eq!(b.west, -126.453);
        assert_eq!(b.east, -119.8);

        assert!(points.iter().all(|p| b.contains(p)));
        assert!(points.iter().any(|p| p.lat == b.south));
        assert!(points.iter().any(|p| p.lat == b.north));
        assert!(points.iter().any(|p| p.lon == b.west));
        assert!(points.iter().any(|p| p.lon == b.east));
    }

    #[test]
    fn test_bounds_need_two_points() {
        assert!(ViewportBounds::from_points(&[]).is_none());
        assert!(ViewportBounds::from_points(&[Coordinate::new(1.0, 2.0)]).is_none());
    }

    #[test]
    fn test_bounds_center() {
        let b = ViewportBounds::from_points(&[
            Coordinate::new(10.0, 20.0),
            Coordinate::new(20.0, 40.0),
        ])
        .unwrap();
        assert_eq!(b.center(), Coordinate::new(15.0, 30.0));
    }

    #[test]
    fn test_derive_falls_back_to_center() {
        let tracked = Coordinate::new(5.0, 6.0);
        assert_eq!(
            Viewport::derive(None, tracked, DEFAULT_ZOOM),
            Viewport::Center {
                center: tracked,
                zoom: DEFAULT_ZOOM
            }
        );

        let b = ViewportBounds::from_points(&route()).unwrap();
        assert_eq!(Viewport::derive(Some(b), tracked, DEFAULT_ZOOM), Viewport::Fit(b));
    }

    #[test]
    fn test_viewport_serialization() {
        let v = Viewport::Center {
            center: Coordinate::new(1.0, 2.0),
            zoom: 13,
        };
        let json = serde_json::to_value(v).unwrap();
        assert_eq!(json["mode"], "center");
        assert_eq!(json["zoom"], 13);
        assert_eq!(json["center"]["lat"], 1.0);
    }
}
