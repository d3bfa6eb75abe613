//! route-core: Polyline decoding and live route tracking.
//!
//! No async, no network I/O. Holds the codec, viewport math, reconnect policy,
//! and the tracker state machine. Transports for the route service, place
//! lookup, and live feed live in `route-server`.

pub mod backoff;
pub mod channel;
pub mod config;
pub mod polyline;
pub mod tracker;
pub mod types;
pub mod viewport;

// Re-export commonly used types at crate root
pub use channel::{Channel, ManualChannel, Subscription};
pub use polyline::{decode, encode};
pub use tracker::{
    ConnectionState, Connectivity, PositionSink, RouteTracker, TrackerEvent, TrackerObserver,
    TrackerSnapshot,
};
pub use types::*;
pub use viewport::{Viewport, ViewportBounds};
