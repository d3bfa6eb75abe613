//! Route tracker: one decoded route, one tracked position, one live channel.
//!
//! `RouteTracker` owns the decoded route and hands each live-channel
//! subscription a [`PositionSink`] bound to the route generation it was
//! opened for. Every mutation goes through a single mutex, and a sink only
//! writes while its generation is current and the tracker is not disposed,
//! so updates racing with `set_route` or `dispose` are dropped rather than
//! applied to a newer route or resurrecting torn-down state. Events are
//! queued under that same mutex, so observers see them in the order the
//! changes were applied.
//!
//! Consumers read immutable [`TrackerSnapshot`]s or register a
//! [`TrackerObserver`] to be told about each [`TrackerEvent`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::{debug, error, info, warn};

use crate::channel::{Channel, Subscription};
use crate::polyline;
use crate::types::*;
use crate::viewport::{Viewport, ViewportBounds, DEFAULT_ZOOM};

// ---------------------------------------------------------------------------
// Connection status
// ---------------------------------------------------------------------------

/// Lifecycle of the live-update subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal; only reached through `dispose`.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Whether the live feed is keeping up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Healthy,
    /// Reconnects keep failing; the tracked position may be stale.
    Degraded,
}

// ---------------------------------------------------------------------------
// Events (output)
// ---------------------------------------------------------------------------

/// State changes published to observers.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// A new route replaced the previous one.
    RouteSet {
        generation: u64,
        points: usize,
        start: Coordinate,
        end: Coordinate,
    },
    /// `set_route(None)` dropped the route.
    RouteCleared { generation: u64 },
    /// The tracked position moved.
    PositionUpdated {
        generation: u64,
        position: Coordinate,
    },
    ConnectionChanged {
        generation: u64,
        state: ConnectionState,
    },
    ConnectivityChanged {
        generation: u64,
        connectivity: Connectivity,
        reason: Option<String>,
    },
    /// Place names for the start and end markers were resolved.
    PlacesResolved {
        generation: u64,
        start: String,
        end: String,
    },
    Disposed,
}

/// Receives tracker events, in the order the state changes were applied.
///
/// Called outside the tracker's lock, one event at a time.
pub trait TrackerObserver: Send + Sync {
    fn on_event(&self, event: &TrackerEvent);
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Immutable view of the tracker at one instant.
#[derive(Debug, Clone)]
pub struct TrackerSnapshot {
    pub generation: u64,
    pub route: Option<Arc<Vec<Coordinate>>>,
    pub tracked: Option<Coordinate>,
    pub markers: Option<RouteMarkers>,
    pub bounds: Option<ViewportBounds>,
    pub viewport: Option<Viewport>,
    pub connection: ConnectionState,
    pub connectivity: Connectivity,
    pub updates_applied: u64,
    pub updates_discarded: u64,
}

impl TrackerSnapshot {
    pub fn has_route(&self) -> bool {
        self.route.is_some()
    }

    pub fn route_len(&self) -> usize {
        self.route.as_ref().map(|r| r.len()).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct TrackerState {
    generation: u64,
    disposed: bool,
    route: Option<Arc<Vec<Coordinate>>>,
    tracked: Option<Coordinate>,
    markers: Option<RouteMarkers>,
    bounds: Option<ViewportBounds>,
    connection: ConnectionState,
    connectivity: Connectivity,
    updates_applied: u64,
    updates_discarded: u64,
    // Events queued in the order their state changes were applied.
    pending: VecDeque<TrackerEvent>,
    dispatching: bool,
}

impl TrackerState {
    fn new() -> Self {
        TrackerState {
            generation: 0,
            disposed: false,
            route: None,
            tracked: None,
            markers: None,
            bounds: None,
            connection: ConnectionState::Disconnected,
            connectivity: Connectivity::Healthy,
            updates_applied: 0,
            updates_discarded: 0,
            pending: VecDeque::new(),
            dispatching: false,
        }
    }

    fn clear_route(&mut self) {
        self.route = None;
        self.tracked = None;
        self.markers = None;
        self.bounds = None;
        self.connectivity = Connectivity::Healthy;
    }

    fn is_current(&self, generation: u64) -> bool {
        !self.disposed && self.generation == generation && self.route.is_some()
    }

    fn emit(&mut self, event: TrackerEvent) {
        self.pending.push_back(event);
    }

    /// Returns `true` if the state changed.
    fn set_connection(&mut self, generation: u64, state: ConnectionState) -> bool {
        if self.connection == state {
            return false;
        }
        self.connection = state;
        self.emit(TrackerEvent::ConnectionChanged { generation, state });
        true
    }
}

struct Shared {
    state: Mutex<TrackerState>,
    observers: RwLock<Vec<Arc<dyn TrackerObserver>>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deliver queued events to observers, outside the state lock.
    ///
    /// One caller drains the queue at a time. A caller that finds a drain
    /// in progress returns at once; its events are delivered by the
    /// draining thread, after everything queued before them.
    fn dispatch(&self) {
        {
            let mut st = self.lock();
            if st.dispatching {
                return;
            }
            st.dispatching = true;
        }
        loop {
            let event = {
                let mut st = self.lock();
                match st.pending.pop_front() {
                    Some(event) => event,
                    None => {
                        st.dispatching = false;
                        return;
                    }
                }
            };
            let observers: Vec<Arc<dyn TrackerObserver>> = self
                .observers
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            for observer in &observers {
                observer.on_event(&event);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Position sink
// ---------------------------------------------------------------------------

/// Write handle given to a channel subscription.
///
/// Bound to the route generation it was issued for. Once the route is
/// replaced or the tracker disposed, every method becomes a no-op and
/// returns `false`.
#[derive(Clone)]
pub struct PositionSink {
    shared: Arc<Shared>,
    generation: u64,
}

impl PositionSink {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while this sink's route is the tracker's current route.
    pub fn is_current(&self) -> bool {
        self.shared.lock().is_current(self.generation)
    }

    /// Replace the tracked position. No range or geometry checks: the
    /// feed is trusted.
    pub fn on_position_update(&self, position: Coordinate) -> bool {
        {
            let mut st = self.shared.lock();
            if !st.is_current(self.generation) {
                st.updates_discarded += 1;
                debug!(
                    generation = self.generation,
                    current = st.generation,
                    disposed = st.disposed,
                    "discarding stale position update"
                );
                return false;
            }
            st.tracked = Some(position);
            st.updates_applied += 1;
            st.emit(TrackerEvent::PositionUpdated {
                generation: self.generation,
                position,
            });
        }
        self.shared.dispatch();
        true
    }

    /// A (re)connect attempt has started.
    pub fn connecting(&self) -> bool {
        self.set_connection(ConnectionState::Connecting)
    }

    /// Handshake succeeded. Restores healthy connectivity.
    pub fn connected(&self) -> bool {
        let (recovered, changed) = {
            let mut st = self.shared.lock();
            if !st.is_current(self.generation) {
                return false;
            }
            let recovered = st.connectivity == Connectivity::Degraded;
            if recovered {
                st.connectivity = Connectivity::Healthy;
                st.emit(TrackerEvent::ConnectivityChanged {
                    generation: self.generation,
                    connectivity: Connectivity::Healthy,
                    reason: None,
                });
            }
            let changed = st.set_connection(self.generation, ConnectionState::Connected);
            (recovered, changed)
        };
        if recovered {
            info!(generation = self.generation, "live channel recovered");
        }
        if changed {
            debug!(generation = self.generation, "connection state changed to connected");
        }
        self.shared.dispatch();
        true
    }

    /// Transport dropped or a connect attempt failed. The channel is
    /// expected to retry per its reconnect policy.
    pub fn disconnected(&self, cause: &RouteError) -> bool {
        if !self.is_current() {
            return false;
        }
        warn!(generation = self.generation, "{cause}");
        self.set_connection(ConnectionState::Disconnected)
    }

    /// Reconnects keep failing. The tracker stays usable with the last
    /// known position.
    pub fn degraded(&self, cause: &RouteError) -> bool {
        {
            let mut st = self.shared.lock();
            if !st.is_current(self.generation) {
                return false;
            }
            if st.connectivity == Connectivity::Degraded {
                return true;
            }
            st.connectivity = Connectivity::Degraded;
            st.emit(TrackerEvent::ConnectivityChanged {
                generation: self.generation,
                connectivity: Connectivity::Degraded,
                reason: Some(cause.to_string()),
            });
        }
        error!(generation = self.generation, "{cause}");
        self.shared.dispatch();
        true
    }

    fn set_connection(&self, state: ConnectionState) -> bool {
        let changed = {
            let mut st = self.shared.lock();
            if !st.is_current(self.generation) {
                return false;
            }
            st.set_connection(self.generation, state)
        };
        if changed {
            debug!(generation = self.generation, %state, "connection state changed");
            self.shared.dispatch();
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Merges a decoded route with a live position feed.
pub struct RouteTracker {
    shared: Arc<Shared>,
    channel: Box<dyn Channel>,
    // Also serializes set_route/dispose so subscriptions never overlap.
    subscription: Mutex<Option<Box<dyn Subscription>>>,
    default_zoom: u8,
}

impl RouteTracker {
    pub fn new(channel: impl Channel + 'static) -> Self {
        RouteTracker::with_channel(Box::new(channel))
    }

    pub fn with_channel(channel: Box<dyn Channel>) -> Self {
        RouteTracker {
            shared: Arc::new(Shared {
                state: Mutex::new(TrackerState::new()),
                observers: RwLock::new(Vec::new()),
            }),
            channel,
            subscription: Mutex::new(None),
            default_zoom: DEFAULT_ZOOM,
        }
    }

    /// Zoom used by the single-point viewport fallback.
    pub fn with_default_zoom(mut self, zoom: u8) -> Self {
        self.default_zoom = zoom;
        self
    }

    /// Register an observer for all subsequent events.
    pub fn subscribe(&self, observer: Arc<dyn TrackerObserver>) {
        self.shared
            .observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    /// Replace the route, or clear it with `None`.
    ///
    /// The new route is decoded before anything changes, so a malformed
    /// encoding leaves the previous route, position and subscription intact.
    /// On success the previous subscription is closed before the new one is
    /// opened. Returns the new route generation.
    pub fn set_route(&self, encoded: Option<&str>) -> Result<u64> {
        let points = match encoded {
            Some(text) => Some(polyline::decode(text)?),
            None => None,
        };

        let mut slot = self
            .subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        let (generation, opened) = {
            let mut st = self.shared.lock();
            if st.disposed {
                return Err(RouteError::Disposed);
            }
            st.generation += 1;
            let generation = st.generation;
            let (event, opened) = match points {
                Some(points) => {
                    let start = points[0];
                    let end = points[points.len() - 1];
                    st.bounds = ViewportBounds::from_points(&points);
                    st.markers = RouteMarkers::from_route(&points);
                    st.tracked = Some(start);
                    st.connectivity = Connectivity::Healthy;
                    st.connection = ConnectionState::Connecting;
                    let len = points.len();
                    st.route = Some(Arc::new(points));
                    let event = TrackerEvent::RouteSet {
                        generation,
                        points: len,
                        start,
                        end,
                    };
                    (event, Some(len))
                }
                None => {
                    st.clear_route();
                    st.connection = ConnectionState::Disconnected;
                    (TrackerEvent::RouteCleared { generation }, None)
                }
            };
            st.emit(event);
            (generation, opened)
        };

        if let Some(mut previous) = slot.take() {
            debug!(generation, "closing previous subscription");
            previous.close();
        }

        match opened {
            Some(points) => {
                info!(generation, points, "route set, opening live subscription");
                let sink = PositionSink {
                    shared: Arc::clone(&self.shared),
                    generation,
                };
                *slot = Some(self.channel.open(sink));
            }
            None => info!(generation, "route cleared"),
        }
        drop(slot);

        self.shared.dispatch();
        Ok(generation)
    }

    /// Close the subscription and release all state. Idempotent.
    ///
    /// Once this returns no position update can change the tracker, and
    /// `Disposed` is queued after every event already applied. If another
    /// thread is delivering events at that moment, it delivers `Disposed`.
    pub fn dispose(&self) {
        let mut slot = self
            .subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        {
            let mut st = self.shared.lock();
            if st.disposed {
                return;
            }
            st.disposed = true;
            st.generation += 1;
            st.clear_route();
            st.connection = ConnectionState::Closed;
            st.emit(TrackerEvent::Disposed);
        }
        if let Some(mut subscription) = slot.take() {
            subscription.close();
        }
        drop(slot);

        info!("route tracker disposed");
        self.shared.dispatch();
    }

    /// Attach resolved place names to the markers of route `generation`.
    ///
    /// Returns `false` if that route has since been replaced.
    pub fn set_place_names(&self, generation: u64, start: String, end: String) -> bool {
        {
            let mut st = self.shared.lock();
            if !st.is_current(generation) {
                debug!(generation, "dropping place names for replaced route");
                return false;
            }
            if let Some(markers) = st.markers.as_mut() {
                markers.start.place = Some(start.clone());
                markers.end.place = Some(end.clone());
            }
            st.emit(TrackerEvent::PlacesResolved {
                generation,
                start,
                end,
            });
        }
        self.shared.dispatch();
        true
    }

    /// Map extent for the current route, or `None` without a route.
    pub fn current_viewport(&self) -> Option<Viewport> {
        let st = self.shared.lock();
        let tracked = st.tracked?;
        Some(Viewport::derive(st.bounds, tracked, self.default_zoom))
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        let st = self.shared.lock();
        let viewport = st
            .tracked
            .map(|t| Viewport::derive(st.bounds, t, self.default_zoom));
        TrackerSnapshot {
            generation: st.generation,
            route: st.route.clone(),
            tracked: st.tracked,
            markers: st.markers.clone(),
            bounds: st.bounds,
            viewport,
            connection: st.connection,
            connectivity: st.connectivity,
            updates_applied: st.updates_applied,
            updates_discarded: st.updates_discarded,
        }
    }

    pub fn route(&self) -> Option<Arc<Vec<Coordinate>>> {
        self.shared.lock().route.clone()
    }

    pub fn tracked_position(&self) -> Option<Coordinate> {
        self.shared.lock().tracked
    }

    pub fn markers(&self) -> Option<RouteMarkers> {
        self.shared.lock().markers.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.lock().connection
    }

    pub fn connectivity(&self) -> Connectivity {
        self.shared.lock().connectivity
    }

    pub fn generation(&self) -> u64 {
        self.shared.lock().generation
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }
}

impl Drop for RouteTracker {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
