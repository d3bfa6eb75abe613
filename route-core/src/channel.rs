//! Live-update channel seam.
//!
//! A [`Channel`] opens one [`Subscription`] per route and pushes positions
//! into the [`PositionSink`] it was given. Transports live outside this
//! crate; [`ManualChannel`] is an in-process channel driven by the caller.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::tracker::PositionSink;
use crate::types::Coordinate;

/// Source of live position updates.
pub trait Channel: Send + Sync {
    /// Start delivering updates into `sink`. The returned handle must stop
    /// delivery when closed or dropped.
    fn open(&self, sink: PositionSink) -> Box<dyn Subscription>;
}

/// Handle to an open live-update stream.
pub trait Subscription: Send {
    /// Stop delivery. Must be idempotent.
    fn close(&mut self);
}

// ---------------------------------------------------------------------------
// Manual channel
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ManualInner {
    sinks: Vec<PositionSink>,
    active: usize,
}

/// Channel whose updates are pushed by hand.
///
/// Subscriptions connect immediately. Used when no live feed is configured
/// and to drive the tracker in tests.
#[derive(Clone, Default)]
pub struct ManualChannel {
    inner: Arc<Mutex<ManualInner>>,
}

impl ManualChannel {
    pub fn new() -> Self {
        ManualChannel::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deliver a position through the most recently opened subscription.
    pub fn push(&self, position: Coordinate) -> bool {
        match self.last_sink() {
            Some(sink) => sink.on_position_update(position),
            None => false,
        }
    }

    pub fn last_sink(&self) -> Option<PositionSink> {
        self.lock().sinks.last().cloned()
    }

    /// Subscriptions opened and not yet closed.
    pub fn active_subscriptions(&self) -> usize {
        self.lock().active
    }

    /// Subscriptions opened over the channel's lifetime.
    pub fn opened(&self) -> usize {
        self.lock().sinks.len()
    }
}

impl Channel for ManualChannel {
    fn open(&self, sink: PositionSink) -> Box<dyn Subscription> {
        {
            let mut inner = self.lock();
            inner.sinks.push(sink.clone());
            inner.active += 1;
        }
        sink.connected();
        Box::new(ManualSubscription {
            inner: Arc::clone(&self.inner),
            closed: false,
        })
    }
}

struct ManualSubscription {
    inner: Arc<Mutex<ManualInner>>,
    closed: bool,
}

impl Subscription for ManualSubscription {
    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.active = inner.active.saturating_sub(1);
    }
}

impl Drop for ManualSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::RouteTracker;

    #[test]
    fn test_push_without_subscription() {
        let channel = ManualChannel::new();
        assert!(!channel.push(Coordinate::new(1.0, 2.0)));
        assert_eq!(channel.opened(), 0);
    }

    #[test]
    fn test_subscription_close_is_idempotent() {
        let channel = ManualChannel::new();
        let tracker = RouteTracker::new(channel.clone());
        tracker.set_route(Some("_p~iF~ps|U")).unwrap();
        assert_eq!(channel.active_subscriptions(), 1);

        tracker.dispose();
        tracker.dispose();
        assert_eq!(channel.active_subscriptions(), 0);
        assert_eq!(channel.opened(), 1);
    }
}
