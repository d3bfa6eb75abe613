//! Live position feed over WebSocket.
//!
//! Each subscription runs one task that connects, forwards `{lat, lon}`
//! text messages into the tracker's sink, and reconnects with exponential
//! backoff when the transport drops. After the policy's attempt budget the
//! sink is told connectivity is degraded; retries continue at the capped
//! delay until the subscription is closed or the sink goes stale.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use route_core::backoff::{Backoff, ReconnectPolicy};
use route_core::channel::{Channel, Subscription};
use route_core::tracker::PositionSink;
use route_core::types::{Coordinate, RouteError};

/// WebSocket live-update channel.
pub struct WebSocketChannel {
    url: String,
    policy: ReconnectPolicy,
    runtime: Handle,
}

impl WebSocketChannel {
    /// Subscriptions are spawned onto `runtime`.
    pub fn new(url: &str, policy: ReconnectPolicy, runtime: Handle) -> Self {
        WebSocketChannel {
            url: url.to_string(),
            policy,
            runtime,
        }
    }
}

impl Channel for WebSocketChannel {
    fn open(&self, sink: PositionSink) -> Box<dyn Subscription> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        debug!(url = %self.url, generation = sink.generation(), "opening live feed");
        self.runtime.spawn(run_feed(self.url.clone(), self.policy, sink, shutdown_rx));
        Box::new(WebSocketSubscription {
            shutdown: Some(shutdown_tx),
        })
    }
}

/// Closing signals the feed task, which sends a close frame and exits.
struct WebSocketSubscription {
    shutdown: Option<oneshot::Sender<()>>,
}

impl Subscription for WebSocketSubscription {
    fn close(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            // Err means the task already exited.
            let _ = tx.send(());
        }
    }
}

impl Drop for WebSocketSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Parse a feed message. Accepts `lon` or `lng`; no range checks.
pub fn parse_position(text: &str) -> Option<Coordinate> {
    let position: Coordinate = serde_json::from_str(text).ok()?;
    if position.lat.is_finite() && position.lon.is_finite() {
        Some(position)
    } else {
        None
    }
}

type FeedStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why a connected session ended.
enum SessionEnd {
    Shutdown,
    Stale,
    Dropped(String),
}

async fn run_feed(
    url: String,
    policy: ReconnectPolicy,
    sink: PositionSink,
    mut shutdown: oneshot::Receiver<()>,
) {
    let generation = sink.generation();
    let mut backoff = Backoff::new(policy);

    loop {
        if !sink.connecting() {
            return;
        }

        let attempt = tokio::select! {
            _ = &mut shutdown => return,
            result = connect_async(url.as_str()) => result,
        };

        let reason = match attempt {
            Ok((stream, _response)) => {
                backoff.reset();
                if !sink.connected() {
                    return;
                }
                info!(%url, generation, "live feed connected");

                match run_session(stream, &sink, &mut shutdown).await {
                    SessionEnd::Shutdown | SessionEnd::Stale => return,
                    SessionEnd::Dropped(reason) => reason,
                }
            }
            Err(e) => e.to_string(),
        };

        if !sink.disconnected(&RouteError::ChannelDisconnected(reason.clone())) {
            return;
        }

        let delay = backoff.fail();
        if backoff.is_exhausted() {
            sink.degraded(&RouteError::ChannelFatal {
                attempts: backoff.failures(),
                reason,
            });
        }
        debug!(generation, failures = backoff.failures(), ?delay, "reconnecting after backoff");

        tokio::select! {
            _ = &mut shutdown => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn run_session(
    stream: FeedStream,
    sink: &PositionSink,
    shutdown: &mut oneshot::Receiver<()>,
) -> SessionEnd {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            _ = &mut *shutdown => {
                let _ = write.send(Message::Close(None)).await;
                return SessionEnd::Shutdown;
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => match parse_position(&text) {
                    Some(position) => {
                        if !sink.on_position_update(position) {
                            let _ = write.send(Message::Close(None)).await;
                            return SessionEnd::Stale;
                        }
                    }
                    None => warn!(message = %text, "ignoring malformed feed message"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = match frame {
                        Some(f) => format!("server closed the feed: {}", f.reason),
                        None => "server closed the feed".to_string(),
                    };
                    return SessionEnd::Dropped(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                None => return SessionEnd::Dropped("feed stream ended".to_string()),
            },
        }
    }
}
