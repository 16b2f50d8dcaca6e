//! Push channel: one WebSocket to the backend, fanned out to any number of
//! in-process subscribers.
//!
//! The connection is owned by a background task started with
//! [`PushChannel::connect`]. While connected it sends a plain `"ping"` text
//! frame every keep-alive interval and forwards decoded message events. When
//! the socket drops, the task reconnects with exponential backoff until
//! [`PushChannel::disconnect`] is called.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::ChannelError;
use crate::models::{MESSAGE_EVENT, PushEvent};

const KEEPALIVE_FRAME: &str = "ping";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting before the next reconnect attempt
    Backoff,
}

/// Handle to the push connection. Clones share the same connection.
#[derive(Clone)]
pub struct PushChannel {
    inner: Arc<Inner>,
}

struct Inner {
    config: SyncConfig,
    state: watch::Sender<ConnectionState>,
    latest: watch::Sender<Option<PushEvent>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PushEvent>>>,
    running: Mutex<Option<Running>>,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!(?previous, ?state, "push channel state");
        }
    }

    /// Deliver to every live subscriber, pruning the ones that went away.
    fn dispatch(&self, event: PushEvent) {
        lock(&self.subscribers).retain(|tx| tx.send(event.clone()).is_ok());
        self.latest.send_replace(Some(event));
    }
}

impl PushChannel {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: watch::Sender::new(ConnectionState::Disconnected),
                latest: watch::Sender::new(None),
                subscribers: Mutex::new(Vec::new()),
                running: Mutex::new(None),
            }),
        }
    }

    /// Start the connection task. Does nothing if it is already running.
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut running = lock(&self.inner.running);
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!("push channel already running");
            return;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(self.inner.clone(), cancel.clone()));
        *running = Some(Running { cancel, handle });
    }

    /// Stop the connection task and close the socket.
    pub async fn disconnect(&self) {
        let running = lock(&self.inner.running).take();
        if let Some(Running { cancel, handle }) = running {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "push task ended abnormally");
            }
        }
        self.inner.set_state(ConnectionState::Disconnected);
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.running)
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Most recently received event, if any.
    pub fn latest(&self) -> Option<PushEvent> {
        self.inner.latest.borrow().clone()
    }

    pub fn watch_latest(&self) -> watch::Receiver<Option<PushEvent>> {
        self.inner.latest.subscribe()
    }

    /// Receive every event from now on, in arrival order.
    pub fn subscribe(&self) -> PushSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = lock(&self.inner.subscribers);
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.push(tx);
        PushSubscription { rx }
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = lock(&self.inner.subscribers);
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for PushChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushChannel")
            .field("ws_url", &self.inner.config.ws_url)
            .field("state", &self.state())
            .finish()
    }
}

/// Ordered, lossless stream of push events. Dropping it unsubscribes.
#[derive(Debug)]
pub struct PushSubscription {
    rx: mpsc::UnboundedReceiver<PushEvent>,
}

impl PushSubscription {
    /// Next event, or `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<PushEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<PushEvent> {
        self.rx.try_recv().ok()
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

/// Decode one inbound text frame. Frames of other event types yield `None`.
pub fn decode_frame(frame: &str) -> Result<Option<PushEvent>, ChannelError> {
    let envelope: Envelope = serde_json::from_str(frame)?;
    if envelope.kind != MESSAGE_EVENT {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(frame)?))
}

/// Reconnect delay: starts at `initial`, doubles per failure up to `max`.
#[derive(Debug)]
pub(crate) struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

enum SessionEnd {
    Cancelled,
    Dropped(ChannelError),
}

async fn run(inner: Arc<Inner>, cancel: CancellationToken) {
    let url = inner.config.ws_url.clone();
    let mut backoff = Backoff::new(inner.config.reconnect_initial, inner.config.reconnect_max);

    loop {
        inner.set_state(ConnectionState::Connecting);
        let attempt = tokio::select! {
            _ = cancel.cancelled() => break,
            result = tokio_tungstenite::connect_async(url.as_str()) => result,
        };

        match attempt {
            Ok((stream, _)) => {
                info!(%url, "push channel connected");
                inner.set_state(ConnectionState::Connected);
                backoff.reset();
                match session(&inner, stream, &cancel).await {
                    SessionEnd::Cancelled => break,
                    SessionEnd::Dropped(e) => warn!(%url, error = %e, "push connection dropped"),
                }
            }
            Err(e) => {
                let e = ChannelError::from_tungstenite(e);
                warn!(%url, error = %e, "push connect failed");
            }
        }

        let delay = backoff.next_delay();
        inner.set_state(ConnectionState::Backoff);
        debug!(?delay, "reconnecting push channel");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    inner.set_state(ConnectionState::Disconnected);
    info!(%url, "push channel stopped");
}

async fn session(
    inner: &Inner,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut write, mut read) = stream.split();
    let period = inner.config.keepalive_interval;
    let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return SessionEnd::Cancelled;
            }

            _ = keepalive.tick() => {
                if let Err(e) = write.send(Message::Text(KEEPALIVE_FRAME.into())).await {
                    debug!(error = %e, "keep-alive ping failed");
                }
            }

            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => match decode_frame(text.as_str()) {
                    Ok(Some(event)) => inner.dispatch(event),
                    Ok(None) => debug!("ignoring non-message push frame"),
                    Err(e) => debug!(error = %e, "dropping push frame"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    return SessionEnd::Dropped(ChannelError::Closed);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return SessionEnd::Dropped(ChannelError::from_tungstenite(e));
                }
            },
        }
    }
}
