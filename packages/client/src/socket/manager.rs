//! WebSocket connection manager.
//!
//! Owns at most one live transport connection per process regardless of how
//! many consumers request one. Consumers hold [`Subscription`]s; incoming
//! frames fan out to every subscription in arrival order. When the last
//! subscription is dropped the connection is torn down: nobody needs
//! real-time updates at that point.
//!
//! The manager is an explicitly constructed service meant to be shared as an
//! `Arc`, not a process-wide global, so tests can run several against
//! different endpoints.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use agora_shared::frame::{ClientFrame, ServerFrame};
use agora_shared::model::Identity;

use crate::error::ClientError;

use super::flags::{self, ConnectionFlags};
use super::state::{LinkEvent, LinkState, NORMAL_CLOSURE};

/// Tunables for the connection manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Real-time endpoint, e.g. `ws://127.0.0.1:8080/ws`.
    pub endpoint: String,
    /// Delay before a reconnect attempt after a non-normal closure.
    pub reconnect_delay: Duration,
    /// Upper bound on a single dial attempt; a hung handshake counts as a
    /// transport failure instead of pinning the connecting state forever.
    pub connect_timeout: Duration,
    /// Debounce window for the UI-facing connection flags.
    pub debounce_window: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8080/ws".to_string(),
            reconnect_delay: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(10),
            debounce_window: Duration::from_millis(300),
        }
    }
}

type Stream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

struct Inner {
    config: ManagerConfig,
    identity: Mutex<Option<Identity>>,
    subscribers: Mutex<HashMap<u64, mpsc::UnboundedSender<ServerFrame>>>,
    next_subscriber_id: AtomicU64,
    state_tx: watch::Sender<LinkState>,
    /// Writer half of the live connection; `None` while closed.
    outbound: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    /// Flipped on explicit disconnect and on last-unsubscribe teardown.
    shutdown_tx: watch::Sender<bool>,
    auth_rejected: AtomicBool,
    last_error: Mutex<Option<String>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

/// Shared connection service. Cheap to clone via `Arc`.
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

/// A registered frame listener. Dropping it unregisters; dropping the last
/// one tears the connection down.
pub struct Subscription {
    id: u64,
    inner: Arc<Inner>,
    rx: mpsc::UnboundedReceiver<ServerFrame>,
}

impl Subscription {
    /// Receive the next frame. `None` once the manager stops for good.
    pub async fn recv(&mut self) -> Option<ServerFrame> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let remaining = {
            let mut subscribers = self.inner.subscribers.lock().unwrap();
            subscribers.remove(&self.id);
            subscribers.len()
        };
        if remaining == 0 {
            // Last subscriber gone: close the connection and cancel any
            // pending reconnect.
            let _ = self.inner.shutdown_tx.send(true);
        }
    }
}

impl ConnectionManager {
    pub fn new(config: ManagerConfig) -> Arc<Self> {
        let (state_tx, _) = watch::channel(LinkState::Idle);
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            inner: Arc::new(Inner {
                config,
                identity: Mutex::new(None),
                subscribers: Mutex::new(HashMap::new()),
                next_subscriber_id: AtomicU64::new(1),
                state_tx,
                outbound: Mutex::new(None),
                shutdown_tx,
                auth_rejected: AtomicBool::new(false),
                last_error: Mutex::new(None),
                supervisor: Mutex::new(None),
            }),
        })
    }

    /// Open the connection as `identity`. Idempotent: already open resolves
    /// immediately, a dial in flight is awaited, otherwise a new attempt
    /// starts. Resolves once the transport opens (the auth frame has been
    /// written), errors if the attempt fails at the transport level.
    pub async fn connect(&self, identity: Identity) -> Result<(), ClientError> {
        *self.inner.identity.lock().unwrap() = Some(identity);
        self.inner.auth_rejected.store(false, Ordering::SeqCst);

        let mut state_rx = self.inner.state_tx.subscribe();
        if state_rx.borrow_and_update().is_open() {
            return Ok(());
        }

        self.ensure_supervisor();

        loop {
            if state_rx.changed().await.is_err() {
                return Err(ClientError::Connection(
                    "connection manager stopped".to_string(),
                ));
            }
            match *state_rx.borrow_and_update() {
                LinkState::Open => return Ok(()),
                // A concurrent teardown can retire the supervisor between
                // our spawn check and its exit; dial again.
                LinkState::Idle => self.ensure_supervisor(),
                LinkState::Closed { .. } => {
                    let reason = self
                        .inner
                        .last_error
                        .lock()
                        .unwrap()
                        .clone()
                        .unwrap_or_else(|| "connection closed".to_string());
                    return if self.inner.auth_rejected.load(Ordering::SeqCst) {
                        Err(ClientError::AuthRejected(reason))
                    } else {
                        Err(ClientError::Connection(reason))
                    };
                }
                _ => {}
            }
        }
    }

    /// Close with a normal-closure code and cancel any pending reconnect.
    pub fn disconnect(&self) {
        let _ = self.inner.shutdown_tx.send(true);
    }

    /// Serialize and transmit a frame if the connection is open. Never
    /// queues: a `false` return means the frame was dropped and the caller
    /// must not assume delivery.
    pub fn send(&self, frame: &ClientFrame) -> bool {
        if !self.inner.state_tx.borrow().is_open() {
            return false;
        }
        match self.inner.outbound.lock().unwrap().as_ref() {
            Some(tx) => tx.send(WsMessage::Text(frame.to_json().into())).is_ok(),
            None => false,
        }
    }

    /// Register a frame listener.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.lock().unwrap().insert(id, tx);
        Subscription {
            id,
            inner: self.inner.clone(),
            rx,
        }
    }

    /// Observe raw lifecycle transitions.
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.inner.state_tx.subscribe()
    }

    /// Observe the debounced UI-facing flags. Must be called from within a
    /// tokio runtime (the debounce stage runs as a task).
    pub fn watch_flags(&self) -> watch::Receiver<ConnectionFlags> {
        flags::debounced_flags(self.watch_state(), self.inner.config.debounce_window)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().unwrap().len()
    }

    /// Last transport problem observed, if any.
    pub fn connection_error(&self) -> Option<String> {
        self.inner.last_error.lock().unwrap().clone()
    }

    /// Drop the current connection (if any) and dial again immediately,
    /// bypassing the reconnect delay.
    pub async fn force_reconnect(&self) {
        self.disconnect();
        let mut state_rx = self.inner.state_tx.subscribe();
        while !matches!(*state_rx.borrow_and_update(), LinkState::Idle) {
            if state_rx.changed().await.is_err() {
                return;
            }
        }
        self.ensure_supervisor();
    }

    fn ensure_supervisor(&self) {
        let mut guard = self.inner.supervisor.lock().unwrap();
        let running = guard.as_ref().is_some_and(|handle| !handle.is_finished());
        if running {
            return;
        }
        let _ = self.inner.shutdown_tx.send(false);
        let inner = self.inner.clone();
        *guard = Some(tokio::spawn(supervisor_loop(inner)));
    }
}

impl Inner {
    fn transition(&self, event: LinkEvent) {
        self.state_tx.send_modify(|state| {
            let next = state.apply(event);
            if next != *state {
                tracing::debug!("Link state {:?} -> {:?}", state, next);
            }
            *state = next;
        });
    }

    /// Deliver a frame to every subscriber, pruning the dead ones.
    fn fan_out(&self, frame: &ServerFrame) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|_, tx| tx.send(frame.clone()).is_ok());
    }

    /// Report a transport problem to subscribers as a typed error frame.
    /// Transport failures are absorbed here; they never become panics or
    /// exceptions in a consumer's render path.
    fn report_error(&self, message: &str) {
        tracing::warn!("{}", message);
        *self.last_error.lock().unwrap() = Some(message.to_string());
        self.fan_out(&ServerFrame::Error {
            message: message.to_string(),
        });
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

/// Resolve once the shutdown flag turns true.
async fn wait_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Connection supervisor: dial, run, and redial until told to stop.
async fn supervisor_loop(inner: Arc<Inner>) {
    let mut shutdown_rx = inner.shutdown_tx.subscribe();

    loop {
        inner.transition(LinkEvent::DialStarted);

        let dial = tokio::time::timeout(
            inner.config.connect_timeout,
            connect_async(&inner.config.endpoint),
        );
        let attempt = tokio::select! {
            result = dial => Some(result),
            _ = wait_shutdown(&mut shutdown_rx) => None,
        };

        let close_code = match attempt {
            None => {
                // Explicit disconnect while dialing.
                inner.transition(LinkEvent::Lost { code: None });
                break;
            }
            Some(Err(_elapsed)) => {
                inner.report_error("Connect attempt timed out");
                inner.transition(LinkEvent::Lost { code: None });
                None
            }
            Some(Ok(Err(e))) => {
                inner.report_error(&format!("Connect failed: {}", e));
                inner.transition(LinkEvent::Lost { code: None });
                None
            }
            Some(Ok(Ok((stream, _response)))) => {
                let code = run_connection(&inner, stream, &mut shutdown_rx).await;
                inner.transition(LinkEvent::Lost { code });
                code
            }
        };

        if inner.shutdown_requested() {
            break;
        }
        if inner.auth_rejected.load(Ordering::SeqCst) {
            tracing::warn!("Not reconnecting: authentication was rejected");
            break;
        }
        if close_code == Some(NORMAL_CLOSURE) {
            break;
        }
        if inner.subscribers.lock().unwrap().is_empty() {
            break;
        }

        tracing::info!(
            "Reconnecting in {:?}...",
            inner.config.reconnect_delay
        );
        let interrupted = tokio::select! {
            _ = tokio::time::sleep(inner.config.reconnect_delay) => false,
            _ = wait_shutdown(&mut shutdown_rx) => true,
        };
        if interrupted {
            break;
        }
    }

    inner.transition(LinkEvent::Detached);
}

/// Drive one open connection until it drops or shutdown is requested.
/// Returns the close code if one was observed.
async fn run_connection(
    inner: &Arc<Inner>,
    stream: Stream,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Option<u16> {
    let (mut sink, mut read) = stream.split();

    // Authenticate before anything else; the identity is re-sent on every
    // reconnect.
    let identity = inner.identity.lock().unwrap().clone();
    if let Some(identity) = identity {
        let auth = ClientFrame::Auth {
            user_id: identity.user_id,
            user_type: identity.role,
            shop_id: identity.shop_id,
        };
        if sink
            .send(WsMessage::Text(auth.to_json().into()))
            .await
            .is_err()
        {
            inner.report_error("Transport error: failed to send auth frame");
            return None;
        }
    }

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsMessage>();
    *inner.outbound.lock().unwrap() = Some(out_tx);
    inner.transition(LinkEvent::Opened);

    let mut close_code: Option<u16> = None;
    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Some(frame) = ServerFrame::parse(&text) {
                        if let ServerFrame::AuthFailed { reason } = &frame {
                            inner.auth_rejected.store(true, Ordering::SeqCst);
                            *inner.last_error.lock().unwrap() =
                                Some(format!("authentication rejected: {}", reason));
                        }
                        inner.fan_out(&frame);
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    close_code = frame.map(|f| u16::from(f.code));
                    break;
                }
                Some(Ok(_)) => {} // ping/pong/binary: nothing to fan out
                Some(Err(e)) => {
                    inner.report_error(&format!("Transport error: {}", e));
                    break;
                }
                None => break,
            },
            outgoing = out_rx.recv() => match outgoing {
                Some(message) => {
                    if sink.send(message).await.is_err() {
                        inner.report_error("Transport error: send failed");
                        break;
                    }
                }
                None => break,
            },
            _ = wait_shutdown(shutdown_rx) => {
                let close = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "".into(),
                };
                let _ = sink.send(WsMessage::Close(Some(close))).await;
                close_code = Some(NORMAL_CLOSURE);
                break;
            }
        }
    }

    *inner.outbound.lock().unwrap() = None;
    close_code
}
