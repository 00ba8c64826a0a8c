//! Link lifecycle state machine.
//!
//! The connection supervisor drives every transition through the single
//! [`LinkState::apply`] dispatch function and publishes the result on a
//! `watch` channel, so any number of consumers can observe the lifecycle
//! without registering raw transport callbacks.

/// Lifecycle state of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No connection and none wanted.
    Idle,
    /// A dial attempt is in flight.
    Connecting,
    /// The transport is open and authenticated frames can flow.
    Open,
    /// The transport dropped; `code` is the close code if one was received.
    Closed { code: Option<u16> },
}

/// Events the supervisor feeds into the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// A dial attempt started (first connect or a scheduled reconnect).
    DialStarted,
    /// The transport handshake completed.
    Opened,
    /// The transport dropped or the dial attempt failed.
    Lost { code: Option<u16> },
    /// The supervisor exited; the manager is back to rest.
    Detached,
}

impl LinkState {
    /// Single dispatch function: current state + event -> next state.
    ///
    /// Events that make no sense in the current state leave it unchanged;
    /// the transport can race its own teardown and a stale event must not
    /// corrupt the lifecycle.
    pub fn apply(self, event: LinkEvent) -> LinkState {
        match (self, event) {
            (_, LinkEvent::Detached) => LinkState::Idle,
            (LinkState::Idle | LinkState::Closed { .. }, LinkEvent::DialStarted) => {
                LinkState::Connecting
            }
            (LinkState::Connecting, LinkEvent::Opened) => LinkState::Open,
            (LinkState::Connecting | LinkState::Open, LinkEvent::Lost { code }) => {
                LinkState::Closed { code }
            }
            (state, event) => {
                tracing::debug!("Ignoring link event {:?} in state {:?}", event, state);
                state
            }
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, LinkState::Open)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, LinkState::Connecting)
    }
}

/// Normal-closure WebSocket close code; anything else triggers reconnects.
pub const NORMAL_CLOSURE: u16 = 1000;
