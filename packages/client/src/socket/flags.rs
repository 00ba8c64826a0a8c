//! Debounced connection flags.
//!
//! UI code must not render raw link-state transitions: a transport that
//! drops and redials within a few hundred milliseconds would make the
//! "Live" badge flicker. This module is the one debounce stage between the
//! state machine and its external observers: upgrades propagate
//! immediately, downgrades only after the link has stayed degraded for the
//! configured window.

use std::time::Duration;

use tokio::sync::watch;

use super::state::LinkState;

/// Coarse connection view exposed to UI code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionFlags {
    pub is_connected: bool,
    pub is_connecting: bool,
}

/// Map a link state to its target flags.
pub fn flags_for(state: LinkState) -> ConnectionFlags {
    ConnectionFlags {
        is_connected: state.is_open(),
        is_connecting: state.is_connecting(),
    }
}

/// Whether moving from `current` to `target` takes connectivity away.
fn degrades(current: ConnectionFlags, target: ConnectionFlags) -> bool {
    current.is_connected && !target.is_connected
}

/// Spawn the debounce stage over a link-state watch channel.
///
/// Losing connectivity is held back for `window`; if the link recovers in
/// the meantime the downgrade never surfaces. The window restarts on each
/// transition while degraded. Must be called from within a tokio runtime.
pub fn debounced_flags(
    mut state_rx: watch::Receiver<LinkState>,
    window: Duration,
) -> watch::Receiver<ConnectionFlags> {
    let (tx, rx) = watch::channel(flags_for(*state_rx.borrow()));

    tokio::spawn(async move {
        loop {
            let target = flags_for(*state_rx.borrow_and_update());
            let current = *tx.borrow();

            if target != current {
                if degrades(current, target) {
                    tokio::select! {
                        _ = tokio::time::sleep(window) => {
                            let settled = flags_for(*state_rx.borrow_and_update());
                            if settled != current && tx.send(settled).is_err() {
                                return;
                            }
                            continue;
                        }
                        changed = state_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            // Re-evaluate the newest state from the top.
                            continue;
                        }
                    }
                } else if tx.send(target).is_err() {
                    return;
                }
            }

            if state_rx.changed().await.is_err() {
                return;
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(300);

    /// Let the debounce task process pending watch notifications without
    /// advancing the paused clock.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_upgrades_propagate_immediately() {
        // given:
        let (state_tx, state_rx) = watch::channel(LinkState::Idle);
        let flags = debounced_flags(state_rx, WINDOW);
        assert_eq!(*flags.borrow(), ConnectionFlags::default());

        // when: the link starts dialing and opens
        state_tx.send(LinkState::Connecting).unwrap();
        settle().await;

        // then:
        assert!(flags.borrow().is_connecting);

        state_tx.send(LinkState::Open).unwrap();
        settle().await;
        assert!(flags.borrow().is_connected);
        assert!(!flags.borrow().is_connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_downgrade_held_for_window() {
        // given: an open link
        let (state_tx, state_rx) = watch::channel(LinkState::Open);
        let flags = debounced_flags(state_rx, WINDOW);
        settle().await;
        assert!(flags.borrow().is_connected);

        // when: the transport drops
        state_tx
            .send(LinkState::Closed { code: Some(1006) })
            .unwrap();
        settle().await;
        tokio::time::advance(Duration::from_millis(200)).await;
        settle().await;

        // then: still connected within the window
        assert!(flags.borrow().is_connected);

        // when: the window elapses
        tokio::time::advance(Duration::from_millis(150)).await;
        settle().await;

        // then: the downgrade surfaces
        assert!(!flags.borrow().is_connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_brief_transport_cycle_never_surfaces() {
        // given: an open link
        let (state_tx, state_rx) = watch::channel(LinkState::Open);
        let flags = debounced_flags(state_rx, WINDOW);
        settle().await;

        // when: drop, redial, and reopen all inside the window
        state_tx
            .send(LinkState::Closed { code: Some(1006) })
            .unwrap();
        settle().await;
        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
        state_tx.send(LinkState::Connecting).unwrap();
        settle().await;
        state_tx.send(LinkState::Open).unwrap();
        settle().await;
        tokio::time::advance(Duration::from_millis(400)).await;
        settle().await;

        // then: the flags never reported a disconnect
        assert!(flags.borrow().is_connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connecting_after_held_downgrade() {
        // given: an open link that drops for good
        let (state_tx, state_rx) = watch::channel(LinkState::Open);
        let flags = debounced_flags(state_rx, WINDOW);
        settle().await;

        state_tx
            .send(LinkState::Closed { code: Some(1006) })
            .unwrap();
        settle().await;
        tokio::time::advance(Duration::from_millis(350)).await;
        settle().await;
        assert!(!flags.borrow().is_connected);

        // when: the reconnect dial starts
        state_tx.send(LinkState::Connecting).unwrap();
        settle().await;

        // then: connecting is an upgrade and shows immediately
        assert!(flags.borrow().is_connecting);
    }
}
