//! # Online Manager
//!
//! Shared view of whether the API is reachable.
//!
//! ```text
//!   network error ──► set_online(false) ──┐
//!                                         ▼
//!                                   watch<bool> ──► MutationProcessor pauses
//!                                         ▲         (resumes on true)
//!   any 2xx/4xx/5xx ─► set_online(true) ──┘
//!
//!   set_offline_mode(true): pinned offline, nothing is sent at all
//! ```
//!
//! Receiving *any* HTTP response proves the server is reachable, so a 500
//! flips the state back online just like a 200 does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone)]
pub struct OnlineManager {
    tx: Arc<watch::Sender<bool>>,
    forced_offline: Arc<AtomicBool>,
}

impl OnlineManager {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        OnlineManager {
            tx: Arc::new(tx),
            forced_offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True when requests may be sent and the last one got an answer.
    pub fn is_online(&self) -> bool {
        !self.is_offline_mode() && *self.tx.borrow()
    }

    /// Records reachability. Ignored while offline mode is on.
    pub fn set_online(&self, online: bool) {
        if online && self.is_offline_mode() {
            return;
        }
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "Connectivity changed");
        }
    }

    /// Pins the client offline (or releases it). Releasing assumes the
    /// server is reachable until a request says otherwise.
    pub fn set_offline_mode(&self, offline: bool) {
        self.forced_offline.store(offline, Ordering::SeqCst);
        info!(offline, "Offline mode toggled");
        if offline {
            self.set_online(false);
        } else {
            self.set_online(true);
        }
    }

    pub fn is_offline_mode(&self) -> bool {
        self.forced_offline.load(Ordering::SeqCst)
    }

    /// Receiver that wakes on every change of the online flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for OnlineManager {
    fn default() -> Self {
        OnlineManager::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let online = OnlineManager::new(true);
        let mut rx = online.subscribe();

        online.set_online(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());
        assert!(!online.is_online());

        // same value: no wake-up
        online.set_online(false);
        assert!(!rx.has_changed().unwrap());

        online.set_online(true);
        assert!(rx.has_changed().unwrap());
        assert!(online.is_online());
    }

    #[test]
    fn test_offline_mode_pins_state() {
        let online = OnlineManager::default();
        online.set_offline_mode(true);
        assert!(!online.is_online());

        online.set_online(true);
        assert!(!online.is_online());

        online.set_offline_mode(false);
        assert!(online.is_online());
    }
}
