//! Connectivity signal supplied by the host environment

use tokio::sync::watch;

/// The engine's view of the host's network state: a current online flag plus
/// a subscription used to observe the became-online transition.
pub trait Connectivity: Send + Sync {
    /// Whether the device is currently online
    fn is_online(&self) -> bool;

    /// Subscribe to online-state transitions
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// A watch-channel backed connectivity source.
///
/// The host flips [`ConnectivitySignal::set_online`] from its own network
/// monitoring; the engine reacts to the edges.
pub struct ConnectivitySignal {
    tx: watch::Sender<bool>,
}

impl ConnectivitySignal {
    /// Create a signal with the given initial state
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx }
    }

    /// Report a change in network state
    pub fn set_online(&self, online: bool) {
        self.tx.send_replace(online);
    }
}

impl Default for ConnectivitySignal {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivitySignal {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_sees_online_transition() {
        let signal = ConnectivitySignal::new(false);
        let mut rx = signal.subscribe();
        assert!(!signal.is_online());

        signal.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
        assert!(signal.is_online());
    }
}
