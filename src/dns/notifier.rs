//! Network change notifications.
//!
//! Chromium mapping: net/base/network_change_notifier.h

use tokio::sync::broadcast;

/// Events a [`NetworkChangeNotifier`] emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkChange {
    /// An interface address was added, removed or changed.
    IpAddressChanged,
}

/// Broadcasts network changes to every subscribed resolver.
#[derive(Debug, Clone)]
pub struct NetworkChangeNotifier {
    tx: broadcast::Sender<NetworkChange>,
}

impl NetworkChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Tell every subscriber that the IP address changed.
    pub fn notify_ip_address_changed(&self) {
        // No subscribers is fine.
        let receivers = self.tx.send(NetworkChange::IpAddressChanged).unwrap_or(0);
        tracing::debug!(receivers, "IP address change notified");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetworkChange> {
        self.tx.subscribe()
    }
}

impl Default for NetworkChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}
