//! Network status monitor
//!
//! Read-only shared connectivity state. A platform shell feeds transitions
//! in via [`NetworkMonitor::set_state`]; the sync engine and UI subscribe
//! independently.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Kind of the active network connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Wifi,
    Cellular,
    None,
    Unknown,
}

/// Current connectivity snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkState {
    pub is_online: bool,
    pub kind: ConnectionKind,
}

impl Default for NetworkState {
    /// Optimistic default: assume online until the platform reports
    /// otherwise, so the first write attempt goes to the remote store.
    fn default() -> Self {
        Self {
            is_online: true,
            kind: ConnectionKind::Unknown,
        }
    }
}

/// Observable connectivity state over a watch channel.
#[derive(Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<NetworkState>>,
}

impl NetworkMonitor {
    /// Create a monitor with the given initial state.
    #[must_use]
    pub fn new(initial: NetworkState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Current connectivity snapshot.
    #[must_use]
    pub fn current(&self) -> NetworkState {
        *self.tx.borrow()
    }

    /// Report a connectivity transition. Always wakes subscribers, even when
    /// the state is unchanged, mirroring how platform monitors re-emit.
    pub fn set_state(&self, state: NetworkState) {
        tracing::debug!(is_online = state.is_online, kind = ?state.kind, "network state changed");
        self.tx.send_replace(state);
    }

    /// Convenience: report going online with the given connection kind.
    pub fn set_online(&self, kind: ConnectionKind) {
        self.set_state(NetworkState {
            is_online: true,
            kind,
        });
    }

    /// Convenience: report going offline.
    pub fn set_offline(&self) {
        self.set_state(NetworkState {
            is_online: false,
            kind: ConnectionKind::None,
        });
    }

    /// Subscribe to state changes. Each receiver is independent.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.tx.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkState::default())
    }
}
