//! Connectivity tracking.

use std::sync::Arc;
use tokio::sync::watch;

/// Source of the device's online state.
pub trait Connectivity: Send + Sync {
    /// Returns true if the device is currently online.
    fn is_online(&self) -> bool;
}

/// Shared, observable online flag.
///
/// Clones share the same state. Platform code calls
/// [`ConnectivityMonitor::set_online`] on network changes; the sync worker
/// subscribes to transitions.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with an initial state.
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self {
            state: Arc::new(state),
        }
    }

    /// Updates the online state. Returns true if it changed.
    pub fn set_online(&self, online: bool) -> bool {
        self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        })
    }

    /// Returns the current online state.
    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Subscribes to online state changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        ConnectivityMonitor::is_online(self)
    }
}

impl<T: Connectivity + ?Sized> Connectivity for Arc<T> {
    fn is_online(&self) -> bool {
        (**self).is_online()
    }
}
