//! Online/offline edge detection over the platform's connectivity signal.

use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CameOnline,
    WentOffline,
}

/// Watches a boolean connectivity signal and reports only real changes.
///
/// The platform may repeat the same value; those notifications are swallowed.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    signal: watch::Receiver<bool>,
    last: bool,
}

impl ConnectivityMonitor {
    pub fn new(mut signal: watch::Receiver<bool>) -> Self {
        let last = *signal.borrow_and_update();
        Self { signal, last }
    }

    /// A monitor that is permanently in one state. It never transitions.
    pub fn fixed(online: bool) -> Self {
        let (_tx, rx) = watch::channel(online);
        Self::new(rx)
    }

    pub fn is_online(&self) -> bool {
        self.last
    }

    /// Waits for the signal to flip.
    ///
    /// Returns `None` once the platform side has gone away.
    pub async fn next_transition(&mut self) -> Option<Transition> {
        loop {
            self.signal.changed().await.ok()?;
            let online = *self.signal.borrow_and_update();
            if online == self.last {
                continue;
            }
            self.last = online;
            let transition = if online {
                Transition::CameOnline
            } else {
                Transition::WentOffline
            };
            info!(?transition, "connectivity changed");
            return Some(transition);
        }
    }
}
