//! The observer a host application registers to see raw messages. Held weakly; the last
//! registration wins.

use crate::message::InboundMessage;
use std::sync::{Arc, RwLock, Weak};

/// Host-side hook for received messages.
pub trait MessageObserver: Send + Sync {
    /// Whether a notification should still be shown while the app is in the foreground.
    fn wants_foreground_notification(&self) -> bool;

    /// Called for every routed message, whether or not a notification was shown.
    fn on_message_received(&self, message: &InboundMessage);
}

/// Holds at most one observer, weakly: the registrant owns its lifetime and the last
/// registration wins. Each `get` upgrades afresh, so an observer may vanish between reads.
#[derive(Default)]
pub struct ObserverSlot {
    inner: RwLock<Option<Weak<dyn MessageObserver>>>,
}

impl ObserverSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the registered observer; `None` clears it.
    pub fn set(&self, observer: Option<&Arc<dyn MessageObserver>>) {
        let mut g = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *g = observer.map(Arc::downgrade);
    }

    pub fn get(&self) -> Option<Arc<dyn MessageObserver>> {
        let g = self.inner.read().unwrap_or_else(|e| e.into_inner());
        g.as_ref().and_then(Weak::upgrade)
    }
}
