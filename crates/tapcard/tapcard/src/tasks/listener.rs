use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{TaskError, TaskReport};
use crate::delay::DelayDisplay;
use crate::session::SessionObserver;

/// Task events, delivered on the worker thread
///
/// Implementations hop to their own thread if they need one.
pub trait TaskListener: Send + Sync {
    /// Progress reached a checkpoint
    fn on_progress(&self, _percent: u8) {}

    /// The card reported a security delay
    fn on_security_delay(&self, _remaining_ms: u32, _display: DelayDisplay) {}

    /// The task completed
    fn on_completed(&self, _report: &TaskReport) {}

    /// The task failed
    fn on_failed(&self, _error: &TaskError) {}

    /// The task was cancelled
    fn on_cancelled(&self) {}
}

/// Holder of a detachable listener
///
/// The task only ever holds the slot. Detaching empties it, after which events are dropped.
#[derive(Default)]
pub struct ListenerSlot {
    listener: RwLock<Option<Arc<dyn TaskListener>>>,
}

impl fmt::Debug for ListenerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSlot")
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl ListenerSlot {
    /// Slot holding `listener`, if any
    pub fn new(listener: Option<Arc<dyn TaskListener>>) -> Self {
        Self {
            listener: RwLock::new(listener),
        }
    }

    /// Remove the listener; calling this again does nothing
    pub fn detach(&self) {
        self.listener.write().take();
    }

    /// Whether a listener is attached
    pub fn is_attached(&self) -> bool {
        self.listener.read().is_some()
    }

    /// Call the listener, if one is attached
    ///
    /// The lock is released before the callback runs, so a listener may detach itself.
    pub fn notify(&self, event: impl FnOnce(&dyn TaskListener)) {
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            event(listener.as_ref());
        }
    }
}

/// Forwards session delay reports to a task listener
pub(super) struct SlotObserver(pub(super) Arc<ListenerSlot>);

impl SessionObserver for SlotObserver {
    fn on_security_delay(&self, remaining_ms: u32, display: DelayDisplay) {
        self.0
            .notify(|l| l.on_security_delay(remaining_ms, display));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Counter(AtomicU32);

    impl TaskListener for Counter {
        fn on_progress(&self, _percent: u8) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_detach_is_idempotent() {
        let counter = Arc::new(Counter::default());
        let slot = ListenerSlot::new(Some(counter.clone()));

        slot.notify(|l| l.on_progress(20));
        slot.detach();
        slot.detach();
        slot.notify(|l| l.on_progress(60));

        assert!(!slot.is_attached());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
