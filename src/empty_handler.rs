//! Callbacks fired when a quiesced queue set has fully drained.

use crossbeam_channel::Sender;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Notified once a quiescing queue set holds no waiting and no executing requests.
///
/// Queue sets invoke the handler on a separate thread, never while holding their own lock,
/// so an implementation is free to call back into the engine.
pub trait EmptyHandler: Send + Sync {
    fn handle_empty(&self);
}

impl<F> EmptyHandler for F
where
    F: Fn() + Send + Sync,
{
    fn handle_empty(&self) {
        self()
    }
}

/// Empty handler installed on retiring priority levels.
///
/// It records that the level drained and nudges the coordinator through a resync channel so
/// that the next reconciliation can drop the level.
pub struct EmptyRelay {
    empty: AtomicBool,
    resync: Sender<()>,
}

impl EmptyRelay {
    pub fn new(resync: Sender<()>) -> Self {
        Self {
            empty: AtomicBool::new(false),
            resync,
        }
    }

    /// Whether the relay has been told its queue set drained.
    pub fn is_empty(&self) -> bool {
        self.empty.load(Ordering::Acquire)
    }
}

impl EmptyHandler for EmptyRelay {
    fn handle_empty(&self) {
        self.empty.store(true, Ordering::Release);
        // A full channel already holds a pending resync; a closed one has nobody to tell.
        let _ = self.resync.try_send(());
    }
}

impl fmt::Debug for EmptyRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmptyRelay")
            .field("empty", &self.is_empty())
            .finish()
    }
}
