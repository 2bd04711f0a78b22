//! Single-slot reconnect signal.
//!
//! At most one reconnect request is pending at a time; a request made while
//! one is already pending is dropped.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct RelinkSignal {
    pending: AtomicBool,
    notify: Notify,
}

impl RelinkSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reconnect. Returns `false` if one was already pending.
    pub fn request(&self) -> bool {
        if self.pending.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.notify.notify_one();
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Drop any pending request without waking the waiter.
    pub fn clear(&self) {
        self.pending.store(false, Ordering::Release);
    }

    /// Wait for a request and consume it. The slot is free again by the time
    /// this returns, so requests made during the reconnect are kept.
    pub async fn wait(&self) {
        loop {
            if self.pending.swap(false, Ordering::AcqRel) {
                return;
            }
            self.notify.notified().await;
        }
    }
}
