//! Reconnect bookkeeping: the session's "reconnecting" signal and the single
//! delayed-retry timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct ReconnectState {
    reconnecting: AtomicBool,
    armed: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectState {
    pub fn set_reconnecting(&self, value: bool) {
        self.reconnecting.store(value, Ordering::SeqCst);
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::SeqCst)
    }

    /// Claim the timer slot. Only one caller wins until the timer fires or
    /// is cancelled.
    pub fn try_arm(&self) -> bool {
        self.armed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Spawn the timer task and keep its handle. The slot stays locked while
    /// spawning so a timer that fires immediately cannot race the store.
    pub fn start_timer(&self, spawn: impl FnOnce() -> JoinHandle<()>) {
        let mut slot = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(spawn());
    }

    /// Called by the timer task when it fires: release the slot so a later
    /// failure can schedule again.
    pub fn fired(&self) {
        self.timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.armed.store(false, Ordering::SeqCst);
    }

    /// Abort a pending timer, if any.
    pub fn cancel(&self) {
        if let Some(handle) = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.armed.store(false, Ordering::SeqCst);
    }
}
