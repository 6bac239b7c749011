//! Wallet event listeners.
//!
//! Listeners are called synchronously on the task that produced the event.
//! While a callback runs, wallet operations that take the wallet lock fail
//! with [`WalletError::ReentrantCall`] instead of deadlocking.

use crate::error::WalletError;
use crate::output::Output;
use std::cell::Cell;
use std::sync::{Arc, RwLock};

/// Receives wallet events. All methods default to no-ops.
pub trait WalletListener: Send + Sync {
    /// `percent_done` is `(height - start + 1) / (end - start)`; exactly one
    /// call per session carries 1.0 and it is the last event of the session.
    fn on_sync_progress(&self, _height: u64, _start_height: u64, _end_height: u64, _percent_done: f64, _message: &str) {}

    fn on_new_block(&self, _height: u64) {}

    fn on_output_received(&self, _output: &Output) {}

    fn on_output_spent(&self, _output: &Output) {}

    /// A background sync failed with a non-network error.
    fn on_sync_error(&self, _error: &WalletError) {}
}

thread_local! {
    static IN_LISTENER: Cell<bool> = const { Cell::new(false) };
}

/// Fails with `ReentrantCall` when called from inside a listener callback.
pub fn check_reentrancy() -> Result<(), WalletError> {
    if IN_LISTENER.with(|f| f.get()) {
        return Err(WalletError::ReentrantCall);
    }
    Ok(())
}

struct CallbackScope {
    previous: bool,
}

impl CallbackScope {
    fn enter() -> Self {
        Self {
            previous: IN_LISTENER.with(|f| f.replace(true)),
        }
    }
}

impl Drop for CallbackScope {
    fn drop(&mut self) {
        IN_LISTENER.with(|f| f.set(self.previous));
    }
}

/// Run `f` with the reentrancy flag set.
pub(crate) fn deliver<F: FnOnce()>(f: F) {
    let _scope = CallbackScope::enter();
    f();
}

/// Registered listeners, delivered to in registration order.
#[derive(Default)]
pub struct ListenerBus {
    listeners: RwLock<Vec<Arc<dyn WalletListener>>>,
}

impl std::fmt::Debug for ListenerBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerBus").field("len", &self.len()).finish()
    }
}

impl ListenerBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`. Returns false if it was already registered.
    pub fn add(&self, listener: Arc<dyn WalletListener>) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        if listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Unregister `listener`. Returns false if it was not registered.
    pub fn remove(&self, listener: &Arc<dyn WalletListener>) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn clear(&self) {
        self.listeners.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn listeners(&self) -> Vec<Arc<dyn WalletListener>> {
        self.listeners.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    // The list is snapshotted so callbacks may add or remove listeners.
    fn each(&self, f: impl Fn(&dyn WalletListener)) {
        let snapshot = self.listeners();
        deliver(|| {
            for l in &snapshot {
                f(l.as_ref());
            }
        });
    }

    pub fn sync_progress(&self, height: u64, start: u64, end: u64, percent: f64, message: &str) {
        self.each(|l| l.on_sync_progress(height, start, end, percent, message));
    }

    pub fn new_block(&self, height: u64) {
        self.each(|l| l.on_new_block(height));
    }

    pub fn output_received(&self, output: &Output) {
        self.each(|l| l.on_output_received(output));
    }

    pub fn output_spent(&self, output: &Output) {
        self.each(|l| l.on_output_spent(output));
    }

    pub fn sync_error(&self, error: &WalletError) {
        self.each(|l| l.on_sync_error(error));
    }
}
