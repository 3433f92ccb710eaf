//! Change notification for the in-memory engine.
//!
//! - In-process only, no replay, no persistence
//! - Delivered synchronously after a successful append, in commit order
//! - Observers are called outside the registry lock and outside the
//!   engine's stream lock

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::event::StorageEvent;

/// Published to observers after every successful append.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChanged {
    /// The events the append persisted, in event-number order.
    pub new_events: Vec<StorageEvent>,
}

type Observer = dyn Fn(&StreamChanged) + Send + Sync;

/// Registry of change observers.
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    next_id: AtomicU64,
    observers: Mutex<Vec<(u64, Arc<Observer>)>>,
    // Filled under the engine's write lock, so queue order is commit order.
    pending: Mutex<VecDeque<StreamChanged>>,
    delivering: Mutex<()>,
}

impl ObserverRegistry {
    pub(crate) fn register<F>(self: &Arc<Self>, observer: F) -> Subscription
    where
        F: Fn(&StreamChanged) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        // A poisoned registry still hands out a handle; it just never fires.
        if let Ok(mut observers) = self.observers.lock() {
            observers.push((id, Arc::new(observer)));
        }

        Subscription {
            id,
            registry: Arc::downgrade(self),
            active: true,
        }
    }

    /// Queues a committed change. Must be called while the change's commit
    /// still excludes other appends.
    pub(crate) fn enqueue(&self, change: StreamChanged) {
        lock(&self.pending).push_back(change);
    }

    /// Delivers every queued change in queue order. When this returns, every
    /// change queued before the call has reached the observers.
    ///
    /// Blocks while another caller is delivering.
    pub(crate) fn deliver_pending(&self) {
        let _delivering = lock(&self.delivering);
        loop {
            let Some(change) = lock(&self.pending).pop_front() else {
                return;
            };
            self.notify(&change);
        }
    }

    fn notify(&self, change: &StreamChanged) {
        let observers: Vec<Arc<Observer>> = match self.observers.lock() {
            Ok(observers) => observers.iter().map(|(_, o)| Arc::clone(o)).collect(),
            Err(_) => return,
        };
        for observer in observers {
            observer(change);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.lock().map_or(0, |o| o.len())
    }

    fn remove(&self, id: u64) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.retain(|(existing, _)| *existing != id);
        }
    }
}

// An observer that panicked leaves the queue itself intact.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish_non_exhaustive()
    }
}

/// Handle for a registered observer.
///
/// Dropping the handle unsubscribes; call [`Subscription::detach`] to keep
/// the observer for the lifetime of the engine instead.
#[derive(Debug)]
#[must_use = "dropping a Subscription unsubscribes the observer"]
pub struct Subscription {
    id: u64,
    registry: Weak<ObserverRegistry>,
    active: bool,
}

impl Subscription {
    /// Removes the observer. No notification is delivered to it afterwards.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Leaves the observer registered for as long as the engine lives.
    pub fn detach(mut self) {
        self.active = false;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}
