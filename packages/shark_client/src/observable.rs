//! Change notification for store values.
//!
//! An [`Observable`] owns a value and a list of callbacks. Every mutation runs
//! the callbacks synchronously, in subscription order, on the mutating task.
//! A [`Subscription`] is the only handle to a registered callback: dropping it
//! (or calling [`Subscription::cancel`]) unregisters the callback.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Callback<T> = Box<dyn FnMut(&T) + Send>;

struct Registry<T> {
    next_id: u64,
    callbacks: Vec<(u64, Callback<T>)>,
    /// Ids cancelled while their callback was checked out for delivery
    cancelled: Vec<u64>,
    delivering: bool,
}

impl<T> Registry<T> {
    fn new() -> Self {
        Self {
            next_id: 0,
            callbacks: Vec::new(),
            cancelled: Vec::new(),
            delivering: false,
        }
    }
}

fn lock<T>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<T: 'static> Detach for Mutex<Registry<T>> {
    fn detach(&self, id: u64) {
        let mut registry = lock(self);
        let before = registry.callbacks.len();
        registry.callbacks.retain(|(cb_id, _)| *cb_id != id);
        if registry.callbacks.len() == before && registry.delivering {
            registry.cancelled.push(id);
        }
    }
}

pub struct Observable<T> {
    value: T,
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: Clone + 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            registry: Arc::new(Mutex::new(Registry::new())),
        }
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> T {
        self.value.clone()
    }

    /// Borrow the current value without cloning.
    pub fn peek(&self) -> &T {
        &self.value
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
        self.notify();
    }

    /// Mutate in place. Subscribers are notified only when `f` returns true.
    pub fn update(&mut self, f: impl FnOnce(&mut T) -> bool) -> bool {
        let changed = f(&mut self.value);
        if changed {
            self.notify();
        }
        changed
    }

    pub fn subscribe(&self, callback: impl FnMut(&T) + Send + 'static) -> Subscription {
        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.callbacks.push((id, Box::new(callback)));
            id
        };
        let registry: Arc<dyn Detach> = self.registry.clone();
        Subscription {
            id,
            registry: Some(Arc::downgrade(&registry)),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).callbacks.len()
    }

    fn notify(&self) {
        // Callbacks run without the lock held so they may cancel subscriptions
        let mut delivering = {
            let mut registry = lock(&self.registry);
            registry.delivering = true;
            std::mem::take(&mut registry.callbacks)
        };

        for (id, callback) in delivering.iter_mut() {
            if lock(&self.registry).cancelled.contains(id) {
                continue;
            }
            callback(&self.value);
        }

        let mut registry = lock(&self.registry);
        let cancelled = std::mem::take(&mut registry.cancelled);
        delivering.retain(|(id, _)| !cancelled.contains(id));
        // Subscriptions made during delivery were pushed onto the emptied list
        let added = std::mem::take(&mut registry.callbacks);
        delivering.extend(added);
        registry.callbacks = delivering;
        registry.delivering = false;
    }
}

impl<T: Clone + Default + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

/// Registration handle returned by [`Observable::subscribe`].
#[must_use = "dropping a Subscription unregisters its callback"]
pub struct Subscription {
    id: u64,
    registry: Option<Weak<dyn Detach>>,
}

impl Subscription {
    pub fn cancel(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(registry) = self.registry.take().and_then(|weak| weak.upgrade()) {
            registry.detach(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
