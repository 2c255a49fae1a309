//! Typed observer registry for UI collaborators.

use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::error;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Set of callbacks receiving values of type `T`.
///
/// Dispatch walks a snapshot taken before the first callback runs, so
/// callbacks may subscribe or unsubscribe (themselves included) freely. A
/// panicking callback is logged and does not stop delivery to the rest.
pub struct SubscriberRegistry<T> {
    inner: Arc<RegistryInner<T>>,
}

struct RegistryInner<T> {
    next_id: AtomicU64,
    callbacks: RwLock<Vec<(u64, Callback<T>)>>,
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<T> Detach for RegistryInner<T> {
    fn detach(&self, id: u64) {
        self.callbacks.write().retain(|(entry, _)| *entry != id);
    }
}

impl<T: 'static> SubscriberRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                next_id: AtomicU64::new(0),
                callbacks: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Register a callback.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.callbacks.write().push((id, Arc::new(callback)));

        let inner: Arc<dyn Detach> = self.inner.clone();
        Subscription {
            id,
            registry: Arc::downgrade(&inner),
            active: AtomicBool::new(true),
        }
    }

    /// Deliver `value` to every callback registered when dispatch starts.
    ///
    /// Returns the number of callbacks that completed without panicking.
    pub fn dispatch(&self, value: &T) -> usize {
        let snapshot: Vec<Callback<T>> = self
            .inner
            .callbacks
            .read()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();

        let mut delivered = 0;
        for callback in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(value))) {
                Ok(()) => delivered += 1,
                Err(_) => error!("Subscriber callback panicked"),
            }
        }
        delivered
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.inner.callbacks.read().len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for SubscriberRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for SubscriberRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.inner.callbacks.read().len())
            .finish()
    }
}

/// Handle returned by [`SubscriberRegistry::subscribe`].
///
/// Dropping the handle leaves the callback registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: u64,
    registry: Weak<dyn Detach>,
    active: AtomicBool,
}

impl Subscription {
    /// Remove the callback. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self.id);
        }
    }

    /// True until [`Subscription::unsubscribe`] is called.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_dispatch_to_all_subscribers() {
        let registry = SubscriberRegistry::<u32>::new();
        let sum = Arc::new(AtomicUsize::new(0));

        let a = sum.clone();
        let _s1 = registry.subscribe(move |v| {
            a.fetch_add(*v as usize, Ordering::SeqCst);
        });
        let b = sum.clone();
        let _s2 = registry.subscribe(move |v| {
            b.fetch_add(*v as usize * 10, Ordering::SeqCst);
        });

        assert_eq!(registry.dispatch(&2), 2);
        assert_eq!(sum.load(Ordering::SeqCst), 22);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let registry = SubscriberRegistry::<u32>::new();
        let sub = registry.subscribe(|_| {});
        assert_eq!(registry.len(), 1);

        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        assert!(registry.is_empty());
        assert_eq!(registry.dispatch(&1), 0);
    }

    #[test]
    fn test_self_unsubscribe_during_dispatch() {
        let registry = SubscriberRegistry::<u32>::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let own = slot.clone();
        let counter = calls.clone();
        let sub = registry.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = own.lock().as_ref() {
                sub.unsubscribe();
            }
        });
        *slot.lock() = Some(sub);

        let other = calls.clone();
        let _keep = registry.subscribe(move |_| {
            other.fetch_add(100, Ordering::SeqCst);
        });

        assert_eq!(registry.dispatch(&0), 2);
        assert_eq!(registry.dispatch(&0), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 201);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let registry = SubscriberRegistry::<u32>::new();
        let reached = Arc::new(AtomicBool::new(false));

        let _bad = registry.subscribe(|_| panic!("subscriber failure"));
        let flag = reached.clone();
        let _good = registry.subscribe(move |_| flag.store(true, Ordering::SeqCst));

        assert_eq!(registry.dispatch(&1), 1);
        assert!(reached.load(Ordering::SeqCst));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unsubscribe_detaches_only_its_entry() {
        let registry = SubscriberRegistry::<u32>::new();
        let first = registry.subscribe(|_| {});
        let second = registry.subscribe(|_| {});
        let third = registry.subscribe(|_| {});

        second.unsubscribe();
        assert_eq!(registry.len(), 2);
        assert!(first.is_active() && third.is_active());

        first.unsubscribe();
        third.unsubscribe();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let registry = SubscriberRegistry::<u32>::new();
        let sub = registry.subscribe(|_| {});
        drop(registry);
        sub.unsubscribe();
        assert!(!sub.is_active());
    }
}
