//! Publisher: an ordered, duplicate-free list of callbacks with
//! snapshot-then-iterate dispatch (spec §4.A). Grounded on
//! `mcl/event/event.py` (original_source) and the `Subscriber`/dispatch
//! pattern in `hdds/src/engine/subscriber.rs`.

use std::sync::Arc;

use parking_lot::RwLock;

/// A callback invoked on every [`Publisher::trigger`], receiving the emitted
/// event by value.
pub type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Ordered, duplicate-free list of callbacks. Callbacks are compared by
/// pointer identity (`Arc::ptr_eq`), matching the "callback reference"
/// language of the spec rather than any notion of value equality.
pub struct Publisher<T: Clone> {
    callbacks: RwLock<Vec<Callback<T>>>,
}

impl<T: Clone> Default for Publisher<T> {
    fn default() -> Self {
        Publisher {
            callbacks: RwLock::new(Vec::new()),
        }
    }
}

impl<T: Clone> Publisher<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `cb` if not already present. Returns whether the insert happened.
    pub fn subscribe(&self, cb: Callback<T>) -> bool {
        let mut guard = self.callbacks.write();
        if guard.iter().any(|existing| Arc::ptr_eq(existing, &cb)) {
            return false;
        }
        guard.push(cb);
        true
    }

    /// Remove `cb` if present. Returns whether the remove happened.
    pub fn unsubscribe(&self, cb: &Callback<T>) -> bool {
        let mut guard = self.callbacks.write();
        let before = guard.len();
        guard.retain(|existing| !Arc::ptr_eq(existing, cb));
        guard.len() != before
    }

    pub fn is_subscribed(&self, cb: &Callback<T>) -> bool {
        self.callbacks.read().iter().any(|existing| Arc::ptr_eq(existing, cb))
    }

    /// Dispatch `value` to a snapshot of the callback list taken at entry.
    /// Callbacks that subscribe/unsubscribe during the call do not affect
    /// this dispatch.
    pub fn trigger(&self, value: T) {
        let snapshot: Vec<Callback<T>> = self.callbacks.read().clone();
        for cb in snapshot {
            cb(value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn subscribe_is_duplicate_free() {
        let p: Publisher<i32> = Publisher::new();
        let cb: Callback<i32> = Arc::new(|_| {});
        assert!(p.subscribe(cb.clone()));
        assert!(!p.subscribe(cb.clone()));
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn trigger_reaches_all_subscribers_until_unsubscribed() {
        let p: Publisher<i32> = Publisher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c2 = count.clone();
        let cb: Callback<i32> = Arc::new(move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
        });
        assert!(p.subscribe(cb.clone()));
        p.trigger(1);
        p.trigger(2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(p.unsubscribe(&cb));
        p.trigger(3);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn mutation_inside_trigger_does_not_affect_current_dispatch() {
        let p: Arc<Publisher<i32>> = Arc::new(Publisher::new());
        let count = Arc::new(AtomicUsize::new(0));

        let p2 = p.clone();
        let count2 = count.clone();
        let second: Callback<i32> = Arc::new(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        let second_for_first = second.clone();
        let p_for_first = p2.clone();
        let first: Callback<i32> = Arc::new(move |_| {
            // Subscribing mid-dispatch must not extend the current snapshot.
            p_for_first.subscribe(second_for_first.clone());
        });

        p.subscribe(first);
        p.trigger(1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(p.len(), 2);

        p.trigger(2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
