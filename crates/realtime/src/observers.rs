//! Per-channel observer registry.

use threadlink_protocol::Payload;

use crate::types::{EventCallback, ListenerId};

/// Observers of one channel, deduplicated by [`ListenerId`].
///
/// Delivery order is registration order, but callers must not rely on it.
#[derive(Default)]
pub(crate) struct ObserverSet {
    entries: Vec<(ListenerId, EventCallback)>,
}

impl ObserverSet {
    /// Adds an observer. Returns `false` if the id was already registered;
    /// the existing callback is kept.
    pub(crate) fn insert(&mut self, id: ListenerId, callback: EventCallback) -> bool {
        if self.contains(id) {
            return false;
        }
        self.entries.push((id, callback));
        true
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    pub(crate) fn contains(&self, id: ListenerId) -> bool {
        self.entries.iter().any(|(existing, _)| *existing == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clones the callbacks so they can be invoked without holding the
    /// registry lock.
    pub(crate) fn snapshot(&self) -> Vec<EventCallback> {
        self.entries.iter().map(|(_, cb)| cb.clone()).collect()
    }
}

/// Delivers one event to every callback in `observers`.
pub(crate) fn dispatch(observers: &[EventCallback], payload: &Payload) {
    for observer in observers {
        observer(payload);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting() -> (EventCallback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let cb: EventCallback = Arc::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (cb, count)
    }

    #[test]
    fn insert_deduplicates_by_id() {
        let mut set = ObserverSet::default();
        let id = ListenerId::new();
        let (cb, _) = counting();
        assert!(set.insert(id, cb.clone()));
        assert!(!set.insert(id, cb));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_only_matching_id() {
        let mut set = ObserverSet::default();
        let (a, b) = (ListenerId::new(), ListenerId::new());
        set.insert(a, counting().0);
        set.insert(b, counting().0);

        assert!(!set.remove(ListenerId::new()));
        assert!(set.remove(a));
        assert!(!set.contains(a));
        assert!(set.contains(b));
        assert!(set.remove(b));
        assert!(set.is_empty());
    }

    #[test]
    fn dispatch_reaches_every_observer_once() {
        let mut set = ObserverSet::default();
        let (cb1, n1) = counting();
        let (cb2, n2) = counting();
        let id1 = ListenerId::new();
        set.insert(id1, cb1.clone());
        set.insert(ListenerId::new(), cb2);
        set.insert(id1, cb1);

        let payload: Payload = serde_json::from_str(r#"{"type":"msg"}"#).unwrap();
        dispatch(&set.snapshot(), &payload);

        assert_eq!(n1.load(Ordering::SeqCst), 1);
        assert_eq!(n2.load(Ordering::SeqCst), 1);
    }
}
