//! Object store boundary.
//!
//! The submitter only needs one thing from the local object store: to be
//! told, through the event loop, when an argument object becomes available
//! (or is declared unproducible). [`InMemoryObjectStore`] is the reference
//! implementation used by the tests and by embedders that keep objects in
//! process memory.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use tideway_core::ObjectId;

use crate::event_loop::EventLoop;

/// Terminal availability of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectAvailability {
    /// The object is materialized in the local store.
    Available,
    /// The object will never be produced.
    Failed,
}

/// Callback invoked (through the event loop) once an object reaches a
/// terminal availability.
pub type AvailabilityCallback = Box<dyn FnOnce(ObjectAvailability)>;

/// What the dispatch layer requires of a local object store.
pub trait ObjectStore {
    /// Whether the object is currently materialized.
    fn contains(&self, id: &ObjectId) -> bool;

    /// Register interest in an object.
    ///
    /// When the object later becomes available or is marked failed, the
    /// callback is posted to the event loop. If the object is already
    /// settled at registration time, the callback runs inline — the
    /// registrant is on the loop already. Callbacks fire at most once and
    /// are never cancelled; an interest in an object that never terminates
    /// is simply never satisfied.
    fn wait_available(&self, id: ObjectId, on_done: AvailabilityCallback);
}

enum StoredState {
    Present(Vec<u8>),
    Failed,
}

/// In-process object store.
///
/// `put` and `fail` settle an object's availability and post every waiting
/// callback to the event loop, one continuation per waiter — notification
/// ordering therefore follows the loop, like every other event in the
/// pipeline.
pub struct InMemoryObjectStore {
    event_loop: Rc<EventLoop>,
    objects: RefCell<HashMap<ObjectId, StoredState>>,
    waiters: RefCell<HashMap<ObjectId, Vec<AvailabilityCallback>>>,
}

impl InMemoryObjectStore {
    /// Create an empty store posting notifications to the given loop.
    pub fn new(event_loop: Rc<EventLoop>) -> Self {
        Self {
            event_loop,
            objects: RefCell::new(HashMap::new()),
            waiters: RefCell::new(HashMap::new()),
        }
    }

    /// Materialize an object. Returns false if the id was already settled.
    pub fn put(&self, id: ObjectId, payload: Vec<u8>) -> bool {
        {
            let mut objects = self.objects.borrow_mut();
            if objects.contains_key(&id) {
                return false;
            }
            objects.insert(id, StoredState::Present(payload));
        }
        self.settle(id, ObjectAvailability::Available);
        true
    }

    /// Mark an object as never-to-be-produced. Returns false if already
    /// settled.
    pub fn fail(&self, id: ObjectId) -> bool {
        {
            let mut objects = self.objects.borrow_mut();
            if objects.contains_key(&id) {
                return false;
            }
            objects.insert(id, StoredState::Failed);
        }
        self.settle(id, ObjectAvailability::Failed);
        true
    }

    /// Read a materialized object's payload.
    pub fn get(&self, id: &ObjectId) -> Option<Vec<u8>> {
        match self.objects.borrow().get(id) {
            Some(StoredState::Present(payload)) => Some(payload.clone()),
            _ => None,
        }
    }

    fn settle(&self, id: ObjectId, availability: ObjectAvailability) {
        let waiters = self.waiters.borrow_mut().remove(&id).unwrap_or_default();
        debug!(object = %id, ?availability, waiters = waiters.len(), "object settled");
        for waiter in waiters {
            self.event_loop.post(move || waiter(availability));
        }
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn contains(&self, id: &ObjectId) -> bool {
        matches!(self.objects.borrow().get(id), Some(StoredState::Present(_)))
    }

    fn wait_available(&self, id: ObjectId, on_done: AvailabilityCallback) {
        let settled = match self.objects.borrow().get(&id) {
            Some(StoredState::Present(_)) => Some(ObjectAvailability::Available),
            Some(StoredState::Failed) => Some(ObjectAvailability::Failed),
            None => None,
        };
        match settled {
            Some(availability) => on_done(availability),
            None => self
                .waiters
                .borrow_mut()
                .entry(id)
                .or_default()
                .push(on_done),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn make_store() -> (Rc<EventLoop>, InMemoryObjectStore) {
        let event_loop = Rc::new(EventLoop::new());
        let store = InMemoryObjectStore::new(event_loop.clone());
        (event_loop, store)
    }

    #[test]
    fn test_put_then_get() {
        let (_event_loop, store) = make_store();
        let id = ObjectId::new(0, 1);

        assert!(!store.contains(&id));
        assert!(store.put(id, b"value".to_vec()));
        assert!(store.contains(&id));
        assert_eq!(store.get(&id), Some(b"value".to_vec()));
    }

    #[test]
    fn test_double_put_rejected() {
        let (_event_loop, store) = make_store();
        let id = ObjectId::new(0, 1);

        assert!(store.put(id, b"first".to_vec()));
        assert!(!store.put(id, b"second".to_vec()));
        assert_eq!(store.get(&id), Some(b"first".to_vec()));
    }

    #[test]
    fn test_waiter_notified_through_loop() {
        let (event_loop, store) = make_store();
        let id = ObjectId::new(0, 1);
        let seen = Rc::new(Cell::new(None));

        let seen_in_cb = seen.clone();
        store.wait_available(
            id,
            Box::new(move |availability| seen_in_cb.set(Some(availability))),
        );

        // Nothing fires until the loop runs the posted continuation.
        assert!(store.put(id, b"x".to_vec()));
        assert!(seen.get().is_none());
        assert_eq!(event_loop.pending(), 1);

        assert!(event_loop.poll_one());
        assert_eq!(seen.get(), Some(ObjectAvailability::Available));
    }

    #[test]
    fn test_wait_on_already_present_object_fires_inline() {
        let (event_loop, store) = make_store();
        let id = ObjectId::new(0, 1);
        store.put(id, b"x".to_vec());
        event_loop.run_until_idle();

        let seen = Rc::new(Cell::new(None));
        let seen_in_cb = seen.clone();
        store.wait_available(
            id,
            Box::new(move |availability| seen_in_cb.set(Some(availability))),
        );

        // Already settled: no loop trip needed.
        assert_eq!(seen.get(), Some(ObjectAvailability::Available));
        assert_eq!(event_loop.pending(), 0);
    }

    #[test]
    fn test_failed_object_notifies_failed() {
        let (event_loop, store) = make_store();
        let id = ObjectId::new(0, 1);

        let seen = Rc::new(Cell::new(None));
        let seen_in_cb = seen.clone();
        store.wait_available(
            id,
            Box::new(move |availability| seen_in_cb.set(Some(availability))),
        );

        assert!(store.fail(id));
        event_loop.run_until_idle();
        assert_eq!(seen.get(), Some(ObjectAvailability::Failed));
        assert!(!store.contains(&id));
    }

    #[test]
    fn test_multiple_waiters_each_notified() {
        let (event_loop, store) = make_store();
        let id = ObjectId::new(0, 1);
        let hits = Rc::new(Cell::new(0));

        for _ in 0..3 {
            let hits = hits.clone();
            store.wait_available(id, Box::new(move |_| hits.set(hits.get() + 1)));
        }

        store.put(id, b"x".to_vec());
        assert_eq!(event_loop.run_until_idle(), 3);
        assert_eq!(hits.get(), 3);
    }
}
