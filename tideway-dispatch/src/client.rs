//! RPC client boundary and the shared client pool.
//!
//! The dispatch layer never talks to sockets: it hands a
//! [`PushTaskRequest`] plus a reply continuation to a [`WorkerClient`] and
//! moves on. Clients are produced lazily by an injected factory and cached
//! by the full address triple, so reconnecting to the same worker reuses
//! the same client (and its in-flight request bookkeeping survives a
//! redundant refresh).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use tideway_core::{PushTaskReply, PushTaskRequest, WorkerAddress};

use crate::error::PushTaskError;

/// Reply continuation for one pushed task.
///
/// The error arm is the transport status: a non-OK push means the request
/// did not reach a live executor.
pub type PushTaskCallback = Box<dyn FnOnce(Result<PushTaskReply, PushTaskError>)>;

/// A connection to one remote worker.
pub trait WorkerClient {
    /// The address this client is connected to.
    fn address(&self) -> &WorkerAddress;

    /// Ship an actor task. `skip_queue` bypasses the transport's
    /// normal-task queue — actor tasks carry their own ordering and must
    /// not be reordered behind it.
    fn push_actor_task(
        &self,
        request: PushTaskRequest,
        skip_queue: bool,
        on_reply: PushTaskCallback,
    );
}

/// Factory producing a client for an address, injected by the embedder.
pub type ClientFactory = Box<dyn Fn(&WorkerAddress) -> Rc<dyn WorkerClient>>;

/// Cache of worker clients, keyed by the full (ip, port, worker id) triple.
pub struct ClientPool {
    factory: ClientFactory,
    clients: RefCell<HashMap<WorkerAddress, Rc<dyn WorkerClient>>>,
}

impl ClientPool {
    /// Create a pool around a client factory.
    pub fn new(factory: ClientFactory) -> Self {
        Self {
            factory,
            clients: RefCell::new(HashMap::new()),
        }
    }

    /// Get the cached client for an address, creating it on first use.
    pub fn get_or_connect(&self, address: &WorkerAddress) -> Rc<dyn WorkerClient> {
        if let Some(client) = self.clients.borrow().get(address) {
            return client.clone();
        }
        debug!(address = %address, "creating worker client");
        let client = (self.factory)(address);
        self.clients
            .borrow_mut()
            .insert(address.clone(), client.clone());
        client
    }

    /// Drop the cached client for an address. Returns whether one existed.
    pub fn disconnect(&self, address: &WorkerAddress) -> bool {
        self.clients.borrow_mut().remove(address).is_some()
    }

    /// Number of cached clients.
    pub fn len(&self) -> usize {
        self.clients.borrow().len()
    }

    /// Whether the pool has no cached clients.
    pub fn is_empty(&self) -> bool {
        self.clients.borrow().is_empty()
    }
}
