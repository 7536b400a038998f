//! Dependency resolution.
//!
//! Before a task can be shipped, every `ObjectRef` argument must be
//! materialized in the local store. The resolver registers one interest per
//! dependency and reports a single outcome for the whole task. Ordering is
//! deliberately *not* its business: tasks resolve in whatever order objects
//! arrive, and the per-actor queue re-establishes submission order (or
//! doesn't, in out-of-order mode).
//!
//! `resolve` must be called on the event loop — the submitter posts the
//! whole call as a continuation. A task with no dependencies therefore
//! resolves within that same loop turn, and a task waiting on objects gets
//! its ready callback from the store's posted notifications. Either way
//! the callback runs on the loop, so a lifecycle event arriving between
//! submission and dispatch always observes a consistent queue.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use tideway_core::TaskSpec;

use crate::store::{ObjectAvailability, ObjectStore};

/// Outcome of dependency resolution for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Every dependency is materialized; the task is ready to send.
    Resolved,
    /// Some dependency will never be produced.
    Failed,
}

/// Callback invoked exactly once per resolved task, on the event loop.
pub type ResolveCallback = Box<dyn FnOnce(ResolveOutcome)>;

struct ResolveState {
    remaining: usize,
    on_ready: Option<ResolveCallback>,
}

/// Registers interest in a task's argument objects and fires one callback
/// when the last of them lands.
#[derive(Clone)]
pub struct DependencyResolver {
    store: Rc<dyn ObjectStore>,
}

impl DependencyResolver {
    /// Create a resolver over the given store.
    pub fn new(store: Rc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Resolve the task's dependencies and invoke `on_ready` at most once.
    ///
    /// The first failed dependency settles the task as
    /// [`ResolveOutcome::Failed`]; notifications for its remaining
    /// dependencies are absorbed. Outstanding interests are never
    /// cancelled — a task evicted from its queue before resolution is
    /// failed there, not here.
    pub fn resolve(&self, spec: &TaskSpec, on_ready: ResolveCallback) {
        let dependencies = spec.dependencies();
        if dependencies.is_empty() {
            on_ready(ResolveOutcome::Resolved);
            return;
        }

        debug!(
            task = %spec.task_id,
            dependencies = dependencies.len(),
            "waiting for task dependencies"
        );
        let state = Rc::new(RefCell::new(ResolveState {
            remaining: dependencies.len(),
            on_ready: Some(on_ready),
        }));

        for id in dependencies {
            let state = state.clone();
            self.store.wait_available(
                id,
                Box::new(move |availability| {
                    let callback = {
                        let mut state = state.borrow_mut();
                        match availability {
                            ObjectAvailability::Available => {
                                state.remaining -= 1;
                                if state.remaining == 0 {
                                    state.on_ready.take().map(|cb| (cb, ResolveOutcome::Resolved))
                                } else {
                                    None
                                }
                            }
                            ObjectAvailability::Failed => state
                                .on_ready
                                .take()
                                .map(|cb| (cb, ResolveOutcome::Failed)),
                        }
                    };
                    if let Some((cb, outcome)) = callback {
                        cb(outcome);
                    }
                }),
            );
        }
    }
}
