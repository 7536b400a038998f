//! The single-threaded event loop.
//!
//! Every piece of mutable dispatch state — submit queues, lifecycle tables,
//! in-flight maps, caller records — is owned by one thread and mutated only
//! from continuations run by this loop. Handlers are run-to-completion;
//! asynchrony is expressed by posting further continuations, never by
//! suspending. That is why there are no locks anywhere in this crate:
//! serialization is by construction.
//!
//! The loop is deliberately dumb: a FIFO of boxed closures. The owner
//! decides when to drain it ([`poll_one`](EventLoop::poll_one) in
//! deterministic tests, [`run_until_idle`](EventLoop::run_until_idle) when
//! embedding).

use std::cell::RefCell;
use std::collections::VecDeque;

/// A posted continuation.
type Continuation = Box<dyn FnOnce()>;

/// FIFO queue of run-to-completion continuations.
///
/// A continuation may post further continuations while running; they land
/// at the back of the queue and run in posting order.
#[derive(Default)]
pub struct EventLoop {
    queue: RefCell<VecDeque<Continuation>>,
}

impl EventLoop {
    /// Create an empty loop.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a continuation.
    pub fn post(&self, f: impl FnOnce() + 'static) {
        self.queue.borrow_mut().push_back(Box::new(f));
    }

    /// Run the continuation at the head of the queue, if any.
    ///
    /// Returns whether a continuation ran. The queue borrow is released
    /// before the continuation runs, so it may freely post.
    pub fn poll_one(&self) -> bool {
        let next = self.queue.borrow_mut().pop_front();
        match next {
            Some(f) => {
                f();
                true
            }
            None => false,
        }
    }

    /// Run continuations until the queue is empty, returning how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.poll_one() {
            ran += 1;
        }
        ran
    }

    /// Number of continuations currently queued.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}
