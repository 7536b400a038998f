//! Receiver-side caller filter.
//!
//! The worker hosting an actor sees one numbered request stream per caller
//! instance. Two things can go wrong with it: a request can arrive twice
//! (transport retry, submitter restart replay), and a *reconstructed*
//! caller can race its own predecessor's stragglers. The filter keeps one
//! record per (callee actor, caller) and admits a request only if it is
//! genuinely new:
//!
//! 1. Unknown caller: accept, start a record.
//! 2. Same worker id: accept only counters above the highest accepted one.
//! 3. Different worker id: the caller was rebuilt. A newer caller
//!    timestamp replaces the record wholesale (counters restart); an older
//!    one is a pre-reconstruction straggler and is rejected.
//!
//! Rejected requests never reach the executor; their reply callback gets
//! the error. Both outcomes travel through the event loop.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, warn};

use tideway_core::{ActorId, PushTaskReply, PushTaskRequest, TaskId, TaskSpec, WorkerId};

use crate::error::ReceiveError;
use crate::event_loop::EventLoop;

/// Reply continuation for one received task.
pub type ReceiverReplyCallback = Box<dyn FnOnce(Result<PushTaskReply, ReceiveError>)>;

/// The executor boundary: runs an admitted task and eventually answers
/// through the reply callback.
pub type TaskHandler = Box<dyn Fn(TaskSpec, ReceiverReplyCallback)>;

/// What the receiver knows about one caller of one actor.
struct CallerRecord {
    worker_id: WorkerId,
    timestamp_ms: i64,
    max_accepted_counter: u64,
}

/// Receives pushed actor tasks, filters stale and duplicate callers, and
/// hands admitted tasks to the executor.
pub struct TaskReceiver {
    event_loop: Rc<EventLoop>,
    executor: Rc<TaskHandler>,
    callers: RefCell<HashMap<(ActorId, TaskId), CallerRecord>>,
}

impl TaskReceiver {
    /// Create a receiver delivering admitted tasks to `executor`.
    pub fn new(event_loop: Rc<EventLoop>, executor: TaskHandler) -> Self {
        Self {
            event_loop,
            executor: Rc::new(executor),
            callers: RefCell::new(HashMap::new()),
        }
    }

    /// Handle one pushed task.
    ///
    /// Admitted tasks are posted to the executor; rejections are posted to
    /// the reply callback with the reason. Either way the caller of this
    /// method returns immediately.
    pub fn handle_push_task(&self, request: PushTaskRequest, on_reply: ReceiverReplyCallback) {
        let spec = request.task_spec;
        let key = (spec.actor_id, spec.caller_id);

        let verdict = {
            let mut callers = self.callers.borrow_mut();
            match callers.get_mut(&key) {
                None => {
                    callers.insert(
                        key,
                        CallerRecord {
                            worker_id: spec.caller_worker_id,
                            timestamp_ms: request.caller_timestamp_ms,
                            max_accepted_counter: spec.actor_counter,
                        },
                    );
                    Ok(())
                }
                Some(record) if record.worker_id == spec.caller_worker_id => {
                    if spec.actor_counter > record.max_accepted_counter {
                        record.max_accepted_counter = spec.actor_counter;
                        Ok(())
                    } else {
                        Err(ReceiveError::DuplicateCounter {
                            counter: spec.actor_counter,
                            max_accepted: record.max_accepted_counter,
                        })
                    }
                }
                Some(record) => {
                    if request.caller_timestamp_ms > record.timestamp_ms {
                        // Reconstructed caller: trust it and restart the
                        // counter history from this request.
                        *record = CallerRecord {
                            worker_id: spec.caller_worker_id,
                            timestamp_ms: request.caller_timestamp_ms,
                            max_accepted_counter: spec.actor_counter,
                        };
                        Ok(())
                    } else {
                        Err(ReceiveError::StaleCaller {
                            timestamp_ms: request.caller_timestamp_ms,
                            last_timestamp_ms: record.timestamp_ms,
                        })
                    }
                }
            }
        };

        match verdict {
            Ok(()) => {
                debug!(
                    actor = %spec.actor_id,
                    caller = %spec.caller_id,
                    counter = spec.actor_counter,
                    "task admitted"
                );
                let executor = self.executor.clone();
                self.event_loop.post(move || executor(spec, on_reply));
            }
            Err(error) => {
                warn!(
                    actor = %spec.actor_id,
                    caller = %spec.caller_id,
                    counter = spec.actor_counter,
                    %error,
                    "task rejected"
                );
                self.event_loop.post(move || on_reply(Err(error)));
            }
        }
    }
}
