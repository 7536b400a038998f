//! Task specifications.
//!
//! A [`TaskSpec`] describes one actor method invocation. It is built by the
//! caller, immutable once submitted, and travels unchanged from the
//! submitter to the hosting worker inside a
//! [`PushTaskRequest`](crate::PushTaskRequest).

use serde::{Deserialize, Serialize};

use crate::ids::{ActorId, ObjectId, TaskId, WorkerId};

/// One argument of an actor task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskArg {
    /// An inline value, serialized by the caller.
    Value(Vec<u8>),
    /// A reference to an object in the object store.
    ///
    /// The task cannot be shipped until this object is materialized
    /// locally; the dependency resolver waits on it.
    ObjectRef(ObjectId),
}

/// An immutable actor method invocation.
///
/// The `actor_counter` is the caller-local, per-actor sequence: the caller
/// assigns counters in submission order, and a retried task keeps its
/// original counter. The submitter stamps it onto the wire as the send
/// sequence, so the receiver observes one monotone numbering per caller
/// instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Identifier of this invocation.
    pub task_id: TaskId,
    /// The caller's own task id.
    pub caller_id: TaskId,
    /// The caller's worker id. Changes when the caller is reconstructed.
    pub caller_worker_id: WorkerId,
    /// The target actor.
    pub actor_id: ActorId,
    /// Caller-local, per-actor sequence number.
    pub actor_counter: u64,
    /// Arguments, inline or by object reference.
    pub args: Vec<TaskArg>,
    /// Number of return objects the invocation produces.
    pub num_returns: u64,
}

impl TaskSpec {
    /// The object ids this task depends on, in argument order.
    pub fn dependencies(&self) -> Vec<ObjectId> {
        self.args
            .iter()
            .filter_map(|arg| match arg {
                TaskArg::ObjectRef(id) => Some(*id),
                TaskArg::Value(_) => None,
            })
            .collect()
    }

    /// Whether any argument is an unresolved object reference.
    pub fn has_dependencies(&self) -> bool {
        self.args
            .iter()
            .any(|arg| matches!(arg, TaskArg::ObjectRef(_)))
    }
}
