//! Error types for the dispatch layer.

use tideway_core::ActorId;

/// Classification of a task failure, delivered to the bookkeeping layer.
///
/// The bookkeeping layer owns the retry decision; this enum only tells it
/// what went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskErrorKind {
    /// RPC to the actor failed while it was believed reachable. May retry.
    ActorUnreachable,
    /// The actor transitioned to DEAD; the death cause accompanies the
    /// failure. Terminal for the actor.
    ActorDied,
    /// An argument object will never be produced.
    DependencyResolutionFailed,
    /// The receiver rejected the request as coming from a stale caller
    /// instance.
    CallerStale,
}

impl std::fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskErrorKind::ActorUnreachable => "actor unreachable",
            TaskErrorKind::ActorDied => "actor died",
            TaskErrorKind::DependencyResolutionFailed => "dependency resolution failed",
            TaskErrorKind::CallerStale => "caller stale",
        };
        f.write_str(s)
    }
}

/// Synchronous errors from `submit_task`.
///
/// Everything else about a submission fails asynchronously through the
/// bookkeeping layer; these two are the caller's immediate problem.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubmitError {
    /// The actor's pending-task bound is reached; the caller must apply
    /// backpressure before submitting more.
    #[error("pending task queue full for actor {actor_id}: limit {limit}")]
    QueueFull {
        /// The actor whose queue is full.
        actor_id: ActorId,
        /// The configured bound.
        limit: u32,
    },

    /// No queue was registered for the actor.
    #[error("unknown actor: {actor_id}")]
    UnknownActor {
        /// The actor that has no queue.
        actor_id: ActorId,
    },
}

/// Transport-level failure reported through a worker client's reply
/// callback.
///
/// A non-OK push status means the request did not reach a live executor;
/// whether the task is retried is the bookkeeping layer's call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PushTaskError {
    /// The connection failed or the worker went away mid-request.
    #[error("i/o failure: {0}")]
    Io(String),

    /// The receiver refused the request (stale or duplicate caller state).
    #[error("rejected by receiver: {0}")]
    Rejected(String),
}

/// Receiver-side rejection of a pushed task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReceiveError {
    /// The counter was already accepted from this caller instance.
    #[error("duplicate actor counter {counter}, highest accepted {max_accepted}")]
    DuplicateCounter {
        /// The counter carried by the rejected request.
        counter: u64,
        /// The highest counter accepted from this caller instance.
        max_accepted: u64,
    },

    /// The request came from an older instance of a reconstructed caller.
    #[error("stale caller instance: timestamp {timestamp_ms} <= last known {last_timestamp_ms}")]
    StaleCaller {
        /// Timestamp carried by the rejected request.
        timestamp_ms: i64,
        /// Timestamp of the caller instance the receiver trusts.
        last_timestamp_ms: i64,
    },
}
