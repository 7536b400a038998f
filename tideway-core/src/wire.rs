//! The actor-task wire exchange.
//!
//! One request/reply pair crosses the transport per dispatched task. The
//! request carries the task spec plus the submitter's ordering metadata; the
//! reply carries the executor's payload. Transport-level failure is not a
//! message — it is the error arm of the reply callback.

use serde::{Deserialize, Serialize};

use crate::ids::TaskId;
use crate::task::TaskSpec;

/// Initial value of [`PushTaskRequest::client_processed_up_to`]: the caller
/// has not yet acknowledged any sequence.
pub const NO_ACKED_SEQUENCE: i64 = -1;

/// A task pushed to the worker hosting an actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushTaskRequest {
    /// The invocation being shipped.
    pub task_spec: TaskSpec,
    /// Submitter-assigned send sequence for this actor.
    ///
    /// In ordered mode the dispatch order equals this numbering; in
    /// out-of-order mode dispatch follows dependency resolution but each
    /// request still carries its originally assigned sequence, so the
    /// receiver can reorder if it wants to.
    pub sequence_number: u64,
    /// Highest sequence the caller considers acknowledged, for
    /// receiver-side cleanup. [`NO_ACKED_SEQUENCE`] until the first
    /// contiguous ack.
    pub client_processed_up_to: i64,
    /// Birth timestamp of the caller instance, in milliseconds.
    ///
    /// A reconstructed caller carries a newer timestamp; the receiver uses
    /// it to tell a fresh caller instance from a pre-reconstruction
    /// straggler.
    pub caller_timestamp_ms: i64,
}

/// The executor's answer to a [`PushTaskRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushTaskReply {
    /// The task this reply answers.
    pub task_id: TaskId,
    /// Serialized return payload, opaque to the pipeline.
    pub payload: Vec<u8>,
    /// True when the method ran but raised an application-level error.
    ///
    /// Transport status stays OK in that case; the bookkeeping layer
    /// publishes the error to the application instead of retrying.
    pub is_application_error: bool,
}
