//! Collaborator boundaries owned by the caller's task-bookkeeping layer.
//!
//! The submitter decides *when* a task is done or doomed; the bookkeeping
//! layer owns what that means — retry counts, result publication, and
//! surfacing death causes to the application. Keeping these traits narrow
//! is what makes the submitter testable with recording fakes.

use tideway_core::{PushTaskReply, TaskId, TaskSpec, WorkerAddress};

use crate::error::{PushTaskError, TaskErrorKind};
use crate::lifecycle::DeathCause;

/// Task-level bookkeeping: completion and failure/retry accounting.
pub trait TaskFinisher {
    /// A task finished on the actor. `is_application_error` is true when
    /// the method ran but raised; transport status was OK either way.
    fn complete_pending_task(
        &self,
        task_id: TaskId,
        reply: &PushTaskReply,
        actor_address: &WorkerAddress,
        is_application_error: bool,
    );

    /// A task failed before or instead of completing. Returns true when a
    /// retry was scheduled (the task will be resubmitted under its
    /// original counter), false when the failure is terminal.
    fn fail_or_retry_pending_task(
        &self,
        task_id: TaskId,
        error: TaskErrorKind,
        status: Option<&PushTaskError>,
        death_cause: Option<&DeathCause>,
    ) -> bool;
}

/// Keeps argument objects alive while their task is outstanding.
///
/// Retained at submission, released exactly once at terminal disposition —
/// whichever of completion, failure, or a lifecycle sweep gets there first.
pub trait ReferenceCounter {
    /// Pin the task's argument objects.
    fn retain_task_args(&self, spec: &TaskSpec);

    /// Unpin the task's argument objects.
    fn release_task_args(&self, spec: &TaskSpec);
}
