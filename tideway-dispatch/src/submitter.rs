//! The submitter core.
//!
//! [`ActorTaskSubmitter`] consumes locally-issued actor tasks, waits for
//! their dependencies, orders them per actor, pairs them with the actor's
//! current RPC client, and reconciles replies with the bookkeeping layer.
//! Lifecycle events from the coordination service drive queue flushes and
//! fail sweeps.
//!
//! ## Shape
//!
//! ```text
//! submit_task ──► DependencyResolver ──► SubmitQueue ──► WorkerClient
//!                      (event loop)        per actor        PushActorTask
//!                                              ▲                │ reply
//! connect_actor / disconnect_actor ────────────┘                ▼
//!        (generation-filtered)                       TaskFinisher / sweeps
//! ```
//!
//! All state lives behind one `Rc<RefCell<..>>` mutated only from the
//! event-loop thread. The helper functions at the bottom are the
//! continuation bodies; each takes care to release the state borrow before
//! calling out into a client, the finisher, or the reference counter, since
//! any of those may re-enter the submitter.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::rc::Rc;

use tracing::{debug, info, warn};

use tideway_core::{
    ActorId, NO_ACKED_SEQUENCE, PushTaskReply, PushTaskRequest, TaskSpec, WorkerAddress,
};

use crate::bookkeeping::{ReferenceCounter, TaskFinisher};
use crate::client::{ClientPool, WorkerClient};
use crate::config::SubmitterConfig;
use crate::error::{PushTaskError, SubmitError, TaskErrorKind};
use crate::event_loop::EventLoop;
use crate::lifecycle::{ActorLifecycle, ActorLifecycleState, DeathCause, Generation};
use crate::resolver::{DependencyResolver, ResolveOutcome};
use crate::store::ObjectStore;
use crate::submit_queue::{
    OutOfOrderSubmitQueue, SequenceNo, SequentialSubmitQueue, SubmitQueue,
};
use crate::time::TimeSource;

/// Invoked once per crossing of the per-actor queue-warning ladder.
pub type QueueWarningCallback = Box<dyn Fn(ActorId, u64)>;

/// A dispatched task awaiting its reply.
struct InflightEntry {
    spec: TaskSpec,
    /// Address the request went to; completion reports it to bookkeeping.
    address: WorkerAddress,
}

/// A task whose push failed while the actor might still be restarting;
/// held until an authoritative death cause arrives or the deadline passes.
struct ParkedEntry {
    deadline_ms: i64,
    spec: TaskSpec,
}

struct ActorQueue {
    lifecycle: ActorLifecycle,
    submit_queue: Box<dyn SubmitQueue>,
    inflight: BTreeMap<SequenceNo, InflightEntry>,
    wait_for_death_info: VecDeque<ParkedEntry>,
    client: Option<Rc<dyn WorkerClient>>,
    max_pending: Option<u32>,
    fail_if_unreachable: bool,
    owned: bool,
    /// High-water mark of assigned sequences; fresh submissions land at or
    /// above it, retries below.
    next_send_seq: SequenceNo,
    /// Highest sequence below which every task has completed.
    acked_up_to: i64,
    /// Completed sequences above the contiguous prefix.
    completed_gaps: BTreeSet<u64>,
    next_warn_threshold: u64,
}

impl ActorQueue {
    fn new(
        max_pending: Option<u32>,
        out_of_order: bool,
        fail_if_unreachable: bool,
        owned: bool,
        warn_threshold: u64,
    ) -> Self {
        let submit_queue: Box<dyn SubmitQueue> = if out_of_order {
            Box::new(OutOfOrderSubmitQueue::new())
        } else {
            Box::new(SequentialSubmitQueue::new())
        };
        Self {
            lifecycle: ActorLifecycle::new(),
            submit_queue,
            inflight: BTreeMap::new(),
            wait_for_death_info: VecDeque::new(),
            client: None,
            max_pending,
            fail_if_unreachable,
            owned,
            next_send_seq: SequenceNo(0),
            acked_up_to: NO_ACKED_SEQUENCE,
            completed_gaps: BTreeSet::new(),
            next_warn_threshold: warn_threshold,
        }
    }

    /// Tasks submitted but not yet acknowledged or failed.
    fn outstanding(&self) -> u64 {
        (self.submit_queue.len() + self.inflight.len() + self.wait_for_death_info.len()) as u64
    }

    /// Record a completed sequence and advance the contiguous-ack cursor.
    fn record_completed(&mut self, seq: SequenceNo) {
        self.completed_gaps.insert(seq.0);
        while self
            .completed_gaps
            .remove(&((self.acked_up_to + 1) as u64))
        {
            self.acked_up_to += 1;
        }
    }
}

#[derive(Default)]
struct SubmitterState {
    queues: HashMap<ActorId, ActorQueue>,
}

/// Everything a posted continuation needs; cheap to clone.
#[derive(Clone)]
struct SubmitterCtx {
    state: Rc<RefCell<SubmitterState>>,
    finisher: Rc<dyn TaskFinisher>,
    reference_counter: Rc<dyn ReferenceCounter>,
    event_loop: Rc<EventLoop>,
    client_pool: Rc<ClientPool>,
    time: Rc<dyn TimeSource>,
    queue_warning: Rc<dyn Fn(ActorId, u64)>,
    warn_threshold: u64,
    wait_for_death_info_timeout_ms: i64,
    instance_timestamp_ms: i64,
}

/// Client-side actor task submitter.
///
/// Single-threaded: every method must be called from the event-loop thread,
/// and every continuation it posts runs there too.
pub struct ActorTaskSubmitter {
    ctx: SubmitterCtx,
    resolver: DependencyResolver,
}

impl ActorTaskSubmitter {
    /// Assemble a submitter from its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client_pool: Rc<ClientPool>,
        object_store: Rc<dyn ObjectStore>,
        finisher: Rc<dyn TaskFinisher>,
        reference_counter: Rc<dyn ReferenceCounter>,
        queue_warning: QueueWarningCallback,
        event_loop: Rc<EventLoop>,
        time: Rc<dyn TimeSource>,
        config: SubmitterConfig,
    ) -> Self {
        let instance_timestamp_ms = config
            .instance_timestamp_ms
            .unwrap_or_else(|| time.now_ms());
        let ctx = SubmitterCtx {
            state: Rc::new(RefCell::new(SubmitterState::default())),
            finisher,
            reference_counter,
            event_loop: event_loop.clone(),
            client_pool,
            time,
            queue_warning: Rc::from(queue_warning),
            warn_threshold: config.queue_warn_threshold,
            wait_for_death_info_timeout_ms: config.wait_for_death_info_timeout_ms,
            instance_timestamp_ms,
        };
        let resolver = DependencyResolver::new(object_store);
        Self { ctx, resolver }
    }

    /// Create the actor's queue in PENDING if it does not exist. Idempotent;
    /// a second call leaves the existing queue and its flags untouched.
    pub fn add_actor_queue_if_not_exists(
        &self,
        actor_id: ActorId,
        max_pending: Option<u32>,
        out_of_order: bool,
        fail_if_unreachable: bool,
        owned: bool,
    ) {
        let mut state = self.ctx.state.borrow_mut();
        state.queues.entry(actor_id).or_insert_with(|| {
            info!(
                actor = %actor_id,
                out_of_order,
                fail_if_unreachable,
                owned,
                "registered actor queue"
            );
            ActorQueue::new(
                max_pending,
                out_of_order,
                fail_if_unreachable,
                owned,
                self.ctx.warn_threshold,
            )
        });
    }

    /// Whether a queue exists for the actor.
    pub fn check_actor_exists(&self, actor_id: ActorId) -> bool {
        self.ctx.state.borrow().queues.contains_key(&actor_id)
    }

    /// Whether this worker owns the actor's lifetime. False for unknown
    /// actors.
    pub fn is_actor_owned(&self, actor_id: ActorId) -> bool {
        self.ctx
            .state
            .borrow()
            .queues
            .get(&actor_id)
            .is_some_and(|queue| queue.owned)
    }

    /// Count of tasks submitted to the actor and not yet acknowledged or
    /// failed.
    pub fn pending_task_count(&self, actor_id: ActorId) -> u64 {
        self.ctx
            .state
            .borrow()
            .queues
            .get(&actor_id)
            .map_or(0, |queue| queue.outstanding())
    }

    /// Whether the actor's not-yet-acknowledged task count has reached its
    /// bound. Always false for unbounded queues.
    pub fn pending_tasks_full(&self, actor_id: ActorId) -> bool {
        let state = self.ctx.state.borrow();
        match state.queues.get(&actor_id) {
            Some(queue) => match queue.max_pending {
                Some(limit) => queue.outstanding() >= u64::from(limit),
                None => false,
            },
            None => false,
        }
    }

    /// Submit a task to its actor.
    ///
    /// The send sequence is assigned here, in call order. The task's
    /// outcome — completion or failure — is always delivered through the
    /// bookkeeping layer; the `Err` arm only reports conditions the caller
    /// must react to right now.
    ///
    /// # Errors
    ///
    /// [`SubmitError::QueueFull`] when the actor's pending bound is
    /// reached, [`SubmitError::UnknownActor`] when no queue was registered.
    pub fn submit_task(&self, spec: TaskSpec) -> Result<(), SubmitError> {
        enum Admission {
            Enqueue { warned: Option<u64> },
            FailDead(DeathCause),
            FailFast,
        }

        let actor_id = spec.actor_id;
        let seq = SequenceNo(spec.actor_counter);

        let admission = {
            let mut state = self.ctx.state.borrow_mut();
            let queue = state
                .queues
                .get_mut(&actor_id)
                .ok_or(SubmitError::UnknownActor { actor_id })?;

            match queue.lifecycle.state() {
                ActorLifecycleState::Dead => Admission::FailDead(
                    queue
                        .lifecycle
                        .death_cause()
                        .cloned()
                        .unwrap_or(DeathCause::OutOfScope),
                ),
                ActorLifecycleState::Restarting if queue.fail_if_unreachable => {
                    Admission::FailFast
                }
                _ => {
                    if let Some(limit) = queue.max_pending
                        && queue.outstanding() >= u64::from(limit)
                    {
                        return Err(SubmitError::QueueFull { actor_id, limit });
                    }
                    queue.submit_queue.emplace(seq, spec.clone());
                    if seq >= queue.next_send_seq {
                        queue.next_send_seq = seq.next();
                    }
                    let outstanding = queue.outstanding();
                    let mut warned = None;
                    while outstanding >= queue.next_warn_threshold {
                        queue.next_warn_threshold *= 2;
                        warned = Some(outstanding);
                    }
                    Admission::Enqueue { warned }
                }
            }
        };

        match admission {
            Admission::FailDead(cause) => {
                // Synchronous by design: a dead actor needs no loop trip.
                debug!(actor = %actor_id, task = %spec.task_id, "submit to dead actor");
                self.ctx.finisher.fail_or_retry_pending_task(
                    spec.task_id,
                    TaskErrorKind::ActorDied,
                    None,
                    Some(&cause),
                );
                Ok(())
            }
            Admission::FailFast => {
                debug!(
                    actor = %actor_id,
                    task = %spec.task_id,
                    "actor restarting, failing submission fast"
                );
                let finisher = self.ctx.finisher.clone();
                let task_id = spec.task_id;
                self.ctx.event_loop.post(move || {
                    finisher.fail_or_retry_pending_task(
                        task_id,
                        TaskErrorKind::ActorUnreachable,
                        None,
                        None,
                    );
                });
                Ok(())
            }
            Admission::Enqueue { warned } => {
                if let Some(count) = warned {
                    warn!(actor = %actor_id, count, "actor task queue is backing up");
                    (self.ctx.queue_warning)(actor_id, count);
                }
                self.ctx.reference_counter.retain_task_args(&spec);
                // Dependency registration runs as its own continuation, so
                // a task with zero dependencies still takes one loop turn
                // and a lifecycle event never lands mid-submission.
                let ctx = self.ctx.clone();
                let resolver = self.resolver.clone();
                self.ctx.event_loop.post(move || {
                    resolver.resolve(
                        &spec,
                        Box::new(move |outcome| {
                            on_dependencies_resolved(&ctx, actor_id, seq, outcome);
                        }),
                    );
                });
                Ok(())
            }
        }
    }

    /// Apply a connect event from the coordination service.
    ///
    /// Accepted only with a strictly newer generation on a live actor;
    /// everything else — including a redundant refresh of the current
    /// address — is a no-op that preserves in-flight tracking. On
    /// acceptance the actor enters RUNNING and every currently
    /// dispatchable task is sent.
    pub fn connect_actor(&self, actor_id: ActorId, address: WorkerAddress, generation: Generation) {
        let accepted = {
            let mut state = self.ctx.state.borrow_mut();
            let Some(queue) = state.queues.get_mut(&actor_id) else {
                warn!(actor = %actor_id, "connect for unregistered actor");
                return;
            };
            queue.lifecycle.try_connect(address.clone(), generation)
        };
        if !accepted {
            debug!(actor = %actor_id, generation = %generation, "connect ignored");
            return;
        }

        let client = self.ctx.client_pool.get_or_connect(&address);
        {
            let mut state = self.ctx.state.borrow_mut();
            if let Some(queue) = state.queues.get_mut(&actor_id) {
                queue.client = Some(client);
            }
        }
        info!(actor = %actor_id, address = %address, generation = %generation, "actor connected");
        send_ready_tasks(&self.ctx, actor_id);
    }

    /// Apply a disconnect event from the coordination service.
    ///
    /// A restart disconnect (strictly newer generation) fails every
    /// in-flight task and keeps the queued ones for the next connect. A
    /// death fails everything and seals the queue; it is accepted from any
    /// live state regardless of generation. Either way the actor drops its
    /// client, but the shared pool slot for the address is evicted only
    /// when no other live actor still resides there.
    pub fn disconnect_actor(
        &self,
        actor_id: ActorId,
        generation: Generation,
        dead: bool,
        death_cause: DeathCause,
        is_restartable: bool,
    ) {
        debug_assert!(
            dead || is_restartable,
            "a non-dead disconnect must leave the actor restartable"
        );

        enum Sweep {
            Death {
                inflight: Vec<TaskSpec>,
                queued: Vec<TaskSpec>,
                parked: Vec<TaskSpec>,
            },
            Restart {
                inflight: Vec<TaskSpec>,
            },
        }

        let (sweep, evict_address) = {
            let mut state = self.ctx.state.borrow_mut();
            let Some(queue) = state.queues.get_mut(&actor_id) else {
                warn!(actor = %actor_id, "disconnect for unregistered actor");
                return;
            };
            if queue.lifecycle.is_dead() {
                debug!(actor = %actor_id, "disconnect ignored, actor already dead");
                return;
            }
            let previous_address = queue.lifecycle.address().cloned();

            let sweep = if dead {
                queue.lifecycle.mark_dead(generation, death_cause.clone());
                queue.client = None;
                let inflight = std::mem::take(&mut queue.inflight)
                    .into_values()
                    .map(|entry| entry.spec)
                    .collect();
                let queued = queue
                    .submit_queue
                    .drain_all()
                    .into_iter()
                    .map(|(_, spec)| spec)
                    .collect();
                let parked = queue
                    .wait_for_death_info
                    .drain(..)
                    .map(|entry| entry.spec)
                    .collect();
                Sweep::Death {
                    inflight,
                    queued,
                    parked,
                }
            } else {
                if !queue.lifecycle.try_restart(generation) {
                    debug!(
                        actor = %actor_id,
                        generation = %generation,
                        "restart disconnect ignored"
                    );
                    return;
                }
                queue.client = None;
                let inflight = std::mem::take(&mut queue.inflight)
                    .into_values()
                    .map(|entry| entry.spec)
                    .collect();
                Sweep::Restart { inflight }
            };

            // The pool slot for an address is shared by every actor hosted
            // there; only the last one out may evict it.
            let evict_address = previous_address.filter(|address| {
                !state
                    .queues
                    .values()
                    .any(|other| other.lifecycle.address() == Some(address))
            });
            (sweep, evict_address)
        };

        if let Some(address) = evict_address {
            self.ctx.client_pool.disconnect(&address);
        }

        match sweep {
            Sweep::Death {
                inflight,
                queued,
                parked,
            } => {
                info!(
                    actor = %actor_id,
                    cause = %death_cause,
                    failing = inflight.len() + queued.len() + parked.len(),
                    "actor died"
                );
                for spec in inflight.into_iter().chain(queued).chain(parked) {
                    fail_task(
                        &self.ctx,
                        &spec,
                        TaskErrorKind::ActorDied,
                        None,
                        Some(&death_cause),
                    );
                }
            }
            Sweep::Restart { inflight } => {
                info!(
                    actor = %actor_id,
                    generation = %generation,
                    failing = inflight.len(),
                    "actor restarting, failing in-flight tasks"
                );
                for spec in inflight {
                    fail_task(
                        &self.ctx,
                        &spec,
                        TaskErrorKind::ActorUnreachable,
                        None,
                        Some(&death_cause),
                    );
                }
            }
        }
    }

    /// Fail parked wait-for-death-info tasks whose deadline has passed.
    ///
    /// Driven periodically by the embedder; a no-op when nothing expired.
    pub fn check_timeout_tasks(&self) {
        let now_ms = self.ctx.time.now_ms();
        let expired: Vec<TaskSpec> = {
            let mut state = self.ctx.state.borrow_mut();
            let mut expired = Vec::new();
            for queue in state.queues.values_mut() {
                // Deadlines are armed in arrival order, so the expired
                // entries form a prefix.
                while let Some(parked) = queue.wait_for_death_info.front() {
                    if parked.deadline_ms > now_ms {
                        break;
                    }
                    if let Some(parked) = queue.wait_for_death_info.pop_front() {
                        expired.push(parked.spec);
                    }
                }
            }
            expired
        };

        for spec in expired {
            warn!(
                task = %spec.task_id,
                actor = %spec.actor_id,
                "no death info arrived in time, failing task as unreachable"
            );
            fail_task(
                &self.ctx,
                &spec,
                TaskErrorKind::ActorUnreachable,
                None,
                None,
            );
        }
    }
}

/// Release the task's argument refs and hand the failure to bookkeeping.
/// Returns true when a retry was scheduled.
fn fail_task(
    ctx: &SubmitterCtx,
    spec: &TaskSpec,
    kind: TaskErrorKind,
    status: Option<&PushTaskError>,
    death_cause: Option<&DeathCause>,
) -> bool {
    ctx.reference_counter.release_task_args(spec);
    ctx.finisher
        .fail_or_retry_pending_task(spec.task_id, kind, status, death_cause)
}

/// Continuation run when a task's dependencies settle.
fn on_dependencies_resolved(
    ctx: &SubmitterCtx,
    actor_id: ActorId,
    seq: SequenceNo,
    outcome: ResolveOutcome,
) {
    enum Disposition {
        MaybeSend,
        FailDependencies(TaskSpec),
        FailDead(TaskSpec, DeathCause),
        Gone,
    }

    let disposition = {
        let mut state = ctx.state.borrow_mut();
        let Some(queue) = state.queues.get_mut(&actor_id) else {
            return;
        };
        match outcome {
            ResolveOutcome::Failed => match queue.submit_queue.remove(seq) {
                Some(spec) => Disposition::FailDependencies(spec),
                None => Disposition::Gone,
            },
            ResolveOutcome::Resolved => {
                if queue.lifecycle.is_dead() {
                    // The queue was swept while this task still waited on
                    // its arguments; it reaches the queue only to be failed.
                    match queue.submit_queue.remove(seq) {
                        Some(spec) => Disposition::FailDead(
                            spec,
                            queue
                                .lifecycle
                                .death_cause()
                                .cloned()
                                .unwrap_or(DeathCause::OutOfScope),
                        ),
                        None => Disposition::Gone,
                    }
                } else {
                    queue.submit_queue.mark_ready(seq);
                    Disposition::MaybeSend
                }
            }
        }
    };

    match disposition {
        Disposition::MaybeSend => send_ready_tasks(ctx, actor_id),
        Disposition::FailDependencies(spec) => {
            debug!(task = %spec.task_id, "dependency will never resolve");
            fail_task(
                ctx,
                &spec,
                TaskErrorKind::DependencyResolutionFailed,
                None,
                None,
            );
        }
        Disposition::FailDead(spec, cause) => {
            fail_task(ctx, &spec, TaskErrorKind::ActorDied, None, Some(&cause));
        }
        Disposition::Gone => {}
    }
}

/// Dispatch every currently dispatchable task for the actor.
fn send_ready_tasks(ctx: &SubmitterCtx, actor_id: ActorId) {
    let (client, batch, processed_up_to) = {
        let mut state = ctx.state.borrow_mut();
        let Some(queue) = state.queues.get_mut(&actor_id) else {
            return;
        };
        if !queue.lifecycle.is_running() {
            return;
        }
        let Some(client) = queue.client.clone() else {
            return;
        };
        let batch = queue.submit_queue.take_dispatchable();
        if batch.is_empty() {
            return;
        }
        let address = client.address().clone();
        for (seq, spec) in &batch {
            queue.inflight.insert(
                *seq,
                InflightEntry {
                    spec: spec.clone(),
                    address: address.clone(),
                },
            );
        }
        (client, batch, queue.acked_up_to)
    };

    for (seq, spec) in batch {
        debug!(actor = %actor_id, seq = %seq, task = %spec.task_id, "pushing actor task");
        let request = PushTaskRequest {
            task_spec: spec,
            sequence_number: seq.0,
            client_processed_up_to: processed_up_to,
            caller_timestamp_ms: ctx.instance_timestamp_ms,
        };
        let reply_ctx = ctx.clone();
        client.push_actor_task(
            request,
            /*skip_queue=*/ true,
            Box::new(move |result| handle_push_reply(&reply_ctx, actor_id, seq, result)),
        );
    }
}

/// Continuation run when a push reply (or its transport failure) arrives.
fn handle_push_reply(
    ctx: &SubmitterCtx,
    actor_id: ActorId,
    seq: SequenceNo,
    result: Result<PushTaskReply, PushTaskError>,
) {
    enum Disposition {
        Complete {
            entry: InflightEntry,
            reply: PushTaskReply,
        },
        Fail {
            spec: TaskSpec,
            kind: TaskErrorKind,
            status: PushTaskError,
        },
        Parked,
    }

    let disposition = {
        let mut state = ctx.state.borrow_mut();
        let Some(queue) = state.queues.get_mut(&actor_id) else {
            return;
        };
        // A dead queue cannot be observed past this guard: the death sweep
        // drains the in-flight map in the same turn it marks the state.
        let Some(entry) = queue.inflight.remove(&seq) else {
            // Already failed by a disconnect sweep; the late reply must not
            // reach bookkeeping a second time.
            debug!(actor = %actor_id, seq = %seq, "reply for task no longer in flight, suppressed");
            return;
        };

        match result {
            Ok(reply) => {
                queue.record_completed(seq);
                Disposition::Complete { entry, reply }
            }
            Err(status) => {
                if matches!(status, PushTaskError::Rejected(_)) {
                    // The receiver refused us as a stale caller; waiting
                    // for death info would not change that.
                    Disposition::Fail {
                        spec: entry.spec,
                        kind: TaskErrorKind::CallerStale,
                        status,
                    }
                } else if queue.fail_if_unreachable {
                    Disposition::Fail {
                        spec: entry.spec,
                        kind: TaskErrorKind::ActorUnreachable,
                        status,
                    }
                } else {
                    queue.wait_for_death_info.push_back(ParkedEntry {
                        deadline_ms: ctx.time.now_ms() + ctx.wait_for_death_info_timeout_ms,
                        spec: entry.spec,
                    });
                    Disposition::Parked
                }
            }
        }
    };

    match disposition {
        Disposition::Complete { entry, reply } => {
            let is_application_error = reply.is_application_error;
            ctx.reference_counter.release_task_args(&entry.spec);
            ctx.finisher.complete_pending_task(
                entry.spec.task_id,
                &reply,
                &entry.address,
                is_application_error,
            );
        }
        Disposition::Fail { spec, kind, status } => {
            debug!(
                actor = %actor_id,
                seq = %seq,
                error = %status,
                kind = %kind,
                "push failed"
            );
            fail_task(ctx, &spec, kind, Some(&status), None);
        }
        Disposition::Parked => {
            debug!(actor = %actor_id, seq = %seq, "push failed, waiting for death info");
        }
    }
}
