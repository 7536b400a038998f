//! Shared fixtures for the dispatch integration suites.
//!
//! The recording fakes mirror the collaborator boundaries one-to-one: the
//! worker client captures requests and hands the test their reply
//! callbacks, the finisher logs every completion and failure, and the
//! reference counter just counts. Scenarios drive the event loop by hand
//! through [`Fixture::check_submit`] — one posted continuation per
//! submission is part of the submitter's contract, so the helper polls
//! exactly once.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::net::{IpAddr, Ipv4Addr};
use std::rc::Rc;

use tideway_core::{
    ActorId, ObjectId, PushTaskReply, PushTaskRequest, TaskArg, TaskId, TaskSpec, WorkerAddress,
    WorkerId,
};
use tideway_dispatch::{
    ActorTaskSubmitter, ClientPool, DeathCause, EventLoop, InMemoryObjectStore, ManualTimeSource,
    PushTaskCallback, PushTaskError, ReferenceCounter, SubmitterConfig, TaskErrorKind,
    TaskFinisher, WorkerClient,
};

/// Fixed birth timestamp of the caller instance under test.
pub const CALLER_BIRTH_MS: i64 = 1_000_000;

/// Install the test logger; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

pub fn make_addr(worker: WorkerId, port: u16) -> WorkerAddress {
    WorkerAddress::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), port, worker)
}

pub fn make_task(actor: ActorId, caller_worker: WorkerId, counter: u64) -> TaskSpec {
    TaskSpec {
        task_id: TaskId::random(),
        caller_id: TaskId::nil(),
        caller_worker_id: caller_worker,
        actor_id: actor,
        actor_counter: counter,
        args: vec![],
        num_returns: 0,
    }
}

pub fn make_task_with_dep(
    actor: ActorId,
    caller_worker: WorkerId,
    counter: u64,
    dep: ObjectId,
) -> TaskSpec {
    let mut spec = make_task(actor, caller_worker, counter);
    spec.args.push(TaskArg::ObjectRef(dep));
    spec
}

/// Worker client that records every request and parks the reply callbacks
/// for the test to answer.
pub struct RecordingWorkerClient {
    address: WorkerAddress,
    callbacks: RefCell<Vec<PushTaskCallback>>,
    received_seq_nos: RefCell<Vec<u64>>,
    processed_up_to_log: RefCell<Vec<i64>>,
}

impl RecordingWorkerClient {
    pub fn new(address: WorkerAddress) -> Self {
        Self {
            address,
            callbacks: RefCell::new(Vec::new()),
            received_seq_nos: RefCell::new(Vec::new()),
            processed_up_to_log: RefCell::new(Vec::new()),
        }
    }

    /// Number of requests still awaiting a reply.
    pub fn pending_replies(&self) -> usize {
        self.callbacks.borrow().len()
    }

    /// Wire history: one sequence number per pushed request.
    pub fn seq_nos(&self) -> Vec<u64> {
        self.received_seq_nos.borrow().clone()
    }

    /// Wire history: `client_processed_up_to` of each pushed request.
    pub fn processed_up_to_log(&self) -> Vec<i64> {
        self.processed_up_to_log.borrow().clone()
    }

    /// Answer the pending request at `index`. Returns false if there is no
    /// such request.
    pub fn reply_push_task(
        &self,
        index: usize,
        result: Result<PushTaskReply, PushTaskError>,
    ) -> bool {
        let callback = {
            let mut callbacks = self.callbacks.borrow_mut();
            if index >= callbacks.len() {
                return false;
            }
            callbacks.remove(index)
        };
        callback(result);
        true
    }

    pub fn reply_ok(&self) -> bool {
        self.reply_ok_at(0)
    }

    pub fn reply_ok_at(&self, index: usize) -> bool {
        self.reply_push_task(index, Ok(PushTaskReply::default()))
    }

    pub fn reply_io_error(&self) -> bool {
        self.reply_io_error_at(0)
    }

    pub fn reply_io_error_at(&self, index: usize) -> bool {
        self.reply_push_task(index, Err(PushTaskError::Io("connection reset".to_string())))
    }
}

impl WorkerClient for RecordingWorkerClient {
    fn address(&self) -> &WorkerAddress {
        &self.address
    }

    fn push_actor_task(
        &self,
        request: PushTaskRequest,
        _skip_queue: bool,
        on_reply: PushTaskCallback,
    ) {
        self.received_seq_nos
            .borrow_mut()
            .push(request.sequence_number);
        self.processed_up_to_log
            .borrow_mut()
            .push(request.client_processed_up_to);
        self.callbacks.borrow_mut().push(on_reply);
    }
}

/// One failure delivered to the bookkeeping fake.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub task_id: TaskId,
    pub kind: TaskErrorKind,
    pub had_status: bool,
    pub death_cause: Option<DeathCause>,
}

/// Bookkeeping fake logging every completion and failure.
#[derive(Default)]
pub struct RecordingFinisher {
    completed: RefCell<Vec<TaskId>>,
    failures: RefCell<Vec<FailureRecord>>,
    /// Value `fail_or_retry_pending_task` reports back (retry scheduled?).
    pub retry_on_failure: Cell<bool>,
}

impl RecordingFinisher {
    pub fn completed(&self) -> Vec<TaskId> {
        self.completed.borrow().clone()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.borrow().len()
    }

    pub fn failures(&self) -> Vec<FailureRecord> {
        self.failures.borrow().clone()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.borrow().len()
    }

    pub fn failed_task_ids(&self) -> Vec<TaskId> {
        self.failures
            .borrow()
            .iter()
            .map(|record| record.task_id)
            .collect()
    }
}

impl TaskFinisher for RecordingFinisher {
    fn complete_pending_task(
        &self,
        task_id: TaskId,
        _reply: &PushTaskReply,
        _actor_address: &WorkerAddress,
        _is_application_error: bool,
    ) {
        self.completed.borrow_mut().push(task_id);
    }

    fn fail_or_retry_pending_task(
        &self,
        task_id: TaskId,
        error: TaskErrorKind,
        status: Option<&PushTaskError>,
        death_cause: Option<&DeathCause>,
    ) -> bool {
        self.failures.borrow_mut().push(FailureRecord {
            task_id,
            kind: error,
            had_status: status.is_some(),
            death_cause: death_cause.cloned(),
        });
        self.retry_on_failure.get()
    }
}

/// Reference-counter fake: retained and released argument sets must balance
/// once every submitted task reaches a terminal state.
#[derive(Default)]
pub struct CountingReferenceCounter {
    retained: Cell<usize>,
    released: Cell<usize>,
}

impl CountingReferenceCounter {
    pub fn retained(&self) -> usize {
        self.retained.get()
    }

    pub fn released(&self) -> usize {
        self.released.get()
    }

    pub fn balanced(&self) -> bool {
        self.retained.get() == self.released.get()
    }
}

impl ReferenceCounter for CountingReferenceCounter {
    fn retain_task_args(&self, _spec: &TaskSpec) {
        self.retained.set(self.retained.get() + 1);
    }

    fn release_task_args(&self, _spec: &TaskSpec) {
        self.released.set(self.released.get() + 1);
    }
}

/// A submitter wired to recording fakes, one shared worker client, and a
/// hand-driven clock.
pub struct Fixture {
    pub event_loop: Rc<EventLoop>,
    pub store: Rc<InMemoryObjectStore>,
    pub finisher: Rc<RecordingFinisher>,
    pub refs: Rc<CountingReferenceCounter>,
    pub worker_client: Rc<RecordingWorkerClient>,
    pub clients_connected: Rc<Cell<usize>>,
    pub last_queue_warning: Rc<Cell<u64>>,
    pub time: Rc<ManualTimeSource>,
    pub submitter: ActorTaskSubmitter,
}

pub fn make_fixture() -> Fixture {
    let event_loop = Rc::new(EventLoop::new());
    let store = Rc::new(InMemoryObjectStore::new(event_loop.clone()));
    let finisher = Rc::new(RecordingFinisher::default());
    let refs = Rc::new(CountingReferenceCounter::default());
    let worker_client = Rc::new(RecordingWorkerClient::new(make_addr(WorkerId::nil(), 0)));
    let clients_connected = Rc::new(Cell::new(0));
    let last_queue_warning = Rc::new(Cell::new(0u64));
    let time = Rc::new(ManualTimeSource::new(CALLER_BIRTH_MS));

    // Like the transport's real pool, but every address resolves to the one
    // recording client; the counter observes factory invocations.
    let pool = {
        let client = worker_client.clone();
        let connects = clients_connected.clone();
        Rc::new(ClientPool::new(Box::new(move |_address| {
            connects.set(connects.get() + 1);
            let client: Rc<dyn WorkerClient> = client.clone();
            client
        })))
    };

    let warning = {
        let last = last_queue_warning.clone();
        Box::new(move |_actor: ActorId, count: u64| last.set(count))
    };

    let submitter = ActorTaskSubmitter::new(
        pool,
        store.clone(),
        finisher.clone(),
        refs.clone(),
        warning,
        event_loop.clone(),
        time.clone(),
        SubmitterConfig {
            instance_timestamp_ms: Some(CALLER_BIRTH_MS),
            ..SubmitterConfig::default()
        },
    );

    Fixture {
        event_loop,
        store,
        finisher,
        refs,
        worker_client,
        clients_connected,
        last_queue_warning,
        time,
        submitter,
    }
}

impl Fixture {
    /// Register a queue with the scenario defaults: unbounded, fail-fast
    /// on unreachable, not owned.
    pub fn add_queue(&self, actor: ActorId, out_of_order: bool) {
        self.submitter
            .add_actor_queue_if_not_exists(actor, None, out_of_order, true, false);
    }

    /// Submit and run the one continuation a live submission posts.
    /// Returns false when nothing was posted (submission to a dead actor).
    pub fn check_submit(&self, spec: TaskSpec) -> bool {
        assert!(self.submitter.submit_task(spec).is_ok());
        self.event_loop.poll_one()
    }
}
