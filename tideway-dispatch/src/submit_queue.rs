//! Per-actor submit queues.
//!
//! A submit queue holds tasks between submission and dispatch. Entries are
//! keyed by their send sequence, marked ready as dependencies resolve, and
//! popped by the submitter when the actor can accept them. The two
//! implementations differ only in *when* a ready task becomes
//! dispatchable:
//!
//! - [`SequentialSubmitQueue`]: a ready task is dispatchable only when
//!   every task before it (by sequence) has already been dispatched — the
//!   longest ready prefix pops, the rest park.
//! - [`OutOfOrderSubmitQueue`]: a task is dispatchable the moment its
//!   dependencies resolve; wire order is resolution order, though every
//!   request still carries its originally assigned sequence.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use tideway_core::TaskSpec;

/// Submitter-assigned, per-actor send sequence number.
///
/// Assigned at submission time in call order; used for wire ordering and
/// in-flight tracking. A retried task keeps its original sequence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct SequenceNo(pub u64);

impl SequenceNo {
    /// The next sequence.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for SequenceNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "seq({})", self.0)
    }
}

/// Buffer of submitted-but-not-yet-dispatched tasks for one actor.
pub trait SubmitQueue {
    /// Insert a task under its send sequence, initially waiting for
    /// dependencies.
    fn emplace(&mut self, seq: SequenceNo, spec: TaskSpec);

    /// Mark a task's dependencies as resolved. Returns false if the
    /// sequence is not queued (already dispatched or evicted).
    fn mark_ready(&mut self, seq: SequenceNo) -> bool;

    /// Evict a single task (dependency failure, death while waiting).
    fn remove(&mut self, seq: SequenceNo) -> Option<TaskSpec>;

    /// Pop every task that may be dispatched right now, in dispatch order.
    fn take_dispatchable(&mut self) -> Vec<(SequenceNo, TaskSpec)>;

    /// Drain the whole queue in sequence order, ready or not. Used by the
    /// lifecycle fail sweeps.
    fn drain_all(&mut self) -> Vec<(SequenceNo, TaskSpec)>;

    /// Lowest sequence still buffered.
    fn lowest_pending(&self) -> Option<SequenceNo>;

    /// Number of buffered tasks.
    fn len(&self) -> usize;

    /// Whether the queue is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct SequentialEntry {
    spec: TaskSpec,
    ready: bool,
}

/// Ordered-mode queue: dispatch order equals sequence order.
#[derive(Default)]
pub struct SequentialSubmitQueue {
    entries: BTreeMap<SequenceNo, SequentialEntry>,
}

impl SequentialSubmitQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SubmitQueue for SequentialSubmitQueue {
    fn emplace(&mut self, seq: SequenceNo, spec: TaskSpec) {
        self.entries
            .insert(seq, SequentialEntry { spec, ready: false });
    }

    fn mark_ready(&mut self, seq: SequenceNo) -> bool {
        match self.entries.get_mut(&seq) {
            Some(entry) => {
                entry.ready = true;
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, seq: SequenceNo) -> Option<TaskSpec> {
        self.entries.remove(&seq).map(|entry| entry.spec)
    }

    fn take_dispatchable(&mut self) -> Vec<(SequenceNo, TaskSpec)> {
        let mut out = Vec::new();
        loop {
            match self.entries.first_key_value() {
                Some((_, entry)) if entry.ready => {
                    if let Some((seq, entry)) = self.entries.pop_first() {
                        out.push((seq, entry.spec));
                    }
                }
                _ => break,
            }
        }
        out
    }

    fn drain_all(&mut self) -> Vec<(SequenceNo, TaskSpec)> {
        std::mem::take(&mut self.entries)
            .into_iter()
            .map(|(seq, entry)| (seq, entry.spec))
            .collect()
    }

    fn lowest_pending(&self) -> Option<SequenceNo> {
        self.entries.keys().next().copied()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Out-of-order queue: dispatch order equals dependency-resolution order.
#[derive(Default)]
pub struct OutOfOrderSubmitQueue {
    waiting: BTreeMap<SequenceNo, TaskSpec>,
    ready: VecDeque<(SequenceNo, TaskSpec)>,
}

impl OutOfOrderSubmitQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SubmitQueue for OutOfOrderSubmitQueue {
    fn emplace(&mut self, seq: SequenceNo, spec: TaskSpec) {
        self.waiting.insert(seq, spec);
    }

    fn mark_ready(&mut self, seq: SequenceNo) -> bool {
        match self.waiting.remove(&seq) {
            Some(spec) => {
                self.ready.push_back((seq, spec));
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, seq: SequenceNo) -> Option<TaskSpec> {
        if let Some(spec) = self.waiting.remove(&seq) {
            return Some(spec);
        }
        let pos = self.ready.iter().position(|(s, _)| *s == seq)?;
        self.ready.remove(pos).map(|(_, spec)| spec)
    }

    fn take_dispatchable(&mut self) -> Vec<(SequenceNo, TaskSpec)> {
        self.ready.drain(..).collect()
    }

    fn drain_all(&mut self) -> Vec<(SequenceNo, TaskSpec)> {
        let mut out: Vec<(SequenceNo, TaskSpec)> = std::mem::take(&mut self.waiting)
            .into_iter()
            .chain(self.ready.drain(..))
            .collect();
        out.sort_by_key(|(seq, _)| *seq);
        out
    }

    fn lowest_pending(&self) -> Option<SequenceNo> {
        let lowest_waiting = self.waiting.keys().next().copied();
        let lowest_ready = self.ready.iter().map(|(seq, _)| *seq).min();
        match (lowest_waiting, lowest_ready) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn len(&self) -> usize {
        self.waiting.len() + self.ready.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tideway_core::{ActorId, TaskId, WorkerId};

    fn make_spec(counter: u64) -> TaskSpec {
        TaskSpec {
            task_id: TaskId::new(1, counter),
            caller_id: TaskId::nil(),
            caller_worker_id: WorkerId::new(2, 2),
            actor_id: ActorId::new(3, 3),
            actor_counter: counter,
            args: vec![],
            num_returns: 0,
        }
    }

    fn seqs(batch: &[(SequenceNo, TaskSpec)]) -> Vec<u64> {
        batch.iter().map(|(seq, _)| seq.0).collect()
    }

    // -------------------------------------------------------------------
    // Sequential queue
    // -------------------------------------------------------------------

    #[test]
    fn test_sequential_head_gates_dispatch() {
        let mut queue = SequentialSubmitQueue::new();
        queue.emplace(SequenceNo(0), make_spec(0));
        queue.emplace(SequenceNo(1), make_spec(1));

        // Tail resolves first: nothing may go out.
        assert!(queue.mark_ready(SequenceNo(1)));
        assert!(queue.take_dispatchable().is_empty());

        // Head resolves: both pop, in sequence order.
        assert!(queue.mark_ready(SequenceNo(0)));
        assert_eq!(seqs(&queue.take_dispatchable()), vec![0, 1]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_sequential_ready_prefix_only() {
        let mut queue = SequentialSubmitQueue::new();
        for i in 0..4 {
            queue.emplace(SequenceNo(i), make_spec(i));
        }
        queue.mark_ready(SequenceNo(0));
        queue.mark_ready(SequenceNo(1));
        queue.mark_ready(SequenceNo(3));

        assert_eq!(seqs(&queue.take_dispatchable()), vec![0, 1]);
        // seq 3 stays parked behind unready seq 2.
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.lowest_pending(), Some(SequenceNo(2)));
    }

    #[test]
    fn test_sequential_mark_ready_unknown() {
        let mut queue = SequentialSubmitQueue::new();
        assert!(!queue.mark_ready(SequenceNo(9)));
    }

    #[test]
    fn test_sequential_remove_and_drain() {
        let mut queue = SequentialSubmitQueue::new();
        queue.emplace(SequenceNo(0), make_spec(0));
        queue.emplace(SequenceNo(1), make_spec(1));

        let removed = queue.remove(SequenceNo(0)).expect("queued");
        assert_eq!(removed.actor_counter, 0);

        let drained = queue.drain_all();
        assert_eq!(seqs(&drained), vec![1]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_sequential_resubmission_at_lower_sequence() {
        // A retried task re-enters under its original sequence and becomes
        // the new head.
        let mut queue = SequentialSubmitQueue::new();
        queue.emplace(SequenceNo(5), make_spec(5));
        queue.emplace(SequenceNo(1), make_spec(1));
        queue.mark_ready(SequenceNo(1));

        assert_eq!(seqs(&queue.take_dispatchable()), vec![1]);
        assert_eq!(queue.lowest_pending(), Some(SequenceNo(5)));
    }

    // -------------------------------------------------------------------
    // Out-of-order queue
    // -------------------------------------------------------------------

    #[test]
    fn test_out_of_order_dispatches_in_resolution_order() {
        let mut queue = OutOfOrderSubmitQueue::new();
        queue.emplace(SequenceNo(0), make_spec(0));
        queue.emplace(SequenceNo(1), make_spec(1));

        assert!(queue.mark_ready(SequenceNo(1)));
        assert_eq!(seqs(&queue.take_dispatchable()), vec![1]);

        assert!(queue.mark_ready(SequenceNo(0)));
        assert_eq!(seqs(&queue.take_dispatchable()), vec![0]);
    }

    #[test]
    fn test_out_of_order_remove_from_either_side() {
        let mut queue = OutOfOrderSubmitQueue::new();
        queue.emplace(SequenceNo(0), make_spec(0));
        queue.emplace(SequenceNo(1), make_spec(1));
        queue.mark_ready(SequenceNo(1));

        assert!(queue.remove(SequenceNo(0)).is_some()); // from waiting
        assert!(queue.remove(SequenceNo(1)).is_some()); // from ready
        assert!(queue.remove(SequenceNo(2)).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_out_of_order_drain_is_sequence_sorted() {
        let mut queue = OutOfOrderSubmitQueue::new();
        queue.emplace(SequenceNo(2), make_spec(2));
        queue.emplace(SequenceNo(0), make_spec(0));
        queue.emplace(SequenceNo(1), make_spec(1));
        queue.mark_ready(SequenceNo(2));

        assert_eq!(seqs(&queue.drain_all()), vec![0, 1, 2]);
    }

    #[test]
    fn test_out_of_order_lowest_pending_spans_both() {
        let mut queue = OutOfOrderSubmitQueue::new();
        queue.emplace(SequenceNo(3), make_spec(3));
        queue.emplace(SequenceNo(1), make_spec(1));
        queue.mark_ready(SequenceNo(1));

        assert_eq!(queue.lowest_pending(), Some(SequenceNo(1)));
        queue.take_dispatchable();
        assert_eq!(queue.lowest_pending(), Some(SequenceNo(3)));
    }
}
