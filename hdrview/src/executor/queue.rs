//! Ready queue of the worker pool.
//!
//! A binary heap keyed by `(priority, ticket)`. The ticket is a per-queue
//! counter stamped at push time, so two units with equal priority leave in
//! the order they arrived.

use super::policy::Priority;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A type-erased unit of work.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// A unit waiting in the queue.
pub(crate) struct QueuedTask {
    job: Job,
    pub priority: Priority,
    ticket: u64,
}

impl QueuedTask {
    /// Runs the unit on the current thread.
    pub fn run(self) {
        (self.job)()
    }
}

impl std::fmt::Debug for QueuedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "QueuedTask({} #{})", self.priority, self.ticket)
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: the smallest (priority, ticket) pair must compare greatest.
        (other.priority, other.ticket).cmp(&(self.priority, self.ticket))
    }
}

/// Units ordered by ascending priority, FIFO among equals.
///
/// Not synchronized; the pool keeps it behind its state mutex.
#[derive(Default)]
pub(crate) struct PriorityQueue {
    heap: BinaryHeap<QueuedTask>,
    next_ticket: u64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `job` behind every unit of equal or more urgent priority.
    pub fn push(&mut self, priority: Priority, job: Job) {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.heap.push(QueuedTask {
            job,
            priority,
            ticket,
        });
    }

    /// Takes the most urgent unit.
    pub fn pop(&mut self) -> Option<QueuedTask> {
        self.heap.pop()
    }

    /// Takes the most urgent unit if it runs no later than `bound`.
    pub fn pop_at_most(&mut self, bound: Priority) -> Option<QueuedTask> {
        if self.heap.peek()?.priority <= bound {
            self.heap.pop()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl std::fmt::Debug for PriorityQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("len", &self.heap.len())
            .field("pushed", &self.next_ticket)
            .finish()
    }
}
