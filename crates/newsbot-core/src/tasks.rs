//! Time-ordered task queue driving the update loop.

use std::{cmp::Ordering, collections::BinaryHeap};

use chrono::{DateTime, Utc};

use crate::domain::ListKey;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Task {
    /// Refresh lists, reconcile channels, fetch, enqueue and drain.
    FullCycle,
    /// Resume a drain pass that stopped on a rate limit. Carries the list
    /// that hit the limit.
    DrainRetry(ListKey),
}

#[derive(Debug)]
struct Scheduled {
    at: DateTime<Utc>,
    seq: u64,
    task: Task,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behavior: earliest first, then insertion order.
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: BinaryHeap<Scheduled>,
    next_seq: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_at(&mut self, at: DateTime<Utc>, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled { at, seq, task });
    }

    /// Fire time of the earliest task.
    pub fn next_at(&self) -> Option<DateTime<Utc>> {
        self.heap.peek().map(|s| s.at)
    }

    /// Pop the earliest task if it is due at `now`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, Task)> {
        if self.heap.peek()?.at > now {
            return None;
        }
        self.heap.pop().map(|s| (s.at, s.task))
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Pending tasks in fire order.
    pub fn snapshot(&self) -> Vec<(DateTime<Utc>, Task)> {
        let mut all: Vec<&Scheduled> = self.heap.iter().collect();
        all.sort_by(|a, b| b.cmp(a));
        all.into_iter().map(|s| (s.at, s.task.clone())).collect()
    }
}
