//! Deadline-ordered timer queue backing `PluginHost::timeout_add`/
//! `timeout_cancel` and the reactor's own internal timers (watchdogs,
//! ping ticks, ALRM rearm). Cancellation is lazy — a cancelled entry stays
//! in the heap and is skipped when popped — since `BinaryHeap` has no
//! efficient arbitrary-removal operation and timers are cancelled far less
//! often than they fire.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use ucollect_plugin::TimerId;

struct Entry {
    when: u64,
    seq: u64,
    id: TimerId,
    data: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.seq == other.seq
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    /// Reversed so the `BinaryHeap` (a max-heap) pops the earliest
    /// deadline first; ties broken by insertion order.
    fn cmp(&self, other: &Self) -> Ordering {
        other.when.cmp(&self.when).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A deadline-ordered queue of `(TimerId, data)` entries, sorted by `when`
/// (milliseconds on whatever clock the caller uses — the reactor feeds in
/// its own monotonic `now()`).
pub struct TimerHeap {
    heap: BinaryHeap<Entry>,
    cancelled: HashSet<u64>,
    next_id: u64,
    next_seq: u64,
}

impl TimerHeap {
    pub fn new() -> Self {
        TimerHeap {
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            next_id: 1,
            next_seq: 0,
        }
    }

    pub fn add(&mut self, when: u64, data: u64) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { when, seq, id, data });
        id
    }

    pub fn cancel(&mut self, id: TimerId) {
        self.cancelled.insert(id.0);
    }

    /// Earliest non-cancelled deadline, without popping it.
    pub fn next_deadline(&mut self) -> Option<u64> {
        self.drop_cancelled();
        self.heap.peek().map(|e| e.when)
    }

    /// Pop and return every entry due at or before `now`, in deadline
    /// order (earliest first).
    pub fn pop_due(&mut self, now: u64) -> Vec<(TimerId, u64)> {
        let mut due = Vec::new();
        loop {
            self.drop_cancelled();
            match self.heap.peek() {
                Some(entry) if entry.when <= now => {
                    let entry = self.heap.pop().unwrap();
                    due.push((entry.id, entry.data));
                }
                _ => break,
            }
        }
        due
    }

    pub fn is_empty(&mut self) -> bool {
        self.drop_cancelled();
        self.heap.is_empty()
    }

    pub fn len(&mut self) -> usize {
        self.drop_cancelled();
        self.heap.len()
    }

    fn drop_cancelled(&mut self) {
        while let Some(entry) = self.heap.peek() {
            if self.cancelled.remove(&entry.id.0) {
                self.heap.pop();
            } else {
                break;
            }
        }
    }
}

impl Default for TimerHeap {
    fn default() -> Self {
        Self::new()
    }
}
