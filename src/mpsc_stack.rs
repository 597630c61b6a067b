// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lock-free multi-producer/single-consumer stack.
//!
//! `push` is safe from any number of concurrent threads. `pop` and
//! `dequeue_all` assume a single consumer — concurrent pops would need
//! hazard-pointer protection on the popped node (see [`crate::hazard`]),
//! which this type does not provide.

use std::sync::atomic::{AtomicPtr, Ordering};
use std::ptr;

struct Node<T> {
    next: *mut Node<T>,
    value: T,
}

/// Lock-free LIFO stack. Safe for any number of pushers; pops (and
/// `dequeue_all`) must come from a single consumer.
pub struct MpscStack<T> {
    head: AtomicPtr<Node<T>>,
}

unsafe impl<T: Send> Send for MpscStack<T> {}
unsafe impl<T: Send> Sync for MpscStack<T> {}

impl<T> MpscStack<T> {
    pub fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Push a value. Lock-free: any number of concurrent pushers is safe.
    pub fn push(&self, value: T) {
        let node = Box::into_raw(Box::new(Node {
            next: ptr::null_mut(),
            value,
        }));
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            unsafe {
                (*node).next = head;
            }
            match self.head.compare_exchange_weak(
                head,
                node,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => head = actual,
            }
        }
    }

    /// Pop the most recently pushed value. Single-consumer only.
    pub fn pop(&self) -> Option<T> {
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            if head.is_null() {
                return None;
            }
            let next = unsafe { (*head).next };
            match self
                .head
                .compare_exchange_weak(head, next, Ordering::Acquire, Ordering::Acquire)
            {
                Ok(_) => {
                    let node = unsafe { Box::from_raw(head) };
                    return Some(node.value);
                }
                Err(actual) => head = actual,
            }
        }
    }

    /// Drain every value currently on the stack, invoking `cb` with each
    /// (most-recently-pushed first), until empty.
    pub fn dequeue_all(&self, mut cb: impl FnMut(T)) {
        while let Some(value) = self.pop() {
            cb(value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }
}

impl<T> Default for MpscStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for MpscStack<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifo_single_threaded() {
        let s = MpscStack::new();
        s.push(1);
        s.push(2);
        s.push(3);
        assert_eq!(s.pop(), Some(3));
        assert_eq!(s.pop(), Some(2));
        assert_eq!(s.pop(), Some(1));
        assert_eq!(s.pop(), None);
    }

    #[test]
    fn dequeue_all_drains() {
        let s = MpscStack::new();
        for i in 0..5 {
            s.push(i);
        }
        let mut seen = Vec::new();
        s.dequeue_all(|v| seen.push(v));
        assert_eq!(seen, vec![4, 3, 2, 1, 0]);
        assert!(s.is_empty());
    }

    #[test]
    fn concurrent_pushers_single_consumer() {
        let s = MpscStack::new();
        crossbeam_utils::thread::scope(|scope| {
            for base in 0..8 {
                let s = &s;
                scope.spawn(move |_| {
                    for i in 0..100 {
                        s.push(base * 100 + i);
                    }
                });
            }
        })
        .unwrap();

        let mut seen = std::collections::HashSet::new();
        while let Some(v) = s.pop() {
            seen.insert(v);
        }
        assert_eq!(seen.len(), 800);
    }
}
