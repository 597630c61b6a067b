// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lock-free bounded multi-producer/multi-consumer ring queue.
//!
//! Dmitry Vyukov's bounded MPMC queue. Each cell carries a generation
//! counter that encodes whose turn it is (producer or consumer), which is
//! what lets `head`/`tail` wrap around without an ABA hazard. Progress is
//! lock-free, not wait-free: a stalled producer can make others spin, but
//! can never deadlock them.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Cell<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    generation: AtomicUsize,
}

/// Error returned when a requested capacity is not a power of two — the
/// ring relies on masked indexing (`cursor & (capacity - 1)`), which only
/// partitions the index space correctly for power-of-two sizes. Rejected
/// at construction instead of silently corrupting the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("MPMC queue capacity must be a power of two, got {0}")]
pub struct CapacityError(pub usize);

/// Bounded, lock-free, multi-producer/multi-consumer queue.
pub struct MpmcBoundedQueue<T> {
    buffer: Box<[Cell<T>]>,
    mask: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
}

// Safety: access to each cell's value is serialized by the generation
// handshake between enqueue and dequeue — only one side ever touches a
// given cell's UnsafeCell at a time.
unsafe impl<T: Send> Send for MpmcBoundedQueue<T> {}
unsafe impl<T: Send> Sync for MpmcBoundedQueue<T> {}

impl<T> MpmcBoundedQueue<T> {
    /// Create a queue of the given capacity, which must be a power of two.
    pub fn new(capacity: usize) -> Result<Self, CapacityError> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(CapacityError(capacity));
        }
        let buffer = (0..capacity)
            .map(|i| Cell {
                value: UnsafeCell::new(MaybeUninit::uninit()),
                generation: AtomicUsize::new(i),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            buffer,
            mask: capacity - 1,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        })
    }

    /// Attempt to enqueue `value`. Returns `Err(value)` if the queue is
    /// momentarily full.
    pub fn enqueue(&self, value: T) -> Result<(), T> {
        let mut pos = self.head.load(Ordering::Relaxed);
        loop {
            let cell = &self.buffer[pos & self.mask];
            let generation = cell.generation.load(Ordering::Acquire);
            let diff = generation as isize - pos as isize;

            if diff == 0 {
                if self
                    .head
                    .compare_exchange_weak(
                        pos,
                        pos + 1,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    unsafe {
                        (*cell.value.get()).write(value);
                    }
                    cell.generation.store(pos + 1, Ordering::Release);
                    return Ok(());
                }
            } else if diff < 0 {
                return Err(value);
            } else {
                pos = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Attempt to dequeue a value. Returns `None` if the queue is
    /// momentarily empty.
    pub fn dequeue(&self) -> Option<T> {
        let mut pos = self.tail.load(Ordering::Relaxed);
        loop {
            let cell = &self.buffer[pos & self.mask];
            let generation = cell.generation.load(Ordering::Acquire);
            let diff = generation as isize - (pos as isize + 1);

            if diff == 0 {
                if self
                    .tail
                    .compare_exchange_weak(
                        pos,
                        pos + 1,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    let value = unsafe { (*cell.value.get()).assume_init_read() };
                    cell.generation
                        .store(pos + self.buffer.len(), Ordering::Release);
                    return Some(value);
                }
            } else if diff < 0 {
                return None;
            } else {
                pos = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}

impl<T> Drop for MpmcBoundedQueue<T> {
    fn drop(&mut self) {
        while self.dequeue().is_some() {}
    }
}
