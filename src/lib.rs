// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Concurrency primitives and a dependency-aware task executor.
//!
//! Components, leaves first:
//! - [`spinlock`], [`semaphore`], [`rwlock`] — compact single-purpose locks.
//! - [`channel`], [`queue`], [`mpmc`], [`mpsc_stack`] — message passing,
//!   blocking and lock-free.
//! - [`hazard`] — safe deferred reclamation for the lock-free structures.
//! - [`hashmap`] — a striped, bucket-chained concurrent map.
//! - [`timer_queue`] — a min-heap of timed items with timed blocking pop.
//! - [`task`], [`future`], [`executor`] — a worker-pool scheduler whose
//!   tasks carry dependency graphs, OR-set triggers, and deadlines.

pub mod clock;
pub mod error;

pub mod spinlock;
pub mod semaphore;
pub mod rwlock;

pub mod channel;
pub mod queue;
pub mod mpmc;
pub mod mpsc_stack;
pub mod hazard;
pub mod hashmap;
pub mod timer_queue;

pub mod task;
pub mod future;
pub mod executor;

pub use clock::{Clock, SystemClock};
pub use executor::Executor;
pub use future::Future;
pub use task::{Task, TaskHandle};
