// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Clock abstraction. Deadline comparisons use `>=`.
//!
//! `Task` deadlines and `TimerQueue` both need a time source. Abstracting
//! it behind a trait lets deadline-gated tests run deterministically
//! instead of sleeping.

use std::time::SystemTime;

/// A time source compatible with `Task` deadlines and `TimerQueue` entries.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// The real wall clock (`SystemTime::now`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}
