// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! RWSpinLock: compact spin-based multi-reader/single-writer lock.
//!
//! `state` is the reader count while `>= 0`, or `-1` while a writer holds
//! the lock. No fairness — a steady stream of readers can starve a writer.
//! Meant for short critical sections only.

use std::sync::atomic::{AtomicI64, Ordering};

/// Spin-based reader/writer lock. Guards nothing by itself — callers pair
/// `lock_read`/`unlock_read` or `lock_write`/`unlock_write` around the
/// section they protect, same as the hand-rolled original.
pub struct RwSpinLock {
    state: AtomicI64,
}

impl RwSpinLock {
    pub const fn new() -> Self {
        Self {
            state: AtomicI64::new(0),
        }
    }

    /// Spin until a read slot is available, then take it.
    pub fn lock_read(&self) {
        loop {
            let snapshot = self.state.load(Ordering::Acquire);
            if snapshot < 0 {
                std::hint::spin_loop();
                continue;
            }
            if self
                .state
                .compare_exchange_weak(
                    snapshot,
                    snapshot + 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return;
            }
        }
    }

    pub fn unlock_read(&self) {
        self.state.fetch_sub(1, Ordering::Release);
    }

    /// Spin until no readers or writer hold the lock, then take it.
    pub fn lock_write(&self) {
        loop {
            if self
                .state
                .compare_exchange_weak(0, -1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
            std::hint::spin_loop();
        }
    }

    pub fn unlock_write(&self) {
        self.state.fetch_add(1, Ordering::Release);
    }

    /// Run `f` while holding the read lock.
    pub fn with_read<R>(&self, f: impl FnOnce() -> R) -> R {
        self.lock_read();
        let result = f();
        self.unlock_read();
        result
    }

    /// Run `f` while holding the write lock.
    pub fn with_write<R>(&self, f: impl FnOnce() -> R) -> R {
        self.lock_write();
        let result = f();
        self.unlock_write();
        result
    }
}

impl Default for RwSpinLock {
    fn default() -> Self {
        Self::new()
    }
}
