// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Blocking reader-writer lock running a caller closure.
//!
//! Unlike `std::sync::RwLock`, this holds the exclusive mutex for the
//! whole duration of a writer's wait, so writers are never starved by a
//! steady stream of readers — readers only hold the mutex long enough to
//! bump/drop a counter, not for the duration of their closure.

use std::sync::{Condvar, Mutex};

struct State {
    readers: u32,
}

/// Closure-based blocking RWLock. `read` runs concurrently with other
/// readers; `write` is exclusive and holds the mutex while `f` runs.
pub struct RwLock {
    state: Mutex<State>,
    no_readers: Condvar,
}

impl RwLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State { readers: 0 }),
            no_readers: Condvar::new(),
        }
    }

    /// Run `f` with shared read access. `f`'s panic is propagated after
    /// the reader count is still decremented on the way out.
    pub fn read<R>(&self, f: impl FnOnce() -> R) -> R {
        {
            let mut guard = self.state.lock().unwrap();
            guard.readers += 1;
        }

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        self.end_read();

        match result {
            Ok(r) => r,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    fn end_read(&self) {
        let mut guard = self.state.lock().unwrap();
        guard.readers -= 1;
        if guard.readers == 0 {
            self.no_readers.notify_one();
        }
    }

    /// Run `f` with exclusive access. Blocks until all in-flight readers
    /// have finished, then holds the mutex for the duration of `f`.
    pub fn write<R>(&self, f: impl FnOnce() -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        guard = self
            .no_readers
            .wait_while(guard, |s| s.readers > 0)
            .unwrap();

        let result = f();
        self.no_readers.notify_one();
        drop(guard);
        result
    }
}

impl Default for RwLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn write_then_read() {
        let lock = RwLock::new();
        let value = std::sync::Mutex::new(0);
        lock.write(|| *value.lock().unwrap() = 42);
        let seen = lock.read(|| *value.lock().unwrap());
        assert_eq!(seen, 42);
    }

    #[test]
    fn concurrent_readers_allowed() {
        let lock = Arc::new(RwLock::new());
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..8 {
            let lock = lock.clone();
            let concurrent = concurrent.clone();
            let max_concurrent = max_concurrent.clone();
            handles.push(std::thread::spawn(move || {
                lock.read(|| {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    max_concurrent.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(5));
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                });
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(max_concurrent.load(Ordering::SeqCst) > 1);
    }

    #[test]
    fn reader_panic_still_releases() {
        let lock = RwLock::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            lock.read(|| panic!("boom"))
        }));
        assert!(result.is_err());
        // Lock must not be stuck — a writer can still proceed.
        lock.write(|| {});
    }

    #[test]
    fn writer_waits_for_readers() {
        let lock = Arc::new(RwLock::new());
        let value = Arc::new(std::sync::atomic::AtomicI64::new(0));

        let lock2 = lock.clone();
        let value2 = value.clone();
        let reader = std::thread::spawn(move || {
            lock2.read(|| {
                std::thread::sleep(std::time::Duration::from_millis(20));
                assert_eq!(value2.load(Ordering::SeqCst), 0);
            });
        });

        std::thread::sleep(std::time::Duration::from_millis(5));
        lock.write(|| value.store(1, Ordering::SeqCst));
        reader.join().unwrap();
    }
}
