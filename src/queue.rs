// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Unbounded blocking FIFO queue with close + cancel.
//!
//! `close` lets `take` drain whatever remains; `cancel` additionally
//! discards it. Both are idempotent and wake every blocked `take`.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

struct State<T> {
    buffer: VecDeque<T>,
    stopped: bool,
}

/// Unbounded FIFO queue. The executor's run queue is built on this.
pub struct UnboundedBlockingQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
}

impl<T> UnboundedBlockingQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                buffer: VecDeque::new(),
                stopped: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Push a value. Returns `false` (without enqueuing) once stopped.
    pub fn put(&self, value: T) -> bool {
        let mut guard = self.state.lock().unwrap();
        if guard.stopped {
            return false;
        }
        guard.buffer.push_back(value);
        drop(guard);
        self.not_empty.notify_one();
        true
    }

    /// Block until a value is available or the queue is stopped and
    /// empty, in which case this returns `None`.
    pub fn take(&self) -> Option<T> {
        let mut guard = self.state.lock().unwrap();
        guard = self
            .not_empty
            .wait_while(guard, |s| !s.stopped && s.buffer.is_empty())
            .unwrap();
        if guard.stopped && guard.buffer.is_empty() {
            return None;
        }
        guard.buffer.pop_front()
    }

    /// Stop accepting new values; existing buffer still drains via `take`.
    pub fn close(&self) {
        self.stop(false);
    }

    /// Stop accepting new values and discard whatever is buffered.
    pub fn cancel(&self) {
        self.stop(true);
    }

    fn stop(&self, clear: bool) {
        {
            let mut guard = self.state.lock().unwrap();
            guard.stopped = true;
            if clear {
                guard.buffer.clear();
            }
        }
        self.not_empty.notify_all();
    }
}

impl<T> Default for UnboundedBlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
