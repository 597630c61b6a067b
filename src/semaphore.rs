// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! FIFO counting semaphore with a custom decrement hook.
//!
//! Waiters are served in ticket order: a thread that calls `enter` while
//! the count is zero takes a ticket and blocks until both the count is
//! positive and it is its turn.

use std::sync::{Condvar, Mutex};

struct State {
    count: i64,
    /// Next ticket to hand out.
    order: u64,
    /// Next ticket allowed to proceed.
    turn: u64,
}

/// A counting semaphore that wakes waiters strictly in request order.
pub struct Semaphore {
    state: Mutex<State>,
    cv: Condvar,
}

impl Semaphore {
    pub fn new(count: i64) -> Self {
        Self {
            state: Mutex::new(State {
                count,
                order: 0,
                turn: 0,
            }),
            cv: Condvar::new(),
        }
    }

    /// Acquire a permit, running `callback` with exclusive access to the
    /// count once it is this caller's turn. The default `enter` decrements
    /// by one; callers needing a different decrement supply their own hook.
    pub fn enter_with<R>(&self, callback: impl FnOnce(&mut i64) -> R) -> R {
        let mut guard = self.state.lock().unwrap();

        if guard.count > 0 {
            return callback(&mut guard.count);
        }

        let ticket = guard.order;
        guard.order += 1;

        guard = self
            .cv
            .wait_while(guard, |s| !(s.count > 0 && ticket == s.turn))
            .unwrap();

        guard.turn += 1;
        callback(&mut guard.count)
    }

    /// Acquire a permit, decrementing the count by one.
    pub fn enter(&self) {
        self.enter_with(|count| *count -= 1);
    }

    /// Release a permit, waking any waiter whose turn has arrived.
    pub fn leave(&self) {
        {
            let mut guard = self.state.lock().unwrap();
            guard.count += 1;
        }
        self.cv.notify_all();
    }
}
