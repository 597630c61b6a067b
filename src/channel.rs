// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Bounded and rendezvous channels with close semantics.
//!
//! Close vs. drop: `close` is called explicitly (there is no receiver-count
//! tracking); it is idempotent. A closed `BufferedChannel` still drains
//! whatever was buffered before a drained `recv` finally returns `None`. A
//! closed `UnbufferedChannel` abandons any send that hasn't yet handed its
//! value to a waiting receiver.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::error::ClosedError;

struct BufferedState<T> {
    buffer: VecDeque<T>,
    closed: bool,
}

/// A bounded FIFO channel of capacity `N`.
pub struct BufferedChannel<T> {
    capacity: usize,
    state: Mutex<BufferedState<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> BufferedChannel<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(BufferedState {
                buffer: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Block until there is room, then push `value`. Fails if the channel
    /// is closed, either before or while waiting for room.
    pub fn send(&self, value: T) -> Result<(), ClosedError> {
        let mut guard = self.state.lock().unwrap();
        if guard.closed {
            return Err(ClosedError);
        }
        guard = self
            .not_full
            .wait_while(guard, |s| !s.closed && s.buffer.len() >= self.capacity)
            .unwrap();
        if guard.closed {
            return Err(ClosedError);
        }
        guard.buffer.push_back(value);
        drop(guard);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Block until a value is available or the channel is closed and
    /// drained. Returns `None` only once closed with nothing left.
    pub fn recv(&self) -> Option<T> {
        let mut guard = self.state.lock().unwrap();
        guard = self
            .not_empty
            .wait_while(guard, |s| !s.closed && s.buffer.is_empty())
            .unwrap();
        let value = guard.buffer.pop_front();
        drop(guard);
        self.not_full.notify_one();
        value
    }

    /// Forbid further sends; buffered values still drain via `recv`.
    pub fn close(&self) {
        {
            let mut guard = self.state.lock().unwrap();
            guard.closed = true;
        }
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }
}

struct UnbufferedState<T> {
    value: Option<T>,
    has_receiver: bool,
    closed: bool,
}

/// A single-slot rendezvous channel: `send` blocks until a receiver is
/// waiting and the slot is empty, `recv` blocks until a value lands.
pub struct UnbufferedChannel<T> {
    state: Mutex<UnbufferedState<T>>,
    send_ready: Condvar,
    recv_ready: Condvar,
}

impl<T> UnbufferedChannel<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(UnbufferedState {
                value: None,
                has_receiver: false,
                closed: false,
            }),
            send_ready: Condvar::new(),
            recv_ready: Condvar::new(),
        }
    }

    pub fn send(&self, value: T) -> Result<(), ClosedError> {
        let mut guard = self.state.lock().unwrap();
        guard = self
            .send_ready
            .wait_while(guard, |s| !s.closed && !(s.has_receiver && s.value.is_none()))
            .unwrap();
        if guard.closed {
            return Err(ClosedError);
        }
        guard.value = Some(value);
        drop(guard);
        self.recv_ready.notify_one();
        Ok(())
    }

    pub fn recv(&self) -> Option<T> {
        let mut guard = self.state.lock().unwrap();
        guard.has_receiver = true;
        drop(guard);
        self.send_ready.notify_one();

        let mut guard = self.state.lock().unwrap();
        guard = self
            .recv_ready
            .wait_while(guard, |s| !(s.closed && s.value.is_none()) && s.value.is_none())
            .unwrap();

        if guard.closed && guard.value.is_none() {
            guard.has_receiver = false;
            return None;
        }
        let value = guard.value.take();
        guard.has_receiver = false;
        value
    }

    /// Forbid further sends and wake any pending sender/receiver with no
    /// value to hand off — unlike `BufferedChannel`, there is no buffer to
    /// drain, so close abandons any rendezvous in progress.
    pub fn close(&self) {
        {
            let mut guard = self.state.lock().unwrap();
            guard.closed = true;
        }
        self.send_ready.notify_all();
        self.recv_ready.notify_all();
    }
}

impl<T> Default for UnbufferedChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}
