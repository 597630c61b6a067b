// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! A [`Task`] that produces a value.
//!
//! `Future<T>` adds a result slot on top of [`task::TaskCore`]'s
//! dependency/trigger/deadline gating: `get` blocks until the task
//! finishes, then returns the stored value or re-raises the captured
//! failure.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::clock::Clock;
use crate::error::TaskFailure;
use crate::task::{TaskCore, TaskHandle, TaskObject};

/// A unit of work that produces a `T`.
pub struct Future<T> {
    core: TaskCore,
    body: Mutex<Option<Box<dyn FnOnce() -> T + Send>>>,
    value: Mutex<Option<T>>,
}

impl<T: Send + 'static> Future<T> {
    pub fn new(clock: Arc<dyn Clock>, body: impl FnOnce() -> T + Send + 'static) -> Arc<Future<T>> {
        Arc::new(Future {
            core: TaskCore::new(clock),
            body: Mutex::new(Some(Box::new(body))),
            value: Mutex::new(None),
        })
    }

    pub fn add_dependency(&self, dep: TaskHandle) {
        self.core.add_dependency(dep);
    }

    pub fn add_trigger(&self, trig: TaskHandle) {
        self.core.add_trigger(trig);
    }

    pub fn set_deadline(&self, at: SystemTime) {
        self.core.set_deadline(at);
    }

    pub fn error(&self) -> Option<TaskFailure> {
        self.core.error()
    }

    /// Block until finished, then return the value or the captured
    /// failure. Safe to call more than once or from more than one
    /// thread; `T` must be `Clone` since each call hands out its own
    /// copy rather than consuming the stored one.
    pub fn get(&self) -> Result<T, TaskFailure>
    where
        T: Clone,
    {
        self.core.wait();
        if let Some(err) = self.core.error() {
            return Err(err);
        }
        let guard = self.value.lock().unwrap();
        Ok(guard
            .as_ref()
            .expect("future finished without a stored value or error")
            .clone())
    }
}

impl<T: Send + 'static> TaskObject for Future<T> {
    fn invoke(&self) {
        let body_slot = &self.body;
        let value_slot = &self.value;
        self.core.invoke_if_ready(|| {
            let f = body_slot
                .lock()
                .unwrap()
                .take()
                .expect("future body already consumed");
            match std::panic::catch_unwind(AssertUnwindSafe(f)) {
                Ok(v) => {
                    *value_slot.lock().unwrap() = Some(v);
                    Ok(())
                }
                Err(payload) => Err(TaskFailure::from_panic(payload)),
            }
        });
    }

    fn is_ready(&self) -> bool {
        self.core.is_ready()
    }
    fn is_completed(&self) -> bool {
        self.core.is_completed()
    }
    fn is_failed(&self) -> bool {
        self.core.is_failed()
    }
    fn is_canceled(&self) -> bool {
        self.core.is_canceled()
    }
    fn is_finished(&self) -> bool {
        self.core.is_finished()
    }
    fn cancel(&self) {
        self.core.cancel();
    }
    fn wait(&self) {
        self.core.wait();
    }
    fn dependencies(&self) -> Vec<TaskHandle> {
        self.core.dependencies()
    }
}
