// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Error types shared across the primitives.
//!
//! Closure is never an error in the C sense — `Recv` on a closed channel
//! returns `None`, not `Err`. These types exist for the operations that
//! genuinely fail: a `Send` against a closed channel, a map miss on `At`,
//! or a task whose `Run` panicked.

/// A channel or queue has been closed; the value could not be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("channel is closed")]
pub struct ClosedError;

/// `ConcurrentHashMap::at` found no entry for the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("key not present in map")]
pub struct KeyAbsentError;

/// A task's `Run` panicked; the payload is captured as a string where
/// possible, matching how a `JoinHandle::join` error is downcast.
#[derive(Debug, Clone, thiserror::Error)]
#[error("task failed: {0}")]
pub struct TaskFailure(pub String);

impl TaskFailure {
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        // A combinator (`then`, `when_all`, `when_first`) re-panics a
        // dependency's already-captured `TaskFailure` to propagate it
        // downstream; unwrap that case instead of re-stringifying it.
        let payload = match payload.downcast::<TaskFailure>() {
            Ok(failure) => return *failure,
            Err(payload) => payload,
        };
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "task panicked with a non-string payload".to_string()
        };
        TaskFailure(msg)
    }
}

/// Returned by `Executor::submit` when the task's dependency graph
/// contains a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("task dependency graph contains a cycle")]
    CyclicDependency,
    #[error("executor is shutting down")]
    ShuttingDown,
}
