// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Task: a unit of work with dependency/trigger/deadline gating.
//!
//! State is four monotonic flags (`canceled`, `failed`, `completed`,
//! `finished`) with the invariant `finished ⇔ completed ∨ failed ∨
//! canceled`, each flipping false→true at most once. `Cancel` does not
//! interrupt a `Run` already in progress — if the two race, the task can
//! end up both canceled and completed; that overlap is left unresolved
//! rather than papered over (see DESIGN.md).

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::SystemTime;

use tracing::warn;

use crate::clock::Clock;
use crate::error::TaskFailure;

/// Anything the executor's queue can hold: a bare `Task` or a `Future<T>`.
pub trait TaskObject: Send + Sync {
    /// Evaluate the ready predicate; if ready, run the task body exactly
    /// once and transition to a terminal state. If not ready, do nothing
    /// — the executor re-queues.
    fn invoke(&self);
    fn is_ready(&self) -> bool;
    fn is_completed(&self) -> bool;
    fn is_failed(&self) -> bool;
    fn is_canceled(&self) -> bool;
    fn is_finished(&self) -> bool;
    fn cancel(&self);
    fn wait(&self);
    /// This task's AND-set dependencies, for submit-time cycle detection.
    fn dependencies(&self) -> Vec<TaskHandle>;
}

/// A shared handle to anything schedulable. Dependencies and triggers are
/// sets of these.
pub type TaskHandle = Arc<dyn TaskObject>;

pub(crate) struct TaskCore {
    canceled: AtomicBool,
    failed: AtomicBool,
    completed: AtomicBool,
    finished: AtomicBool,
    dependencies: Mutex<Vec<TaskHandle>>,
    triggers: Mutex<Vec<TaskHandle>>,
    deadline: Mutex<Option<SystemTime>>,
    error: Mutex<Option<TaskFailure>>,
    done: Mutex<bool>,
    done_cv: Condvar,
    /// Serializes a running `Run` against `wait`/cancellation bookkeeping.
    invoke_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl TaskCore {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            canceled: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            dependencies: Mutex::new(Vec::new()),
            triggers: Mutex::new(Vec::new()),
            deadline: Mutex::new(None),
            error: Mutex::new(None),
            done: Mutex::new(false),
            done_cv: Condvar::new(),
            invoke_lock: Mutex::new(()),
            clock,
        }
    }

    pub(crate) fn add_dependency(&self, dep: TaskHandle) {
        self.dependencies.lock().unwrap().push(dep);
    }

    pub(crate) fn add_trigger(&self, trig: TaskHandle) {
        self.triggers.lock().unwrap().push(trig);
    }

    pub(crate) fn dependencies(&self) -> Vec<TaskHandle> {
        self.dependencies.lock().unwrap().clone()
    }

    pub(crate) fn set_deadline(&self, at: SystemTime) {
        *self.deadline.lock().unwrap() = Some(at);
    }

    fn ready_predicate(&self) -> bool {
        if self.canceled.load(Ordering::Acquire) {
            return false;
        }
        let deps_ready = self
            .dependencies
            .lock()
            .unwrap()
            .iter()
            .all(|d| d.is_finished());
        if !deps_ready {
            return false;
        }
        let triggers_ready = {
            let triggers = self.triggers.lock().unwrap();
            triggers.is_empty() || triggers.iter().any(|t| t.is_finished())
        };
        if !triggers_ready {
            return false;
        }
        match *self.deadline.lock().unwrap() {
            Some(at) => self.clock.now() >= at,
            None => true,
        }
    }

    /// Run `body` exactly once if the ready predicate holds and the task
    /// hasn't already finished, recording completion/failure. `body`
    /// returns `Ok(())` on success or `Err` with the captured failure.
    pub(crate) fn invoke_if_ready(&self, body: impl FnOnce() -> Result<(), TaskFailure>) {
        if !self.ready_predicate() {
            return;
        }

        let _guard = self.invoke_lock.lock().unwrap();
        if self.canceled.load(Ordering::Acquire) || self.finished.load(Ordering::Acquire) {
            return;
        }

        match body() {
            Ok(()) => {
                self.completed.store(true, Ordering::Release);
            }
            Err(e) => {
                warn!(error = %e, "task run failed");
                self.failed.store(true, Ordering::Release);
                *self.error.lock().unwrap() = Some(e);
            }
        }
        self.finish();
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::Release);
        *self.done.lock().unwrap() = true;
        self.done_cv.notify_all();
    }

    pub(crate) fn cancel(&self) {
        // Fire-and-forget: no coordination with an in-flight `invoke`.
        // See module docs.
        self.canceled.store(true, Ordering::Release);
        self.finish();
    }

    pub(crate) fn wait(&self) {
        let guard = self.done.lock().unwrap();
        let _guard = self.done_cv.wait_while(guard, |done| !*done).unwrap();
    }

    pub(crate) fn error(&self) -> Option<TaskFailure> {
        self.error.lock().unwrap().clone()
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
    pub(crate) fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
    pub(crate) fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
    pub(crate) fn is_ready(&self) -> bool {
        self.ready_predicate()
    }
}

/// A bare unit of work with no return value.
pub struct Task {
    core: TaskCore,
    body: Mutex<Option<Box<dyn FnOnce() -> Result<(), TaskFailure> + Send>>>,
}

impl Task {
    pub fn new(
        clock: Arc<dyn Clock>,
        body: impl FnOnce() -> Result<(), TaskFailure> + Send + 'static,
    ) -> Arc<Task> {
        Arc::new(Task {
            core: TaskCore::new(clock),
            body: Mutex::new(Some(Box::new(body))),
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
}

impl TaskObject for Task {
    fn invoke(&self) {
        self.core.invoke_if_ready(|| {
            let f = self
                .body
                .lock()
                .unwrap()
                .take()
                .expect("task body already consumed");
            match std::panic::catch_unwind(AssertUnwindSafe(f)) {
                Ok(result) => result,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use std::sync::atomic::AtomicUsize;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(SystemClock)
    }

    #[test]
    fn completes_normally() {
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        let task = Task::new(clock(), move || {
            ran2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        task.invoke();
        assert!(task.is_completed());
        assert!(task.is_finished());
        assert!(!task.is_failed());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn captures_failure() {
        let task = Task::new(clock(), || Err(TaskFailure("boom".into())));
        task.invoke();
        assert!(task.is_failed());
        assert!(task.is_finished());
        assert!(!task.is_completed());
        assert_eq!(task.error().unwrap().0, "boom");
    }

    #[test]
    fn captures_panic_as_failure() {
        let task = Task::new(clock(), || panic!("kaboom"));
        task.invoke();
        assert!(task.is_failed());
        assert!(task.error().unwrap().0.contains("kaboom"));
    }

    #[test]
    fn cancel_sets_finished_without_running() {
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        let task = Task::new(clock(), move || {
            ran2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        task.cancel();
        assert!(task.is_canceled());
        assert!(task.is_finished());
        task.invoke(); // ready_predicate() is false once canceled; no-op.
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn waits_for_dependency_before_running() {
        let dep = Task::new(clock(), || Ok(()));
        let dependent_ran = Arc::new(AtomicUsize::new(0));
        let dependent_ran2 = dependent_ran.clone();
        let dependent = Task::new(clock(), move || {
            dependent_ran2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        dependent.add_dependency(dep.clone());

        dependent.invoke();
        assert_eq!(dependent_ran.load(Ordering::SeqCst), 0, "dependency not finished yet");

        dep.invoke();
        dependent.invoke();
        assert_eq!(dependent_ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn or_trigger_any_one_suffices() {
        let t1 = Task::new(clock(), || Ok(()));
        let t2 = Task::new(clock(), || Ok(()));
        let gated = Task::new(clock(), || Ok(()));
        gated.add_trigger(t1.clone());
        gated.add_trigger(t2.clone());

        gated.invoke();
        assert!(!gated.is_finished());

        t2.invoke();
        gated.invoke();
        assert!(gated.is_finished());
    }

    #[test]
    fn deadline_delays_eligibility() {
        use crate::clock::test_support::FakeClock;
        let fake = Arc::new(FakeClock::new());
        let task = Task::new(fake.clone(), || Ok(()));
        task.set_deadline(fake.now() + std::time::Duration::from_secs(10));

        task.invoke();
        assert!(!task.is_finished());

        fake.advance(std::time::Duration::from_secs(10));
        task.invoke();
        assert!(task.is_finished());
    }

    #[test]
    fn wait_blocks_until_finished() {
        let task = Task::new(clock(), || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(())
        });
        let t = task.clone();
        let runner = std::thread::spawn(move || t.invoke());
        task.wait();
        assert!(task.is_finished());
        runner.join().unwrap();
    }
}
