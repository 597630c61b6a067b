// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Worker-pool task executor with future combinators.
//!
//! Workers pull from a shared [`UnboundedBlockingQueue`] and call
//! `invoke` on whatever they pop. A task whose dependencies, triggers,
//! or deadline aren't satisfied yet is re-queued after a short backoff —
//! there is no waker or readiness notification wired back from a
//! dependency's completion to its dependents, so this is a polling
//! scheduler, not an event-driven one. That tradeoff is accepted here
//! (see DESIGN.md) rather than building a reverse-dependency index.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::error::{SubmitError, TaskFailure};
use crate::future::Future;
use crate::queue::UnboundedBlockingQueue;
use crate::task::{TaskHandle, TaskObject};

const DEFAULT_POLL_BACKOFF: Duration = Duration::from_millis(1);

/// A fixed-size worker pool that runs [`Task`]s and [`Future`]s honoring
/// their dependencies, triggers, and deadlines.
pub struct Executor {
    queue: Arc<UnboundedBlockingQueue<TaskHandle>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    clock: Arc<dyn Clock>,
    poll_backoff: Duration,
    requeued: Arc<AtomicUsize>,
}

impl Executor {
    pub fn new(num_threads: usize) -> Self {
        Self::with_clock(num_threads, Arc::new(SystemClock))
    }

    pub fn with_clock(num_threads: usize, clock: Arc<dyn Clock>) -> Self {
        let queue = Arc::new(UnboundedBlockingQueue::new());
        let requeued = Arc::new(AtomicUsize::new(0));
        let workers = (0..num_threads.max(1))
            .map(|i| {
                let queue = queue.clone();
                let requeued = requeued.clone();
                thread::Builder::new()
                    .name(format!("concourse-worker-{i}"))
                    .spawn(move || worker_loop(queue, requeued))
                    .expect("failed to spawn executor worker thread")
            })
            .collect();

        info!(num_threads, "executor started");
        Executor {
            queue,
            workers: Mutex::new(workers),
            clock,
            poll_backoff: DEFAULT_POLL_BACKOFF,
            requeued,
        }
    }

    /// Submit a task or future for scheduling. Rejects a dependency graph
    /// that loops back on itself rather than enqueuing a task that could
    /// never become ready. If the executor is already shutting down, the
    /// task is canceled immediately instead of being enqueued.
    pub fn submit(&self, task: TaskHandle) -> Result<(), SubmitError> {
        if has_cycle(&task) {
            return Err(SubmitError::CyclicDependency);
        }
        if !self.queue.put(task.clone()) {
            task.cancel();
            return Err(SubmitError::ShuttingDown);
        }
        Ok(())
    }

    /// Stop accepting new work and discard whatever is still queued but
    /// not yet started; in-flight invocations still run to completion.
    pub fn start_shutdown(&self) {
        debug!("executor shutdown requested");
        self.queue.cancel();
    }

    /// Block until every worker thread has exited (i.e. the queue has
    /// drained after `start_shutdown`).
    pub fn wait_shutdown(&self) {
        let handles: Vec<_> = self.workers.lock().unwrap().drain(..).collect();
        for h in handles {
            let _ = h.join();
        }
        info!(
            requeued = self.requeued.load(Ordering::Relaxed),
            "executor shut down"
        );
    }

    /// Schedule `body` with no dependencies and return its future.
    pub fn invoke<T>(&self, body: impl FnOnce() -> T + Send + 'static) -> Arc<Future<T>>
    where
        T: Send + 'static,
    {
        let fut = Future::new(self.clock.clone(), body);
        self.submit(fut.clone() as TaskHandle)
            .expect("a freshly constructed future has no dependencies to cycle");
        fut
    }

    /// Schedule `cont` to run after `parent` finishes, fed `parent`'s
    /// result. If `parent` failed, `cont` never runs — the returned
    /// future fails with the same captured failure instead.
    pub fn then<T, U>(
        &self,
        parent: Arc<Future<T>>,
        cont: impl FnOnce(T) -> U + Send + 'static,
    ) -> Arc<Future<U>>
    where
        T: Clone + Send + 'static,
        U: Send + 'static,
    {
        let dep = parent.clone() as TaskHandle;
        let body = move || {
            let value = parent.get().unwrap_or_else(|e| propagate(e));
            cont(value)
        };
        let fut = Future::new(self.clock.clone(), body);
        fut.add_dependency(dep);
        self.submit(fut.clone() as TaskHandle)
            .expect("then depends on exactly one already-submitted future");
        fut
    }

    /// Schedule a future that becomes ready once every input future has
    /// finished, yielding their results in input order.
    pub fn when_all<T>(&self, futures: Vec<Arc<Future<T>>>) -> Arc<Future<Vec<T>>>
    where
        T: Clone + Send + 'static,
    {
        let deps: Vec<TaskHandle> = futures.iter().map(|f| f.clone() as TaskHandle).collect();
        let body = move || {
            futures
                .iter()
                .map(|f| f.get().unwrap_or_else(|e| propagate(e)))
                .collect()
        };
        let fut = Future::new(self.clock.clone(), body);
        for d in deps {
            fut.add_dependency(d);
        }
        self.submit(fut.clone() as TaskHandle)
            .expect("when_all depends only on its own, already-submitted inputs");
        fut
    }

    /// Like [`Executor::when_all`], but gives up at `deadline`: any input
    /// not yet finished by then is skipped from the result entirely.
    /// Unlike the other combinators this isn't expressed through the
    /// dependency/trigger graph (there is no "OR of all-done and
    /// deadline-passed" gate) — the future's body itself polls.
    pub fn when_all_before_deadline<T>(
        &self,
        futures: Vec<Arc<Future<T>>>,
        deadline: SystemTime,
    ) -> Arc<Future<Vec<T>>>
    where
        T: Clone + Send + 'static,
    {
        let clock = self.clock.clone();
        let poll_backoff = self.poll_backoff;
        let body = move || {
            loop {
                if futures.iter().all(|f| f.is_finished()) {
                    break;
                }
                if clock.now() >= deadline {
                    break;
                }
                thread::sleep(poll_backoff);
            }
            futures
                .iter()
                .filter(|f| f.is_finished())
                .filter_map(|f| f.get().ok())
                .collect()
        };
        let fut = Future::new(self.clock.clone(), body);
        self.submit(fut.clone() as TaskHandle)
            .expect("when_all_before_deadline has no dependencies to cycle");
        fut
    }

    /// Schedule a future that completes with whichever input finishes
    /// first, via the trigger OR-set.
    pub fn when_first<T>(&self, futures: Vec<Arc<Future<T>>>) -> Arc<Future<T>>
    where
        T: Clone + Send + 'static,
    {
        let triggers: Vec<TaskHandle> = futures.iter().map(|f| f.clone() as TaskHandle).collect();
        let winners = futures.clone();
        let body = move || {
            winners
                .iter()
                .find(|f| f.is_finished())
                .expect("when_first invoked with no finished input")
                .get()
                .unwrap_or_else(|e| propagate(e))
        };
        let fut = Future::new(self.clock.clone(), body);
        for t in triggers {
            fut.add_trigger(t);
        }
        self.submit(fut.clone() as TaskHandle)
            .expect("when_first depends only on its own, already-submitted inputs");
        fut
    }
}

/// Re-panic a dependency's captured failure so the continuation's own
/// `catch_unwind` turns it back into a `TaskFailure` on the downstream
/// future, propagating failure through combinator chains.
fn propagate<T>(failure: TaskFailure) -> T {
    std::panic::resume_unwind(Box::new(failure));
}

fn has_cycle(root: &TaskHandle) -> bool {
    fn visit(node: &TaskHandle, stack: &mut Vec<TaskHandle>) -> bool {
        if stack.iter().any(|h| Arc::ptr_eq(h, node)) {
            return true;
        }
        stack.push(node.clone());
        let cyclic = node.dependencies().iter().any(|d| visit(d, stack));
        stack.pop();
        cyclic
    }
    let mut stack = Vec::new();
    visit(root, &mut stack)
}

fn worker_loop(queue: Arc<UnboundedBlockingQueue<TaskHandle>>, requeued: Arc<AtomicUsize>) {
    while let Some(task) = queue.take() {
        if task.is_finished() {
            continue;
        }
        task.invoke();
        if !task.is_finished() {
            requeued.fetch_add(1, Ordering::Relaxed);
            thread::sleep(DEFAULT_POLL_BACKOFF);
            queue.put(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::FakeClock;
    use crate::task::Task;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::time::Duration;

    #[test]
    fn invoke_runs_and_returns_value() {
        let exec = Executor::new(2);
        let f = exec.invoke(|| 21 * 2);
        assert_eq!(f.get().unwrap(), 42);
        exec.start_shutdown();
        exec.wait_shutdown();
    }

    #[test]
    fn then_chains_on_parent_result() {
        let exec = Executor::new(2);
        let f1 = exec.invoke(|| 1);
        let f2 = exec.then(f1, |v| v + 1);
        assert_eq!(f2.get().unwrap(), 2);
        exec.start_shutdown();
        exec.wait_shutdown();
    }

    #[test]
    fn when_all_collects_every_result_in_order() {
        let exec = Executor::new(4);
        let f1 = exec.invoke(|| 1);
        let f2 = exec.then(f1.clone(), |v| v + 1);
        let f3 = exec.when_all(vec![f1, f2]);
        assert_eq!(f3.get().unwrap(), vec![1, 2]);
        exec.start_shutdown();
        exec.wait_shutdown();
    }

    #[test]
    fn when_first_returns_earliest_winner() {
        let exec = Executor::new(4);
        let slow = exec.invoke(|| {
            std::thread::sleep(Duration::from_millis(50));
            "slow"
        });
        let fast = exec.invoke(|| "fast");
        let first = exec.when_first(vec![slow, fast]);
        assert_eq!(first.get().unwrap(), "fast");
        exec.start_shutdown();
        exec.wait_shutdown();
    }

    #[test]
    fn when_all_before_deadline_skips_unfinished() {
        let exec = Executor::new(4);
        let fast = exec.invoke(|| 1);
        let slow = exec.invoke(|| {
            std::thread::sleep(Duration::from_millis(200));
            2
        });
        let deadline = SystemTime::now() + Duration::from_millis(30);
        let combined = exec.when_all_before_deadline(vec![fast, slow], deadline);
        let result = combined.get().unwrap();
        assert_eq!(result, vec![1]);
        exec.start_shutdown();
        exec.wait_shutdown();
    }

    #[test]
    fn submit_rejects_self_dependency_cycle() {
        let exec = Executor::new(1);
        let a = Task::new(Arc::new(SystemClock), || Ok(()));
        a.add_dependency(a.clone());
        let result = exec.submit(a);
        assert_eq!(result, Err(SubmitError::CyclicDependency));
        exec.start_shutdown();
        exec.wait_shutdown();
    }

    #[test]
    fn deadline_gated_task_waits_for_fake_clock() {
        let clock = Arc::new(FakeClock::new());
        let exec = Executor::with_clock(2, clock.clone());
        let ran = Arc::new(StdAtomicUsize::new(0));
        let ran2 = ran.clone();
        let task = Task::new(clock.clone(), move || {
            ran2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        task.set_deadline(clock.now() + Duration::from_millis(50));
        exec.submit(task.clone()).unwrap();

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        clock.advance(Duration::from_millis(50));
        task.wait();
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        exec.start_shutdown();
        exec.wait_shutdown();
    }

    #[test]
    fn submit_after_shutdown_is_rejected_and_cancels_task() {
        let exec = Executor::new(1);
        exec.start_shutdown();
        let task = Task::new(Arc::new(SystemClock), || Ok(()));
        assert_eq!(exec.submit(task.clone()), Err(SubmitError::ShuttingDown));
        assert!(task.is_canceled());
        assert!(task.is_finished());
        exec.wait_shutdown();
    }
}
