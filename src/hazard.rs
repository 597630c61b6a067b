// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Hazard-pointer based safe memory reclamation.
//!
//! A value is never reclaimed while any registered thread's hazard slot
//! holds it: `acquire` publishes a pointer before use via a
//! publish-and-recheck protocol, and `scan_free_list` only frees a
//! retired value once it has snapshotted every thread's slot and found
//! the value absent from all of them.
//!
//! Registration is modeled as an RAII guard (`ThreadRecord`) rather than
//! a global thread-local, so a process can run more than one independent
//! `HazardDomain` without the slots colliding.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::trace;

/// Threshold above which `retire` triggers a scan of the free list.
const DEFAULT_SCAN_THRESHOLD: usize = 1000;

struct HazardSlot {
    ptr: AtomicPtr<()>,
}

struct RetiredNode {
    value: *mut (),
    deleter: Box<dyn FnOnce(*mut ()) + Send>,
    next: *mut RetiredNode,
}

/// Process-wide (or domain-wide) hazard-pointer state: the registered
/// thread set and the lock-free free list of retired-but-not-yet-reclaimed
/// pointers.
pub struct HazardDomain {
    threads: Mutex<Vec<Arc<HazardSlot>>>,
    free_list: AtomicPtr<RetiredNode>,
    approx_free_list_size: AtomicUsize,
    scan_lock: Mutex<()>,
    scan_threshold: usize,
}

impl HazardDomain {
    pub fn new() -> Self {
        Self::with_scan_threshold(DEFAULT_SCAN_THRESHOLD)
    }

    pub fn with_scan_threshold(scan_threshold: usize) -> Self {
        Self {
            threads: Mutex::new(Vec::new()),
            free_list: AtomicPtr::new(std::ptr::null_mut()),
            approx_free_list_size: AtomicUsize::new(0),
            scan_lock: Mutex::new(()),
            scan_threshold,
        }
    }

    /// Register the calling thread. The returned guard must be kept alive
    /// for the duration of that thread's use of the domain and dropped
    /// (unregistering) before the thread exits.
    pub fn register(&self) -> ThreadRecord<'_> {
        let slot = Arc::new(HazardSlot {
            ptr: AtomicPtr::new(std::ptr::null_mut()),
        });
        self.threads.lock().unwrap().push(slot.clone());
        ThreadRecord { domain: self, slot }
    }

    fn unregister(&self, slot: &Arc<HazardSlot>) {
        let mut threads = self.threads.lock().unwrap();
        if let Some(idx) = threads.iter().position(|s| Arc::ptr_eq(s, slot)) {
            threads.swap_remove(idx);
        }
        let last_thread_gone = threads.is_empty();
        drop(threads);

        if last_thread_gone {
            // No readers remain; nothing can be protected anymore.
            self.drain_free_list();
        }
    }

    fn drain_free_list(&self) {
        let mut node = self.free_list.swap(std::ptr::null_mut(), Ordering::AcqRel);
        let mut freed = 0usize;
        while !node.is_null() {
            let boxed = unsafe { Box::from_raw(node) };
            node = boxed.next;
            (boxed.deleter)(boxed.value);
            freed += 1;
        }
        self.approx_free_list_size.store(0, Ordering::SeqCst);
        if freed > 0 {
            trace!(freed, "hazard domain drained free list (last thread unregistered)");
        }
    }

    fn push_retired(&self, node: *mut RetiredNode) {
        let mut head = self.free_list.load(Ordering::Relaxed);
        loop {
            unsafe {
                (*node).next = head;
            }
            match self.free_list.compare_exchange_weak(
                head,
                node,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => head = actual,
            }
        }
    }

    /// Snapshot the free list and every hazard slot, reclaiming whatever
    /// is retired and unprotected; anything still protected goes back on
    /// the free list for a later scan.
    pub fn scan_free_list(&self) {
        let _guard = self.scan_lock.lock().unwrap();

        let mut retired = self.free_list.swap(std::ptr::null_mut(), Ordering::AcqRel);
        self.approx_free_list_size.store(0, Ordering::SeqCst);

        let protected: Vec<*mut ()> = {
            let threads = self.threads.lock().unwrap();
            threads
                .iter()
                .map(|t| t.ptr.load(Ordering::Acquire))
                .filter(|p| !p.is_null())
                .collect()
        };

        let mut reclaimed = 0usize;
        let mut requeued = 0usize;

        while !retired.is_null() {
            let node = unsafe { Box::from_raw(retired) };
            let next = node.next;
            if protected.contains(&node.value) {
                let raw = Box::into_raw(node);
                unsafe {
                    (*raw).next = std::ptr::null_mut();
                }
                self.push_retired(raw);
                requeued += 1;
            } else {
                (node.deleter)(node.value);
                reclaimed += 1;
            }
            retired = next;
        }

        trace!(reclaimed, requeued, "hazard domain scanned free list");
    }
}

impl Default for HazardDomain {
    fn default() -> Self {
        Self::new()
    }
}

/// A thread's registration with a [`HazardDomain`]. Dropping it
/// unregisters the thread; if it was the last registered thread, the
/// free list is drained unconditionally (no readers remain to protect
/// anything).
pub struct ThreadRecord<'d> {
    domain: &'d HazardDomain,
    slot: Arc<HazardSlot>,
}

impl<'d> ThreadRecord<'d> {
    /// Publish-and-recheck acquire: safe even if `ptr` is concurrently
    /// swapped out and reclaimed by another thread between the initial
    /// load and the publish.
    pub fn acquire<T>(&self, ptr: &AtomicPtr<T>) -> Option<NonNull<T>> {
        let mut value = ptr.load(Ordering::Acquire);
        loop {
            self.slot.ptr.store(value as *mut (), Ordering::SeqCst);
            let revalidated = ptr.load(Ordering::Acquire);
            if revalidated == value {
                return NonNull::new(value);
            }
            value = revalidated;
        }
    }

    /// Clear this thread's hazard slot, making whatever it protected
    /// eligible for reclamation again.
    pub fn release(&self) {
        self.slot.ptr.store(std::ptr::null_mut(), Ordering::SeqCst);
    }

    /// Schedule `value` for deferred reclamation via `deleter`. Triggers
    /// a scan once the approximate free-list size crosses the domain's
    /// threshold.
    pub fn retire<T: Send + 'static>(&self, value: *mut T, deleter: impl FnOnce(*mut T) + Send + 'static) {
        let node = Box::into_raw(Box::new(RetiredNode {
            value: value as *mut (),
            deleter: Box::new(move |erased: *mut ()| deleter(erased as *mut T)),
            next: std::ptr::null_mut(),
        }));
        self.domain.push_retired(node);
        let size = self.domain.approx_free_list_size.fetch_add(1, Ordering::SeqCst) + 1;
        if size > self.domain.scan_threshold {
            self.domain.scan_free_list();
        }
    }
}

impl<'d> Drop for ThreadRecord<'d> {
    fn drop(&mut self) {
        self.domain.unregister(&self.slot);
    }
}
