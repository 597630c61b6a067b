// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Striped, bucket-chained concurrent hash map.
//!
//! Buckets are plain `Vec<(K, V)>` chains behind an `UnsafeCell`, mutated
//! only while the bucket's covering stripe mutex is held. The bucket
//! index and the stripe index are both taken from the same key hash
//! (`% buckets.len()` and `% stripes.len()`), so the bucket count is kept
//! a multiple of the stripe count at all times (seeded at `stripes.len()`,
//! grown 3x at a time) — that's what guarantees `hash % buckets.len() %
//! stripes.len() == hash % stripes.len()`, i.e. every key landing in a
//! given bucket always picks the same stripe, no matter how the bucket
//! array has since been resized. Without that invariant two keys that
//! collide into the same bucket could lock two different stripes and
//! race on the same `UnsafeCell`.
//!
//! `Clear` and `Rehash` take every stripe in index order — always the
//! same order, from every caller — so they can never deadlock against
//! each other, then take the structural write lock to resize the bucket
//! array.

use std::cell::UnsafeCell;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use crate::error::KeyAbsentError;

const DEFAULT_STRIPES: usize = 50;
/// A bucket longer than this triggers a rehash into a table 3x the size.
const REHASH_THRESHOLD: usize = 50;

struct Inner<K, V> {
    buckets: Vec<UnsafeCell<Vec<(K, V)>>>,
}

// Safety: bucket contents are only ever mutated while the calling
// thread holds the stripe mutex covering that bucket's hash, and the
// bucket array itself is only resized while every stripe is held
// (`clear`/`rehash`). No two threads ever get simultaneous mutable
// access to the same `UnsafeCell`.
unsafe impl<K: Send, V: Send> Sync for Inner<K, V> {}

/// A concurrent hash map with stripe-locked buckets.
pub struct ConcurrentHashMap<K, V, S = RandomState> {
    stripes: Vec<Mutex<()>>,
    data: RwLock<Inner<K, V>>,
    hasher: S,
    size: AtomicUsize,
}

impl<K, V> ConcurrentHashMap<K, V, RandomState>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::with_stripes(DEFAULT_STRIPES)
    }

    pub fn with_stripes(stripes: usize) -> Self {
        Self::with_hasher(stripes, RandomState::new())
    }
}

impl<K, V, S> ConcurrentHashMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    pub fn with_hasher(stripes: usize, hasher: S) -> Self {
        let stripes = stripes.max(1);
        Self {
            stripes: (0..stripes).map(|_| Mutex::new(())).collect(),
            // Seeded at exactly `stripes` buckets so the bucket count
            // starts as a multiple of the stripe count; `rehash` preserves
            // that by always growing 3x.
            data: RwLock::new(Inner {
                buckets: (0..stripes).map(|_| UnsafeCell::new(Vec::new())).collect(),
            }),
            hasher,
            size: AtomicUsize::new(0),
        }
    }

    fn hash(&self, key: &K) -> u64 {
        self.hasher.hash_one(key)
    }

    fn stripe_for(&self, hash: u64) -> usize {
        (hash as usize) % self.stripes.len()
    }

    /// Insert `key`/`value`. Returns `false` (without modifying the map)
    /// if `key` is already present.
    pub fn insert(&self, key: K, value: V) -> bool {
        let hash = self.hash(&key);
        let stripe = self.stripe_for(hash);
        let _stripe_guard = self.stripes[stripe].lock().unwrap();

        let data = self.data.read().unwrap();
        let bucket_idx = (hash as usize) % data.buckets.len();
        // SAFETY: see `Sync` impl above.
        let bucket = unsafe { &mut *data.buckets[bucket_idx].get() };

        let inserted = if bucket.iter().any(|(k, _)| k == &key) {
            false
        } else {
            bucket.push((key, value));
            true
        };
        let bucket_len = bucket.len();
        drop(data);
        // `rehash` locks every stripe in index order, including this one —
        // drop it before calling rehash, or a bucket crossing the
        // threshold self-deadlocks against its own stripe mutex.
        drop(_stripe_guard);

        if inserted {
            self.size.fetch_add(1, Ordering::SeqCst);
            if bucket_len > REHASH_THRESHOLD {
                self.rehash();
            }
        }
        inserted
    }

    /// Remove `key`. Returns whether it was present.
    pub fn erase(&self, key: &K) -> bool {
        let hash = self.hash(key);
        let stripe = self.stripe_for(hash);
        let _stripe_guard = self.stripes[stripe].lock().unwrap();

        let data = self.data.read().unwrap();
        let bucket_idx = (hash as usize) % data.buckets.len();
        let bucket = unsafe { &mut *data.buckets[bucket_idx].get() };

        let before = bucket.len();
        bucket.retain(|(k, _)| k != key);
        let removed = bucket.len() < before;
        drop(data);

        if removed {
            self.size.fetch_sub(1, Ordering::SeqCst);
        }
        removed
    }

    /// Look up `key`, returning `(found, value-copy)`.
    pub fn find(&self, key: &K) -> (bool, Option<V>)
    where
        V: Clone,
    {
        let hash = self.hash(key);
        let stripe = self.stripe_for(hash);
        let _stripe_guard = self.stripes[stripe].lock().unwrap();

        let data = self.data.read().unwrap();
        let bucket_idx = (hash as usize) % data.buckets.len();
        // SAFETY: read-only access, still serialized by the stripe lock
        // against concurrent writers of the same bucket.
        let bucket = unsafe { &*data.buckets[bucket_idx].get() };

        match bucket.iter().find(|(k, _)| k == key) {
            Some((_, v)) => (true, Some(v.clone())),
            None => (false, None),
        }
    }

    /// Look up `key`, failing with [`KeyAbsentError`] on a miss.
    pub fn at(&self, key: &K) -> Result<V, KeyAbsentError>
    where
        V: Clone,
    {
        match self.find(key) {
            (true, Some(v)) => Ok(v),
            _ => Err(KeyAbsentError),
        }
    }

    /// Remove every entry. Takes every stripe, in index order, so it can
    /// never deadlock against another `clear`/`rehash`.
    pub fn clear(&self) {
        let _guards: Vec<_> = self.stripes.iter().map(|m| m.lock().unwrap()).collect();
        let mut data = self.data.write().unwrap();
        data.buckets = (0..self.stripes.len())
            .map(|_| UnsafeCell::new(Vec::new()))
            .collect();
        self.size.store(0, Ordering::SeqCst);
    }

    /// Grow the bucket array 3x and redistribute entries. Takes every
    /// stripe in index order, matching `clear`'s deadlock-avoidance.
    pub fn rehash(&self) {
        let _guards: Vec<_> = self.stripes.iter().map(|m| m.lock().unwrap()).collect();
        let mut data = self.data.write().unwrap();
        let new_len = (data.buckets.len() * 3).max(1);
        let mut new_buckets: Vec<Vec<(K, V)>> = (0..new_len).map(|_| Vec::new()).collect();
        for cell in data.buckets.drain(..) {
            for (k, v) in cell.into_inner() {
                let hash = self.hash(&k);
                let idx = (hash as usize) % new_len;
                new_buckets[idx].push((k, v));
            }
        }
        data.buckets = new_buckets.into_iter().map(UnsafeCell::new).collect();
    }

    /// Snapshot of the number of entries. Consistent only under external
    /// quiescence (no concurrent insert/erase in flight).
    pub fn len(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for ConcurrentHashMap<K, V, RandomState>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
