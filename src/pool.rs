//! Thread-safe slab-style object pools (spec §3: "Record and commit-descriptor
//! objects are drawn from slab-style pools and freed either on successful
//! apply or on teardown").
//!
//! This generalizes the C implementation's `kmem_cache` free-lists into a
//! plain typed free-list behind a lock. An optional outstanding-object
//! `limit` lets tests exercise the "out-of-memory during allocation"
//! failure path (spec §7) deterministically.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

pub struct Pool<T> {
    free: Mutex<Vec<T>>,
    limit: Option<usize>,
    outstanding: AtomicUsize,
}

impl<T> Pool<T> {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            limit,
            outstanding: AtomicUsize::new(0),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Take a recycled object, or construct a new one via `make`. Returns
    /// `None` if the pool's outstanding-object limit has been reached,
    /// simulating allocation failure.
    pub fn take_or_else(&self, make: impl FnOnce() -> T) -> Option<T> {
        if let Some(limit) = self.limit {
            if self.outstanding.load(Ordering::Relaxed) >= limit {
                return None;
            }
        }
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        let item = self.free.lock().pop().unwrap_or_else(make);
        Some(item)
    }

    pub fn recycle(&self, item: T) {
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        self.free.lock().push(item);
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }
}
