//! Bounded, lock-free object pool for trace records
//!
//! Instrumented code borrows short-lived records on the hot path and hands
//! them back when a trace unit completes. The pool never blocks and never
//! fails: when the container is empty it falls back to plain allocation and
//! counts the miss as garbage, when it is full a recycled object is dropped.
//!
//! # Design
//!
//! ```text
//! create_instance() ──► ArrayQueue::pop() ──► hit: reused instance
//!                              │
//!                              └──► miss: Allocator::create_instance()
//!                                         garbage_created += 1
//!
//! recycle(obj) ──► Resetter::recycle(&mut obj) ──► ArrayQueue::push(obj)
//!                                                    └──► full: drop(obj)
//! ```
//!
//! The container is a `crossbeam::queue::ArrayQueue`, a fixed-capacity
//! multi-producer multi-consumer queue. Every slot is moved out of the queue
//! by value, so an instance can never be held by two callers at once.

use crossbeam::queue::ArrayQueue;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Strategy for constructing a fresh instance when the pool is empty.
///
/// Any `Fn() -> T` closure is an allocator.
pub trait Allocator<T>: Send + Sync {
    fn create_instance(&self) -> T;
}

impl<T, F> Allocator<T> for F
where
    F: Fn() -> T + Send + Sync,
{
    fn create_instance(&self) -> T {
        self()
    }
}

/// Strategy for clearing an instance's mutable state before it is reused.
///
/// Any `Fn(&mut T)` closure is a resetter.
pub trait Resetter<T>: Send + Sync {
    fn recycle(&self, obj: &mut T);
}

impl<T, F> Resetter<T> for F
where
    F: Fn(&mut T) + Send + Sync,
{
    fn recycle(&self, obj: &mut T) {
        self(obj)
    }
}

/// Records that know how to clear their own state.
pub trait Recyclable {
    /// Restore the instance to the state of a freshly allocated one
    fn reset_state(&mut self);
}

/// Resetter delegating to [`Recyclable::reset_state`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RecyclableResetter;

impl<T: Recyclable> Resetter<T> for RecyclableResetter {
    fn recycle(&self, obj: &mut T) {
        obj.reset_state();
    }
}

/// Resetter for payloads that carry no per-use state
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResetter;

impl<T> Resetter<T> for NoopResetter {
    fn recycle(&self, _obj: &mut T) {}
}

/// Fixed-capacity concurrent pool of reusable instances
pub struct BoundedObjectPool<T> {
    /// `None` for a zero-capacity pool, which degrades to plain allocation
    queue: Option<ArrayQueue<T>>,
    allocator: Box<dyn Allocator<T>>,
    resetter: Box<dyn Resetter<T>>,
    garbage_created: AtomicU64,
    requested: AtomicU64,
    recycled: AtomicU64,
}

impl<T> BoundedObjectPool<T> {
    /// Create an empty pool holding at most `capacity` idle instances
    pub fn new(
        capacity: usize,
        allocator: impl Allocator<T> + 'static,
        resetter: impl Resetter<T> + 'static,
    ) -> Self {
        BoundedObjectPool {
            queue: (capacity > 0).then(|| ArrayQueue::new(capacity)),
            allocator: Box::new(allocator),
            resetter: Box::new(resetter),
            garbage_created: AtomicU64::new(0),
            requested: AtomicU64::new(0),
            recycled: AtomicU64::new(0),
        }
    }

    /// Create a pool and fill it to capacity up front.
    ///
    /// Pre-allocated instances are not counted as garbage.
    pub fn preallocated(
        capacity: usize,
        allocator: impl Allocator<T> + 'static,
        resetter: impl Resetter<T> + 'static,
    ) -> Self {
        let pool = Self::new(capacity, allocator, resetter);
        if let Some(queue) = &pool.queue {
            while !queue.is_full() {
                if queue.push(pool.allocator.create_instance()).is_err() {
                    break;
                }
            }
        }
        pool
    }

    /// Take an idle instance, or `None` if the pool is currently empty.
    ///
    /// Never allocates.
    pub fn try_create_instance(&self) -> Option<T> {
        let obj = self.pop_idle()?;
        self.requested.fetch_add(1, Ordering::Relaxed);
        Some(obj)
    }

    /// Take an idle instance, allocating a new one if the pool is empty
    pub fn create_instance(&self) -> T {
        self.requested.fetch_add(1, Ordering::Relaxed);
        match self.pop_idle() {
            Some(obj) => obj,
            None => {
                self.garbage_created.fetch_add(1, Ordering::Relaxed);
                self.allocator.create_instance()
            }
        }
    }

    /// Reset `obj` and make it available again.
    ///
    /// If the pool is full the instance is dropped.
    pub fn recycle(&self, mut obj: T) {
        self.resetter.recycle(&mut obj);
        self.recycled.fetch_add(1, Ordering::Relaxed);
        if let Some(queue) = &self.queue {
            // Err hands the instance back; letting it go is the overflow policy
            let _ = queue.push(obj);
        }
    }

    /// Move up to `max_elements` idle instances from `other` into this pool.
    ///
    /// Returns how many were moved. Never allocates and never exceeds this
    /// pool's capacity. Instances in `other` were reset when they were
    /// recycled there, so they are not reset again.
    pub fn fill_from_other_pool(&self, other: &BoundedObjectPool<T>, max_elements: usize) -> usize {
        if std::ptr::eq(self, other) {
            return 0;
        }
        let Some(queue) = &self.queue else {
            return 0;
        };

        let mut moved = 0;
        while moved < max_elements && !queue.is_full() {
            let Some(obj) = other.pop_idle() else {
                break;
            };
            if let Err(obj) = queue.push(obj) {
                // Lost a race for the last free slot
                other.push_idle(obj);
                break;
            }
            moved += 1;
        }
        moved
    }

    /// Drop every idle instance
    pub fn clear(&self) {
        while self.pop_idle().is_some() {}
    }

    /// Maximum number of idle instances
    pub fn size(&self) -> usize {
        self.queue.as_ref().map_or(0, ArrayQueue::capacity)
    }

    /// Idle instances currently available (best effort under contention)
    pub fn objects_in_pool(&self) -> usize {
        self.queue.as_ref().map_or(0, ArrayQueue::len)
    }

    /// Allocations made because the pool was empty
    pub fn garbage_created(&self) -> u64 {
        self.garbage_created.load(Ordering::Relaxed)
    }

    /// Instances handed out by `create_instance`/`try_create_instance`
    pub fn requested_count(&self) -> u64 {
        self.requested.load(Ordering::Relaxed)
    }

    /// Instances passed to `recycle`, whether or not they were retained
    pub fn recycled_count(&self) -> u64 {
        self.recycled.load(Ordering::Relaxed)
    }

    /// Snapshot of the pool counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.size(),
            available: self.objects_in_pool(),
            requested: self.requested_count(),
            garbage_created: self.garbage_created(),
            recycled: self.recycled_count(),
        }
    }

    fn pop_idle(&self) -> Option<T> {
        self.queue.as_ref()?.pop()
    }

    fn push_idle(&self, obj: T) {
        if let Some(queue) = &self.queue {
            let _ = queue.push(obj);
        }
    }
}

impl<T> fmt::Debug for BoundedObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedObjectPool")
            .field("capacity", &self.size())
            .field("objects_in_pool", &self.objects_in_pool())
            .field("garbage_created", &self.garbage_created())
            .finish()
    }
}

/// Pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Pool capacity
    pub capacity: usize,
    /// Idle instances in the pool
    pub available: usize,
    /// Total instances handed out
    pub requested: u64,
    /// Allocations caused by an empty pool
    pub garbage_created: u64,
    /// Total recycle operations
    pub recycled: u64,
}

impl PoolStats {
    /// Percentage of requests served from the pool
    pub fn hit_rate(&self) -> f64 {
        if self.requested == 0 {
            return 0.0;
        }
        let hits = self.requested.saturating_sub(self.garbage_created);
        (hits as f64 / self.requested as f64) * 100.0
    }

    /// Percentage of capacity currently handed out
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        let used = self.capacity.saturating_sub(self.available);
        (used as f64 / self.capacity as f64) * 100.0
    }

    /// Instances handed out and not yet recycled
    pub fn outstanding(&self) -> u64 {
        self.requested.saturating_sub(self.recycled)
    }
}
