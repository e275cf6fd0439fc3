//! RAII handles over pooled payloads that cannot reset themselves
//!
//! A [`HandlePool`] is a pool of handle slots around a pool of payloads. The
//! slot allocator needs a reference back to the pool it feeds, so the pool is
//! built with [`Arc::new_cyclic`]: the allocator receives the pool's weak
//! reference before the pool exists and callers only ever see the fully wired
//! pool.

use crate::object_pool::{Allocator, BoundedObjectPool, NoopResetter, PoolStats};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};

/// Pooled slot: the payload plus the pool it returns to
struct Slot<T> {
    payload: T,
    owner: Weak<HandlePool<T>>,
}

/// Creates slots on pool miss, each bound to the owning pool
struct SlotAllocator<T> {
    owner: Weak<HandlePool<T>>,
    payload: Box<dyn Allocator<T>>,
}

impl<T: Send + Sync> Allocator<Slot<T>> for SlotAllocator<T> {
    fn create_instance(&self) -> Slot<T> {
        Slot {
            payload: self.payload.create_instance(),
            owner: self.owner.clone(),
        }
    }
}

/// Pool handing out [`ObjectHandle`]s
pub struct HandlePool<T> {
    slots: BoundedObjectPool<Slot<T>>,
}

impl<T: Send + Sync + 'static> HandlePool<T> {
    /// Build a handle pool of `capacity` slots whose payloads come from
    /// `allocator`
    pub fn new(capacity: usize, allocator: impl Allocator<T> + 'static) -> Arc<Self> {
        let payload: Box<dyn Allocator<T>> = Box::new(allocator);
        Arc::new_cyclic(|owner| HandlePool {
            slots: BoundedObjectPool::new(
                capacity,
                SlotAllocator {
                    owner: owner.clone(),
                    payload,
                },
                NoopResetter,
            ),
        })
    }
}

impl<T> HandlePool<T> {
    /// Borrow a handle, allocating a new slot if none is idle
    pub fn acquire(&self) -> ObjectHandle<T> {
        ObjectHandle {
            slot: Some(self.slots.create_instance()),
        }
    }

    /// Borrow a handle only if an idle slot is available
    pub fn try_acquire(&self) -> Option<ObjectHandle<T>> {
        self.slots
            .try_create_instance()
            .map(|slot| ObjectHandle { slot: Some(slot) })
    }

    pub fn stats(&self) -> PoolStats {
        self.slots.stats()
    }

    pub fn objects_in_pool(&self) -> usize {
        self.slots.objects_in_pool()
    }

    pub fn garbage_created(&self) -> u64 {
        self.slots.garbage_created()
    }
}

impl<T> fmt::Debug for HandlePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlePool").field("slots", &self.slots).finish()
    }
}

/// Exclusive handle to a pooled payload.
///
/// Dropping the handle (or calling [`ObjectHandle::close`]) returns its slot
/// to the issuing pool exactly once. The payload is not reset.
pub struct ObjectHandle<T> {
    slot: Option<Slot<T>>,
}

impl<T> ObjectHandle<T> {
    pub fn get(&self) -> &T {
        &self.slot().payload
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.slot_mut().payload
    }

    /// Return the handle to its pool
    pub fn close(self) {
        drop(self);
    }

    fn slot(&self) -> &Slot<T> {
        self.slot
            .as_ref()
            .expect("object handle used after its slot was released")
    }

    fn slot_mut(&mut self) -> &mut Slot<T> {
        self.slot
            .as_mut()
            .expect("object handle used after its slot was released")
    }
}

impl<T> Deref for ObjectHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get()
    }
}

impl<T> DerefMut for ObjectHandle<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.get_mut()
    }
}

impl<T> Drop for ObjectHandle<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            // Pool already gone: the slot is simply freed
            if let Some(pool) = slot.owner.upgrade() {
                pool.slots.recycle(slot);
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ObjectHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectHandle").field(self.get()).finish()
    }
}
