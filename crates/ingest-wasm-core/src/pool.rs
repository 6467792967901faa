//! Bounded cache of warm sessions.
//!
//! [`SessionPool`] keeps up to `capacity` idle items in a free list and builds
//! new ones with its factory whenever the list is empty. Neither direction
//! ever waits for another caller:
//!
//! - [`SessionPool::get`] pops an idle item or constructs a fresh one
//! - [`SessionPool::put`] caches the item, or drops it if the cache is full
//!
//! Capacity bounds the memory held by *idle* items only. The number of items
//! in flight is bounded by the number of concurrent callers, not by the pool.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace};

use ingest_wasm_common::ProcessorError;

type Factory<T> = Box<dyn Fn() -> Result<T, ProcessorError> + Send + Sync>;

/// A bounded free list plus an overflow factory.
pub struct SessionPool<T> {
    /// Idle items. The lock is held only to push or pop.
    idle: Mutex<Vec<T>>,
    capacity: usize,
    factory: Factory<T>,
    created: AtomicUsize,
}

impl<T> SessionPool<T> {
    /// Create an empty pool.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of idle items kept; `0` caches nothing
    /// * `factory` - Builds a new item when none is idle
    pub fn new<F>(capacity: usize, factory: F) -> Self
    where
        F: Fn() -> Result<T, ProcessorError> + Send + Sync + 'static,
    {
        Self {
            idle: Mutex::new(Vec::new()),
            capacity,
            factory: Box::new(factory),
            created: AtomicUsize::new(0),
        }
    }

    /// Create a pool holding `seed` as its first idle item.
    pub fn with_seed<F>(seed: T, capacity: usize, factory: F) -> Self
    where
        F: Fn() -> Result<T, ProcessorError> + Send + Sync + 'static,
    {
        let pool = Self::new(capacity, factory);
        pool.put(seed);
        pool
    }

    /// Take an idle item, or build a new one if none is cached.
    ///
    /// # Errors
    ///
    /// Returns the factory's error when a new item cannot be built.
    pub fn get(&self) -> Result<T, ProcessorError> {
        let cached = self.idle.lock().pop();
        if let Some(item) = cached {
            return Ok(item);
        }

        debug!(capacity = self.capacity, "No idle session cached, creating one");
        let item = (self.factory)()?;
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(item)
    }

    /// Return an item to the cache.
    ///
    /// Returns `false` if the cache was full and the item was dropped.
    pub fn put(&self, item: T) -> bool {
        let rejected = {
            let mut idle = self.idle.lock();
            if idle.len() < self.capacity {
                idle.push(item);
                None
            } else {
                Some(item)
            }
        };

        match rejected {
            None => true,
            Some(item) => {
                trace!(capacity = self.capacity, "Session cache full, dropping session");
                // Dropped outside the lock
                drop(item);
                false
            }
        }
    }

    /// Return an item to the cache if there is one. `None` is a no-op.
    pub fn put_opt(&self, item: Option<T>) {
        if let Some(item) = item {
            self.put(item);
        }
    }

    /// Take an item with scoped ownership.
    ///
    /// The returned guard puts the item back when dropped, on every exit path.
    ///
    /// # Errors
    ///
    /// As [`SessionPool::get`].
    pub fn acquire(&self) -> Result<Pooled<'_, T>, ProcessorError> {
        let item = self.get()?;
        Ok(Pooled {
            pool: self,
            item: Some(item),
        })
    }

    /// Number of idle items currently cached.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Maximum number of idle items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items built by the factory since the pool was created.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

impl<T> std::fmt::Debug for SessionPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("capacity", &self.capacity)
            .field("idle", &self.idle_count())
            .field("created", &self.created_count())
            .finish_non_exhaustive()
    }
}

/// An item checked out of a [`SessionPool`].
///
/// Dereferences to the item and returns it to the pool on drop.
pub struct Pooled<'a, T> {
    pool: &'a SessionPool<T>,
    item: Option<T>,
}

impl<T> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.item.as_ref().expect("pooled item is present until drop")
    }
}

impl<T> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("pooled item is present until drop")
    }
}

impl<T> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        self.pool.put_opt(self.item.take());
    }
}
