//! Handle allocation and the handle-to-resource map.
//!
//! The registry itself is a plain owned map: it lives inside the host context
//! state and is only ever touched by work running there, so it needs no lock.
//! Handle allocation is the one piece that may be called from anywhere, which
//! is why [`HandleAllocator`] is atomic and can be shared.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Process-unique identifier of one registered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(u64);

impl Handle {
    /// Wraps a raw handle value received from a controller.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value, as sent on the wire.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Monotonic handle source. Handles start at 1 and are never reissued.
#[derive(Debug)]
pub struct HandleAllocator {
    next: AtomicU64,
}

impl HandleAllocator {
    /// Creates an allocator whose first handle is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Issues a fresh handle.
    #[must_use]
    pub fn allocate(&self) -> Handle {
        Handle(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns true if `handle` was issued by this allocator.
    #[must_use]
    pub fn issued(&self, handle: Handle) -> bool {
        handle.0 >= 1 && handle.0 < self.next.load(Ordering::Relaxed)
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors raised by [`ResourceRegistry::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A resource is already registered under the handle.
    #[error("handle {handle} is already registered")]
    Occupied {
        /// Handle that was already in use.
        handle: Handle,
    },
    /// The handle was never issued by the registry's allocator.
    #[error("handle {handle} was never allocated")]
    Unallocated {
        /// Handle that did not come from the allocator.
        handle: Handle,
    },
}

/// Owned mapping from handles to resources.
#[derive(Debug)]
pub struct ResourceRegistry<R> {
    allocator: Arc<HandleAllocator>,
    entries: HashMap<Handle, R>,
}

impl<R> ResourceRegistry<R> {
    /// Creates an empty registry with its own allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_allocator(Arc::new(HandleAllocator::new()))
    }

    /// Creates an empty registry drawing handles from a shared allocator.
    #[must_use]
    pub fn with_allocator(allocator: Arc<HandleAllocator>) -> Self {
        Self {
            allocator,
            entries: HashMap::new(),
        }
    }

    /// Shared allocator, for callers that reserve handles off the host context.
    #[must_use]
    pub fn allocator(&self) -> Arc<HandleAllocator> {
        Arc::clone(&self.allocator)
    }

    /// Issues a fresh handle without registering anything under it.
    #[must_use]
    pub fn allocate(&self) -> Handle {
        self.allocator.allocate()
    }

    /// Registers `resource` under a previously allocated, unused handle.
    ///
    /// # Errors
    ///
    /// Rejects handles that are already registered and handles the allocator
    /// never issued. The registry is left unchanged in both cases.
    pub fn insert(&mut self, handle: Handle, resource: R) -> Result<(), RegistryError> {
        if !self.allocator.issued(handle) {
            return Err(RegistryError::Unallocated { handle });
        }
        if self.entries.contains_key(&handle) {
            return Err(RegistryError::Occupied { handle });
        }
        self.entries.insert(handle, resource);
        Ok(())
    }

    /// Allocates a handle and registers `resource` under it.
    pub fn register(&mut self, resource: R) -> Handle {
        let handle = self.allocate();
        self.entries.insert(handle, resource);
        handle
    }

    /// Borrows the resource registered under `handle`.
    #[must_use]
    pub fn lookup(&self, handle: Handle) -> Option<&R> {
        self.entries.get(&handle)
    }

    /// Mutably borrows the resource registered under `handle`.
    pub fn lookup_mut(&mut self, handle: Handle) -> Option<&mut R> {
        self.entries.get_mut(&handle)
    }

    /// Detaches the resource so the caller can tear it down.
    pub fn remove(&mut self, handle: Handle) -> Option<R> {
        self.entries.remove(&handle)
    }

    /// Returns true if a resource is registered under `handle`.
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Number of live resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live handles in ascending order.
    #[must_use]
    pub fn handles(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.entries.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    /// Removes every resource, returning them in handle order.
    pub fn drain(&mut self) -> Vec<(Handle, R)> {
        let mut drained: Vec<(Handle, R)> = self.entries.drain().collect();
        drained.sort_unstable_by_key(|(handle, _)| *handle);
        drained
    }
}

impl<R> Default for ResourceRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}
