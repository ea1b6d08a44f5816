use std::alloc::Layout;
use std::any::{TypeId, type_name};
use std::collections::hash_map::Entry;
use std::fmt;
use std::num::NonZero;

use foldhash::{HashMap, HashMapExt};
use tracing::debug;

use crate::{DropPolicy, Error, Handle, PoolAllocatorBuilder, Result, SizeClassPool};

/// Hands out fixed-size slots from a set of [`SizeClassPool`]s, one pool per element type.
///
/// Pools are created on the first allocation of each type (or up front via
/// [`PoolAllocatorBuilder::preallocate()`]) and all have the same capacity. A pool never
/// grows: once it is exhausted, allocations of that type fail until a slot is released.
///
/// Pools are keyed by the element type rather than its size, so two unrelated types that
/// happen to have the same size never share slots.
///
/// Allocated slots are uninitialized. The allocator never runs constructors or destructors.
///
/// # Example
///
/// ```rust
/// use std::num::NonZero;
///
/// use size_class_pool::{Error, PoolAllocator};
///
/// let mut allocator = PoolAllocator::new(NonZero::new(2).unwrap());
///
/// let mut first = allocator.allocate::<u64>().unwrap();
/// let _second = allocator.allocate::<u64>().unwrap();
///
/// // The pool for u64 is now exhausted.
/// assert!(matches!(
///     allocator.allocate::<u64>(),
///     Err(Error::Exhausted { capacity: 2 })
/// ));
///
/// // SAFETY: The slot is allocated to us and sized and aligned for a u64.
/// unsafe { first.ptr().write(42) };
///
/// allocator.release(&mut first).unwrap();
/// assert!(first.is_empty());
///
/// // Releasing an emptied handle is rejected.
/// assert!(matches!(
///     allocator.release(&mut first),
///     Err(Error::InvalidArgument { .. })
/// ));
/// ```
///
/// # Thread safety
///
/// This type is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]).
pub struct PoolAllocator {
    /// Slot count of every pool created by this allocator.
    pool_capacity: NonZero<usize>,

    /// One pool per element type. We use foldhash for better performance with small hash tables.
    pools: HashMap<TypeId, SizeClassPool>,

    drop_policy: DropPolicy,
}

impl PoolAllocator {
    /// Creates an allocator whose pools each hold `pool_capacity` slots.
    ///
    /// No pools are created until the first allocation of each type. For more
    /// configuration options, use [`PoolAllocator::builder()`].
    #[must_use]
    pub fn new(pool_capacity: NonZero<usize>) -> Self {
        Self::new_inner(pool_capacity, DropPolicy::default())
    }

    /// Creates a builder for configuring and constructing a [`PoolAllocator`].
    pub fn builder() -> PoolAllocatorBuilder {
        PoolAllocatorBuilder::new()
    }

    #[must_use]
    pub(crate) fn new_inner(pool_capacity: NonZero<usize>, drop_policy: DropPolicy) -> Self {
        Self {
            pool_capacity,
            pools: HashMap::new(),
            drop_policy,
        }
    }

    /// Allocates one uninitialized slot sized and aligned for a `T`.
    ///
    /// The slot is exclusively owned by the caller until the handle is passed to
    /// [`release()`][Self::release]. Initializing the slot is up to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Exhausted`] if every slot of the pool for `T` is allocated.
    ///
    /// Returns [`Error::InvalidArgument`] if `T` is zero-sized.
    ///
    /// Returns [`Error::AllocationFailed`] if this is the first allocation of a `T` and the
    /// buffer for its pool could not be allocated.
    pub fn allocate<T: 'static>(&mut self) -> Result<Handle<T>> {
        let slot = self.pool_for::<T>()?.allocate()?;

        Ok(Handle::new(slot))
    }

    /// Returns the slot referenced by `handle` to its pool and empties the handle.
    ///
    /// The contents of the slot are not dropped. On error, the handle is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the handle is empty or was not allocated by
    /// this allocator.
    ///
    /// Returns [`Error::DoubleFree`] if the slot has already been released through another
    /// copy of the handle, even if the slot has been allocated again since.
    pub fn release<T: 'static>(&mut self, handle: &mut Handle<T>) -> Result<()> {
        let Some(slot) = handle.slot() else {
            debug!(element_type = type_name::<T>(), "rejected release of empty handle");

            return Err(Error::InvalidArgument {
                reason: "handle is empty",
            });
        };

        let Some(pool) = self.pools.get_mut(&TypeId::of::<T>()) else {
            debug!(
                element_type = type_name::<T>(),
                "rejected release for type without a pool"
            );

            return Err(Error::InvalidArgument {
                reason: "no pool exists for this element type",
            });
        };

        pool.release(slot)?;
        handle.clear();

        Ok(())
    }

    /// The number of slots in every pool this allocator creates.
    #[must_use]
    pub fn pool_capacity(&self) -> usize {
        self.pool_capacity.get()
    }

    /// The number of pools created so far.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Returns `true` if a pool for `T` has been created.
    #[must_use]
    pub fn has_pool_for<T: 'static>(&self) -> bool {
        self.pools.contains_key(&TypeId::of::<T>())
    }

    /// The number of allocated slots across all pools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.values().map(SizeClassPool::len).sum()
    }

    /// Returns `true` if no slot of any pool is allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.values().all(SizeClassPool::is_empty)
    }

    /// The number of allocated slots of type `T`.
    #[must_use]
    pub fn len_of<T: 'static>(&self) -> usize {
        self.pools
            .get(&TypeId::of::<T>())
            .map_or(0, SizeClassPool::len)
    }

    /// The capacity of the pool for `T`, or 0 if no pool for `T` has been created yet.
    #[must_use]
    pub fn capacity_of<T: 'static>(&self) -> usize {
        self.pools
            .get(&TypeId::of::<T>())
            .map_or(0, SizeClassPool::capacity)
    }

    fn pool_for<T: 'static>(&mut self) -> Result<&mut SizeClassPool> {
        self.pool_for_key(TypeId::of::<T>(), type_name::<T>(), Layout::new::<T>())
    }

    /// Returns the pool for the given type, creating it if it does not exist yet.
    ///
    /// This is the only place pools are created.
    pub(crate) fn pool_for_key(
        &mut self,
        type_id: TypeId,
        type_name: &'static str,
        layout: Layout,
    ) -> Result<&mut SizeClassPool> {
        match self.pools.entry(type_id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let pool = SizeClassPool::new(layout, self.pool_capacity, self.drop_policy)
                    .inspect_err(|error| {
                        debug!(element_type = type_name, %error, "failed to create pool");
                    })?;

                debug!(
                    element_type = type_name,
                    element_size = layout.size(),
                    "registered pool"
                );

                Ok(entry.insert(pool))
            }
        }
    }
}

impl Drop for PoolAllocator {
    fn drop(&mut self) {
        // The pools release their buffers as they are dropped after this.
        debug!(
            pools = self.pools.len(),
            outstanding_slots = self.len(),
            "tearing down allocator"
        );
    }
}

impl fmt::Debug for PoolAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("pool_capacity", &self.pool_capacity)
            .field("pools", &self.pools)
            .field("drop_policy", &self.drop_policy)
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(PoolAllocator: Send, fmt::Debug);
    assert_not_impl_any!(PoolAllocator: Sync);

    fn allocator(capacity: usize) -> PoolAllocator {
        PoolAllocator::new(NonZero::new(capacity).unwrap())
    }

    #[test]
    fn allocate_write_read_release() {
        let mut allocator = allocator(4);

        let mut handle = allocator.allocate::<u64>().unwrap();

        unsafe {
            handle.ptr().write(0xdead_beef);
            assert_eq!(handle.ptr().read(), 0xdead_beef);
        }

        assert_eq!(allocator.len(), 1);
        assert_eq!(allocator.len_of::<u64>(), 1);

        allocator.release(&mut handle).unwrap();

        assert!(handle.is_empty());
        assert!(allocator.is_empty());
    }

    #[test]
    fn pools_are_created_lazily() {
        let mut allocator = allocator(4);

        assert_eq!(allocator.pool_count(), 0);
        assert!(!allocator.has_pool_for::<u64>());
        assert_eq!(allocator.capacity_of::<u64>(), 0);

        let _a = allocator.allocate::<u64>().unwrap();
        let _b = allocator.allocate::<u64>().unwrap();

        assert_eq!(allocator.pool_count(), 1);
        assert!(allocator.has_pool_for::<u64>());
        assert_eq!(allocator.capacity_of::<u64>(), 4);

        let _c = allocator.allocate::<u32>().unwrap();

        assert_eq!(allocator.pool_count(), 2);
    }

    #[test]
    fn same_size_types_get_separate_pools() {
        #[derive(Clone, Copy)]
        struct Meters(u64);

        #[derive(Clone, Copy)]
        struct Seconds(u64);

        let mut allocator = allocator(1);

        let meters = allocator.allocate::<Meters>().unwrap();
        let seconds = allocator.allocate::<Seconds>().unwrap();

        assert_eq!(allocator.pool_count(), 2);
        assert_ne!(meters.ptr().cast::<u8>(), seconds.ptr().cast::<u8>());

        // Each pool is exhausted independently.
        assert!(matches!(
            allocator.allocate::<Meters>(),
            Err(Error::Exhausted { .. })
        ));
        assert!(matches!(
            allocator.allocate::<u64>(),
            Ok(handle) if !handle.is_empty()
        ));

        unsafe {
            meters.ptr().write(Meters(5));
            seconds.ptr().write(Seconds(7));
            assert_eq!(meters.ptr().read().0, 5);
            assert_eq!(seconds.ptr().read().0, 7);
        }
    }

    #[test]
    fn releasing_empty_handle_is_invalid_argument() {
        let mut allocator = allocator(4);
        let mut handle = Handle::<u64>::empty();

        assert!(matches!(
            allocator.release(&mut handle),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn releasing_without_pool_is_invalid_argument() {
        let mut other = allocator(4);
        let mut handle = other.allocate::<u64>().unwrap();

        let mut allocator = allocator(4);

        assert!(matches!(
            allocator.release(&mut handle),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(!handle.is_empty());

        other.release(&mut handle).unwrap();
    }

    #[test]
    fn releasing_handle_of_other_allocator_is_invalid_argument() {
        let mut other = allocator(4);
        let mut foreign = other.allocate::<u64>().unwrap();

        let mut allocator = allocator(4);
        let _local = allocator.allocate::<u64>().unwrap();

        assert!(matches!(
            allocator.release(&mut foreign),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(!foreign.is_empty());
        assert_eq!(allocator.len(), 1);
    }

    #[test]
    fn failed_release_leaves_handle_unchanged() {
        let mut allocator = allocator(4);

        let mut handle = allocator.allocate::<u64>().unwrap();
        let mut copy = handle;

        allocator.release(&mut handle).unwrap();

        assert!(matches!(
            allocator.release(&mut copy),
            Err(Error::DoubleFree { .. })
        ));
        assert!(!copy.is_empty());
    }

    #[test]
    fn zero_sized_type_is_invalid_argument() {
        let mut allocator = allocator(4);

        assert!(matches!(
            allocator.allocate::<()>(),
            Err(Error::InvalidArgument { .. })
        ));
        assert_eq!(allocator.pool_count(), 0);
    }

    #[test]
    fn exhaustion_is_reported_per_type() {
        let mut allocator = allocator(2);

        let _a = allocator.allocate::<u32>().unwrap();
        let _b = allocator.allocate::<u32>().unwrap();

        assert_eq!(
            allocator.allocate::<u32>(),
            Err(Error::Exhausted { capacity: 2 })
        );
        assert_eq!(allocator.len_of::<u32>(), 2);
        assert_eq!(allocator.len_of::<u64>(), 0);
    }

    #[test]
    #[should_panic]
    fn must_not_leak_slots_panics_on_teardown() {
        let mut allocator = PoolAllocator::builder()
            .drop_policy(DropPolicy::MustNotLeakSlots)
            .build()
            .unwrap();

        let _leaked = allocator.allocate::<u64>().unwrap();
    }

    #[test]
    fn may_leak_slots_tears_down_quietly() {
        let mut allocator = allocator(4);

        let _leaked = allocator.allocate::<u64>().unwrap();
        let _also_leaked = allocator.allocate::<[u8; 100]>().unwrap();

        drop(allocator);
    }

    #[test]
    fn moves_between_threads() {
        let mut allocator = allocator(4);
        let mut handle = allocator.allocate::<u64>().unwrap();

        let mut allocator = std::thread::spawn(move || {
            assert_eq!(allocator.len(), 1);
            allocator
        })
        .join()
        .unwrap();

        allocator.release(&mut handle).unwrap();
    }
}
