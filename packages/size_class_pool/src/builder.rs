use std::alloc::Layout;
use std::any::TypeId;
use std::cell::Cell;
use std::marker::PhantomData;
use std::num::NonZero;

use crate::{DropPolicy, PoolAllocator, Result};

/// Slot count of each pool when no capacity is configured.
pub(crate) const DEFAULT_POOL_CAPACITY: NonZero<usize> = NonZero::new(10).expect("10 is non-zero");

/// Builder for creating an instance of [`PoolAllocator`].
///
/// All settings are optional.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use size_class_pool::{DropPolicy, PoolAllocator};
///
/// let allocator = PoolAllocator::builder()
///     .pool_capacity(NonZero::new(1000).unwrap())
///     .drop_policy(DropPolicy::MustNotLeakSlots)
///     .preallocate::<u64>()
///     .preallocate::<[u8; 32]>()
///     .build()
///     .unwrap();
///
/// assert_eq!(allocator.pool_count(), 2);
/// assert_eq!(allocator.capacity_of::<u64>(), 1000);
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) and can be safely transferred between threads,
/// allowing allocator configuration to happen on different threads than where the allocator
/// is used. However, it is not thread-safe ([`Sync`]) as it contains mutable configuration state.
#[derive(Debug)]
#[must_use]
pub struct PoolAllocatorBuilder {
    pool_capacity: NonZero<usize>,
    drop_policy: DropPolicy,

    /// Pools to create when the allocator is built instead of on first use.
    preallocated: Vec<(TypeId, &'static str, Layout)>,

    // Prevents Sync while allowing Send - builders are thread-mobile but not thread-safe
    _not_sync: PhantomData<Cell<()>>,
}

impl PoolAllocatorBuilder {
    pub(crate) fn new() -> Self {
        Self {
            pool_capacity: DEFAULT_POOL_CAPACITY,
            drop_policy: DropPolicy::default(),
            preallocated: Vec::new(),
            _not_sync: PhantomData,
        }
    }

    /// Sets the number of slots in every pool the allocator creates.
    ///
    /// Pools never grow, so this is the maximum number of simultaneously allocated
    /// items of any one type.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::num::NonZero;
    ///
    /// use size_class_pool::PoolAllocator;
    ///
    /// let allocator = PoolAllocator::builder()
    ///     .pool_capacity(NonZero::new(100).unwrap())
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(allocator.pool_capacity(), 100);
    /// ```
    pub fn pool_capacity(mut self, capacity: NonZero<usize>) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// Sets the [drop policy][DropPolicy] for every pool. This governs how to treat
    /// slots that are still allocated when the allocator is dropped.
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Creates the pool for `T` when the allocator is built, so the first allocation
    /// of a `T` does not pay for acquiring the pool's buffer.
    ///
    /// Requesting the same type more than once creates a single pool.
    pub fn preallocate<T: 'static>(mut self) -> Self {
        self.preallocated.push((
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
            Layout::new::<T>(),
        ));
        self
    }

    /// Builds the allocator with the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if one of the pools requested via [`preallocate()`][Self::preallocate]
    /// cannot be created, either because the type is zero-sized
    /// ([`Error::InvalidArgument`][crate::Error::InvalidArgument]) or because its buffer could
    /// not be allocated ([`Error::AllocationFailed`][crate::Error::AllocationFailed]).
    pub fn build(self) -> Result<PoolAllocator> {
        let mut allocator = PoolAllocator::new_inner(self.pool_capacity, self.drop_policy);

        for (type_id, type_name, layout) in self.preallocated {
            allocator.pool_for_key(type_id, type_name, layout)?;
        }

        Ok(allocator)
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::Error;

    assert_impl_all!(PoolAllocatorBuilder: Send, std::fmt::Debug);
    assert_not_impl_any!(PoolAllocatorBuilder: Sync);

    #[test]
    fn builder_new_creates_default_state() {
        let builder = PoolAllocatorBuilder::new();

        assert_eq!(builder.pool_capacity, DEFAULT_POOL_CAPACITY);
        assert_eq!(builder.drop_policy, DropPolicy::default());
        assert!(builder.preallocated.is_empty());
    }

    #[test]
    fn pool_capacity_sets_capacity() {
        let builder = PoolAllocatorBuilder::new().pool_capacity(NonZero::new(42).unwrap());

        assert_eq!(builder.pool_capacity.get(), 42);
    }

    #[test]
    fn drop_policy_sets_policy() {
        let builder = PoolAllocatorBuilder::new().drop_policy(DropPolicy::MustNotLeakSlots);
        assert_eq!(builder.drop_policy, DropPolicy::MustNotLeakSlots);

        let builder = PoolAllocatorBuilder::new().drop_policy(DropPolicy::MayLeakSlots);
        assert_eq!(builder.drop_policy, DropPolicy::MayLeakSlots);
    }

    #[test]
    fn build_without_preallocation_has_no_pools() {
        let allocator = PoolAllocatorBuilder::new().build().unwrap();

        assert_eq!(allocator.pool_count(), 0);
        assert_eq!(allocator.pool_capacity(), DEFAULT_POOL_CAPACITY.get());
    }

    #[test]
    fn preallocate_creates_pools_eagerly() {
        let allocator = PoolAllocatorBuilder::new()
            .pool_capacity(NonZero::new(8).unwrap())
            .preallocate::<u64>()
            .preallocate::<[u8; 16]>()
            .preallocate::<[u8; 32]>()
            .build()
            .unwrap();

        assert_eq!(allocator.pool_count(), 3);
        assert!(allocator.has_pool_for::<u64>());
        assert!(allocator.has_pool_for::<[u8; 16]>());
        assert!(allocator.has_pool_for::<[u8; 32]>());
        assert_eq!(allocator.capacity_of::<[u8; 16]>(), 8);
        assert!(allocator.is_empty());
    }

    #[test]
    fn preallocate_same_type_twice_creates_one_pool() {
        let allocator = PoolAllocatorBuilder::new()
            .preallocate::<u64>()
            .preallocate::<u64>()
            .build()
            .unwrap();

        assert_eq!(allocator.pool_count(), 1);
    }

    #[test]
    fn preallocate_zero_sized_type_fails_build() {
        let result = PoolAllocatorBuilder::new().preallocate::<()>().build();

        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
    }
}
