/// Determines what happens when a pool is dropped while some of its slots are still allocated.
///
/// The pool never runs destructors for slot contents, so by default it simply releases its
/// buffer, leaving any outstanding handles dangling.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use size_class_pool::{DropPolicy, PoolAllocator};
///
/// // The drop policy is set at allocator creation time and applies to every pool.
/// let allocator = PoolAllocator::builder()
///     .pool_capacity(NonZero::new(16).unwrap())
///     .drop_policy(DropPolicy::MustNotLeakSlots)
///     .build()
///     .unwrap();
/// # drop(allocator);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// The pool releases its buffer even if slots are still allocated. This is the default.
    #[default]
    MayLeakSlots,

    /// The pool panics if any slot is still allocated when it is dropped.
    ///
    /// Useful for catching handles that were never released, as every such handle
    /// dangles once the pool is gone.
    MustNotLeakSlots,
}
