use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::Slot;

/// A typed reference to one slot allocated by a [`PoolAllocator`][crate::PoolAllocator].
///
/// The slot is sized and aligned for one `T` but is uninitialized when handed out. Writing
/// the value and reading it back goes through [`ptr()`][Self::ptr] under the caller's own
/// `unsafe` contract.
///
/// Handles can be copied freely. Releasing a handle through
/// [`PoolAllocator::release()`][crate::PoolAllocator::release] empties that handle; any other
/// copies become stale and are rejected if they are released later, even after the slot has
/// been handed out again.
///
/// # Example
///
/// ```rust
/// use std::num::NonZero;
///
/// use size_class_pool::{Handle, PoolAllocator};
///
/// let mut allocator = PoolAllocator::new(NonZero::new(4).unwrap());
///
/// let mut handle: Handle<u32> = allocator.allocate().unwrap();
/// assert!(!handle.is_empty());
///
/// allocator.release(&mut handle).unwrap();
/// assert!(handle.is_empty());
/// ```
pub struct Handle<T> {
    slot: Option<Slot>,

    _type: PhantomData<*mut T>,
}

impl<T> Handle<T> {
    #[must_use]
    pub(crate) fn new(slot: Slot) -> Self {
        Self {
            slot: Some(slot),
            _type: PhantomData,
        }
    }

    /// Creates a handle that does not refer to any slot.
    ///
    /// Releasing an empty handle fails with
    /// [`Error::InvalidArgument`][crate::Error::InvalidArgument].
    #[must_use]
    pub fn empty() -> Self {
        Self {
            slot: None,
            _type: PhantomData,
        }
    }

    /// Returns `true` if the handle does not refer to a slot, either because it was created
    /// empty or because it has been released.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }

    /// Returns a pointer to the slot, sized and aligned for one `T`.
    ///
    /// The pointee is uninitialized until the caller writes a `T` to it. The pointer must not
    /// be used after the slot is released or the allocator is dropped.
    ///
    /// # Panics
    ///
    /// Panics if the handle is empty.
    #[must_use]
    pub fn ptr(&self) -> NonNull<T> {
        self.slot
            .expect("cannot access the slot of an empty handle")
            .ptr()
            .cast()
    }

    #[must_use]
    pub(crate) fn slot(&self) -> Option<Slot> {
        self.slot
    }

    pub(crate) fn clear(&mut self) {
        self.slot = None;
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot
    }
}

impl<T> Eq for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("type", &type_name::<T>())
            .field("slot", &self.slot)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(Handle<u64>: Copy, fmt::Debug, Default);
    assert_not_impl_any!(Handle<u64>: Send, Sync);

    #[test]
    fn empty_handle_is_empty() {
        let handle = Handle::<u64>::empty();

        assert!(handle.is_empty());
        assert!(handle.slot().is_none());
        assert_eq!(handle, Handle::default());
    }

    #[test]
    #[should_panic]
    fn empty_handle_ptr_panics() {
        _ = Handle::<u64>::empty().ptr();
    }

    #[test]
    fn clear_empties_only_this_copy() {
        let mut value = 0_u64;
        let slot = Slot::new(NonNull::from(&mut value).cast(), 3);

        let mut handle = Handle::<u64>::new(slot);
        let copy = handle;

        handle.clear();

        assert!(handle.is_empty());
        assert!(!copy.is_empty());
        assert_eq!(copy.slot(), Some(slot));
        assert_eq!(copy.ptr(), NonNull::from(&mut value));
    }

    #[test]
    fn debug_names_the_type() {
        let rendered = format!("{:?}", Handle::<u32>::empty());

        assert!(rendered.contains("u32"));
    }
}
