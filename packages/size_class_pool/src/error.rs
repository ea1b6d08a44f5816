use thiserror::Error;

/// Errors that can occur when allocating or releasing pool slots.
///
/// None of these leave a pool in a different state than before the failed call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The pool has no free slots left. Pools never grow, so this persists until a slot
    /// is released back to the pool.
    #[error("pool of capacity {capacity} is exhausted")]
    Exhausted {
        /// The fixed capacity of the exhausted pool.
        capacity: usize,
    },

    /// The caller passed a handle or address that the pool cannot accept.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// A human-readable description of the problem.
        reason: &'static str,
    },

    /// The slot referenced by the handle is not currently allocated to the holder
    /// of that handle, either because it was already released or because it was
    /// released and handed out again since the handle was created.
    #[error("slot {index} is not allocated to this handle (double free)")]
    DoubleFree {
        /// Index of the slot within its pool.
        index: usize,
    },

    /// The memory backing a new pool could not be acquired.
    #[error("failed to allocate pool buffer of {size} bytes aligned to {align}")]
    AllocationFailed {
        /// Requested buffer size in bytes. `usize::MAX` if the size calculation overflowed.
        size: usize,

        /// Requested buffer alignment in bytes.
        align: usize,
    },
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug, Clone);

    #[test]
    fn messages_name_the_problem() {
        assert_eq!(
            Error::Exhausted { capacity: 100 }.to_string(),
            "pool of capacity 100 is exhausted"
        );
        assert_eq!(
            Error::InvalidArgument {
                reason: "handle is empty"
            }
            .to_string(),
            "invalid argument: handle is empty"
        );
        assert_eq!(
            Error::DoubleFree { index: 7 }.to_string(),
            "slot 7 is not allocated to this handle (double free)"
        );
        assert_eq!(
            Error::AllocationFailed { size: 64, align: 8 }.to_string(),
            "failed to allocate pool buffer of 64 bytes aligned to 8"
        );
    }
}
