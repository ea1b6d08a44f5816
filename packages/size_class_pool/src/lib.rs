#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Fixed-capacity memory pools that hand out uninitialized, fixed-size slots without calling
//! the global allocator per allocation.
//!
//! This crate provides [`PoolAllocator`], which keeps one [`SizeClassPool`] per element type
//! and dispatches typed allocations to the right pool, and [`SizeClassPool`] itself for
//! callers that want to manage a single pool directly.
//!
//! # Key Features
//!
//! - **One buffer per pool**: Each pool acquires a single contiguous buffer up front, holding
//!   the slots and all of the pool's bookkeeping.
//! - **Zero per-slot link overhead**: Free slots store the free list in their own bytes.
//! - **Occupancy bitmap**: One bit per slot tells allocated slots from free ones, which lets
//!   the pool reject double frees instead of corrupting its free list.
//! - **Stale handle detection**: Every slot carries a generation number, so a copy of a
//!   released handle cannot release the slot after it has been handed out again.
//! - **LIFO reuse**: The most recently released slot is the next one allocated.
//! - **Bounded memory**: Pools never grow. Exhaustion is reported as [`Error::Exhausted`].
//! - **Type-keyed pools**: Two different types never share a pool, even if they have the
//!   same size.
//!
//! # Example
//!
//! ```rust
//! use std::num::NonZero;
//!
//! use size_class_pool::{Error, PoolAllocator};
//!
//! struct Dummy {
//!     count: u64,
//!     value: f64,
//! }
//!
//! let mut allocator = PoolAllocator::new(NonZero::new(100).unwrap());
//!
//! let mut handle = allocator.allocate::<Dummy>().unwrap();
//!
//! // The slot is uninitialized; the caller writes the value.
//! // SAFETY: The slot is allocated to us and sized and aligned for a Dummy.
//! unsafe {
//!     handle.ptr().write(Dummy {
//!         count: 1,
//!         value: 2.5,
//!     })
//! };
//!
//! // SAFETY: We initialized the slot above and have not released it.
//! let count = unsafe { handle.ptr().as_ref().count };
//! assert_eq!(count, 1);
//!
//! // Releasing empties the handle; releasing it again is rejected.
//! allocator.release(&mut handle).unwrap();
//! assert!(matches!(
//!     allocator.release(&mut handle),
//!     Err(Error::InvalidArgument { .. })
//! ));
//! ```
//!
//! # Thread safety
//!
//! Pools and allocators are thread-mobile ([`Send`]) but not thread-safe ([`Sync`]).
//! Wrap them in a mutex to share them between threads.

mod allocator;
mod builder;
mod drop_policy;
mod error;
mod handle;
mod layout;
mod pool;
mod slot;

pub use allocator::PoolAllocator;
pub use builder::PoolAllocatorBuilder;
pub use drop_policy::*;
pub use error::*;
pub use handle::Handle;
pub(crate) use layout::*;
pub use pool::SizeClassPool;
pub use slot::Slot;
