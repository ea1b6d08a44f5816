use std::ptr::NonNull;

/// A slot handed out by [`SizeClassPool::allocate()`][crate::SizeClassPool::allocate].
///
/// Identifies the slot by address and remembers the slot's generation at the time it was
/// allocated. The generation lets the pool reject a stale copy of this value after the slot
/// has been released and allocated again.
///
/// The memory behind the pointer is uninitialized when the slot is handed out.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Slot {
    ptr: NonNull<u8>,
    generation: u32,
}

impl Slot {
    #[must_use]
    pub(crate) fn new(ptr: NonNull<u8>, generation: u32) -> Self {
        Self { ptr, generation }
    }

    /// Returns a pointer to the first byte of the slot.
    #[must_use]
    pub fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Returns the generation of the slot at the time it was allocated.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}
