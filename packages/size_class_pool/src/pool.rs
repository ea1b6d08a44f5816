use std::alloc::{Layout, alloc, dealloc};
use std::num::NonZero;
use std::ptr::NonNull;
use std::{fmt, thread};

use tracing::{debug, trace};

use crate::{DropPolicy, Error, PoolLayoutInfo, Result, Slot};

/// A fixed-capacity pool of equally sized, uninitialized memory slots.
///
/// All slots live in one contiguous buffer acquired when the pool is created. The buffer also
/// holds the pool's bookkeeping: the head of a free list threaded through the free slots
/// themselves, a generation number per slot and an occupancy bitmap with one bit per slot.
///
/// The pool never grows. Once every slot is allocated, [`allocate()`][Self::allocate] returns
/// [`Error::Exhausted`] until a slot is released. Released slots are reused in LIFO order.
///
/// The pool does not know or care what callers store in the slots and never runs destructors
/// for slot contents.
///
/// # Out of band access
///
/// The pool does not create or keep references to slot memory, so it is valid to access slots
/// via the pointers it hands out even when not holding a reference to the pool.
///
/// # Example
///
/// ```rust
/// use std::alloc::Layout;
/// use std::num::NonZero;
///
/// use size_class_pool::{DropPolicy, SizeClassPool};
///
/// let mut pool = SizeClassPool::new(
///     Layout::new::<u64>(),
///     NonZero::new(2).unwrap(),
///     DropPolicy::default(),
/// )
/// .unwrap();
///
/// let slot = pool.allocate().unwrap();
///
/// // SAFETY: The slot is allocated to us and large and aligned enough for a u64.
/// unsafe { slot.ptr().cast::<u64>().write(42) };
///
/// pool.release(slot).unwrap();
/// assert!(pool.is_empty());
/// ```
///
/// # Thread safety
///
/// This type is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]).
pub struct SizeClassPool {
    /// Layout of the items the slots are sized for. The size is the pool's size class.
    item_layout: Layout,

    /// Number of slots in the pool, fixed at creation.
    capacity: NonZero<usize>,

    /// Precomputed offsets of the regions within the buffer.
    layout_info: PoolLayoutInfo,

    /// Start of the buffer. Slot 0 starts here.
    buffer: NonNull<u8>,

    /// Number of currently allocated slots.
    count: usize,

    drop_policy: DropPolicy,
}

impl SizeClassPool {
    /// Creates a pool of `capacity` slots, each able to hold one item of `item_layout`.
    ///
    /// The buffer is acquired from the global allocator here and nowhere else.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `item_layout` has zero size.
    ///
    /// Returns [`Error::AllocationFailed`] if the buffer could not be allocated.
    pub fn new(
        item_layout: Layout,
        capacity: NonZero<usize>,
        drop_policy: DropPolicy,
    ) -> Result<Self> {
        if item_layout.size() == 0 {
            return Err(Error::InvalidArgument {
                reason: "element size must be non-zero",
            });
        }

        let layout_info = PoolLayoutInfo::calculate(item_layout, capacity)?;
        let buffer_layout = layout_info.buffer_layout();

        // SAFETY: The buffer layout is never zero-sized because it contains at least one slot.
        let buffer = NonNull::new(unsafe { alloc(buffer_layout) }).ok_or(
            Error::AllocationFailed {
                size: buffer_layout.size(),
                align: buffer_layout.align(),
            },
        )?;

        let mut pool = Self {
            item_layout,
            capacity,
            layout_info,
            buffer,
            count: 0,
            drop_policy,
        };

        // Every slot links to the one after it. The last one links to `capacity`,
        // which is the end-of-list sentinel.
        for index in 0..capacity.get() {
            // Cannot overflow because index < capacity.
            pool.write_link(index, index.wrapping_add(1));
        }

        pool.set_head(0);
        pool.clear_bookkeeping();

        debug!(
            element_size = item_layout.size(),
            element_align = item_layout.align(),
            capacity = capacity.get(),
            buffer_bytes = buffer_layout.size(),
            "created size class pool"
        );

        #[cfg(debug_assertions)]
        pool.integrity_check();

        Ok(pool)
    }

    /// The size in bytes of the items this pool is sized for. This is the pool's size class.
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.item_layout.size()
    }

    /// The layout of the items this pool is sized for.
    #[must_use]
    pub fn item_layout(&self) -> Layout {
        self.item_layout
    }

    /// The number of slots in the pool. Never changes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// The number of currently allocated slots.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinite loops in callers that drain the pool.
    pub fn len(&self) -> usize {
        self.count
    }

    /// The number of slots available for allocation.
    #[must_use]
    pub fn free_count(&self) -> usize {
        // Cannot underflow because count never exceeds capacity.
        self.capacity.get().wrapping_sub(self.count)
    }

    /// Returns `true` if no slots are allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns `true` if every slot is allocated, so the next allocation will fail.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.head() >= self.capacity.get()
    }

    /// Returns `true` if `ptr` points to the start of one of this pool's slots,
    /// regardless of whether that slot is currently allocated.
    #[must_use]
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.index_of(ptr).is_ok()
    }

    /// Returns `true` if the slot at `index` is currently allocated.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not less than the capacity of the pool.
    #[must_use]
    pub fn is_allocated(&self, index: usize) -> bool {
        let (byte_ptr, mask) = self.bitmap_location(index);

        // SAFETY: bitmap_location() only returns pointers into the initialized bitmap.
        let byte = unsafe { byte_ptr.read() };

        byte & mask != 0
    }

    /// Takes a free slot from the pool.
    ///
    /// The slot most recently released is the one handed out. The slot's memory is
    /// uninitialized and exclusively owned by the caller until it is passed to
    /// [`release()`][Self::release].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Exhausted`] if every slot is already allocated. The pool is unchanged.
    pub fn allocate(&mut self) -> Result<Slot> {
        let index = self.head();

        if index >= self.capacity.get() {
            debug!(
                element_size = self.item_layout.size(),
                capacity = self.capacity.get(),
                "pool exhausted"
            );

            return Err(Error::Exhausted {
                capacity: self.capacity.get(),
            });
        }

        debug_assert!(
            !self.is_allocated(index),
            "free list head {index} points to an allocated slot"
        );

        // Pop the slot off the free list before the caller can overwrite the link.
        let next = self.read_link(index);
        self.set_allocated(index, true);
        self.set_head(next);

        // Cannot overflow because count never exceeds capacity.
        self.count = self.count.wrapping_add(1);

        let generation = self.generation(index);

        trace!(index, generation, "allocated slot");

        #[cfg(debug_assertions)]
        self.integrity_check();

        Ok(Slot::new(self.slot_ptr(index), generation))
    }

    /// Returns a slot to the pool, making it the next slot to be allocated.
    ///
    /// The contents of the slot are not dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the slot does not point to the start of one of
    /// this pool's slots.
    ///
    /// Returns [`Error::DoubleFree`] if the slot is already free, or if it has been released
    /// and allocated again since `slot` was handed out.
    ///
    /// In all error cases the pool is unchanged.
    pub fn release(&mut self, slot: Slot) -> Result<()> {
        let index = self.index_of(slot.ptr()).inspect_err(|error| {
            debug!(%error, "rejected release of foreign slot");
        })?;

        if !self.is_allocated(index) {
            debug!(index, "rejected release of free slot");
            return Err(Error::DoubleFree { index });
        }

        let generation = self.generation(index);

        if generation != slot.generation() {
            debug!(
                index,
                current_generation = generation,
                handle_generation = slot.generation(),
                "rejected release of stale slot"
            );
            return Err(Error::DoubleFree { index });
        }

        // Push the slot onto the free list.
        let head = self.head();
        self.set_allocated(index, false);
        self.write_link(index, head);
        self.set_head(index);
        self.set_generation(index, generation.wrapping_add(1));

        // Cannot underflow because the slot was allocated.
        self.count = self.count.wrapping_sub(1);

        trace!(index, "released slot");

        #[cfg(debug_assertions)]
        self.integrity_check();

        Ok(())
    }

    /// Resolves a slot pointer to its index, rejecting pointers that are not the start of a
    /// slot in this pool.
    #[expect(
        clippy::arithmetic_side_effects,
        clippy::integer_division,
        reason = "stride is never zero and the offset is bounds-checked first"
    )]
    fn index_of(&self, ptr: NonNull<u8>) -> Result<usize> {
        let slots_len = self.layout_info.head_offset();

        let offset = ptr
            .addr()
            .get()
            .checked_sub(self.buffer.addr().get())
            .filter(|offset| *offset < slots_len)
            .ok_or(Error::InvalidArgument {
                reason: "address does not belong to this pool",
            })?;

        let stride = self.layout_info.stride();

        if offset % stride != 0 {
            return Err(Error::InvalidArgument {
                reason: "address is not the start of a slot",
            });
        }

        Ok(offset / stride)
    }

    fn slot_ptr(&self, index: usize) -> NonNull<u8> {
        assert!(
            index < self.capacity.get(),
            "slot {index} index out of bounds in pool of capacity {}",
            self.capacity.get()
        );

        // Cannot overflow because that would imply the buffer extends beyond virtual memory.
        let offset = index.wrapping_mul(self.layout_info.stride());

        // SAFETY: index is bounds-checked above, so the offset stays inside the slot region.
        unsafe { self.buffer.add(offset) }
    }

    /// Reads the free-list link stored in a free slot.
    fn read_link(&self, index: usize) -> usize {
        let link_ptr = self.slot_ptr(index).cast::<usize>();

        // SAFETY: Slots are aligned and sized for a usize (see PoolLayoutInfo) and every free
        // slot holds an initialized link. Callers only read links of free slots.
        unsafe { link_ptr.read() }
    }

    fn write_link(&mut self, index: usize, next: usize) {
        let link_ptr = self.slot_ptr(index).cast::<usize>();

        // SAFETY: Slots are aligned and sized for a usize (see PoolLayoutInfo) and the slot is
        // either free or being returned to the free list, so we own its bytes.
        unsafe { link_ptr.write(next) };
    }

    fn head_ptr(&self) -> NonNull<usize> {
        // SAFETY: The head offset lies inside the buffer and is usize-aligned.
        unsafe { self.buffer.add(self.layout_info.head_offset()).cast() }
    }

    /// Index of the first free slot, or `capacity` if no slot is free.
    fn head(&self) -> usize {
        // SAFETY: The head field is initialized in new() before any read.
        unsafe { self.head_ptr().read() }
    }

    fn set_head(&mut self, index: usize) {
        // SAFETY: The head field lies inside the buffer we exclusively own.
        unsafe { self.head_ptr().write(index) };
    }

    fn generation_ptr(&self, index: usize) -> NonNull<u32> {
        assert!(
            index < self.capacity.get(),
            "slot {index} index out of bounds in pool of capacity {}",
            self.capacity.get()
        );

        // Cannot overflow because the generation table fits in the buffer.
        let offset = self
            .layout_info
            .generations_offset()
            .wrapping_add(index.wrapping_mul(size_of::<u32>()));

        // SAFETY: index is bounds-checked above, so the offset stays inside the generation table.
        unsafe { self.buffer.add(offset).cast() }
    }

    fn generation(&self, index: usize) -> u32 {
        // SAFETY: The generation table is zeroed in new() before any read.
        unsafe { self.generation_ptr(index).read() }
    }

    fn set_generation(&mut self, index: usize, generation: u32) {
        // SAFETY: The generation table lies inside the buffer we exclusively own.
        unsafe { self.generation_ptr(index).write(generation) };
    }

    /// Returns the bitmap byte holding the bit of slot `index` and the mask selecting that bit.
    ///
    /// Slot `i` is bit `7 - i % 8` of byte `i / 8`, most significant bit first.
    fn bitmap_location(&self, index: usize) -> (NonNull<u8>, u8) {
        assert!(
            index < self.capacity.get(),
            "slot {index} index out of bounds in pool of capacity {}",
            self.capacity.get()
        );

        let byte_index = index >> 3;
        let mask = 0x80_u8 >> (index & 7);

        // Cannot overflow because the bitmap fits in the buffer.
        let offset = self.layout_info.bitmap_offset().wrapping_add(byte_index);

        // SAFETY: byte_index < bitmap_len because index < capacity, so we stay inside the bitmap.
        (unsafe { self.buffer.add(offset) }, mask)
    }

    fn set_allocated(&mut self, index: usize, allocated: bool) {
        let (byte_ptr, mask) = self.bitmap_location(index);

        // SAFETY: bitmap_location() only returns pointers into the initialized bitmap,
        // which lies inside the buffer we exclusively own.
        unsafe {
            let byte = byte_ptr.read();
            byte_ptr.write(if allocated { byte | mask } else { byte & !mask });
        }
    }

    /// Zeroes the generation table and the bitmap.
    fn clear_bookkeeping(&mut self) {
        let generations = self.generation_ptr(0);
        let (bitmap, _) = self.bitmap_location(0);

        // SAFETY: Both regions lie inside the buffer and are exactly this long.
        unsafe {
            generations.write_bytes(0, self.capacity.get());
        }

        // SAFETY: As above.
        unsafe {
            bitmap.write_bytes(0, self.layout_info.bitmap_len());
        }
    }

    /// Walks the free list from the head and returns the slot indices in list order.
    ///
    /// # Panics
    ///
    /// Panics if the list leaves the pool, visits an allocated slot or contains a cycle.
    #[cfg(any(test, debug_assertions))]
    #[allow(
        clippy::indexing_slicing,
        reason = "indices are bounds-checked before use"
    )]
    pub(crate) fn free_list_indices(&self) -> Vec<usize> {
        let capacity = self.capacity.get();
        let mut visited = vec![false; capacity];
        let mut indices = Vec::with_capacity(self.free_count());

        let mut cursor = self.head();

        while cursor != capacity {
            assert!(
                cursor < capacity,
                "free list link {cursor} out of bounds in pool of capacity {capacity}"
            );
            assert!(
                !visited[cursor],
                "free list revisits slot {cursor} in pool of capacity {capacity}"
            );
            assert!(
                !self.is_allocated(cursor),
                "free list reaches allocated slot {cursor} in pool of capacity {capacity}"
            );

            visited[cursor] = true;
            indices.push(cursor);
            cursor = self.read_link(cursor);
        }

        indices
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    /// Asserts that the bitmap, the free list and the allocated count agree with each other.
    ///
    /// This method is only available in debug builds and runs after every mutation.
    pub(crate) fn integrity_check(&self) {
        let capacity = self.capacity.get();
        let free_list = self.free_list_indices();

        let allocated = (0..capacity)
            .filter(|&index| self.is_allocated(index))
            .count();

        assert_eq!(
            allocated, self.count,
            "bitmap shows {allocated} allocated slots but count is {} in pool of capacity {capacity}",
            self.count
        );

        assert_eq!(
            free_list.len(),
            self.free_count(),
            "free list has {} slots but {} slots are free in pool of capacity {capacity}",
            free_list.len(),
            self.free_count()
        );
    }
}

impl Drop for SizeClassPool {
    fn drop(&mut self) {
        let outstanding = self.count;

        // SAFETY: We allocated the buffer with this exact layout in new() and never freed it.
        unsafe {
            dealloc(self.buffer.as_ptr(), self.layout_info.buffer_layout());
        }

        // We check at the end so the memory is released first. If we are already panicking, we
        // do not want to panic again because that would obscure the original panic.
        if !thread::panicking() && matches!(self.drop_policy, DropPolicy::MustNotLeakSlots) {
            assert!(
                outstanding == 0,
                "dropped a SizeClassPool with {outstanding} allocated slots - this is forbidden by DropPolicy::MustNotLeakSlots"
            );
        }
    }
}

impl fmt::Debug for SizeClassPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SizeClassPool")
            .field("item_layout", &self.item_layout)
            .field("capacity", &self.capacity)
            .field("count", &self.count)
            .field("drop_policy", &self.drop_policy)
            .finish_non_exhaustive()
    }
}

// SAFETY: The pool exclusively owns its buffer and holds no thread-specific state. The raw
// pointer is only dereferenced through &self/&mut self methods, so Rust's borrowing rules
// govern all access.
unsafe impl Send for SizeClassPool {}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::collections::HashSet;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(SizeClassPool: Send, fmt::Debug);
    assert_not_impl_any!(SizeClassPool: Sync);

    fn pool_of<T>(capacity: usize) -> SizeClassPool {
        SizeClassPool::new(
            Layout::new::<T>(),
            NonZero::new(capacity).unwrap(),
            DropPolicy::MayLeakSlots,
        )
        .unwrap()
    }

    fn bitmap_byte(pool: &SizeClassPool, byte_index: usize) -> u8 {
        let (byte_ptr, _) = pool.bitmap_location(byte_index * 8);
        unsafe { byte_ptr.read() }
    }

    #[test]
    fn smoke_test() {
        let mut pool = pool_of::<u64>(3);

        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        let c = pool.allocate().unwrap();

        unsafe {
            a.ptr().cast::<u64>().write(42);
            b.ptr().cast::<u64>().write(43);
            c.ptr().cast::<u64>().write(44);
        }

        assert_eq!(pool.len(), 3);
        assert!(pool.is_full());

        pool.release(b).unwrap();
        assert_eq!(pool.len(), 2);

        let d = pool.allocate().unwrap();
        unsafe { d.ptr().cast::<u64>().write(45) };

        unsafe {
            assert_eq!(a.ptr().cast::<u64>().read(), 42);
            assert_eq!(c.ptr().cast::<u64>().read(), 44);
            assert_eq!(d.ptr().cast::<u64>().read(), 45);
        }

        pool.release(a).unwrap();
        pool.release(c).unwrap();
        pool.release(d).unwrap();

        assert!(pool.is_empty());
    }

    #[test]
    fn new_pool_is_all_free() {
        let pool = pool_of::<u64>(10);

        assert_eq!(pool.len(), 0);
        assert_eq!(pool.free_count(), 10);
        assert!(pool.is_empty());
        assert!(!pool.is_full());
        assert_eq!(pool.free_list_indices(), (0..10).collect::<Vec<_>>());

        for index in 0..10 {
            assert!(!pool.is_allocated(index));
        }
    }

    #[test]
    fn allocates_from_the_start_in_order() {
        let mut pool = pool_of::<u64>(3);
        let stride = pool.layout_info.stride();

        let first = pool.allocate().unwrap();
        let second = pool.allocate().unwrap();
        let third = pool.allocate().unwrap();

        assert_eq!(first.ptr(), pool.buffer);
        assert_eq!(second.ptr().addr().get(), first.ptr().addr().get() + stride);
        assert_eq!(third.ptr().addr().get(), second.ptr().addr().get() + stride);
    }

    #[test]
    fn bitmap_is_most_significant_bit_first() {
        let mut pool = pool_of::<u64>(10);

        _ = pool.allocate().unwrap();
        assert_eq!(bitmap_byte(&pool, 0), 0b1000_0000);

        _ = pool.allocate().unwrap();
        assert_eq!(bitmap_byte(&pool, 0), 0b1100_0000);

        for _ in 0..7 {
            _ = pool.allocate().unwrap();
        }

        assert_eq!(bitmap_byte(&pool, 0), 0b1111_1111);
        assert_eq!(bitmap_byte(&pool, 1), 0b1000_0000);
    }

    #[test]
    fn released_slots_are_reused_lifo() {
        let mut pool = pool_of::<u64>(5);

        let h0 = pool.allocate().unwrap();
        let h1 = pool.allocate().unwrap();
        let h2 = pool.allocate().unwrap();

        pool.release(h0).unwrap();
        pool.release(h1).unwrap();
        pool.release(h2).unwrap();

        assert_eq!(pool.allocate().unwrap().ptr(), h2.ptr());
        assert_eq!(pool.allocate().unwrap().ptr(), h1.ptr());
        assert_eq!(pool.allocate().unwrap().ptr(), h0.ptr());
    }

    #[test]
    fn exhausted_pool_reports_and_stays_unchanged() {
        let mut pool = pool_of::<u64>(2);

        _ = pool.allocate().unwrap();
        _ = pool.allocate().unwrap();

        assert_eq!(pool.allocate(), Err(Error::Exhausted { capacity: 2 }));
        assert_eq!(pool.allocate(), Err(Error::Exhausted { capacity: 2 }));
        assert_eq!(pool.len(), 2);
        assert!(pool.free_list_indices().is_empty());
    }

    #[test]
    fn release_after_exhaustion_makes_room() {
        let mut pool = pool_of::<u64>(1);

        let only = pool.allocate().unwrap();
        assert!(pool.allocate().is_err());

        pool.release(only).unwrap();

        assert_eq!(pool.allocate().unwrap().ptr(), only.ptr());
    }

    #[test]
    fn double_free_is_rejected_without_side_effects() {
        let mut pool = pool_of::<u64>(4);

        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();

        pool.release(a).unwrap();
        let free_list_before = pool.free_list_indices();

        assert_eq!(pool.release(a), Err(Error::DoubleFree { index: 0 }));

        assert_eq!(pool.free_list_indices(), free_list_before);
        assert!(pool.is_allocated(1));
        assert_eq!(pool.len(), 1);

        pool.release(b).unwrap();
    }

    #[test]
    fn stale_slot_cannot_release_reallocated_slot() {
        let mut pool = pool_of::<u64>(4);

        let stale = pool.allocate().unwrap();
        pool.release(stale).unwrap();

        let live = pool.allocate().unwrap();
        assert_eq!(live.ptr(), stale.ptr());
        assert_ne!(live.generation(), stale.generation());

        assert_eq!(pool.release(stale), Err(Error::DoubleFree { index: 0 }));
        assert!(pool.is_allocated(0));
        assert_eq!(pool.len(), 1);

        pool.release(live).unwrap();
    }

    #[test]
    fn foreign_address_is_invalid_argument() {
        let mut pool = pool_of::<u64>(4);
        let mut other = pool_of::<u64>(4);

        let foreign = other.allocate().unwrap();

        assert!(!pool.contains(foreign.ptr()));
        assert!(matches!(
            pool.release(foreign),
            Err(Error::InvalidArgument { .. })
        ));

        let mut local = 0_u64;
        let stack_slot = Slot::new(NonNull::from(&mut local).cast(), 0);

        assert!(matches!(
            pool.release(stack_slot),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(pool.is_empty());
    }

    #[test]
    fn address_inside_slot_is_invalid_argument() {
        let mut pool = pool_of::<[u64; 2]>(4);

        let slot = pool.allocate().unwrap();
        let inside = Slot::new(unsafe { slot.ptr().add(8) }, slot.generation());

        assert!(!pool.contains(inside.ptr()));
        assert!(matches!(
            pool.release(inside),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(pool.is_allocated(0));
    }

    #[test]
    fn round_trip_restores_every_slot() {
        let mut pool = pool_of::<u64>(50);

        let slots = (0..50)
            .map(|_| pool.allocate().unwrap())
            .collect::<Vec<_>>();

        assert!(pool.is_full());

        // Mixed order: evens first, then odds in reverse.
        for slot in slots.iter().step_by(2) {
            pool.release(*slot).unwrap();
        }
        for slot in slots.iter().skip(1).step_by(2).rev() {
            pool.release(*slot).unwrap();
        }

        assert!(pool.is_empty());

        for byte_index in 0..pool.layout_info.bitmap_len() {
            assert_eq!(bitmap_byte(&pool, byte_index), 0);
        }

        let reachable = pool.free_list_indices().into_iter().collect::<HashSet<_>>();
        assert_eq!(reachable, (0..50).collect::<HashSet<_>>());
    }

    #[test]
    fn small_items_get_usable_slots() {
        let mut pool = pool_of::<u8>(100);

        let slots = (0..100_u8)
            .map(|value| {
                let slot = pool.allocate().unwrap();
                unsafe { slot.ptr().write(value) };
                slot
            })
            .collect::<Vec<_>>();

        for (expected, slot) in (0..100_u8).zip(&slots) {
            assert_eq!(unsafe { slot.ptr().read() }, expected);
        }

        for slot in slots {
            pool.release(slot).unwrap();
        }
    }

    #[test]
    fn slots_are_aligned_for_the_item() {
        #[repr(C, align(64))]
        struct CacheLine {
            data: [u8; 64],
        }

        let mut pool = pool_of::<CacheLine>(4);

        for _ in 0..4 {
            let slot = pool.allocate().unwrap();
            assert_eq!(slot.ptr().addr().get() % 64, 0);
            unsafe { slot.ptr().cast::<CacheLine>().write(CacheLine { data: [7; 64] }) };
        }
    }

    #[test]
    fn element_size_is_size_class() {
        let pool = pool_of::<[u8; 24]>(2);

        assert_eq!(pool.element_size(), 24);
        assert_eq!(pool.item_layout(), Layout::new::<[u8; 24]>());
        assert_eq!(pool.capacity(), 2);
    }

    #[test]
    fn zero_sized_item_is_invalid_argument() {
        let result = SizeClassPool::new(
            Layout::new::<()>(),
            NonZero::new(3).unwrap(),
            DropPolicy::MayLeakSlots,
        );

        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
    }

    #[test]
    fn huge_pool_is_allocation_failure() {
        let result = SizeClassPool::new(
            Layout::new::<[u8; 4096]>(),
            NonZero::new(usize::MAX / 4096).unwrap(),
            DropPolicy::MayLeakSlots,
        );

        assert!(matches!(result, Err(Error::AllocationFailed { .. })));
    }

    #[test]
    fn may_leak_slots_drops_quietly() {
        let mut pool = pool_of::<u64>(3);
        _ = pool.allocate().unwrap();
        drop(pool);
    }

    #[test]
    #[should_panic]
    fn must_not_leak_slots_panics_on_drop() {
        let mut pool = SizeClassPool::new(
            Layout::new::<u64>(),
            NonZero::new(3).unwrap(),
            DropPolicy::MustNotLeakSlots,
        )
        .unwrap();

        _ = pool.allocate().unwrap();
    }

    #[test]
    fn must_not_leak_slots_allows_empty_drop() {
        let mut pool = SizeClassPool::new(
            Layout::new::<u64>(),
            NonZero::new(3).unwrap(),
            DropPolicy::MustNotLeakSlots,
        )
        .unwrap();

        let slot = pool.allocate().unwrap();
        pool.release(slot).unwrap();
    }

    #[test]
    fn moves_between_threads() {
        let mut pool = pool_of::<u64>(3);
        let slot = pool.allocate().unwrap();

        let mut pool = std::thread::spawn(move || {
            assert_eq!(pool.len(), 1);
            pool
        })
        .join()
        .unwrap();

        assert!(pool.contains(slot.ptr()));
        pool.release(slot).unwrap();
    }
}
