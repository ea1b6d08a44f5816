use std::alloc::Layout;
use std::mem;
use std::num::NonZero;

use crate::{Error, Result};

/// Layout calculations for the single buffer backing a [`SizeClassPool`][crate::SizeClassPool].
///
/// The buffer is laid out as:
///
/// ```text
/// [slot 0][slot 1]...[slot N-1][head: usize][generations: u32 * N][bitmap: ceil(N / 8) bytes]
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct PoolLayoutInfo {
    /// Byte distance between the starts of consecutive slots. Always large enough and aligned
    /// enough for a free slot to hold a `usize` link to the next free slot.
    stride: usize,

    /// Byte offset of the free-list head field.
    head_offset: usize,

    /// Byte offset of the per-slot generation table.
    generations_offset: usize,

    /// Byte offset of the occupancy bitmap.
    bitmap_offset: usize,

    /// Length of the occupancy bitmap in bytes.
    bitmap_len: usize,

    /// Layout of the entire buffer, used both to allocate and to deallocate it.
    buffer_layout: Layout,
}

impl PoolLayoutInfo {
    /// Calculates the buffer layout for a pool of `capacity` items with the given layout.
    ///
    /// Returns [`Error::AllocationFailed`] if the buffer size cannot be represented.
    ///
    /// # Panics
    ///
    /// Panics if the item layout has zero size.
    pub(crate) fn calculate(item_layout: Layout, capacity: NonZero<usize>) -> Result<Self> {
        assert!(
            item_layout.size() > 0,
            "PoolLayoutInfo cannot be calculated for zero-sized item layout"
        );

        let overflow = Error::AllocationFailed {
            size: usize::MAX,
            align: item_layout.align(),
        };

        // A free slot stores the index of the next free slot in its own bytes.
        let slot_layout = Layout::from_size_align(
            item_layout.size().max(mem::size_of::<usize>()),
            item_layout.align().max(mem::align_of::<usize>()),
        )
        .map_err(|_layout_error| overflow.clone())?
        .pad_to_align();

        let stride = slot_layout.size();

        let slots_size = stride
            .checked_mul(capacity.get())
            .ok_or_else(|| overflow.clone())?;

        let slots_layout = Layout::from_size_align(slots_size, slot_layout.align())
            .map_err(|_layout_error| overflow.clone())?;

        let (layout, head_offset) = slots_layout
            .extend(Layout::new::<usize>())
            .map_err(|_layout_error| overflow.clone())?;

        let generations_layout =
            Layout::array::<u32>(capacity.get()).map_err(|_layout_error| overflow.clone())?;

        let (layout, generations_offset) = layout
            .extend(generations_layout)
            .map_err(|_layout_error| overflow.clone())?;

        let bitmap_len = capacity.get().div_ceil(8);

        let bitmap_layout =
            Layout::array::<u8>(bitmap_len).map_err(|_layout_error| overflow.clone())?;

        let (layout, bitmap_offset) = layout
            .extend(bitmap_layout)
            .map_err(|_layout_error| overflow)?;

        Ok(Self {
            stride,
            head_offset,
            generations_offset,
            bitmap_offset,
            bitmap_len,
            buffer_layout: layout.pad_to_align(),
        })
    }

    #[must_use]
    pub(crate) fn stride(&self) -> usize {
        self.stride
    }

    #[must_use]
    pub(crate) fn head_offset(&self) -> usize {
        self.head_offset
    }

    #[must_use]
    pub(crate) fn generations_offset(&self) -> usize {
        self.generations_offset
    }

    #[must_use]
    pub(crate) fn bitmap_offset(&self) -> usize {
        self.bitmap_offset
    }

    #[must_use]
    pub(crate) fn bitmap_len(&self) -> usize {
        self.bitmap_len
    }

    #[must_use]
    pub(crate) fn buffer_layout(&self) -> Layout {
        self.buffer_layout
    }
}

#[cfg(test)]
#[allow(
    clippy::arithmetic_side_effects,
    clippy::integer_division,
    reason = "test code doesn't need the same rigor as production code"
)]
mod tests {
    use super::*;

    #[test]
    fn small_items_are_widened_to_hold_a_link() {
        let info = PoolLayoutInfo::calculate(Layout::new::<u8>(), NonZero::new(3).unwrap())
            .unwrap();

        assert_eq!(info.stride(), mem::size_of::<usize>());
    }

    #[test]
    fn large_items_keep_their_size() {
        #[repr(C)]
        struct Sixteen {
            a: u64,
            b: u64,
        }

        let info = PoolLayoutInfo::calculate(Layout::new::<Sixteen>(), NonZero::new(3).unwrap())
            .unwrap();

        assert_eq!(info.stride(), 16);
    }

    #[test]
    fn stride_respects_item_alignment() {
        #[repr(C, align(32))]
        struct Aligned {
            data: u8,
        }

        let info = PoolLayoutInfo::calculate(Layout::new::<Aligned>(), NonZero::new(5).unwrap())
            .unwrap();

        assert_eq!(info.stride() % 32, 0);
        assert!(info.buffer_layout().align() >= 32);
    }

    #[test]
    fn regions_follow_each_other() {
        let capacity = NonZero::new(100).unwrap();
        let info = PoolLayoutInfo::calculate(Layout::new::<u64>(), capacity).unwrap();

        assert_eq!(info.head_offset(), info.stride() * capacity.get());
        assert!(info.generations_offset() >= info.head_offset() + mem::size_of::<usize>());
        assert!(info.bitmap_offset() >= info.generations_offset() + 4 * capacity.get());
        assert!(info.buffer_layout().size() >= info.bitmap_offset() + info.bitmap_len());
        assert_eq!(info.head_offset() % mem::align_of::<usize>(), 0);
        assert_eq!(info.generations_offset() % mem::align_of::<u32>(), 0);
    }

    #[test]
    fn bitmap_rounds_up_to_whole_bytes() {
        for (capacity, expected) in [(1, 1), (7, 1), (8, 1), (9, 2), (100, 13)] {
            let info =
                PoolLayoutInfo::calculate(Layout::new::<u64>(), NonZero::new(capacity).unwrap())
                    .unwrap();

            assert_eq!(info.bitmap_len(), expected, "capacity {capacity}");
        }
    }

    #[test]
    fn overflowing_capacity_is_allocation_failure() {
        let result =
            PoolLayoutInfo::calculate(Layout::new::<u64>(), NonZero::new(usize::MAX / 2).unwrap());

        assert!(matches!(result, Err(Error::AllocationFailed { .. })));
    }

    #[test]
    #[should_panic]
    fn zero_size_layout_panics() {
        let zero_layout = Layout::from_size_align(0, 1).unwrap();
        _ = PoolLayoutInfo::calculate(zero_layout, NonZero::new(3).unwrap());
    }
}
