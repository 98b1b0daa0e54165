//! Off-heap backing storage for a ring.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use crate::buffer::AtomicBuffer;
use crate::descriptor::TRAILER_LENGTH;
use crate::error::RingError;

/// Smallest supported data region.
pub(crate) const MIN_DATA_SIZE: usize = 16;

/// Largest supported data region; frame lengths travel as `i32`.
pub(crate) const MAX_DATA_SIZE: usize = 1 << 30;

pub(crate) fn check_data_size(data_size: usize) -> Result<(), RingError> {
    if !data_size.is_power_of_two() || data_size < MIN_DATA_SIZE || data_size > MAX_DATA_SIZE {
        return Err(RingError::InvalidCapacity(data_size));
    }
    Ok(())
}

/// Owning handle to an aligned, zero-initialized, contiguous off-heap region
/// of `data_size + TRAILER_LENGTH` bytes.
///
/// The region stays at the same address for its whole life and is freed on
/// drop. It must outlive every producer and consumer handle wrapping it; the
/// rings hold it alive through shared ownership.
#[derive(Debug)]
pub struct AlignedRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl AlignedRegion {
    /// Allocate a region for a `data_size`-byte data region plus the
    /// metadata trailer, with the base address aligned to `alignment`.
    pub fn allocate(data_size: usize, alignment: usize) -> Result<Self, RingError> {
        check_data_size(data_size)?;
        if !alignment.is_power_of_two() || alignment < 8 {
            return Err(RingError::InvalidAlignment(alignment));
        }

        let total = data_size + TRAILER_LENGTH;
        let layout = Layout::from_size_align(total, alignment)
            .map_err(|_| RingError::InvalidAlignment(alignment))?;

        // SAFETY: the layout has a non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(RingError::AllocationFailed(total))?;

        Ok(Self { ptr, layout })
    }

    /// Total length in bytes, data region plus trailer.
    #[inline]
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    /// Length of the data region alone.
    #[inline]
    pub fn data_size(&self) -> usize {
        self.layout.size() - TRAILER_LENGTH
    }

    /// Base address of the region.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Read-write view over the whole region.
    #[inline]
    pub fn as_buffer(&self) -> AtomicBuffer {
        AtomicBuffer::new(self.ptr.as_ptr(), self.layout.size())
    }
}

impl Drop for AlignedRegion {
    fn drop(&mut self) {
        // SAFETY: allocated with this exact layout in `allocate`.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

// The region is a plain byte range; all cross-thread coordination is layered
// on top through the atomic accessors of `AtomicBuffer`.
unsafe impl Send for AlignedRegion {}
unsafe impl Sync for AlignedRegion {}
