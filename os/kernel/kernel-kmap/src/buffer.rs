//! # Shared Buffer Allocation
//!
//! The general allocator hands out byte-granular blocks, but a buffer that is
//! mapped into user space must start on a page boundary and cover whole
//! pages. The buffer is therefore carved out of an over-sized allocation:
//!
//! ```text
//! raw.start           aligned.start                     aligned.end   raw.end
//!    │  < PAGE_SIZE      │                                   │           │
//!    ├───────────────────┼───────────── capacity ────────────┼───────────┤
//!    │ alignment waste   │        AlignedBuffer (shared)     │   slack   │
//!    └───────────────────┴───────────────────────────────────┴───────────┘
//!    └──────────────────── capacity + 2 × PAGE_SIZE ─────────────────────┘
//! ```
//!
//! Aligning up wastes at most `PAGE_SIZE - 1` bytes, so the two pages of
//! slack always leave room for `capacity` bytes behind the boundary.

use crate::error::AllocError;
use crate::platform::KernelHeap;
use core::ptr::NonNull;
use kernel_info::memory::{ALLOC_SLACK_PAGES, PAGE_SIZE};
use kernel_memory_addresses::{Size4K, VirtualAddress};

/// The block obtained from the general allocator. Owned by the device for
/// its whole lifetime and released exactly once.
#[derive(Debug)]
pub struct RawAllocation {
    ptr: NonNull<u8>,
    len: usize,
}

impl RawAllocation {
    /// Request `capacity` bytes plus the alignment slack.
    ///
    /// # Errors
    /// [`AllocError::OutOfMemory`] if the heap cannot satisfy the request.
    pub fn allocate<H: KernelHeap>(heap: &H, capacity: usize) -> Result<Self, AllocError> {
        let len = capacity + ALLOC_SLACK_PAGES * PAGE_SIZE;
        let Some(ptr) = heap.kmalloc(len) else {
            log::error!("kmalloc of {len} bytes failed");
            return Err(AllocError::OutOfMemory { requested: len });
        };

        log::info!("kmalloc_ptr at {}", VirtualAddress::from_nonnull(ptr));
        Ok(Self { ptr, len })
    }

    #[inline]
    #[must_use]
    pub fn start(&self) -> VirtualAddress {
        VirtualAddress::from_nonnull(self.ptr)
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Hand the block back to the allocator.
    ///
    /// # Safety
    /// No [`AlignedBuffer`] derived from this allocation may be used
    /// afterwards, and `heap` must be the heap it came from.
    pub unsafe fn release<H: KernelHeap>(self, heap: &H) {
        unsafe { heap.kfree(self.ptr) }
    }
}

/// The page-aligned window of a [`RawAllocation`] that is actually shared.
///
/// ### Invariants
/// - `start` is a multiple of the page size.
/// - `[start, start + len)` lies inside the raw allocation.
#[derive(Debug)]
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

impl AlignedBuffer {
    #[inline]
    #[must_use]
    pub fn start(&self) -> VirtualAddress {
        VirtualAddress::from_nonnull(self.ptr)
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub const fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Exclusive view of the buffer.
    ///
    /// # Safety
    /// No client mapping of the buffer may exist while the slice is alive.
    #[inline]
    pub const unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

/// Derive the page-aligned buffer of `capacity` bytes from `raw`.
///
/// # Panics
/// If the aligned window would leave the raw allocation, i.e. the allocation
/// was made without the alignment slack.
#[must_use]
pub fn align_to_page(raw: &RawAllocation, capacity: usize) -> AlignedBuffer {
    let start = raw.start();
    let aligned = start.align_up::<Size4K>();
    let waste = aligned
        .checked_distance_from(start)
        .and_then(|w| usize::try_from(w).ok())
        .unwrap_or(usize::MAX);
    assert!(
        waste.saturating_add(capacity) <= raw.len(),
        "aligned buffer exceeds its allocation"
    );

    // SAFETY: `waste < raw.len()` as asserted above, so the pointer stays
    // inside the allocation.
    let ptr = unsafe { raw.ptr.add(waste) };
    debug_assert!(VirtualAddress::from_nonnull(ptr).is_aligned::<Size4K>());

    AlignedBuffer { ptr, len: capacity }
}

/// Tile `pattern` across `buf`.
///
/// The pattern is copied `buf.len() / pattern.len()` times back to back,
/// followed by its first `buf.len() % pattern.len()` bytes.
///
/// # Panics
/// If `pattern` is empty; an empty pattern would leave the buffer content
/// undefined.
pub fn fill_pattern(buf: &mut [u8], pattern: &[u8]) {
    assert!(!pattern.is_empty(), "fill pattern must not be empty");

    let iterations = buf.len() / pattern.len();
    let leftover = buf.len() - iterations * pattern.len();
    log::debug!(
        "filling {} bytes at {:p}: {iterations} iterations, {leftover} leftover",
        buf.len(),
        buf.as_ptr()
    );

    let mut chunks = buf.chunks_exact_mut(pattern.len());
    for chunk in &mut chunks {
        chunk.copy_from_slice(pattern);
    }
    chunks.into_remainder().copy_from_slice(&pattern[..leftover]);
}

/// Raw allocation together with the aligned buffer carved from it.
#[derive(Debug)]
pub struct KmapBuffer {
    raw: RawAllocation,
    aligned: AlignedBuffer,
}

// SAFETY: The buffer is plain memory owned by the device. After startup the
// device only touches it through raw copies; concurrent client writes through
// their own mappings are the clients' business.
unsafe impl Send for KmapBuffer {}
unsafe impl Sync for KmapBuffer {}

impl KmapBuffer {
    /// Allocate, align and pattern-fill a buffer of `capacity` bytes.
    ///
    /// # Errors
    /// [`AllocError::OutOfMemory`] if the heap cannot provide the raw block.
    pub fn allocate<H: KernelHeap>(
        heap: &H,
        capacity: usize,
        pattern: &[u8],
    ) -> Result<Self, AllocError> {
        let raw = RawAllocation::allocate(heap, capacity)?;
        let mut aligned = align_to_page(&raw, capacity);
        log::info!("kmalloc_area at {}", aligned.start());

        // SAFETY: the buffer was just allocated; nothing maps it yet.
        fill_pattern(unsafe { aligned.as_mut_slice() }, pattern);
        Ok(Self { raw, aligned })
    }

    #[inline]
    #[must_use]
    pub const fn raw(&self) -> &RawAllocation {
        &self.raw
    }

    #[inline]
    #[must_use]
    pub const fn aligned(&self) -> &AlignedBuffer {
        &self.aligned
    }

    /// Copy `dst.len()` bytes starting at `offset` out of the buffer.
    ///
    /// Returns the number of bytes copied, which is short if the range runs
    /// past the end of the buffer.
    pub fn copy_out(&self, offset: usize, dst: &mut [u8]) -> usize {
        let count = self.aligned.len.saturating_sub(offset).min(dst.len());
        if count > 0 {
            // SAFETY: `offset + count <= len`; the destination is a distinct
            // Rust slice. Concurrent client writes may tear but cannot fault.
            unsafe {
                core::ptr::copy_nonoverlapping(
                    self.aligned.as_ptr().add(offset),
                    dst.as_mut_ptr(),
                    count,
                );
            }
        }
        count
    }

    /// Return the raw block to `heap`.
    ///
    /// # Safety
    /// `heap` must be the heap the buffer was allocated from, and no client
    /// mapping may still reference the buffer.
    pub unsafe fn release<H: KernelHeap>(self, heap: &H) {
        unsafe { self.raw.release(heap) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPlatform;
    use kernel_info::device::FILL_PATTERN;
    use kernel_info::memory::KMAP_CAPACITY;
    use proptest::prelude::*;

    #[test]
    fn fill_pattern_law_on_full_capacity() {
        let mut buf = vec![0u8; KMAP_CAPACITY];
        fill_pattern(&mut buf, FILL_PATTERN);
        for (i, b) in buf.iter().enumerate() {
            assert_eq!(*b, FILL_PATTERN[i % 10], "byte {i}");
        }
        assert_eq!(&buf[16380..], b"0123");
        assert_eq!(&buf[16370..16380], b"0123456789");
    }

    #[test]
    fn fill_pattern_shorter_than_pattern() {
        let mut buf = [0u8; 4];
        fill_pattern(&mut buf, b"0123456789");
        assert_eq!(&buf, b"0123");
    }

    #[test]
    #[should_panic(expected = "fill pattern must not be empty")]
    fn empty_pattern_is_fatal() {
        let mut buf = [0u8; 16];
        fill_pattern(&mut buf, b"");
    }

    #[test]
    fn aligned_buffer_sits_on_page_boundary_inside_allocation() {
        let platform = MockPlatform::new();
        let raw = RawAllocation::allocate(&platform, KMAP_CAPACITY).unwrap();
        assert_eq!(raw.len(), KMAP_CAPACITY + 2 * PAGE_SIZE);
        assert!(!raw.start().is_aligned::<Size4K>(), "mock heap is misaligned on purpose");

        let aligned = align_to_page(&raw, KMAP_CAPACITY);
        assert!(aligned.start().is_aligned::<Size4K>());
        assert!(aligned.start() >= raw.start());
        let end = aligned.start().as_u64() + aligned.len() as u64;
        assert!(end <= raw.start().as_u64() + raw.len() as u64);

        unsafe { raw.release(&platform) };
        assert_eq!(platform.live_allocations(), 0);
    }

    #[test]
    fn allocation_failure_is_reported() {
        let platform = MockPlatform::new().with_failing_heap();
        let err = KmapBuffer::allocate(&platform, KMAP_CAPACITY, FILL_PATTERN).unwrap_err();
        assert_eq!(
            err,
            AllocError::OutOfMemory {
                requested: KMAP_CAPACITY + 2 * PAGE_SIZE
            }
        );
    }

    #[test]
    fn copy_out_is_clamped_to_buffer() {
        let platform = MockPlatform::new();
        let buffer = KmapBuffer::allocate(&platform, KMAP_CAPACITY, FILL_PATTERN).unwrap();

        let mut head = [0u8; 10];
        assert_eq!(buffer.copy_out(0, &mut head), 10);
        assert_eq!(&head, b"0123456789");

        let mut tail = [0u8; 10];
        assert_eq!(buffer.copy_out(KMAP_CAPACITY - 4, &mut tail), 4);
        assert_eq!(&tail[..4], b"0123");
        assert_eq!(buffer.copy_out(KMAP_CAPACITY + 1, &mut tail), 0);

        unsafe { buffer.release(&platform) };
    }

    proptest! {
        #[test]
        fn alignment_waste_never_exceeds_slack(misalign in 0usize..PAGE_SIZE) {
            let platform = MockPlatform::new().with_heap_misalignment(misalign);
            let raw = RawAllocation::allocate(&platform, KMAP_CAPACITY).unwrap();
            let aligned = align_to_page(&raw, KMAP_CAPACITY);

            prop_assert!(aligned.start().is_aligned::<Size4K>());
            let waste = aligned.start().checked_distance_from(raw.start()).unwrap();
            prop_assert!(waste < PAGE_SIZE as u64);
            prop_assert!(usize::try_from(waste).unwrap() + KMAP_CAPACITY <= raw.len());
            unsafe { raw.release(&platform) };
        }

        #[test]
        fn pattern_law_holds_for_any_length(len in 0usize..4096, pattern in proptest::collection::vec(any::<u8>(), 1..32)) {
            let mut buf = vec![0u8; len];
            fill_pattern(&mut buf, &pattern);
            for (i, b) in buf.iter().enumerate() {
                prop_assert_eq!(*b, pattern[i % pattern.len()]);
            }
        }
    }
}
