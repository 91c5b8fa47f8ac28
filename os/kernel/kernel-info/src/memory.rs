//! # Memory Layout

use kernel_memory_addresses::{PageSize, Size4K};

/// Size of the shared buffer in bytes.
pub const KMAP_CAPACITY: usize = 16 * 1024;

/// Extra pages requested from the general allocator on top of
/// [`KMAP_CAPACITY`] so the buffer can be moved up to a page boundary.
pub const ALLOC_SLACK_PAGES: usize = 2;

/// Size of the raw allocation backing the buffer.
pub const RAW_ALLOCATION_LEN: usize = KMAP_CAPACITY + ALLOC_SLACK_PAGES * PAGE_SIZE;

/// Mapping and reservation granularity.
#[allow(
    clippy::cast_possible_truncation,
    reason = "4096 fits every usize the kernel targets"
)]
pub const PAGE_SIZE: usize = Size4K::SIZE as usize;

/// Number of physical pages the buffer spans.
pub const KMAP_PAGES: usize = KMAP_CAPACITY.div_ceil(PAGE_SIZE);

/// First physical address of the hosted platform's RAM.
///
/// Frame numbers handed out by the hosted platform therefore start at
/// `PHYS_MEM_START >> 12` rather than zero.
pub const PHYS_MEM_START: u64 = 0x0010_0000; // 1 MiB

/// Default number of 4 KiB frames of hosted RAM.
pub const HOSTED_DEFAULT_FRAMES: u64 = 64;

const _: () = {
    // Aligning up wastes at most PAGE_SIZE - 1 bytes.
    assert!(ALLOC_SLACK_PAGES * PAGE_SIZE > PAGE_SIZE - 1);
    assert!(KMAP_CAPACITY > 0);
    assert!(PHYS_MEM_START.is_multiple_of(Size4K::SIZE));
    assert!(HOSTED_DEFAULT_FRAMES * Size4K::SIZE > RAW_ALLOCATION_LEN as u64);
};
