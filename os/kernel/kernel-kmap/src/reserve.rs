//! # Page Reservation
//!
//! Every page backing the shared buffer is flagged reserved while the device
//! exists, so the memory manager neither reclaims it nor treats it as
//! ordinary anonymous memory when user space maps it.
//!
//! Exactly the pages starting at `start + k * PAGE_SIZE` for
//! `k * PAGE_SIZE < len` are touched; the page following the buffer is not.

use crate::buffer::AlignedBuffer;
use crate::platform::{PageReservations, PhysMapper};
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{PhysicalPage, Size4K};

/// Flag every page of `buffer` reserved. Returns the number of pages marked.
#[must_use]
pub fn reserve_pages<P>(platform: &P, buffer: &AlignedBuffer) -> usize
where
    P: PhysMapper + PageReservations,
{
    let count = for_each_page(platform, buffer, P::set_page_reserved);
    log::debug!("reserved {count} pages at {}", buffer.start());
    count
}

/// Clear the reservation of every page of `buffer`. Returns the number of
/// pages cleared.
#[must_use]
pub fn unreserve_pages<P>(platform: &P, buffer: &AlignedBuffer) -> usize
where
    P: PhysMapper + PageReservations,
{
    let count = for_each_page(platform, buffer, P::clear_page_reserved);
    log::debug!("unreserved {count} pages at {}", buffer.start());
    count
}

fn for_each_page<P, F>(platform: &P, buffer: &AlignedBuffer, mut f: F) -> usize
where
    P: PhysMapper,
    F: FnMut(&P, PhysicalPage<Size4K>),
{
    let start = buffer.start();
    let mut offset = 0;
    let mut count = 0;
    while offset < buffer.len() {
        f(platform, platform.virt_to_page(start + offset as u64));
        offset += PAGE_SIZE;
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::KmapBuffer;
    use crate::mock::MockPlatform;
    use kernel_info::device::FILL_PATTERN;
    use kernel_info::memory::{KMAP_CAPACITY, KMAP_PAGES};
    use kernel_memory_addresses::PhysicalAddress;

    #[test]
    fn reserves_exactly_the_buffer_pages() {
        let platform = MockPlatform::new();
        let buffer = KmapBuffer::allocate(&platform, KMAP_CAPACITY, FILL_PATTERN).unwrap();

        assert_eq!(reserve_pages(&platform, buffer.aligned()), KMAP_PAGES);
        assert_eq!(platform.reserved_pages(), 4);

        let calls = platform.reserve_calls();
        let first = buffer.aligned().start().as_u64();
        for (k, page) in calls.iter().enumerate() {
            assert_eq!(page.base().as_u64(), first + (k * PAGE_SIZE) as u64);
        }

        // The page right behind the buffer stays untouched.
        let behind = first + KMAP_CAPACITY as u64;
        assert!(calls.iter().all(|p| p.base().as_u64() != behind));

        assert_eq!(unreserve_pages(&platform, buffer.aligned()), KMAP_PAGES);
        unsafe { buffer.release(&platform) };
    }

    #[test]
    fn unreserve_mirrors_reserve() {
        let platform = MockPlatform::new();
        let buffer = KmapBuffer::allocate(&platform, KMAP_CAPACITY, FILL_PATTERN).unwrap();

        let reserved = reserve_pages(&platform, buffer.aligned());
        assert_eq!(unreserve_pages(&platform, buffer.aligned()), reserved);

        assert_eq!(platform.reserve_calls(), platform.unreserve_calls());
        assert_eq!(platform.reserved_pages(), 0);
        assert_eq!(platform.max_reservation_depth(), 0);
        unsafe { buffer.release(&platform) };
    }

    #[test]
    fn partial_page_is_still_reserved() {
        let platform = MockPlatform::new();
        let buffer = KmapBuffer::allocate(&platform, PAGE_SIZE + 1, FILL_PATTERN).unwrap();

        assert_eq!(reserve_pages(&platform, buffer.aligned()), 2);
        let calls = platform.reserve_calls();
        assert_eq!(calls[1], calls[0].next());
        let start = PhysicalAddress::new(buffer.aligned().start().as_u64());
        assert_eq!(calls[0], start.page());

        assert_eq!(unreserve_pages(&platform, buffer.aligned()), 2);
        unsafe { buffer.release(&platform) };
    }
}
