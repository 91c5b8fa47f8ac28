//! Per-frame page descriptors.
//!
//! Each physical frame has one flag byte, the hosted counterpart of
//! `struct page`. Only the reservation flag is tracked; the counters catch
//! unbalanced reserve/unreserve sequences.

use bitfield_struct::bitfield;
use kernel_memory_addresses::{PageFrameNumber, PhysicalPage, Size4K};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Flags of a single frame.
#[bitfield(u8)]
pub struct PageFlags {
    /// Exempt from reclaim while mapped by user space (`PG_reserved`).
    pub reserved: bool,
    #[bits(7)]
    __: u8,
}

const RESERVED: u8 = PageFlags::new().with_reserved(true).into_bits();

pub struct PageDescriptors {
    first: PageFrameNumber,
    flags: Box<[AtomicU8]>,
    double_reservations: AtomicUsize,
    spurious_clears: AtomicUsize,
}

impl PageDescriptors {
    #[must_use]
    pub fn new(first: PageFrameNumber, frames: u64) -> Self {
        let flags = (0..frames).map(|_| AtomicU8::new(0)).collect();
        Self {
            first,
            flags,
            double_reservations: AtomicUsize::new(0),
            spurious_clears: AtomicUsize::new(0),
        }
    }

    fn descriptor(&self, page: PhysicalPage<Size4K>) -> Option<&AtomicU8> {
        let index = page.frame_number().as_u64().checked_sub(self.first.as_u64())?;
        self.flags.get(usize::try_from(index).ok()?)
    }

    pub fn set_reserved(&self, page: PhysicalPage<Size4K>) {
        let Some(flags) = self.descriptor(page) else {
            log::warn!("SetPageReserved on {page} outside physical memory");
            return;
        };
        let old = PageFlags::from_bits(flags.fetch_or(RESERVED, Ordering::AcqRel));
        if old.reserved() {
            log::warn!("page {page} reserved twice");
            self.double_reservations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn clear_reserved(&self, page: PhysicalPage<Size4K>) {
        let Some(flags) = self.descriptor(page) else {
            log::warn!("ClearPageReserved on {page} outside physical memory");
            return;
        };
        let old = PageFlags::from_bits(flags.fetch_and(!RESERVED, Ordering::AcqRel));
        if !old.reserved() {
            log::warn!("page {page} was not reserved");
            self.spurious_clears.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn flags(&self, page: PhysicalPage<Size4K>) -> Option<PageFlags> {
        self.descriptor(page)
            .map(|f| PageFlags::from_bits(f.load(Ordering::Acquire)))
    }

    /// Frames currently flagged reserved.
    #[must_use]
    pub fn reserved_pages(&self) -> usize {
        self.flags
            .iter()
            .filter(|f| PageFlags::from_bits(f.load(Ordering::Acquire)).reserved())
            .count()
    }

    #[must_use]
    pub fn double_reservations(&self) -> usize {
        self.double_reservations.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn spurious_clears(&self) -> usize {
        self.spurious_clears.load(Ordering::Relaxed)
    }
}
