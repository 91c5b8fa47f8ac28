//! # Physical Memory
//!
//! Hosted "RAM" is an anonymous in-memory file. Physical address `pa` lives at
//! file offset `pa - PHYS_MEM_START`, so frame numbers are stable and never
//! start at zero.
//!
//! The kernel reaches all of it through one shared mapping of the whole file,
//! the direct map. Client mappings installed later map the same file pages a
//! second (third, ...) time, which is what makes a store through one mapping
//! visible through every other.
//!
//! ```text
//!  direct map (kernel)        memfd                    client mapping
//!  base ─────────────► offset 0 ◄── pa = PHYS_MEM_START
//!  base + off ───────► offset off ◄────────────────── vma.start
//! ```

use crate::error::HostedError;
use kernel_info::memory::PHYS_MEM_START;
use kernel_memory_addresses::{
    PageFrameNumber, PageSize, PhysicalAddress, Size4K, VirtualAddress,
};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr::NonNull;

pub struct PhysicalMemory {
    file: OwnedFd,
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: the direct map is a plain shared mapping owned by this value. All
// mutation of its contents is coordinated by the heap and by the driver.
unsafe impl Send for PhysicalMemory {}
unsafe impl Sync for PhysicalMemory {}

impl PhysicalMemory {
    /// Create `frames` zeroed 4 KiB frames and map them.
    ///
    /// # Errors
    /// Any failure creating, sizing or mapping the backing file.
    pub fn new(frames: u64) -> Result<Self, HostedError> {
        if frames == 0 {
            return Err(HostedError::NoFrames);
        }
        let len = frames
            .checked_mul(Size4K::SIZE)
            .and_then(|l| usize::try_from(l).ok())
            .ok_or(HostedError::TooLarge { frames })?;

        let fd = unsafe { libc::memfd_create(c"kmap-phys".as_ptr(), libc::MFD_CLOEXEC) };
        if fd < 0 {
            return Err(HostedError::MemfdCreate(io::Error::last_os_error()));
        }
        // SAFETY: `fd` was just created and is owned by nobody else.
        let file = unsafe { OwnedFd::from_raw_fd(fd) };

        let len_off = libc::off_t::try_from(len).map_err(|_| HostedError::TooLarge { frames })?;
        if unsafe { libc::ftruncate(file.as_raw_fd(), len_off) } != 0 {
            return Err(HostedError::Resize {
                len: len as u64,
                source: io::Error::last_os_error(),
            });
        }

        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(HostedError::DirectMap(io::Error::last_os_error()));
        }
        let base = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| HostedError::DirectMap(io::Error::from(io::ErrorKind::AddrNotAvailable)))?;

        log::info!(
            "physical memory: {frames} frames at {}, direct map at {}",
            PhysicalAddress::new(PHYS_MEM_START),
            VirtualAddress::from_nonnull(base)
        );
        Ok(Self { file, base, len })
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
    pub const fn frames(&self) -> u64 {
        self.len as u64 / Size4K::SIZE
    }

    #[inline]
    #[must_use]
    pub const fn first_frame() -> PageFrameNumber {
        PageFrameNumber::new(PHYS_MEM_START >> Size4K::SHIFT)
    }

    /// Kernel-virtual address of physical address `PHYS_MEM_START`.
    #[inline]
    #[must_use]
    pub fn direct_map_base(&self) -> VirtualAddress {
        VirtualAddress::from_nonnull(self.base)
    }

    #[inline]
    #[must_use]
    pub const fn direct_map_ptr(&self) -> NonNull<u8> {
        self.base
    }

    #[inline]
    #[must_use]
    pub fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Physical address behind a direct-map address, or `None` if `va` lies
    /// outside the direct map.
    #[must_use]
    pub fn virt_to_phys(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let offset = va.checked_distance_from(self.direct_map_base())?;
        (offset < self.len as u64).then_some(PhysicalAddress::new(PHYS_MEM_START + offset))
    }

    /// File offset of `count` frames starting at `first`, if all of them
    /// exist.
    #[must_use]
    pub fn frame_range_offset(&self, first: PageFrameNumber, count: u64) -> Option<u64> {
        let index = first.as_u64().checked_sub(Self::first_frame().as_u64())?;
        let end = index.checked_add(count)?;
        (end <= self.frames()).then_some(index << Size4K::SHIFT)
    }
}

impl Drop for PhysicalMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base.as_ptr().cast::<libc::c_void>(), self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_direct_map_addresses() {
        let mem = PhysicalMemory::new(4).unwrap();
        let base = mem.direct_map_base();
        assert!(base.is_aligned::<Size4K>());
        assert_eq!(mem.virt_to_phys(base), Some(PhysicalAddress::new(0x10_0000)));
        assert_eq!(
            mem.virt_to_phys(base + 0x1234),
            Some(PhysicalAddress::new(0x10_1234))
        );
        assert_eq!(mem.virt_to_phys(base + 4 * 4096), None);
    }

    #[test]
    fn frame_ranges_are_bounded() {
        let mem = PhysicalMemory::new(4).unwrap();
        let first = PhysicalMemory::first_frame();
        assert_eq!(first.as_u64(), 0x100);
        assert_eq!(mem.frame_range_offset(first, 4), Some(0));
        assert_eq!(mem.frame_range_offset(first + 1, 3), Some(4096));
        assert_eq!(mem.frame_range_offset(first + 1, 4), None);
        assert_eq!(mem.frame_range_offset(PageFrameNumber::new(0xff), 1), None);
    }

    #[test]
    fn zero_frames_are_rejected() {
        assert!(matches!(PhysicalMemory::new(0), Err(HostedError::NoFrames)));
    }
}
