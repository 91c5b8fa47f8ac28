//! `remap_pfn_range` for the hosted platform.
//!
//! The frames are installed by mapping the matching range of the physical
//! memory file over the caller's area with `MAP_FIXED`. Several areas may be
//! installed at once from different threads; each call only touches its own
//! area.

use crate::phys_mem::PhysicalMemory;
use kernel_kmap::{PageProtection, RemapError, VmArea};
use kernel_memory_addresses::{PageFrameNumber, PageSize, Size4K, pages_spanning};
use std::io;

/// Map `size` bytes (rounded up to whole pages) of frames starting at `pfn`
/// over `vma`.
///
/// # Errors
/// - [`RemapError::Unaligned`] if the area does not start on a page.
/// - [`RemapError::OutOfRange`] if the frames are not all physical memory.
/// - [`RemapError::Os`] if the host refuses the mapping.
pub fn remap_pfn_range(
    phys: &PhysicalMemory,
    vma: &mut VmArea,
    pfn: PageFrameNumber,
    size: u64,
) -> Result<(), RemapError> {
    if size == 0 {
        return Ok(());
    }
    if !vma.start.is_aligned::<Size4K>() {
        return Err(RemapError::Unaligned);
    }

    let count = pages_spanning::<Size4K>(size);
    let offset = phys
        .frame_range_offset(pfn, count)
        .ok_or(RemapError::OutOfRange { first: pfn, count })?;

    let len = usize::try_from(count * Size4K::SIZE).map_err(|_| RemapError::OutOfRange {
        first: pfn,
        count,
    })?;
    let offset = libc::off_t::try_from(offset)
        .map_err(|_| RemapError::OutOfRange { first: pfn, count })?;
    let start = usize::try_from(vma.start.as_u64()).map_err(|_| RemapError::Os(libc::EFAULT))?;

    let addr = unsafe {
        libc::mmap(
            core::ptr::with_exposed_provenance_mut::<libc::c_void>(start),
            len,
            host_protection(vma.page_prot),
            libc::MAP_SHARED | libc::MAP_FIXED,
            phys.raw_fd(),
            offset,
        )
    };
    if addr == libc::MAP_FAILED {
        let errno = io::Error::last_os_error().raw_os_error().unwrap_or(libc::EINVAL);
        return Err(RemapError::Os(errno));
    }

    vma.flags = vma.flags.with_io(true).with_pfnmap(true);
    log::debug!("installed {count} frames from {pfn} at {}", vma.start);
    Ok(())
}

fn host_protection(prot: PageProtection) -> libc::c_int {
    let mut flags = libc::PROT_NONE;
    if prot.present() {
        flags |= libc::PROT_READ;
    }
    if prot.writable() {
        flags |= libc::PROT_WRITE;
    }
    if prot.present() && !prot.no_execute() {
        flags |= libc::PROT_EXEC;
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_kmap::VmFlags;
    use kernel_memory_addresses::VirtualAddress;

    #[test]
    fn protection_follows_page_bits() {
        let rw = kernel_kmap::vma::vm_get_page_prot(VmFlags::shared_read_write());
        assert_eq!(host_protection(rw), libc::PROT_READ | libc::PROT_WRITE);

        let ro = kernel_kmap::vma::vm_get_page_prot(VmFlags::new().with_read(true));
        assert_eq!(host_protection(ro), libc::PROT_READ);
        assert_eq!(host_protection(PageProtection::new()), libc::PROT_NONE);
    }

    #[test]
    fn zero_size_installs_nothing() {
        let phys = PhysicalMemory::new(4).unwrap();
        let mut vma = VmArea::new(VirtualAddress::new(0x1000), 0, 0, VmFlags::shared_read_write());
        remap_pfn_range(&phys, &mut vma, PhysicalMemory::first_frame(), 0).unwrap();
        assert!(!vma.flags.pfnmap());
    }

    #[test]
    fn misaligned_area_is_refused() {
        let phys = PhysicalMemory::new(4).unwrap();
        let mut vma =
            VmArea::new(VirtualAddress::new(0x1010), 4096, 0, VmFlags::shared_read_write());
        assert_eq!(
            remap_pfn_range(&phys, &mut vma, PhysicalMemory::first_frame(), 4096),
            Err(RemapError::Unaligned)
        );
    }

    #[test]
    fn frames_past_memory_are_refused() {
        let phys = PhysicalMemory::new(4).unwrap();
        let mut vma =
            VmArea::new(VirtualAddress::new(0x1000), 8192, 0, VmFlags::shared_read_write());
        let first = PhysicalMemory::first_frame() + 3;
        assert_eq!(
            remap_pfn_range(&phys, &mut vma, first, 8192),
            Err(RemapError::OutOfRange { first, count: 2 })
        );
    }
}
