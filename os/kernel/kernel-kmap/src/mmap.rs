//! # Mapping Requests
//!
//! Each `mmap` of the device node arrives here with the caller's
//! [`VmArea`]. The handler checks the length, marks the area and asks the
//! platform to back it with the buffer's frames, starting at the first frame
//! regardless of the requested offset. Once installed, the mapping needs no
//! further driver involvement: loads and stores go straight to the frames,
//! and every mapping of the device aliases the same frames.

use crate::buffer::AlignedBuffer;
use crate::config::{KmapConfig, LengthPolicy};
use crate::error::MmapError;
use crate::platform::{PfnRemapper, PhysMapper};
use crate::vma::VmArea;
use kernel_memory_addresses::{PageFrameNumber, PageSize, Size4K};

/// Validate `vma` against the buffer and install the frame range.
///
/// # Errors
/// - [`MmapError::SizeExceeded`] if the area is larger than the buffer.
/// - [`MmapError::InvalidLength`] under [`LengthPolicy::Strict`] if the area
///   is empty or not a whole number of pages.
/// - [`MmapError::InstallFailed`] if the platform refused the mapping.
pub fn handle_mmap<P>(
    platform: &P,
    buffer: &AlignedBuffer,
    config: KmapConfig,
    vma: &mut VmArea,
) -> Result<(), MmapError>
where
    P: PhysMapper + PfnRemapper,
{
    let len = vma.len();
    let capacity = buffer.len() as u64;
    log::debug!("mmap {vma:?}, {len} bytes");

    check_length(len, capacity, config.length_policy)?;

    if vma.pgoff != 0 {
        log::debug!("ignoring page offset {}", vma.pgoff);
    }

    vma.flags = vma.flags.with_dontexpand(true).with_dontdump(true);

    let pfn = buffer_frame(platform, buffer);
    platform.remap_pfn_range(vma, pfn, len).map_err(|e| {
        log::error!("remap_pfn_range of {len} bytes at {pfn} failed: {e}");
        MmapError::InstallFailed(e)
    })?;

    log::debug!("mapped frame {pfn}..+{len} at {}", vma.start);
    Ok(())
}

/// First frame of the buffer.
#[must_use]
pub fn buffer_frame<P: PhysMapper>(platform: &P, buffer: &AlignedBuffer) -> PageFrameNumber {
    platform.virt_to_page(buffer.start()).frame_number()
}

fn check_length(len: u64, capacity: u64, policy: LengthPolicy) -> Result<(), MmapError> {
    if len > capacity {
        log::warn!("mmap of {len} bytes exceeds the {capacity} byte buffer");
        return Err(MmapError::SizeExceeded {
            requested: len,
            capacity,
        });
    }

    if policy == LengthPolicy::Strict && (len == 0 || len & Size4K::MASK != 0) {
        log::warn!("mmap length {len} rejected");
        return Err(MmapError::InvalidLength(len));
    }

    Ok(())
}
