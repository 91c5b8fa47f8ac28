//! # Driver Errors
//!
//! Startup errors ([`KmapInitError`]) are fatal: by the time one is returned
//! every step that had already completed has been undone. Mapping errors
//! ([`MmapError`]) concern a single request only; the device stays usable.

use kernel_memory_addresses::PageFrameNumber;

/// `EIO`: returned for requests larger than the buffer.
pub const EIO: i32 = 5;
/// `EAGAIN`: returned when the platform fails to install the mapping.
pub const EAGAIN: i32 = 11;
/// `ENOMEM`: returned when the buffer cannot be allocated.
pub const ENOMEM: i32 = 12;
/// `EINVAL`: returned for lengths rejected by a strict length policy.
pub const EINVAL: i32 = 22;

/// The general allocator could not satisfy the buffer allocation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("out of memory allocating {requested} bytes")]
    OutOfMemory { requested: usize },
}

/// A device-model step failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("character device registration failed ({0})")]
    Chrdev(i32),
    #[error("device class creation failed ({0})")]
    Class(i32),
    #[error("device node creation failed ({0})")]
    Device(i32),
}

impl RegistrationError {
    /// Negative errno for callers of the classic module-init ABI.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::Chrdev(e) | Self::Class(e) | Self::Device(e) => -e.abs(),
        }
    }
}

/// Startup failed; nothing of the device remains registered or allocated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KmapInitError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Allocation(#[from] AllocError),
}

impl KmapInitError {
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::Registration(e) => e.errno(),
            Self::Allocation(_) => -ENOMEM,
        }
    }
}

/// The platform could not install a frame range.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemapError {
    #[error("frames {first}..+{count} lie outside physical memory")]
    OutOfRange { first: PageFrameNumber, count: u64 },
    #[error("virtual range is not page aligned")]
    Unaligned,
    #[error("mapping primitive failed with errno {0}")]
    Os(i32),
}

/// A single mapping request was refused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MmapError {
    #[error("requested {requested} bytes but the buffer holds {capacity}")]
    SizeExceeded { requested: u64, capacity: u64 },
    #[error("length {0} rejected by the strict length policy")]
    InvalidLength(u64),
    #[error("failed to install mapping: {0}")]
    InstallFailed(#[from] RemapError),
}

impl MmapError {
    /// Negative errno as the classic `mmap` file operation reports it.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::SizeExceeded { .. } => -EIO,
            Self::InvalidLength(_) => -EINVAL,
            Self::InstallFailed(_) => -EAGAIN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mmap_errno_matches_driver_abi() {
        let exceeded = MmapError::SizeExceeded {
            requested: 16385,
            capacity: 16384,
        };
        assert_eq!(exceeded.errno(), -5);
        assert_eq!(MmapError::InstallFailed(RemapError::Os(12)).errno(), -11);
        assert_eq!(MmapError::InvalidLength(0).errno(), -22);
    }

    #[test]
    fn init_errno() {
        let e = KmapInitError::from(AllocError::OutOfMemory { requested: 1 });
        assert_eq!(e.errno(), -12);
        let e = KmapInitError::from(RegistrationError::Class(-12));
        assert_eq!(e.errno(), -12);
    }
}
