//! # Platform Seams
//!
//! The driver core never touches page tables, page descriptors or the device
//! model directly. Each collaborator is a small trait; a kernel build
//! implements them on top of its memory manager, the hosted build on top of a
//! shared-memory file (see the `kernel-hosted` crate), and the unit tests on
//! top of plain heap memory.
//!
//! All methods take `&self`. Lifecycle operations are serialized by the
//! device itself; mapping installation may be called concurrently and must be
//! re-entrant.

use crate::error::{RegistrationError, RemapError};
use crate::vma::VmArea;
use core::fmt;
use core::ptr::NonNull;
use kernel_memory_addresses::{PageFrameNumber, PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};

/// General-purpose kernel allocator (`kmalloc`-like).
///
/// Returned blocks carry no page-alignment guarantee.
pub trait KernelHeap {
    /// Allocate `len` bytes, or `None` if the request cannot be satisfied.
    fn kmalloc(&self, len: usize) -> Option<NonNull<u8>>;

    /// Return a block to the allocator.
    ///
    /// # Safety
    /// `ptr` must come from [`kmalloc`](Self::kmalloc) on the same heap and
    /// must not be used afterwards.
    unsafe fn kfree(&self, ptr: NonNull<u8>);
}

/// Translates kernel-virtual addresses of directly mapped memory to physical
/// addresses.
pub trait PhysMapper {
    /// Physical address behind `va`.
    ///
    /// Only meaningful for addresses inside the platform's direct map (that is,
    /// memory obtained from its [`KernelHeap`]).
    fn virt_to_phys(&self, va: VirtualAddress) -> PhysicalAddress;

    /// Physical page containing `va`.
    #[inline]
    fn virt_to_page(&self, va: VirtualAddress) -> PhysicalPage<Size4K> {
        self.virt_to_phys(va).page()
    }
}

/// Per-page reservation flag (`PG_reserved`-like).
///
/// Reserved pages are exempt from reclaim and from copy-on-fork accounting,
/// which keeps them valid while user space maps them. Marking never fails.
pub trait PageReservations {
    fn set_page_reserved(&self, page: PhysicalPage<Size4K>);
    fn clear_page_reserved(&self, page: PhysicalPage<Size4K>);
}

/// Installs a physically contiguous frame range into a caller's address space.
pub trait PfnRemapper {
    /// Map `size` bytes starting at frame `pfn` to `vma.start` with
    /// `vma.page_prot`.
    ///
    /// Implementations may add flags to `vma.flags` (typically `io` and
    /// `pfnmap`). Must be safe to call from several threads at once.
    ///
    /// # Errors
    /// Any [`RemapError`] reported by the underlying primitive. The caller
    /// does not retry.
    fn remap_pfn_range(
        &self,
        vma: &mut VmArea,
        pfn: PageFrameNumber,
        size: u64,
    ) -> Result<(), RemapError>;
}

/// Major device number.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Major(u32);

impl Major {
    #[inline]
    #[must_use]
    pub const fn new(major: u32) -> Self {
        Self(major)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Major {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Major({})", self.0)
    }
}

impl fmt::Display for Major {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Packed major/minor device number (`MKDEV`).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DevNum(u32);

impl DevNum {
    const MINOR_BITS: u32 = 20;
    const MINOR_MASK: u32 = (1 << Self::MINOR_BITS) - 1;

    #[inline]
    #[must_use]
    pub const fn new(major: Major, minor: u32) -> Self {
        debug_assert!(minor <= Self::MINOR_MASK);
        Self((major.0 << Self::MINOR_BITS) | (minor & Self::MINOR_MASK))
    }

    #[inline]
    #[must_use]
    pub const fn major(self) -> Major {
        Major(self.0 >> Self::MINOR_BITS)
    }

    #[inline]
    #[must_use]
    pub const fn minor(self) -> u32 {
        self.0 & Self::MINOR_MASK
    }
}

impl fmt::Debug for DevNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DevNum({}:{})", self.major().0, self.minor())
    }
}

/// Opaque handle to a registered device class.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ClassHandle(pub u64);

/// Opaque handle to a created device node.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct DeviceHandle(pub u64);

/// Device model: character device numbers, classes and nodes.
///
/// Each `*_create`/`register_*` call has an inverse that cannot fail.
pub trait DeviceRegistry {
    /// Register a character device with a dynamically chosen major number.
    ///
    /// # Errors
    /// [`RegistrationError::Chrdev`] if no major number is available.
    fn register_chrdev(&self, name: &'static str) -> Result<Major, RegistrationError>;
    fn unregister_chrdev(&self, major: Major, name: &'static str);

    /// # Errors
    /// [`RegistrationError::Class`] if the class cannot be created.
    fn class_create(&self, name: &'static str) -> Result<ClassHandle, RegistrationError>;
    fn class_destroy(&self, class: ClassHandle);

    /// # Errors
    /// [`RegistrationError::Device`] if the node cannot be created.
    fn device_create(
        &self,
        class: ClassHandle,
        devnum: DevNum,
        name: &'static str,
    ) -> Result<DeviceHandle, RegistrationError>;
    fn device_destroy(&self, class: ClassHandle, devnum: DevNum);
}

/// Everything the driver needs from its environment.
pub trait Platform:
    KernelHeap + PhysMapper + PageReservations + PfnRemapper + DeviceRegistry + Sync
{
}

impl<T> Platform for T where
    T: KernelHeap + PhysMapper + PageReservations + PfnRemapper + DeviceRegistry + Sync
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn devnum_packs_major_and_minor() {
        let dev = DevNum::new(Major::new(240), 3);
        assert_eq!(dev.major(), Major::new(240));
        assert_eq!(dev.minor(), 3);
    }
}
