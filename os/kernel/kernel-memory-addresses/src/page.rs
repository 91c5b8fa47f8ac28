use crate::{MemoryAddress, PageFrameNumber, PageSize, PhysicalAddress, VirtualAddress};
use core::fmt;
use core::marker::PhantomData;

/// Virtual memory page base for size `S`.
///
/// ### Invariants
/// - The low `S::SHIFT` bits of the base are always zero (page aligned).
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage<S: PageSize> {
    base: MemoryAddress,
    _phantom: PhantomData<S>,
}

impl<S: PageSize> VirtualPage<S> {
    /// Page that contains `addr` (aligns down to page boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: VirtualAddress) -> Self {
        Self {
            base: addr.0.align_down::<S>(),
            _phantom: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress(self.base)
    }

    /// The page directly above this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self {
            base: MemoryAddress::new(self.base.as_u64() + S::SIZE),
            _phantom: PhantomData,
        }
    }
}

impl<S: PageSize> fmt::Display for VirtualPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}/{}", self.base.as_u64(), S::as_str())
    }
}

impl<S: PageSize> fmt::Debug for VirtualPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VirtualPage<{}>({:#018X})",
            S::as_str(),
            self.base.as_u64()
        )
    }
}

impl<S: PageSize> TryFrom<VirtualAddress> for VirtualPage<S> {
    type Error = ();

    #[inline]
    fn try_from(va: VirtualAddress) -> Result<Self, ()> {
        if va.is_aligned::<S>() {
            Ok(va.page())
        } else {
            Err(())
        }
    }
}

/// Physical memory page base for size `S`.
///
/// A `PhysicalPage<S>` is the unit of reservation bookkeeping: the driver
/// marks exactly one descriptor per physical page it shares.
///
/// ### Invariants
/// - The low `S::SHIFT` bits of the base are always zero (page aligned).
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pa = PhysicalAddress::new(0x0000_0008_1234_5678);
/// let pp = pa.page::<Size4K>();
/// assert_eq!(pp.base().as_u64(), 0x0000_0008_1234_5000);
/// assert_eq!(pp.frame_number().as_u64(), 0x0000_0008_1234_5);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage<S: PageSize> {
    base: MemoryAddress,
    _phantom: PhantomData<S>,
}

impl<S: PageSize> PhysicalPage<S> {
    /// Page that contains `addr` (aligns down to page boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: PhysicalAddress) -> Self {
        Self {
            base: addr.0.align_down::<S>(),
            _phantom: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress(self.base)
    }

    /// Frame number of this page, i.e. `base >> S::SHIFT`.
    #[inline]
    #[must_use]
    pub const fn frame_number(self) -> PageFrameNumber {
        PageFrameNumber::new(self.base.as_u64() >> S::SHIFT)
    }

    /// The page directly above this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self {
            base: MemoryAddress::new(self.base.as_u64() + S::SIZE),
            _phantom: PhantomData,
        }
    }
}

impl<S: PageSize> fmt::Display for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}/{}", self.base.as_u64(), S::as_str())
    }
}

impl<S: PageSize> fmt::Debug for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PhysicalPage<{}>({:#018X})",
            S::as_str(),
            self.base.as_u64()
        )
    }
}
