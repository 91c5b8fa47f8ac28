use crate::{MemoryAddress, PageSize, PhysicalPage};
use core::fmt;
use core::ops::{Add, AddAssign};

/// Physical memory address.
///
/// A thin wrapper around [`MemoryAddress`] that denotes **physical** addresses.
/// Like [`VirtualAddress`](super::VirtualAddress), this type carries intent and
/// prevents accidental VA/PA mix-ups when translating a buffer for mapping.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pa = PhysicalAddress::new(0x0000_0010_2000_0042);
/// let pp = pa.page::<Size4K>();
/// assert_eq!(pp.base().as_u64() & (Size4K::SIZE - 1), 0);
/// assert_eq!(pp.base() + pa.offset::<Size4K>(), pa);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(pub(crate) MemoryAddress);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(MemoryAddress::new(v))
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.as_u64()
    }

    #[inline]
    #[must_use]
    pub const fn page<S: PageSize>(self) -> PhysicalPage<S> {
        PhysicalPage::containing_address(self)
    }

    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> u64 {
        self.0.offset::<S>()
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned<S: PageSize>(self) -> bool {
        self.0.is_aligned::<S>()
    }

    /// Bytes from `origin` up to `self`, or `None` if `origin` lies above.
    #[inline]
    #[must_use]
    pub const fn checked_distance_from(self, origin: Self) -> Option<u64> {
        self.0.checked_distance_from(origin.0)
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.as_u64())
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl<S> From<PhysicalPage<S>> for PhysicalAddress
where
    S: PageSize,
{
    fn from(value: PhysicalPage<S>) -> Self {
        value.base()
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for PhysicalAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}
