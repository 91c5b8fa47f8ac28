use crate::{MemoryAddress, PageSize, VirtualPage};
use core::fmt;
use core::ops::{Add, AddAssign};
use core::ptr::NonNull;

/// Virtual memory address.
///
/// A thin wrapper around [`MemoryAddress`] that denotes **virtual** addresses:
/// the kernel's view of the shared buffer, or the start of a client's mapping
/// window. It does not validate canonicality; it only carries the *kind* of
/// address at the type level.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0xFFFF_FFFF_8000_1234);
/// let vp = va.page::<Size4K>();
/// assert_eq!(vp.base().as_u64() & (Size4K::SIZE - 1), 0);
/// assert_eq!(vp.base() + va.offset::<Size4K>(), va);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(pub(crate) MemoryAddress);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub fn from_nonnull<T>(ptr: NonNull<T>) -> Self {
        Self::from_ptr(ptr.as_ptr())
    }

    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(MemoryAddress::from_ptr(ptr))
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(MemoryAddress::new(v))
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.as_u64()
    }

    #[inline]
    #[must_use]
    pub const fn page<S: PageSize>(self) -> VirtualPage<S> {
        VirtualPage::containing_address(self)
    }

    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> u64 {
        self.0.offset::<S>()
    }

    #[inline]
    #[must_use]
    pub const fn align_up<S: PageSize>(self) -> Self {
        Self(self.0.align_up::<S>())
    }

    #[inline]
    #[must_use]
    pub const fn align_down<S: PageSize>(self) -> Self {
        Self(self.0.align_down::<S>())
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

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.as_u64())
    }
}

impl From<u64> for VirtualAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl<S> From<VirtualPage<S>> for VirtualAddress
where
    S: PageSize,
{
    fn from(value: VirtualPage<S>) -> Self {
        value.base()
    }
}

impl Add<u64> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}
