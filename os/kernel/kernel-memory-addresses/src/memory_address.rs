use crate::PageSize;
use core::fmt;
use core::ops::{Add, AddAssign};
use core::ptr::NonNull;

/// Principal raw memory address ([virtual](super::VirtualAddress) or [physical](super::PhysicalAddress)).
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MemoryAddress(u64);

impl MemoryAddress {
    #[inline]
    #[must_use]
    pub fn from_nonnull<T>(ptr: NonNull<T>) -> Self {
        Self::from_ptr(ptr.as_ptr())
    }

    /// Address of `ptr`. Provenance is dropped; keep the pointer around if
    /// the memory is to be accessed.
    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self::new(ptr.addr() as u64)
    }

    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The offset within the page of size `S` that contains this address.
    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> u64 {
        self.0 & S::MASK
    }

    /// Align down to page boundary `S`.
    #[inline]
    #[must_use]
    pub const fn align_down<S: PageSize>(self) -> Self {
        Self(self.0 & !S::MASK)
    }

    /// Align up to page boundary `S`: the first address `>= self` that is a
    /// multiple of `S::SIZE`.
    ///
    /// Overflows (and panics in debug) for addresses in the last page of the
    /// address space.
    #[inline]
    #[must_use]
    pub const fn align_up<S: PageSize>(self) -> Self {
        Self((self.0 + S::MASK) & !S::MASK)
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned<S: PageSize>(self) -> bool {
        self.0 & S::MASK == 0
    }

    /// `self - origin`, or `None` if `origin` lies above `self`.
    #[inline]
    #[must_use]
    pub const fn checked_distance_from(self, origin: Self) -> Option<u64> {
        self.0.checked_sub(origin.0)
    }
}

impl fmt::Debug for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryAddress(0x{:016X})", self.0)
    }
}

impl fmt::Display for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.as_u64())
    }
}

impl From<u64> for MemoryAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<MemoryAddress> for u64 {
    #[inline]
    fn from(a: MemoryAddress) -> Self {
        a.as_u64()
    }
}

impl Add<u64> for MemoryAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for MemoryAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}
