use crate::{PageSize, PhysicalAddress, PhysicalPage};
use core::fmt;
use core::ops::Add;

/// Physical frame number: the index of a physical page.
///
/// This is what a pfn-range mapping primitive consumes. The page size is not
/// part of the type; callers name it when converting back with
/// [`base`](Self::base) or [`page`](Self::page).
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageFrameNumber(u64);

impl PageFrameNumber {
    #[inline]
    #[must_use]
    pub const fn new(pfn: u64) -> Self {
        Self(pfn)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Physical base address of the frame for pages of size `S`.
    #[inline]
    #[must_use]
    pub const fn base<S: PageSize>(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 << S::SHIFT)
    }

    #[inline]
    #[must_use]
    pub const fn page<S: PageSize>(self) -> PhysicalPage<S> {
        PhysicalPage::containing_address(self.base::<S>())
    }
}

impl Add<u64> for PageFrameNumber {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl fmt::Debug for PageFrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PFN({:#X})", self.0)
    }
}

impl fmt::Display for PageFrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#X}", self.0)
    }
}
