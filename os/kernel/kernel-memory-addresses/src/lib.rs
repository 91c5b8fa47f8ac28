//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for the addresses a page-sharing driver juggles:
//! the kernel-virtual address of a buffer, the physical address behind it,
//! the page frames it spans, and the frame number handed to the mapping
//! primitive.
//!
//! ## Overview
//!
//! | Type | Meaning |
//! |----------|-------------|
//! | [`MemoryAddress`] | A raw 64-bit address, either physical or virtual. |
//! | [`VirtualAddress`] / [`VirtualPage<S>`] | Virtual (page-table translated) memory. |
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | Physical memory backing a mapping. |
//! | [`PageFrameNumber`] | Index of a physical page (`pa >> S::SHIFT`). |
//!
//! Only [`Size4K`] pages are modelled; the [`PageSize`] trait keeps the
//! arithmetic generic so the helpers read the same as the paging code that
//! consumes them.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! // A heap pointer that is not page aligned ...
//! let raw = VirtualAddress::new(0xFFFF_8880_0010_0010);
//! // ... rounds up to the next page boundary.
//! let aligned = raw.align_up::<Size4K>();
//! assert_eq!(aligned.as_u64(), 0xFFFF_8880_0010_1000);
//! assert!(aligned.is_aligned::<Size4K>());
//!
//! // A physical page reports its frame number.
//! let pa = PhysicalAddress::new(0x0010_3000);
//! assert_eq!(pa.page::<Size4K>().frame_number().as_u64(), 0x103);
//! ```
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` and implement `Copy`, `Eq`, `Ord`, and
//!   `Hash`.
//! - All alignment calculations are `const fn`.
//! - The phantom marker `S` carries the page size at the type level.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod frame_number;
mod memory_address;
mod page;
mod page_size;
mod physical_address;
mod virtual_address;

pub use crate::frame_number::PageFrameNumber;
pub use crate::memory_address::MemoryAddress;
pub use crate::page::{PhysicalPage, VirtualPage};
pub use crate::page_size::{PageSize, Size4K};
pub use crate::physical_address::PhysicalAddress;
pub use crate::virtual_address::VirtualAddress;

/// Number of `S`-sized pages needed to cover `len` bytes (rounds up).
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// assert_eq!(pages_spanning::<Size4K>(0), 0);
/// assert_eq!(pages_spanning::<Size4K>(1), 1);
/// assert_eq!(pages_spanning::<Size4K>(16 * 1024), 4);
/// assert_eq!(pages_spanning::<Size4K>(16 * 1024 + 1), 5);
/// ```
#[inline]
#[must_use]
pub const fn pages_spanning<S: PageSize>(len: u64) -> u64 {
    len.div_ceil(S::SIZE)
}
