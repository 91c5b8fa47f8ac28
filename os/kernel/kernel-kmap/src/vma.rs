//! # Virtual Memory Areas
//!
//! A [`VmArea`] describes the window of a caller's address space that a
//! mapping request wants backed by the shared buffer. The platform picks the
//! range before the driver sees it; the driver only validates it, marks it
//! and asks the platform to install the frames.
//!
//! [`VmFlags`] follows the bit layout of the Linux `VM_*` flags so values can
//! be compared against kernel dumps; [`PageProtection`] follows the x86-64
//! leaf page-table entry layout.

use bitfield_struct::bitfield;
use core::fmt;
use kernel_memory_addresses::VirtualAddress;

/// Per-area flags (`vm_flags`).
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct VmFlags {
    /// Readable (bit 0).
    pub read: bool,
    /// Writable (bit 1).
    pub write: bool,
    /// Executable (bit 2).
    pub exec: bool,
    /// Shared with other mappings of the same backing store (bit 3).
    pub shared: bool,
    /// `mprotect` may later add read permission (bit 4).
    pub may_read: bool,
    /// `mprotect` may later add write permission (bit 5).
    pub may_write: bool,
    /// `mprotect` may later add exec permission (bit 6).
    pub may_exec: bool,
    /// The area may be shared (bit 7).
    pub may_share: bool,
    #[bits(2)]
    __growsdown_uffd: u8,
    /// Backed by raw frame numbers, not by `struct page` references (bit 10).
    pub pfnmap: bool,
    #[bits(3)]
    __uffd_wp_locked: u8,
    /// Memory-mapped I/O or equivalent; never swapped, never core dumped (bit 14).
    pub io: bool,
    #[bits(2)]
    __read_hints: u8,
    /// Do not copy on fork (bit 17).
    pub dontcopy: bool,
    /// Cannot be grown with `mremap` (bit 18).
    pub dontexpand: bool,
    #[bits(1)]
    __lockonfault: u8,
    /// Charged to the committed-memory accounting (bit 20).
    pub account: bool,
    /// Not charged to swap reservations (bit 21).
    pub noreserve: bool,
    #[bits(4)]
    __hugetlb_sync_arch: u8,
    /// Excluded from core dumps (bit 26).
    pub dontdump: bool,
    #[bits(37)]
    __high: u64,
}

impl VmFlags {
    /// Flags of a `PROT_READ | PROT_WRITE`, `MAP_SHARED` request.
    #[must_use]
    pub const fn shared_read_write() -> Self {
        Self::new()
            .with_read(true)
            .with_write(true)
            .with_shared(true)
            .with_may_read(true)
            .with_may_write(true)
            .with_may_share(true)
    }

    /// Whether the area carries the marks that keep the kernel's memory
    /// accounting from treating it as ordinary private memory.
    #[must_use]
    pub const fn is_reservation_consistent(self) -> bool {
        self.dontexpand() && self.dontdump()
    }
}

/// Leaf page protection bits (`vm_page_prot`).
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageProtection {
    /// Present (bit 0).
    pub present: bool,
    /// Writable (bit 1).
    pub writable: bool,
    /// User accessible (bit 2).
    pub user: bool,
    /// Page write-through (bit 3).
    pub write_through: bool,
    /// Page cache disable (bit 4).
    pub cache_disable: bool,
    /// Accessed (bit 5).
    pub accessed: bool,
    /// Dirty (bit 6).
    pub dirty: bool,
    /// Page attribute table (bit 7).
    pub pat: bool,
    /// Global (bit 8).
    pub global: bool,
    #[bits(54)]
    __reserved: u64,
    /// No-execute (bit 63).
    pub no_execute: bool,
}

/// Derive the page protection of a user mapping from its area flags.
#[must_use]
pub const fn vm_get_page_prot(flags: VmFlags) -> PageProtection {
    PageProtection::new()
        .with_present(flags.read() || flags.write() || flags.exec())
        .with_writable(flags.write())
        .with_user(true)
        .with_no_execute(!flags.exec())
}

/// A caller's virtual range `[start, end)` awaiting a backing.
#[derive(Clone, PartialEq, Eq)]
pub struct VmArea {
    pub start: VirtualAddress,
    pub end: VirtualAddress,
    /// Requested offset into the device, in pages.
    pub pgoff: u64,
    pub flags: VmFlags,
    pub page_prot: PageProtection,
}

impl VmArea {
    /// An area of `len` bytes at `start`, with protection derived from `flags`.
    #[must_use]
    pub fn new(start: VirtualAddress, len: u64, pgoff: u64, flags: VmFlags) -> Self {
        Self {
            start,
            end: start + len,
            pgoff,
            flags,
            page_prot: vm_get_page_prot(flags),
        }
    }

    /// Length of the area in bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end.as_u64() - self.start.as_u64()
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for VmArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmArea")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("pgoff", &self.pgoff)
            .field("flags", &format_args!("{:#X}", self.flags.into_bits()))
            .field("page_prot", &format_args!("{:#X}", self.page_prot.into_bits()))
            .finish()
    }
}
