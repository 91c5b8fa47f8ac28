//! # Kernel Heap
//!
//! A `kmalloc`-style allocator over the direct map: first fit, split on
//! allocation, coalesce on free. Every block, free or allocated, starts with
//! a [`BlockHeader`]:
//!
//! ```text
//! +----------------------+-------------------------+
//! | BlockHeader (16 B)   |      payload (size)     |
//! +----------------------+-------------------------+
//! ^ block                ^ block + HEADER = pointer handed out
//! ```
//!
//! The header keeps the payload size while the block is allocated, so
//! [`kfree`](KmallocHeap::kfree) needs nothing but the pointer. Payloads are
//! aligned to [`MIN_ALIGN`] bytes, which is all a general-purpose allocator
//! promises; in particular the first allocation is *not* page aligned.

use core::ptr::{self, NonNull, null_mut};
use spin::Mutex;

/// Alignment (and size granularity) of every payload.
pub const MIN_ALIGN: usize = 16;

/// Header stored at the beginning of every block.
///
/// - `size` is the number of payload bytes **after** the header.
/// - `next` links to the next free block while the block is free; free
///   blocks are kept **sorted by address** to enable coalescing. Allocated
///   blocks carry a null link.
#[repr(C, align(16))]
struct BlockHeader {
    size: usize,
    next: *mut BlockHeader,
}

const HEADER: usize = size_of::<BlockHeader>();

const _: () = assert!(HEADER == MIN_ALIGN);

#[inline]
const fn align_up(n: usize, align: usize) -> usize {
    (n + (align - 1)) & !(align - 1)
}

/// Address-ordered free list.
///
/// # Invariants
/// - All blocks are non-overlapping and lie within `[start, start + len)`.
/// - No two free blocks are adjacent; they are coalesced on insertion.
/// - `head` is a sentinel; the first real block is at `head.next`.
struct FreeList {
    head: BlockHeader,
    start: usize,
    len: usize,
}

// SAFETY: the list is only reached through the heap's mutex.
unsafe impl Send for FreeList {}

impl FreeList {
    /// Manage `[start, start + len)` as a single free block.
    ///
    /// # Safety
    /// The range must be valid, writable, exclusive to the list and
    /// [`MIN_ALIGN`]-aligned.
    unsafe fn new(start: NonNull<u8>, len: usize) -> Self {
        let mut list = Self {
            head: BlockHeader {
                size: 0,
                next: null_mut(),
            },
            start: start.as_ptr().addr(),
            len,
        };
        if len > HEADER {
            let block = start.as_ptr().cast::<BlockHeader>();
            unsafe {
                ptr::write(
                    block,
                    BlockHeader {
                        size: len - HEADER,
                        next: null_mut(),
                    },
                );
            }
            list.head.next = block;
        }
        list
    }

    /// Unlink the first block that fits `size` payload bytes and split off
    /// what it does not need.
    unsafe fn allocate(&mut self, size: usize) -> *mut u8 {
        let size = align_up(size.max(1), MIN_ALIGN);
        let mut prev = &raw mut self.head;
        let mut current = unsafe { (*prev).next };

        while !current.is_null() {
            let available = unsafe { (*current).size };
            if available >= size {
                let remainder = available - size;
                let next = unsafe { (*current).next };

                if remainder > HEADER {
                    // Tail becomes a free block of its own, in place.
                    let tail = unsafe { current.cast::<u8>().add(HEADER + size) }
                        .cast::<BlockHeader>();
                    unsafe {
                        ptr::write(
                            tail,
                            BlockHeader {
                                size: remainder - HEADER,
                                next,
                            },
                        );
                        (*prev).next = tail;
                        (*current).size = size;
                    }
                } else {
                    unsafe { (*prev).next = next };
                }

                unsafe { (*current).next = null_mut() };
                return unsafe { current.cast::<u8>().add(HEADER) };
            }
            prev = current;
            current = unsafe { (*current).next };
        }
        null_mut()
    }

    /// Return the block whose payload starts at `payload`.
    unsafe fn free(&mut self, payload: *mut u8) {
        let block = unsafe { payload.sub(HEADER) }.cast::<BlockHeader>();
        let addr = block.addr();

        let mut prev = &raw mut self.head;
        let mut current = unsafe { (*prev).next };
        while !current.is_null() && current.addr() < addr {
            prev = current;
            current = unsafe { (*current).next };
        }

        unsafe {
            (*block).next = current;
            (*prev).next = block;
            self.coalesce(prev);
        }
    }

    /// Merge the block after `prev` with its successor, then `prev` with it.
    unsafe fn coalesce(&mut self, prev: *mut BlockHeader) {
        let curr = unsafe { (*prev).next };
        if curr.is_null() {
            return;
        }

        let next = unsafe { (*curr).next };
        if !next.is_null() && Self::end_of(curr) == next.addr() {
            unsafe {
                (*curr).size += HEADER + (*next).size;
                (*curr).next = (*next).next;
            }
        }

        if !ptr::eq(prev, &raw const self.head) && Self::end_of(prev) == curr.addr() {
            unsafe {
                (*prev).size += HEADER + (*curr).size;
                (*prev).next = (*curr).next;
            }
        }
    }

    fn end_of(block: *const BlockHeader) -> usize {
        block.addr() + HEADER + unsafe { (*block).size }
    }

    fn contains(&self, payload: *const u8) -> bool {
        let addr = payload.addr();
        addr >= self.start + HEADER && addr < self.start + self.len
    }

    /// Payload bytes available across all free blocks, and the block count.
    fn stats(&self) -> (usize, usize) {
        let mut bytes = 0;
        let mut blocks = 0;
        let mut current = self.head.next;
        while !current.is_null() {
            unsafe {
                bytes += (*current).size;
                current = (*current).next;
            }
            blocks += 1;
        }
        (bytes, blocks)
    }
}

/// The general allocator of the hosted kernel.
pub struct KmallocHeap {
    list: Mutex<FreeList>,
    capacity: usize,
}

impl KmallocHeap {
    /// Build a heap over `[start, start + len)`.
    ///
    /// # Safety
    /// The range must stay valid and writable for the heap's lifetime and
    /// must not be used by anything else. `start` must be
    /// [`MIN_ALIGN`]-aligned.
    #[must_use]
    pub unsafe fn new(start: NonNull<u8>, len: usize) -> Self {
        debug_assert!(start.as_ptr().addr().is_multiple_of(MIN_ALIGN));
        let list = unsafe { FreeList::new(start, len) };
        let (capacity, _) = list.stats();
        Self {
            list: Mutex::new(list),
            capacity,
        }
    }

    /// Allocate `len` bytes.
    #[must_use]
    pub fn kmalloc(&self, len: usize) -> Option<NonNull<u8>> {
        let ptr = unsafe { self.list.lock().allocate(len) };
        let ptr = NonNull::new(ptr);
        if ptr.is_none() {
            log::warn!("kmalloc: no free block for {len} bytes");
        }
        ptr
    }

    /// Free a block from [`kmalloc`](Self::kmalloc).
    ///
    /// # Safety
    /// `ptr` must have come from this heap and must not be used afterwards.
    pub unsafe fn kfree(&self, ptr: NonNull<u8>) {
        let mut list = self.list.lock();
        if !list.contains(ptr.as_ptr()) {
            log::error!("kfree: {ptr:p} is not a heap pointer");
            return;
        }
        unsafe { list.free(ptr.as_ptr()) };
    }

    /// Payload bytes free right now.
    #[must_use]
    pub fn available(&self) -> usize {
        self.list.lock().stats().0
    }

    /// Number of free blocks; `1` when nothing is allocated.
    #[must_use]
    pub fn free_blocks(&self) -> usize {
        self.list.lock().stats().1
    }

    /// Payload bytes free on an empty heap.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
