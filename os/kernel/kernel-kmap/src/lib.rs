//! # Shared Kernel Buffer Driver
//!
//! A character device that owns one page-aligned, pattern-filled buffer and
//! lets any number of clients map it straight into their address space. After
//! the mapping is installed no further calls are needed: every client reads
//! and writes the same physical pages.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 KmapDevice (device)                 │
//! │    • registration and unwinding                     │
//! │    • FileOperations: mmap, unlocked_ioctl           │
//! └───────┬───────────────────┬──────────────────┬──────┘
//!         │ startup/teardown  │ startup/teardown │ per request
//! ┌───────▼────────┐  ┌───────▼────────┐  ┌──────▼──────┐
//! │ KmapBuffer     │  │ reserve_pages  │  │ handle_mmap │
//! │ (buffer)       │  │ (reserve)      │  │ (mmap)      │
//! │ • allocate     │  │ • reserve      │  │ • validate  │
//! │ • align        │  │ • unreserve    │  │ • mark vma  │
//! │ • fill pattern │  │                │  │ • remap pfn │
//! └───────┬────────┘  └───────┬────────┘  └──────┬──────┘
//!         └───────────────────┼──────────────────┘
//! ┌───────────────────────────▼─────────────────────────┐
//! │                 Platform (platform)                 │
//! │    KernelHeap · PhysMapper · PageReservations       │
//! │    PfnRemapper · DeviceRegistry                     │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The crate is `no_std` and never touches hardware itself. A kernel supplies
//! the [`platform`] traits; the `kernel-hosted` crate supplies them in user
//! space on top of a shared-memory file.
//!
//! ## Usage
//!
//! ```ignore
//! let device = KmapDevice::init(&platform, KmapConfig::default())?;
//! let mut vma = VmArea::new(user_start, 16384, 0, VmFlags::shared_read_write());
//! device.mmap(&mut vma)?;
//! // ... clients use the mapping ...
//! device.shutdown();
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod buffer;
pub mod config;
pub mod device;
pub mod error;
pub mod ioctl;
pub mod mmap;
pub mod platform;
pub mod reserve;
pub mod vma;

#[cfg(test)]
mod mock;

pub use crate::config::{KmapConfig, LengthPolicy};
pub use crate::device::{FileOperations, KmapDevice};
pub use crate::error::{AllocError, KmapInitError, MmapError, RegistrationError, RemapError};
pub use crate::platform::{
    ClassHandle, DevNum, DeviceHandle, DeviceRegistry, KernelHeap, Major, PageReservations,
    PfnRemapper, PhysMapper, Platform,
};
pub use crate::vma::{PageProtection, VmArea, VmFlags};
