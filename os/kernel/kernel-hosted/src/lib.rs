//! # Hosted Platform
//!
//! Runs the shared-buffer driver inside an ordinary Linux process. The
//! pieces a kernel would provide are rebuilt on top of one shared-memory
//! file that stands in for physical RAM:
//!
//! | Kernel service | Hosted counterpart |
//! |---|---|
//! | physical memory, direct map | [`PhysicalMemory`]: a `memfd` mapped once `MAP_SHARED` |
//! | `kmalloc` / `kfree` | [`KmallocHeap`]: free-list allocator over the direct map |
//! | `struct page` flags | [`PageDescriptors`]: one atomic flag byte per frame |
//! | `remap_pfn_range` | [`remap::remap_pfn_range`]: `mmap(MAP_FIXED)` of the file range |
//! | chrdev / class / device | [`DeviceNodes`]: node table with an event log |
//! | kernel log | [`KernelLogger`]: `log` sink on stderr |
//!
//! Because every client mapping and the direct map are views of the same
//! file pages, the aliasing behavior matches the real thing: a store through
//! one mapping is visible through all others and through the kernel.
//!
//! ```no_run
//! use kernel_hosted::{Access, HostedConfig, HostedKernel, open};
//! use kernel_kmap::KmapConfig;
//!
//! let kernel = HostedKernel::boot(HostedConfig::default())?;
//! let device = kernel.load_driver(KmapConfig::default())?;
//! let file = open(&kernel, &device, "/dev/kmap")?;
//! let map = file.mmap(16384, Access::ReadWrite)?;
//! map.write(0, b"Hello world\0")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Frames are assumed to be the host's page size (4 KiB).

pub mod client;
pub mod config;
pub mod error;
pub mod heap;
pub mod kernel;
pub mod logger;
pub mod pages;
pub mod phys_mem;
pub mod registry;
pub mod remap;

pub use crate::client::{Access, ClientError, DeviceFile, UserMapping, open};
pub use crate::config::{FailStage, HostedConfig};
pub use crate::error::HostedError;
pub use crate::heap::KmallocHeap;
pub use crate::kernel::HostedKernel;
pub use crate::logger::KernelLogger;
pub use crate::pages::{PageDescriptors, PageFlags};
pub use crate::phys_mem::PhysicalMemory;
pub use crate::registry::{DeviceNode, DeviceNodes, RegistryEvent};
