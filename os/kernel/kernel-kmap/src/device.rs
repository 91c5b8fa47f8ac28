//! # Device Lifecycle
//!
//! [`KmapDevice`] owns everything the driver holds while loaded: the device
//! registration, the raw allocation and the reserved, pattern-filled buffer
//! carved from it. It is built once by [`KmapDevice::init`] and torn down once
//! when dropped; there is no global driver state.
//!
//! ## Startup
//!
//! 1. register the character device (dynamic major number)
//! 2. create the device class
//! 3. create the device node `MKDEV(major, 0)`
//! 4. allocate, align and fill the buffer
//! 5. reserve the buffer's pages
//!
//! A failing step undoes all earlier ones in reverse order before the error
//! is returned, so no half-built device is ever reachable.
//!
//! ## Teardown
//!
//! The exact mirror: unreserve, free, destroy the node, destroy the class,
//! unregister. Client mappings must be gone by then; the device does not
//! track them.

use crate::buffer::KmapBuffer;
use crate::config::KmapConfig;
use crate::error::{KmapInitError, MmapError};
use crate::ioctl::handle_ioctl;
use crate::mmap::handle_mmap;
use crate::platform::{ClassHandle, DevNum, DeviceHandle, DeviceRegistry, Major, Platform};
use crate::reserve::{reserve_pages, unreserve_pages};
use crate::vma::VmArea;
use core::mem::ManuallyDrop;
use kernel_info::device::{DEVICE_MINOR, DEVICE_NAME, FILL_PATTERN};
use kernel_info::memory::KMAP_CAPACITY;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// Entry points a device node dispatches to.
pub trait FileOperations {
    /// Back `vma` with device memory.
    ///
    /// # Errors
    /// Whatever the device refuses; see [`MmapError`].
    fn mmap(&self, vma: &mut VmArea) -> Result<(), MmapError>;

    /// Device-specific control request. Returns the syscall result.
    fn unlocked_ioctl(&self, cmd: u32, arg: u64) -> i64;
}

/// A loaded shared-buffer device.
pub struct KmapDevice<'p, P: Platform> {
    platform: &'p P,
    config: KmapConfig,
    major: Major,
    class: ClassHandle,
    devnum: DevNum,
    node: DeviceHandle,
    buffer: ManuallyDrop<KmapBuffer>,
    reserved: usize,
}

impl<'p, P: Platform> KmapDevice<'p, P> {
    /// Register the device and prepare its buffer.
    ///
    /// # Errors
    /// - [`KmapInitError::Registration`] if a device-model step fails.
    /// - [`KmapInitError::Allocation`] if the buffer cannot be allocated.
    ///
    /// Either way every completed step has been undone.
    pub fn init(platform: &'p P, config: KmapConfig) -> Result<Self, KmapInitError> {
        let major = platform.register_chrdev(DEVICE_NAME).inspect_err(|e| {
            log::error!("registration failed with {}", e.errno());
        })?;
        log::info!("loading driver with major num: {major}");

        let class = match platform.class_create(DEVICE_NAME) {
            Ok(class) => class,
            Err(e) => {
                log::error!("error creating {DEVICE_NAME} class: {e}");
                unwind(platform, major, None);
                return Err(e.into());
            }
        };

        let devnum = DevNum::new(major, DEVICE_MINOR);
        let node = match platform.device_create(class, devnum, DEVICE_NAME) {
            Ok(node) => node,
            Err(e) => {
                log::error!("error creating {DEVICE_NAME} device: {e}");
                unwind(platform, major, Some((class, None)));
                return Err(e.into());
            }
        };

        let buffer = match KmapBuffer::allocate(platform, KMAP_CAPACITY, FILL_PATTERN) {
            Ok(buffer) => buffer,
            Err(e) => {
                unwind(platform, major, Some((class, Some(devnum))));
                return Err(e.into());
            }
        };
        log::info!(
            "buffer at {}, physical at {}",
            buffer.aligned().start(),
            platform.virt_to_phys(buffer.aligned().start())
        );

        let reserved = reserve_pages(platform, buffer.aligned());

        Ok(Self {
            platform,
            config,
            major,
            class,
            devnum,
            node,
            buffer: ManuallyDrop::new(buffer),
            reserved,
        })
    }

    /// Unload the device. Equivalent to dropping it.
    pub fn shutdown(self) {
        drop(self);
    }

    #[must_use]
    pub const fn config(&self) -> &KmapConfig {
        &self.config
    }

    #[must_use]
    pub const fn major(&self) -> Major {
        self.major
    }

    #[must_use]
    pub const fn devnum(&self) -> DevNum {
        self.devnum
    }

    #[must_use]
    pub const fn node(&self) -> DeviceHandle {
        self.node
    }

    /// Number of pages reserved at startup.
    #[must_use]
    pub const fn reserved_pages(&self) -> usize {
        self.reserved
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer().aligned().len()
    }

    /// Kernel-virtual start of the shared buffer.
    #[must_use]
    pub fn buffer_start(&self) -> VirtualAddress {
        self.buffer().aligned().start()
    }

    #[must_use]
    pub fn buffer_phys(&self) -> PhysicalAddress {
        self.platform.virt_to_phys(self.buffer_start())
    }

    /// Read buffer contents from the kernel side. Returns the number of bytes
    /// copied.
    pub fn copy_from_buffer(&self, offset: usize, dst: &mut [u8]) -> usize {
        self.buffer().copy_out(offset, dst)
    }

    fn buffer(&self) -> &KmapBuffer {
        &self.buffer
    }
}

impl<P: Platform> FileOperations for KmapDevice<'_, P> {
    fn mmap(&self, vma: &mut VmArea) -> Result<(), MmapError> {
        handle_mmap(self.platform, self.buffer().aligned(), self.config, vma)
    }

    fn unlocked_ioctl(&self, cmd: u32, arg: u64) -> i64 {
        handle_ioctl(cmd, arg)
    }
}

impl<P: Platform> Drop for KmapDevice<'_, P> {
    fn drop(&mut self) {
        // SAFETY: `drop` runs once and the field is not touched afterwards.
        let buffer = unsafe { ManuallyDrop::take(&mut self.buffer) };
        let cleared = unreserve_pages(self.platform, buffer.aligned());
        if cleared != self.reserved {
            log::warn!("reserved {} pages but cleared {cleared}", self.reserved);
        }
        // SAFETY: the buffer came from this platform's heap; clients are
        // required to have unmapped before the device is unloaded.
        unsafe { buffer.release(self.platform) };

        log::info!("cleaning up {DEVICE_NAME} module");
        unwind(self.platform, self.major, Some((self.class, Some(self.devnum))));
    }
}

/// Undo the device-model steps that completed, newest first.
fn unwind<R: DeviceRegistry>(
    registry: &R,
    major: Major,
    class: Option<(ClassHandle, Option<DevNum>)>,
) {
    if let Some((class, devnum)) = class {
        if let Some(devnum) = devnum {
            registry.device_destroy(class, devnum);
        }
        registry.class_destroy(class);
    }
    registry.unregister_chrdev(major, DEVICE_NAME);
}
