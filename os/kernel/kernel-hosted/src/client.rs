//! # Client Side
//!
//! What a user process does with the device node: open it by path, map it,
//! then use plain loads and stores. [`DeviceFile::mmap`] plays the part of
//! the `mmap` system call: it picks a free, page-aligned address range (the
//! kernel's choice of VMA), describes it as a [`VmArea`] and hands it to the
//! driver.

use crate::kernel::HostedKernel;
use core::marker::PhantomData;
use core::ptr::NonNull;
use kernel_info::memory::PAGE_SIZE;
use kernel_kmap::{FileOperations, KmapDevice, MmapError, VmArea, VmFlags};
use kernel_memory_addresses::VirtualAddress;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{0}: no such device")]
    NoSuchDevice(String),
    #[error("mmap failed: {0}")]
    Mmap(#[from] MmapError),
    #[error("mapping is read-only")]
    ReadOnly,
    #[error("{offset}+{len} lies outside the {mapped} byte mapping")]
    OutOfBounds {
        offset: usize,
        len: usize,
        mapped: usize,
    },
    #[error(transparent)]
    Os(#[from] io::Error),
}

/// Requested mapping permissions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

impl Access {
    const fn vm_flags(self) -> VmFlags {
        match self {
            Self::ReadOnly => VmFlags::new()
                .with_read(true)
                .with_shared(true)
                .with_may_read(true)
                .with_may_share(true),
            Self::ReadWrite => VmFlags::shared_read_write(),
        }
    }
}

/// An open device node.
pub struct DeviceFile<'a> {
    device: &'a KmapDevice<'a, HostedKernel>,
    path: String,
}

/// Open the node at `path`, which must be the one `device` published.
///
/// # Errors
/// [`ClientError::NoSuchDevice`] if no such node exists.
pub fn open<'a>(
    kernel: &HostedKernel,
    device: &'a KmapDevice<'a, HostedKernel>,
    path: &str,
) -> Result<DeviceFile<'a>, ClientError> {
    match kernel.registry().lookup(path) {
        Some(node) if node.devnum == device.devnum() => Ok(DeviceFile {
            device,
            path: path.to_owned(),
        }),
        _ => Err(ClientError::NoSuchDevice(path.to_owned())),
    }
}

impl DeviceFile<'_> {
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Map `len` bytes of the device at offset zero.
    ///
    /// # Errors
    /// [`ClientError::Mmap`] if the driver refuses, [`ClientError::Os`] if
    /// no address range is available.
    pub fn mmap(&self, len: usize, access: Access) -> Result<UserMapping<'_>, ClientError> {
        self.mmap_at(len, 0, access)
    }

    /// Map `len` bytes with page offset `pgoff`.
    ///
    /// # Errors
    /// See [`mmap`](Self::mmap).
    pub fn mmap_at(
        &self,
        len: usize,
        pgoff: u64,
        access: Access,
    ) -> Result<UserMapping<'_>, ClientError> {
        let reserved = len.div_ceil(PAGE_SIZE).max(1) * PAGE_SIZE;
        let addr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                reserved,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error().into());
        }
        let Some(ptr) = NonNull::new(addr.cast::<u8>()) else {
            return Err(io::Error::from(io::ErrorKind::AddrNotAvailable).into());
        };
        let mapping = UserMapping {
            ptr,
            len,
            reserved,
            access,
            _file: PhantomData,
        };

        let start = VirtualAddress::new(ptr.as_ptr().expose_provenance() as u64);
        let mut vma = VmArea::new(start, len as u64, pgoff, access.vm_flags());
        // On error `mapping` is dropped and the range released.
        self.device.mmap(&mut vma)?;
        Ok(mapping)
    }

    /// Issue a control request.
    #[must_use]
    pub fn ioctl(&self, cmd: u32, arg: u64) -> i64 {
        self.device.unlocked_ioctl(cmd, arg)
    }
}

/// A client's window onto the device buffer. Unmapped on drop.
///
/// The mapping borrows the [`DeviceFile`] it came from, which borrows the
/// device, so the device cannot be unloaded while a mapping is alive:
///
/// ```compile_fail
/// use kernel_hosted::{Access, HostedConfig, HostedKernel, open};
/// use kernel_kmap::KmapConfig;
///
/// let kernel = HostedKernel::boot(HostedConfig::default()).unwrap();
/// let device = kernel.load_driver(KmapConfig::default()).unwrap();
/// let file = open(&kernel, &device, "/dev/kmap").unwrap();
/// let map = file.mmap(16384, Access::ReadWrite).unwrap();
/// drop(file);
/// device.shutdown();
/// let _ = map.byte(0);
/// ```
pub struct UserMapping<'a> {
    ptr: NonNull<u8>,
    len: usize,
    reserved: usize,
    access: Access,
    _file: PhantomData<&'a DeviceFile<'a>>,
}

// SAFETY: the mapping is process-wide memory; the type only hands out copies.
unsafe impl Send for UserMapping<'_> {}
unsafe impl Sync for UserMapping<'_> {}

impl UserMapping<'_> {
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[must_use]
    pub const fn access(&self) -> Access {
        self.access
    }

    fn check(&self, offset: usize, len: usize) -> Result<(), ClientError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(ClientError::OutOfBounds {
                offset,
                len,
                mapped: self.len,
            }),
        }
    }

    /// Copy bytes out of the mapping.
    ///
    /// # Errors
    /// [`ClientError::OutOfBounds`] if the range is not mapped.
    pub fn read(&self, offset: usize, dst: &mut [u8]) -> Result<(), ClientError> {
        self.check(offset, dst.len())?;
        // SAFETY: in bounds; other mappings may write concurrently, which at
        // worst tears the copy.
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.ptr.as_ptr().add(offset),
                dst.as_mut_ptr(),
                dst.len(),
            );
        }
        Ok(())
    }

    /// Copy bytes into the mapping. Every other mapping of the device sees
    /// them immediately.
    ///
    /// # Errors
    /// [`ClientError::ReadOnly`] for read-only mappings,
    /// [`ClientError::OutOfBounds`] if the range is not mapped.
    pub fn write(&self, offset: usize, src: &[u8]) -> Result<(), ClientError> {
        if self.access == Access::ReadOnly {
            return Err(ClientError::ReadOnly);
        }
        self.check(offset, src.len())?;
        unsafe {
            core::ptr::copy_nonoverlapping(
                src.as_ptr(),
                self.ptr.as_ptr().add(offset),
                src.len(),
            );
        }
        Ok(())
    }

    /// Read one byte.
    ///
    /// # Errors
    /// [`ClientError::OutOfBounds`] if `offset` is not mapped.
    pub fn byte(&self, offset: usize) -> Result<u8, ClientError> {
        let mut b = [0u8];
        self.read(offset, &mut b)?;
        Ok(b[0])
    }
}

impl Drop for UserMapping<'_> {
    fn drop(&mut self) {
        let rc = unsafe { libc::munmap(self.ptr.as_ptr().cast::<libc::c_void>(), self.reserved) };
        if rc != 0 {
            log::warn!("munmap failed: {}", io::Error::last_os_error());
        }
    }
}
