//! The hosted kernel: all platform services the driver needs, assembled over
//! one block of physical memory.

use crate::config::HostedConfig;
use crate::error::HostedError;
use crate::heap::KmallocHeap;
use crate::pages::PageDescriptors;
use crate::phys_mem::PhysicalMemory;
use crate::registry::{DeviceNodes, RegistryEvent};
use crate::remap;
use core::ptr::NonNull;
use kernel_kmap::{
    ClassHandle, DevNum, DeviceHandle, DeviceRegistry, KernelHeap, KmapConfig, KmapDevice,
    KmapInitError, Major, PageReservations, PfnRemapper, PhysMapper, RegistrationError,
    RemapError, VmArea,
};
use kernel_memory_addresses::{
    PageFrameNumber, PhysicalAddress, PhysicalPage, Size4K, VirtualAddress,
};

pub struct HostedKernel {
    phys: PhysicalMemory,
    heap: KmallocHeap,
    pages: PageDescriptors,
    registry: DeviceNodes,
}

impl HostedKernel {
    /// Bring up physical memory, the heap, page descriptors and the device
    /// model.
    ///
    /// # Errors
    /// If physical memory cannot be created.
    pub fn boot(config: HostedConfig) -> Result<Self, HostedError> {
        let phys = PhysicalMemory::new(config.frames)?;
        // SAFETY: the direct map is page aligned, lives as long as `phys`
        // and is handed to nothing but the heap.
        let heap = unsafe { KmallocHeap::new(phys.direct_map_ptr(), phys.len()) };
        let pages = PageDescriptors::new(PhysicalMemory::first_frame(), phys.frames());
        let registry = DeviceNodes::new(config.fail_at);

        log::info!(
            "hosted kernel up: {} heap bytes, {} frames",
            heap.capacity(),
            phys.frames()
        );
        Ok(Self {
            phys,
            heap,
            pages,
            registry,
        })
    }

    /// Load the shared-buffer driver on this kernel.
    ///
    /// # Errors
    /// See [`KmapDevice::init`].
    pub fn load_driver(&self, config: KmapConfig) -> Result<KmapDevice<'_, Self>, KmapInitError> {
        KmapDevice::init(self, config)
    }

    #[must_use]
    pub const fn phys(&self) -> &PhysicalMemory {
        &self.phys
    }

    #[must_use]
    pub const fn registry(&self) -> &DeviceNodes {
        &self.registry
    }

    #[must_use]
    pub fn registry_events(&self) -> Vec<RegistryEvent> {
        self.registry.events()
    }

    #[must_use]
    pub fn reserved_pages(&self) -> usize {
        self.pages.reserved_pages()
    }

    #[must_use]
    pub fn double_reservations(&self) -> usize {
        self.pages.double_reservations()
    }

    #[must_use]
    pub fn spurious_clears(&self) -> usize {
        self.pages.spurious_clears()
    }

    #[must_use]
    pub fn is_page_reserved(&self, page: PhysicalPage<Size4K>) -> bool {
        self.pages.flags(page).is_some_and(|f| f.reserved())
    }

    #[must_use]
    pub fn heap_available(&self) -> usize {
        self.heap.available()
    }

    #[must_use]
    pub const fn heap_capacity(&self) -> usize {
        self.heap.capacity()
    }
}

impl KernelHeap for HostedKernel {
    fn kmalloc(&self, len: usize) -> Option<NonNull<u8>> {
        self.heap.kmalloc(len)
    }

    unsafe fn kfree(&self, ptr: NonNull<u8>) {
        unsafe { self.heap.kfree(ptr) }
    }
}

impl PhysMapper for HostedKernel {
    fn virt_to_phys(&self, va: VirtualAddress) -> PhysicalAddress {
        let pa = self.phys.virt_to_phys(va);
        debug_assert!(pa.is_some(), "virt_to_phys: {va} is outside the direct map");
        pa.unwrap_or_else(|| {
            log::warn!("virt_to_phys: {va} is outside the direct map");
            PhysicalAddress::zero()
        })
    }
}

impl PageReservations for HostedKernel {
    fn set_page_reserved(&self, page: PhysicalPage<Size4K>) {
        self.pages.set_reserved(page);
    }

    fn clear_page_reserved(&self, page: PhysicalPage<Size4K>) {
        self.pages.clear_reserved(page);
    }
}

impl PfnRemapper for HostedKernel {
    fn remap_pfn_range(
        &self,
        vma: &mut VmArea,
        pfn: PageFrameNumber,
        size: u64,
    ) -> Result<(), RemapError> {
        remap::remap_pfn_range(&self.phys, vma, pfn, size)
    }
}

impl DeviceRegistry for HostedKernel {
    fn register_chrdev(&self, name: &'static str) -> Result<Major, RegistrationError> {
        self.registry.register_chrdev(name)
    }

    fn unregister_chrdev(&self, major: Major, name: &'static str) {
        self.registry.unregister_chrdev(major, name);
    }

    fn class_create(&self, name: &'static str) -> Result<ClassHandle, RegistrationError> {
        self.registry.class_create(name)
    }

    fn class_destroy(&self, class: ClassHandle) {
        self.registry.class_destroy(class);
    }

    fn device_create(
        &self,
        class: ClassHandle,
        devnum: DevNum,
        name: &'static str,
    ) -> Result<DeviceHandle, RegistrationError> {
        self.registry.device_create(class, devnum, name)
    }

    fn device_destroy(&self, class: ClassHandle, devnum: DevNum) {
        self.registry.device_destroy(class, devnum);
    }
}
