//! In-crate test platform: heap memory from the global allocator, an
//! identity "direct map", and bookkeeping that records every call.

use crate::error::{RegistrationError, RemapError};
use crate::platform::{
    ClassHandle, DevNum, DeviceHandle, DeviceRegistry, KernelHeap, Major, PageReservations,
    PfnRemapper, PhysMapper,
};
use crate::vma::VmArea;
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{
    PageFrameNumber, PhysicalAddress, PhysicalPage, Size4K, VirtualAddress,
};
use std::alloc::{Layout, alloc, dealloc};
use std::collections::{BTreeMap, HashMap};
use std::ptr::NonNull;
use std::sync::Mutex;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    RegisterChrdev(Major),
    UnregisterChrdev(Major),
    ClassCreate(ClassHandle),
    ClassDestroy(ClassHandle),
    DeviceCreate(DevNum),
    DeviceDestroy(DevNum),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FailAt {
    Chrdev,
    Class,
    Device,
}

#[derive(Debug, Clone)]
pub struct RemapCall {
    pub vma: VmArea,
    pub pfn: PageFrameNumber,
    pub size: u64,
}

pub struct MockPlatform {
    misalign: usize,
    heap_fails: bool,
    allocations: Mutex<HashMap<usize, (usize, Layout)>>,
    reserved: Mutex<BTreeMap<PhysicalPage<Size4K>, u32>>,
    reserve_calls: Mutex<Vec<PhysicalPage<Size4K>>>,
    unreserve_calls: Mutex<Vec<PhysicalPage<Size4K>>>,
    remap_error: Option<RemapError>,
    remaps: Mutex<Vec<RemapCall>>,
    fail_at: Option<FailAt>,
    events: Mutex<Vec<RegistryEvent>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            misalign: 16,
            heap_fails: false,
            allocations: Mutex::default(),
            reserved: Mutex::default(),
            reserve_calls: Mutex::default(),
            unreserve_calls: Mutex::default(),
            remap_error: None,
            remaps: Mutex::default(),
            fail_at: None,
            events: Mutex::default(),
        }
    }

    pub fn with_heap_misalignment(mut self, misalign: usize) -> Self {
        self.misalign = misalign;
        self
    }

    pub fn with_failing_heap(mut self) -> Self {
        self.heap_fails = true;
        self
    }

    pub fn with_failing_remap(mut self, error: RemapError) -> Self {
        self.remap_error = Some(error);
        self
    }

    pub fn with_failing_registration(mut self, stage: FailAt) -> Self {
        self.fail_at = Some(stage);
        self
    }

    pub fn live_allocations(&self) -> usize {
        self.allocations.lock().unwrap().len()
    }

    /// Pages whose reservation count is currently non-zero.
    pub fn reserved_pages(&self) -> usize {
        self.reserved.lock().unwrap().values().filter(|c| **c > 0).count()
    }

    /// Highest current reservation count of any page.
    pub fn max_reservation_depth(&self) -> u32 {
        self.reserved.lock().unwrap().values().copied().max().unwrap_or(0)
    }

    pub fn reserve_calls(&self) -> Vec<PhysicalPage<Size4K>> {
        self.reserve_calls.lock().unwrap().clone()
    }

    pub fn unreserve_calls(&self) -> Vec<PhysicalPage<Size4K>> {
        self.unreserve_calls.lock().unwrap().clone()
    }

    pub fn remaps(&self) -> Vec<RemapCall> {
        self.remaps.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<RegistryEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl KernelHeap for MockPlatform {
    fn kmalloc(&self, len: usize) -> Option<NonNull<u8>> {
        if self.heap_fails {
            return None;
        }
        let layout = Layout::from_size_align(len + self.misalign, PAGE_SIZE).ok()?;
        let base = NonNull::new(unsafe { alloc(layout) })?;
        let ptr = unsafe { base.add(self.misalign) };
        self.allocations
            .lock()
            .unwrap()
            .insert(ptr.as_ptr().addr(), (self.misalign, layout));
        Some(ptr)
    }

    unsafe fn kfree(&self, ptr: NonNull<u8>) {
        let (misalign, layout) = self
            .allocations
            .lock()
            .unwrap()
            .remove(&ptr.as_ptr().addr())
            .expect("kfree of unknown pointer");
        unsafe { dealloc(ptr.as_ptr().sub(misalign), layout) };
    }
}

impl PhysMapper for MockPlatform {
    fn virt_to_phys(&self, va: VirtualAddress) -> PhysicalAddress {
        PhysicalAddress::new(va.as_u64())
    }
}

impl PageReservations for MockPlatform {
    fn set_page_reserved(&self, page: PhysicalPage<Size4K>) {
        *self.reserved.lock().unwrap().entry(page).or_default() += 1;
        self.reserve_calls.lock().unwrap().push(page);
    }

    fn clear_page_reserved(&self, page: PhysicalPage<Size4K>) {
        let mut reserved = self.reserved.lock().unwrap();
        let count = reserved.entry(page).or_default();
        assert!(*count > 0, "clearing unreserved page {page}");
        *count -= 1;
        self.unreserve_calls.lock().unwrap().push(page);
    }
}

impl PfnRemapper for MockPlatform {
    fn remap_pfn_range(
        &self,
        vma: &mut VmArea,
        pfn: PageFrameNumber,
        size: u64,
    ) -> Result<(), RemapError> {
        if let Some(error) = self.remap_error {
            return Err(error);
        }
        vma.flags = vma.flags.with_io(true).with_pfnmap(true);
        self.remaps.lock().unwrap().push(RemapCall {
            vma: vma.clone(),
            pfn,
            size,
        });
        Ok(())
    }
}

impl DeviceRegistry for MockPlatform {
    fn register_chrdev(&self, _name: &'static str) -> Result<Major, RegistrationError> {
        if self.fail_at == Some(FailAt::Chrdev) {
            return Err(RegistrationError::Chrdev(-16));
        }
        let major = Major::new(240);
        self.events.lock().unwrap().push(RegistryEvent::RegisterChrdev(major));
        Ok(major)
    }

    fn unregister_chrdev(&self, major: Major, _name: &'static str) {
        self.events.lock().unwrap().push(RegistryEvent::UnregisterChrdev(major));
    }

    fn class_create(&self, _name: &'static str) -> Result<ClassHandle, RegistrationError> {
        if self.fail_at == Some(FailAt::Class) {
            return Err(RegistrationError::Class(-12));
        }
        let class = ClassHandle(1);
        self.events.lock().unwrap().push(RegistryEvent::ClassCreate(class));
        Ok(class)
    }

    fn class_destroy(&self, class: ClassHandle) {
        self.events.lock().unwrap().push(RegistryEvent::ClassDestroy(class));
    }

    fn device_create(
        &self,
        _class: ClassHandle,
        devnum: DevNum,
        _name: &'static str,
    ) -> Result<DeviceHandle, RegistrationError> {
        if self.fail_at == Some(FailAt::Device) {
            return Err(RegistrationError::Device(-17));
        }
        self.events.lock().unwrap().push(RegistryEvent::DeviceCreate(devnum));
        Ok(DeviceHandle(1))
    }

    fn device_destroy(&self, _class: ClassHandle, devnum: DevNum) {
        self.events.lock().unwrap().push(RegistryEvent::DeviceDestroy(devnum));
    }
}
