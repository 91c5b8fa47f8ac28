use kernel_hosted::{Access, FailStage, HostedConfig, HostedKernel, RegistryEvent, open};
use kernel_info::memory::{KMAP_CAPACITY, KMAP_PAGES, PAGE_SIZE};
use kernel_kmap::{KernelHeap, KmapConfig, KmapInitError, Major};
use kernel_memory_addresses::{PhysicalPage, Size4K};

#[test]
fn buffer_is_page_aligned_and_pages_reserved() {
    let kernel = HostedKernel::boot(HostedConfig::default()).unwrap();
    let device = kernel.load_driver(KmapConfig::default()).unwrap();

    assert_eq!(device.capacity(), KMAP_CAPACITY);
    assert!(device.buffer_start().is_aligned::<Size4K>());
    assert!(device.buffer_phys().is_aligned::<Size4K>());
    assert_eq!(kernel.reserved_pages(), KMAP_PAGES);

    let first: PhysicalPage<Size4K> = device.buffer_phys().page();
    let mut page = first;
    for _ in 0..KMAP_PAGES {
        assert!(kernel.is_page_reserved(page));
        page = page.next();
    }
    // Nothing past the buffer.
    assert!(!kernel.is_page_reserved(page));
}

#[test]
fn shutdown_releases_everything() {
    let kernel = HostedKernel::boot(HostedConfig::default()).unwrap();
    let free = kernel.heap_available();

    let device = kernel.load_driver(KmapConfig::default()).unwrap();
    assert!(kernel.heap_available() < free);
    device.shutdown();

    assert_eq!(kernel.reserved_pages(), 0);
    assert_eq!(kernel.double_reservations(), 0);
    assert_eq!(kernel.spurious_clears(), 0);
    assert_eq!(kernel.heap_available(), free);
    assert!(kernel.registry().is_empty());

    let events = kernel.registry_events();
    assert!(matches!(
        events[3..],
        [
            RegistryEvent::DeviceDestroy { .. },
            RegistryEvent::ClassDestroy { .. },
            RegistryEvent::UnregisterChrdev { .. },
        ]
    ));
}

#[test]
fn driver_can_be_reloaded() {
    let kernel = HostedKernel::boot(HostedConfig::default()).unwrap();
    kernel.load_driver(KmapConfig::default()).unwrap().shutdown();
    let device = kernel.load_driver(KmapConfig::default()).unwrap();
    assert_eq!(kernel.reserved_pages(), KMAP_PAGES);
    assert!(kernel.registry().lookup("/dev/kmap").is_some());
    drop(device);
    assert_eq!(kernel.double_reservations(), 0);
}

#[test]
fn second_instance_is_refused() {
    let kernel = HostedKernel::boot(HostedConfig::default()).unwrap();
    let _device = kernel.load_driver(KmapConfig::default()).unwrap();
    let err = kernel.load_driver(KmapConfig::default()).err().unwrap();
    assert!(matches!(err, KmapInitError::Registration(_)));
    assert_eq!(kernel.reserved_pages(), KMAP_PAGES);
}

#[test]
fn class_failure_unwinds_chrdev() {
    let kernel =
        HostedKernel::boot(HostedConfig::default().failing_at(FailStage::Class)).unwrap();
    let err = kernel.load_driver(KmapConfig::default()).err().unwrap();
    assert_eq!(err.errno(), -12);
    assert_eq!(
        kernel.registry_events(),
        [
            RegistryEvent::RegisterChrdev {
                major: Major::new(254),
                name: "kmap"
            },
            RegistryEvent::UnregisterChrdev {
                major: Major::new(254)
            },
        ]
    );
    assert!(kernel.registry().is_empty());
}

#[test]
fn device_failure_unwinds_class_and_chrdev() {
    let kernel =
        HostedKernel::boot(HostedConfig::default().failing_at(FailStage::Device)).unwrap();
    assert!(kernel.load_driver(KmapConfig::default()).is_err());

    let events = kernel.registry_events();
    assert!(matches!(
        events[..],
        [
            RegistryEvent::RegisterChrdev { .. },
            RegistryEvent::ClassCreate { .. },
            RegistryEvent::ClassDestroy { .. },
            RegistryEvent::UnregisterChrdev { .. },
        ]
    ));
    assert!(kernel.registry().is_empty());
    assert_eq!(kernel.heap_available(), kernel.heap_capacity());
}

#[test]
fn out_of_memory_unwinds_registration() {
    // Four frames cannot hold 16 KiB plus two pages of slack.
    let kernel = HostedKernel::boot(HostedConfig::default().with_frames(4)).unwrap();
    let err = kernel.load_driver(KmapConfig::default()).err().unwrap();
    assert!(matches!(err, KmapInitError::Allocation(_)));
    assert_eq!(err.errno(), -12);

    assert!(kernel.registry().is_empty());
    assert_eq!(kernel.registry_events().len(), 6);
    assert_eq!(kernel.reserved_pages(), 0);
    assert_eq!(kernel.heap_available(), kernel.heap_capacity());
}

#[test]
fn tight_memory_still_fits_the_buffer() {
    // Header + capacity + two slack pages, rounded up to whole frames.
    let frames = (KMAP_CAPACITY + 2 * PAGE_SIZE + 16).div_ceil(PAGE_SIZE) as u64;
    let kernel = HostedKernel::boot(HostedConfig::default().with_frames(frames)).unwrap();
    let device = kernel.load_driver(KmapConfig::default()).unwrap();
    assert_eq!(kernel.reserved_pages(), KMAP_PAGES);
    drop(device);
    assert_eq!(kernel.reserved_pages(), 0);
}

#[test]
fn mapped_pages_stay_out_of_the_heap_until_unload() {
    let kernel = HostedKernel::boot(HostedConfig::default()).unwrap();
    let device = kernel.load_driver(KmapConfig::default()).unwrap();
    let file = open(&kernel, &device, "/dev/kmap").unwrap();
    let map = file.mmap(KMAP_CAPACITY, Access::ReadWrite).unwrap();
    map.write(0, b"live").unwrap();

    // Kernel allocations made while mapped never hand out buffer pages.
    let other = kernel.kmalloc(8000).unwrap();
    unsafe { other.as_ptr().write_bytes(0xab, 8000) };
    assert_eq!(kernel.reserved_pages(), KMAP_PAGES);
    let mut head = [0u8; 4];
    map.read(0, &mut head).unwrap();
    assert_eq!(&head, b"live");
    unsafe { kernel.kfree(other) };

    // Unloading requires the mapping and the file to be gone first.
    drop(map);
    drop(file);
    device.shutdown();
    assert_eq!(kernel.reserved_pages(), 0);
    assert_eq!(kernel.heap_available(), kernel.heap_capacity());
}
