pub mod address_space;
pub mod paging;
pub mod frame_allocator;

pub use address_space::{copy_from_user, copy_to_user, AddressSpace, MemoryRange};

use frame_allocator::BumpFrameAllocator;
use spin::Mutex;
use lazy_static::lazy_static;

lazy_static! {
    pub static ref FRAME_ALLOCATOR: Mutex<BumpFrameAllocator> = Mutex::new(BumpFrameAllocator::new());
}

pub fn init(multiboot_info_addr: usize) {
    let boot_info = unsafe { crate::boot::parse(multiboot_info_addr) }.expect("Failed to parse Multiboot2 boot info!");

    let mut allocator = FRAME_ALLOCATOR.lock();
    unsafe { allocator.init(x86_64::PhysAddr::new(boot_info.widest_area_start), x86_64::PhysAddr::new(boot_info.widest_area_end)) };

    // Test native single frame allocation visually
    use x86_64::structures::paging::FrameAllocator;
    let _first_frame = allocator.allocate_frame().unwrap();

    crate::log_info!("Physical Memory Frame Allocator initialized using Multiboot2 Map.");

    // Setup Paging
    // In our architecture, the bootloader (boot.asm) identity maps the first 1GB of memory.
    // This allows us to use physical address 0 as virtual address 0.
    use x86_64::VirtAddr;
    let phys_mem_offset = VirtAddr::new(0); // For identity mapping
    let mut mapper = unsafe { paging::init_paging(phys_mem_offset) };
    crate::log_info!("Virtual Memory Paging subsystem initialized.");

    // Initialize Heap Support (Dynamic Memory Allocation via #[global_allocator])
    crate::allocator::init_heap(&mut mapper, &mut *allocator)
        .expect("Heap initialization failed");
    
    crate::log_info!("Heap Allocator initialized successfully.");

    // Validate dynamic allocation features
    use alloc::vec;
    use alloc::string::String;
    let mut dynam_vec: vec::Vec<u32> = vec::Vec::new();
    for i in 0..500 {
        dynam_vec.push(i);
    }
    crate::log_info!("Dynamically allocated a {} elements vector at {:p}", dynam_vec.len(), dynam_vec.as_slice());

    let hello_alloc = String::from("String built from Heap!");
    crate::log_info!("Test dynamically stored string: {}", hello_alloc);
}
