//! Virtual memory mapping: the active level-4 table, a fresh per-process
//! table for `fork`/`exec`, and the copy/unmap helpers the scheduler uses
//! to clone or tear down a process's user pages.
//!
//! The bootloader identity-maps the first 1 GiB of physical memory (see
//! `boot.asm`), so `phys_mem_offset` is always `VirtAddr::new(0)` here —
//! every physical address doubles as a virtual one without a separate
//! offset-mapped window.

use x86_64::{
    registers::control::Cr3,
    structures::paging::{FrameAllocator, Mapper, OffsetPageTable, Page, PageTable, PageTableFlags, Size4KiB, Translate},
    PhysAddr, VirtAddr,
};

/// The physical memory offset used everywhere in this module. A named
/// constant rather than a parameter, since every caller agrees on it.
fn phys_mem_offset() -> VirtAddr {
    VirtAddr::new(0)
}

/// Build an `OffsetPageTable` over whichever level-4 table is currently
/// loaded in CR3.
pub unsafe fn init_paging(physical_memory_offset: VirtAddr) -> OffsetPageTable<'static> {
    let level_4_table = active_level_4_table(physical_memory_offset);
    OffsetPageTable::new(level_4_table, physical_memory_offset)
}

unsafe fn active_level_4_table(physical_memory_offset: VirtAddr) -> &'static mut PageTable {
    let (level_4_table_frame, _) = Cr3::read();
    let phys = level_4_table_frame.start_address();
    let virt = physical_memory_offset + phys.as_u64();
    let page_table_ptr: *mut PageTable = virt.as_mut_ptr();

    &mut *page_table_ptr
}

unsafe fn table_at(phys: PhysAddr) -> &'static mut PageTable {
    let virt = phys_mem_offset() + phys.as_u64();
    &mut *(virt.as_mut_ptr::<PageTable>())
}

/// Allocate a fresh level-4 table for a new process (`fork`/`exec`),
/// sharing the kernel's higher-half entries with the currently active
/// table so kernel code and data stay mapped after a CR3 switch.
pub fn create_new_page_table() -> Option<PhysAddr> {
    let mut allocator = crate::memory::FRAME_ALLOCATOR.lock();
    let frame = allocator.allocate_frame()?;
    let phys = frame.start_address();

    let new_table = unsafe { table_at(phys) };
    new_table.zero();

    let (current_p4_frame, _) = Cr3::read();
    let current_table = unsafe { table_at(current_p4_frame.start_address()) };

    // Entries 256..512 cover the canonical higher half (kernel space);
    // every process shares those, only the lower half differs.
    for i in 256..512 {
        new_table[i] = current_table[i].clone();
    }

    Some(phys)
}

/// Deep-copy every page backing `allocations` (the `(vaddr, size)` user
/// ranges the parent owns) from the currently active table into
/// `child_p4`, allocating a fresh physical frame per page so parent and
/// child no longer share any user-space physical memory (`fork`'s
/// copy-on-write is a later optimization this kernel doesn't do yet).
pub fn deep_clone_process_memory(child_p4: PhysAddr, allocations: &[(u64, u64)]) -> bool {
    let offset = phys_mem_offset();

    let (parent_p4_frame, _) = Cr3::read();
    let parent_table = unsafe { table_at(parent_p4_frame.start_address()) };
    let mut parent_mapper = unsafe { OffsetPageTable::new(parent_table, offset) };

    let child_table = unsafe { table_at(child_p4) };
    let mut child_mapper = unsafe { OffsetPageTable::new(child_table, offset) };

    let mut allocator = crate::memory::FRAME_ALLOCATOR.lock();

    for &(vaddr, size) in allocations {
        let start_page = Page::<Size4KiB>::containing_address(VirtAddr::new(vaddr));
        let page_count = (size + 4095) / 4096;

        for i in 0..page_count {
            let page = start_page + i;
            let parent_frame = match parent_mapper.translate_page(page) {
                Ok(frame) => frame,
                Err(_) => continue, // unmapped hole inside the range; nothing to clone
            };

            let new_frame = match allocator.allocate_frame() {
                Some(frame) => frame,
                None => return false,
            };

            unsafe {
                let src = (offset + parent_frame.start_address().as_u64()).as_ptr::<u8>();
                let dst = (offset + new_frame.start_address().as_u64()).as_mut_ptr::<u8>();
                core::ptr::copy_nonoverlapping(src, dst, 4096);
            }

            let flags = PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE;
            let map_result = unsafe { child_mapper.map_to(page, new_frame, flags, &mut *allocator) };
            match map_result {
                Ok(flush) => flush.ignore(),
                Err(_) => return false,
            }
        }
    }

    true
}

/// Unmap and free every page covering `[addr, addr+size)` in the active
/// table. Called on `munmap`, `exec` (before loading the replacement
/// image), and process exit.
pub fn free_user_memory(addr: VirtAddr, size: u64) {
    let offset = phys_mem_offset();
    let (p4_frame, _) = Cr3::read();
    let table = unsafe { table_at(p4_frame.start_address()) };
    let mut mapper = unsafe { OffsetPageTable::new(table, offset) };

    let start_page = Page::<Size4KiB>::containing_address(addr);
    let page_count = (size + 4095) / 4096;
    let mut allocator = crate::memory::FRAME_ALLOCATOR.lock();

    for i in 0..page_count {
        let page = start_page + i;
        if let Ok((frame, flush)) = mapper.unmap(page) {
            flush.flush();
            allocator.free_frame(frame);
        }
    }
}

/// Map `[addr, addr+size)` as fresh anonymous pages into the active
/// table — one frame per page, `PRESENT | WRITABLE | USER_ACCESSIBLE`.
/// Used by the ELF loader for a program's image and stack, and by
/// `mmap`'s no-hint path. Rolls back nothing on partial failure: a
/// `false` return leaves whatever pages were already mapped in place,
/// since the caller (process exit or a failed exec) tears the whole
/// range down through `free_user_memory` anyway.
pub fn allocate_user_memory(addr: VirtAddr, size: u64) -> bool {
    let offset = phys_mem_offset();
    let (p4_frame, _) = Cr3::read();
    let table = unsafe { table_at(p4_frame.start_address()) };
    let mut mapper = unsafe { OffsetPageTable::new(table, offset) };

    let start_page = Page::<Size4KiB>::containing_address(addr);
    let page_count = (size + 4095) / 4096;
    let flags = PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE;
    let mut allocator = crate::memory::FRAME_ALLOCATOR.lock();

    for i in 0..page_count {
        let page = start_page + i;
        let frame = match allocator.allocate_frame() {
            Some(frame) => frame,
            None => return false,
        };
        match unsafe { mapper.map_to(page, frame, flags, &mut *allocator) } {
            Ok(flush) => flush.flush(),
            Err(_) => return false,
        }
    }
    true
}
