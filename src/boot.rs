//! Boot-info handoff: wraps the Multiboot2 information block the
//! bootloader hands `_start` into a small, typed `BootInfo` so
//! `memory::init` (and anything else that needs the memory map) doesn't
//! have to parse Multiboot2 tags itself.
//!
//! Grounded in the teacher's own inline parsing in `memory::init` —
//! lifted out to its own module rather than rewritten, since the
//! `multiboot2` crate and its borrow-from-raw-pointer shape are already
//! exactly what this needs.

use multiboot2::BootInformation;

/// The widest usable physical memory region the bootloader reported,
/// plus anything else `memory::init` needs before the heap exists.
pub struct BootInfo {
    pub widest_area_start: u64,
    pub widest_area_end: u64,
}

#[derive(Debug)]
pub enum BootInfoError {
    LoadFailed,
    NoMemoryMap,
    NoUsableArea,
}

/// Parse the Multiboot2 info block at `multiboot_info_addr` (the pointer
/// the bootloader leaves for `_start`) and pick the single largest usable
/// memory area, since the frame allocator only tracks one contiguous
/// range at this stage of boot.
///
/// # Safety
/// `multiboot_info_addr` must be the untouched pointer handed to
/// `_start` by the bootloader, pointing at a live Multiboot2 info block.
pub unsafe fn parse(multiboot_info_addr: usize) -> Result<BootInfo, BootInfoError> {
    let boot_info = BootInformation::load(multiboot_info_addr as *const _).map_err(|_| BootInfoError::LoadFailed)?;
    let memory_map_tag = boot_info.memory_map_tag().ok_or(BootInfoError::NoMemoryMap)?;

    let areas = memory_map_tag.memory_areas();
    // The tag's memory lives in the (static, bootloader-reserved) info
    // block, so reconstructing a `'static` slice from it is sound for as
    // long as that block stays untouched, which it does for the rest of
    // boot.
    let static_areas: &'static [multiboot2::MemoryArea] = core::slice::from_raw_parts(areas.as_ptr(), areas.len());

    let widest = static_areas
        .iter()
        .max_by_key(|area| area.end_address() - area.start_address())
        .ok_or(BootInfoError::NoUsableArea)?;

    Ok(BootInfo { widest_area_start: widest.start_address(), widest_area_end: widest.end_address() })
}
