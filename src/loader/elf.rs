use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

// ══════════════════════════════════════════════════════════════
//  ELF64 constants
// ══════════════════════════════════════════════════════════════

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS64: u8    = 2;
const ELFDATA2LSB: u8   = 1;
const ET_EXEC: u16      = 2;
const EM_X86_64: u16    = 62;
const PT_LOAD: u32      = 1;

// ══════════════════════════════════════════════════════════════
//  ELF64 structures
// ══════════════════════════════════════════════════════════════

struct Elf64Ehdr {
    e_entry: u64,
    e_phoff: u64,
    e_phentsize: u16,
    e_phnum: u16,
}

impl Elf64Ehdr {
    fn parse(data: &[u8]) -> Result<Self, ExecError> {
        if data.len() < 64 { return Err(ExecError::InvalidFormat); }
        if data[0..4] != ELF_MAGIC { return Err(ExecError::InvalidFormat); }
        if data[4] != ELFCLASS64 { return Err(ExecError::UnsupportedArch); }
        if data[5] != ELFDATA2LSB { return Err(ExecError::UnsupportedArch); }

        let e_type = u16::from_le_bytes([data[16], data[17]]);
        let e_machine = u16::from_le_bytes([data[18], data[19]]);
        if e_type != ET_EXEC { return Err(ExecError::UnsupportedType); }
        if e_machine != EM_X86_64 { return Err(ExecError::UnsupportedArch); }

        Ok(Elf64Ehdr {
            e_entry: u64::from_le_bytes(data[24..32].try_into().unwrap()),
            e_phoff: u64::from_le_bytes(data[32..40].try_into().unwrap()),
            e_phentsize: u16::from_le_bytes([data[54], data[55]]),
            e_phnum: u16::from_le_bytes([data[56], data[57]]),
        })
    }
}

struct Elf64Phdr {
    p_type: u32,
    p_offset: u64,
    p_vaddr: u64,
    p_filesz: u64,
    p_memsz: u64,
}

impl Elf64Phdr {
    fn parse(data: &[u8]) -> Result<Self, ExecError> {
        if data.len() < 56 { return Err(ExecError::InvalidFormat); }
        Ok(Elf64Phdr {
            p_type: u32::from_le_bytes(data[0..4].try_into().unwrap()),
            p_offset: u64::from_le_bytes(data[8..16].try_into().unwrap()),
            p_vaddr: u64::from_le_bytes(data[16..24].try_into().unwrap()),
            p_filesz: u64::from_le_bytes(data[32..40].try_into().unwrap()),
            p_memsz: u64::from_le_bytes(data[40..48].try_into().unwrap()),
        })
    }
}

// ══════════════════════════════════════════════════════════════
//  ExecError
// ══════════════════════════════════════════════════════════════

#[derive(Debug)]
pub enum ExecError {
    FileNotFound,
    InvalidFormat,
    UnsupportedArch,
    UnsupportedType,
    MemoryError,
    ReadError,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecError::FileNotFound    => write!(f, "File not found"),
            ExecError::InvalidFormat   => write!(f, "Invalid ELF format"),
            ExecError::UnsupportedArch => write!(f, "Unsupported architecture"),
            ExecError::UnsupportedType => write!(f, "Unsupported ELF type (need ET_EXEC)"),
            ExecError::MemoryError     => write!(f, "Memory allocation error"),
            ExecError::ReadError       => write!(f, "File read error"),
        }
    }
}

// ══════════════════════════════════════════════════════════════
//  Ring 3 trampoline
// ══════════════════════════════════════════════════════════════

/// Entry point every freshly loaded user task's context points `rip` at.
/// The scheduler hands it the target entry and stack top in `r12`/`r13`
/// (callee-saved, so they survive `restore_context`'s register load
/// untouched) — this naked shim moves them into the System V argument
/// registers before calling into ordinary Rust.
#[unsafe(naked)]
pub unsafe extern "C" fn usermode_trampoline() -> ! {
    core::arch::naked_asm!(
        "mov rdi, r12",
        "mov rsi, r13",
        "call {inner}",
        inner = sym usermode_trampoline_inner,
    );
}

extern "C" fn usermode_trampoline_inner(entry: u64, user_stack_top: u64) -> ! {
    let user_cs = crate::interrupts::gdt::user_code_selector().0;
    let user_ss = crate::interrupts::gdt::user_data_selector().0;

    crate::log_info!("ELF: jumping to Ring 3 — entry={:#x} stack={:#x} cs={:#x} ss={:#x}",
        entry, user_stack_top, user_cs, user_ss);

    crate::interrupts::usermode::jump_to_usermode(entry, user_stack_top, user_cs, user_ss);
    unreachable!("jump_to_usermode never returns");
}

// ══════════════════════════════════════════════════════════════
//  ELF Loader
// ══════════════════════════════════════════════════════════════

/// Stack size for user programs (16 KiB).
const USER_STACK_SIZE: usize = 4096 * 4;

/// Everything `sys_exec` needs to replace the calling process's address
/// space in place: the page table it now runs under, the `(vaddr, size)`
/// ranges it owns (for later `munmap`/exit teardown), and the entry
/// point and stack top the trampoline should jump to.
pub struct ElfLoadParams {
    pub page_table: u64,
    pub allocations: Vec<(u64, u64)>,
    pub entry: u64,
    pub user_stack_top: u64,
}

/// Parsed layout of one loaded image: where its segments and stack
/// landed, and what CR3 they were mapped under.
struct LoadedImage {
    page_table: u64,
    load_base: u64,
    image_size: u64,
    user_stack_base: u64,
    user_stack_top: u64,
    entry: u64,
}

/// Parse `path`'s ELF headers, map its segments and a fresh user stack
/// into the *currently active* page table, and copy the segment data
/// in. Shared by `load` (spawn a new task) and `parse_and_map_elf`
/// (replace the calling task's image).
fn load_into_current_table(path: &str) -> Result<LoadedImage, ExecError> {
    let file_data = read_file_all(path)?;
    let ehdr = Elf64Ehdr::parse(&file_data)?;

    crate::log_info!("ELF: entry={:#x} phoff={} phnum={}", ehdr.e_entry, ehdr.e_phoff, ehdr.e_phnum);

    let mut load_base: u64 = u64::MAX;
    let mut load_end: u64 = 0;

    for i in 0..ehdr.e_phnum as usize {
        let off = ehdr.e_phoff as usize + i * ehdr.e_phentsize as usize;
        let phdr = Elf64Phdr::parse(&file_data[off..])?;
        if phdr.p_type != PT_LOAD { continue; }
        if phdr.p_vaddr < load_base { load_base = phdr.p_vaddr; }
        let seg_end = phdr.p_vaddr + phdr.p_memsz;
        if seg_end > load_end { load_end = seg_end; }
    }

    if load_base == u64::MAX {
        return Err(ExecError::InvalidFormat);
    }

    let load_end_aligned = (load_end + 4095) & !4095;
    let user_stack_base = load_end_aligned;
    let user_stack_top = user_stack_base + USER_STACK_SIZE as u64;
    let image_size = load_end - load_base;

    if !crate::memory::paging::allocate_user_memory(x86_64::VirtAddr::new(load_base), image_size) {
        return Err(ExecError::MemoryError);
    }
    if !crate::memory::paging::allocate_user_memory(x86_64::VirtAddr::new(user_stack_base), USER_STACK_SIZE as u64) {
        return Err(ExecError::MemoryError);
    }

    for i in 0..ehdr.e_phnum as usize {
        let off = ehdr.e_phoff as usize + i * ehdr.e_phentsize as usize;
        let phdr = Elf64Phdr::parse(&file_data[off..])?;
        if phdr.p_type != PT_LOAD { continue; }

        let dest_ptr = phdr.p_vaddr as *mut u8;
        let file_offset = phdr.p_offset as usize;
        let file_size = phdr.p_filesz as usize;

        if file_offset + file_size <= file_data.len() {
            unsafe {
                core::ptr::copy_nonoverlapping(file_data[file_offset..].as_ptr(), dest_ptr, file_size);
            }
        }

        if phdr.p_memsz > phdr.p_filesz {
            let bss_size = (phdr.p_memsz - phdr.p_filesz) as usize;
            unsafe {
                core::ptr::write_bytes(dest_ptr.add(file_size), 0, bss_size);
            }
        }
    }

    let (current_p4, _) = x86_64::registers::control::Cr3::read();

    Ok(LoadedImage {
        page_table: current_p4.start_address().as_u64(),
        load_base,
        image_size,
        user_stack_base,
        user_stack_top,
        entry: ehdr.e_entry,
    })
}

/// Load an ELF64 binary and spawn it as a brand-new Ring 3 task,
/// sharing the caller's page table (there is no demand paging yet, so
/// every task's user pages live in one address space).
pub fn load(path: &str) -> Result<u64, ExecError> {
    let image = load_into_current_table(path)?;
    let task_name = extract_filename(path);

    let task_id = crate::scheduler::spawn_process(
        &task_name,
        image.page_table,
        image.entry,
        image.user_stack_top,
        vec![(image.load_base, image.image_size), (image.user_stack_base, USER_STACK_SIZE as u64)],
    );

    crate::log_info!("ELF: spawned task '{}' (id {})", task_name, task_id.0);
    Ok(task_id.0)
}

/// Load an ELF64 binary in place of the calling process's image, for
/// `sys_exec`. The caller is responsible for freeing its old
/// allocations and swapping in the returned page table and context
/// before this process runs again.
pub fn parse_and_map_elf(path: &str) -> Result<ElfLoadParams, ExecError> {
    let image = load_into_current_table(path)?;
    Ok(ElfLoadParams {
        page_table: image.page_table,
        allocations: vec![(image.load_base, image.image_size), (image.user_stack_base, USER_STACK_SIZE as u64)],
        entry: image.entry,
        user_stack_top: image.user_stack_top,
    })
}

fn read_file_all(path: &str) -> Result<Vec<u8>, ExecError> {
    let vfs = crate::fs::VFS.lock();
    let inode = vfs.lookup(path).map_err(|_| ExecError::FileNotFound)?;
    if inode.size == 0 { return Err(ExecError::InvalidFormat); }
    let mut buf = vec![0u8; inode.size];
    let bytes_read = vfs.read_file(path, 0, &mut buf).map_err(|_| ExecError::ReadError)?;
    buf.truncate(bytes_read);
    Ok(buf)
}

fn extract_filename(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).into()
}
