pub mod vfs;
pub mod inode;
pub mod file;
pub mod dentry;
pub mod mount;
pub mod error;
pub mod pipe;
pub mod fd;
pub mod ramfs;
pub mod blockfs;

use spin::Mutex;
use lazy_static::lazy_static;
use vfs::Vfs;

lazy_static! {
    pub static ref VFS: Mutex<Vfs> = Mutex::new(Vfs::new());
    /// `/persist` — the on-disk slot allocator backing persistent storage.
    pub static ref PERSIST_FS: blockfs::BlockFs = blockfs::BlockFs::new(&*crate::drivers::ata::PRIMARY_ATA);
}

/// Initialize the VFS with RAMFS at root.
pub fn init() {
    let mut vfs = VFS.lock();

    // Mount the primary RAMFS at "/"
    let ramfs: &'static ramfs::RamFs = &ramfs::RAMFS_INSTANCE;
    vfs.mount("/", ramfs);

    // Mount a separate TmpFS at "/tmp"
    let tmpfs: &'static ramfs::RamFs = &ramfs::TMPFS_INSTANCE;
    vfs.mount("/tmp", tmpfs);

    drop(vfs);
    seed_default_files();

    crate::log_info!("VFS initialized: ramfs at /, tmpfs at /tmp.");
}

/// Format or re-attach `/persist` to the tail of the primary ATA disk.
/// Must be called after `drivers::ata::init()`.
pub fn mount_persist() {
    if PERSIST_FS.mount() {
        let mut vfs = VFS.lock();
        let fs: &'static blockfs::BlockFs = &PERSIST_FS;
        vfs.mount("/persist", fs);
        crate::log_info!("BlockFS mounted at /persist.");
    } else {
        crate::log_warn!("BlockFS mount failed: /persist unavailable.");
    }
}

fn seed_default_files() {
    use crate::fs::VFS;
    let mut vfs = VFS.lock();
    let _ = vfs.mkdir("/boot");
    let _ = vfs.mkdir("/etc");
    let _ = vfs.mkdir("/home");
    let _ = vfs.create("/README.md");
    let _ = vfs.write_file("/README.md", b"# AtomicOS\nA hobby x86_64 kernel written in Rust.\n");
    let _ = vfs.create("/BUILD.md");
    let _ = vfs.write_file("/BUILD.md", b"# Build Dependencies\nnasm, ld, gcc, grub-mkrescue, qemu, rust nightly\n");
    let _ = vfs.create("/boot/kernel.bin");
    let _ = vfs.write_file("/boot/kernel.bin", b"[ELF binary]");
    let _ = vfs.create("/etc/hostname");
    let _ = vfs.write_file("/etc/hostname", b"atomicos\n");
}
