//! BlockFS — a from-scratch, directory-less slot allocator for
//! `/persist/*`. Formats the *tail* of a block device with a header,
//! a fixed 256-entry file table, and `256 × 16 KiB` data slots, staying
//! clear of the last 34 blocks so a GPT backup header never gets
//! clobbered. Every read/write is a block-aligned read-modify-write
//! through the owning `drivers::BlockDevice`, going through
//! `drivers::ata::PRIMARY_ATA` one sector at a time.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use spin::Mutex;

use super::dentry::DirEntry;
use super::error::{FsError, FsResult};
use super::inode::{FileType, Inode};
use super::mount::FileSystem;
use crate::drivers::BlockDevice;

const MAGIC: u32 = 0x5253_4501;
const VERSION: u32 = 1;
const MAX_FILES: usize = 256;
const SLOT_BYTES: u32 = 16 * 1024;
const NAME_MAX: usize = 31;
const GPT_GUARD_BLOCKS: u64 = 34;
const BLOCK_SIZE: u32 = 512;

const HEADER_BYTES: usize = 48;
const ENTRY_BYTES: usize = 32 + 4 + 4 + 1;

#[derive(Clone, Copy)]
struct BlockFsHeader {
    magic: u32,
    version: u32,
    block_size: u32,
    slot_size: u32,
    max_files: u32,
    table_blocks: u32,
    start_lba: u64,
    data_start_lba: u64,
    region_blocks: u64,
}

impl BlockFsHeader {
    fn zeroed() -> Self {
        BlockFsHeader { magic: 0, version: 0, block_size: 0, slot_size: 0, max_files: 0, table_blocks: 0, start_lba: 0, data_start_lba: 0, region_blocks: 0 }
    }

    fn to_bytes(&self, out: &mut [u8; 512]) {
        out.fill(0);
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..8].copy_from_slice(&self.version.to_le_bytes());
        out[8..12].copy_from_slice(&self.block_size.to_le_bytes());
        out[12..16].copy_from_slice(&self.slot_size.to_le_bytes());
        out[16..20].copy_from_slice(&self.max_files.to_le_bytes());
        out[20..24].copy_from_slice(&self.table_blocks.to_le_bytes());
        out[24..32].copy_from_slice(&self.start_lba.to_le_bytes());
        out[32..40].copy_from_slice(&self.data_start_lba.to_le_bytes());
        out[40..48].copy_from_slice(&self.region_blocks.to_le_bytes());
    }

    fn from_bytes(buf: &[u8; 512]) -> Self {
        BlockFsHeader {
            magic: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            version: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            block_size: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            slot_size: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            max_files: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            table_blocks: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
            start_lba: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            data_start_lba: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
            region_blocks: u64::from_le_bytes(buf[40..48].try_into().unwrap()),
        }
    }
}

#[derive(Clone, Copy)]
struct BlockFsEntry {
    name: [u8; 32],
    size: u32,
    slot_index: u32,
    in_use: bool,
}

impl BlockFsEntry {
    fn empty(slot_index: u32) -> Self {
        BlockFsEntry { name: [0; 32], size: 0, slot_index, in_use: false }
    }

    fn name_str(&self) -> String {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..len]).into_owned()
    }

    fn set_name(&mut self, name: &str) {
        self.name = [0; 32];
        let bytes = name.as_bytes();
        let n = bytes.len().min(NAME_MAX);
        self.name[..n].copy_from_slice(&bytes[..n]);
    }

    fn write_to(&self, out: &mut [u8]) {
        out[0..32].copy_from_slice(&self.name);
        out[32..36].copy_from_slice(&self.size.to_le_bytes());
        out[36..40].copy_from_slice(&self.slot_index.to_le_bytes());
        out[40] = self.in_use as u8;
    }

    fn read_from(buf: &[u8]) -> Self {
        let mut name = [0u8; 32];
        name.copy_from_slice(&buf[0..32]);
        BlockFsEntry {
            name,
            size: u32::from_le_bytes(buf[32..36].try_into().unwrap()),
            slot_index: u32::from_le_bytes(buf[36..40].try_into().unwrap()),
            in_use: buf[40] != 0,
        }
    }
}

struct BlockFsState {
    mounted: bool,
    header: BlockFsHeader,
    entries: Vec<BlockFsEntry>,
    slot_blocks: u32,
}

/// A slot-allocator filesystem over a raw block device. Flat namespace
/// (no subdirectories) — every entry lives directly under the mount
/// point, matching `/persist/<name>`.
pub struct BlockFs {
    device: &'static dyn BlockDevice,
    state: Mutex<BlockFsState>,
}

impl BlockFs {
    pub fn new(device: &'static dyn BlockDevice) -> Self {
        BlockFs {
            device,
            state: Mutex::new(BlockFsState {
                mounted: false,
                header: BlockFsHeader::zeroed(),
                entries: vec![BlockFsEntry::empty(0); MAX_FILES],
                slot_blocks: 0,
            }),
        }
    }

    fn blocks_for_bytes(bytes: u32) -> u32 {
        (bytes + BLOCK_SIZE - 1) / BLOCK_SIZE
    }

    /// Format or re-attach to the tail region of the backing device.
    /// Re-mounting is idempotent: if a valid header with matching
    /// geometry is already on disk, its entry table is loaded instead
    /// of reformatting over existing files.
    pub fn mount(&self) -> bool {
        let total_blocks = self.device.total_blocks();
        let slot_blocks = Self::blocks_for_bytes(SLOT_BYTES);
        let slot_size = slot_blocks * BLOCK_SIZE;
        let table_blocks = Self::blocks_for_bytes((ENTRY_BYTES * MAX_FILES) as u32);
        let region_blocks = 1 + table_blocks as u64 + slot_blocks as u64 * MAX_FILES as u64;

        if total_blocks <= region_blocks + GPT_GUARD_BLOCKS + 1 {
            return false;
        }

        let start_lba = total_blocks - region_blocks - GPT_GUARD_BLOCKS;
        let data_start_lba = start_lba + 1 + table_blocks as u64;

        let mut state = self.state.lock();

        let mut header_buf = [0u8; 512];
        if self.device.read_block(start_lba, &mut header_buf).is_err() {
            return false;
        }
        let on_disk = BlockFsHeader::from_bytes(&header_buf);

        let matches = on_disk.magic == MAGIC
            && on_disk.version == VERSION
            && on_disk.block_size == BLOCK_SIZE
            && on_disk.slot_size == slot_size
            && on_disk.max_files == MAX_FILES as u32
            && on_disk.table_blocks == table_blocks;

        state.slot_blocks = slot_blocks;

        if matches {
            state.header = on_disk;
            if !self.load_entries(&mut state, start_lba, table_blocks) {
                return false;
            }
        } else {
            state.header = BlockFsHeader {
                magic: MAGIC,
                version: VERSION,
                block_size: BLOCK_SIZE,
                slot_size,
                max_files: MAX_FILES as u32,
                table_blocks,
                start_lba,
                data_start_lba,
                region_blocks,
            };
            for (i, entry) in state.entries.iter_mut().enumerate() {
                *entry = BlockFsEntry::empty(i as u32);
            }
            if !self.sync_header(&state) || !self.sync_entries(&state) {
                return false;
            }
        }

        state.mounted = true;
        true
    }

    fn load_entries(&self, state: &mut BlockFsState, start_lba: u64, table_blocks: u32) -> bool {
        let mut raw = vec![0u8; table_blocks as usize * BLOCK_SIZE as usize];
        for i in 0..table_blocks as u64 {
            let mut block = [0u8; 512];
            if self.device.read_block(start_lba + 1 + i, &mut block).is_err() {
                return false;
            }
            let off = i as usize * BLOCK_SIZE as usize;
            raw[off..off + BLOCK_SIZE as usize].copy_from_slice(&block);
        }
        for i in 0..MAX_FILES {
            state.entries[i] = BlockFsEntry::read_from(&raw[i * ENTRY_BYTES..]);
        }
        true
    }

    fn sync_header(&self, state: &BlockFsState) -> bool {
        let mut buf = [0u8; 512];
        state.header.to_bytes(&mut buf);
        self.device.write_block(state.header.start_lba, &buf).is_ok()
    }

    fn sync_entries(&self, state: &BlockFsState) -> bool {
        let table_blocks = state.header.table_blocks as usize;
        let mut raw = vec![0u8; table_blocks * BLOCK_SIZE as usize];
        for (i, entry) in state.entries.iter().enumerate() {
            entry.write_to(&mut raw[i * ENTRY_BYTES..(i + 1) * ENTRY_BYTES]);
        }
        for i in 0..table_blocks {
            let mut block = [0u8; 512];
            let off = i * BLOCK_SIZE as usize;
            block.copy_from_slice(&raw[off..off + BLOCK_SIZE as usize]);
            if self.device.write_block(state.header.start_lba + 1 + i as u64, &block).is_err() {
                return false;
            }
        }
        true
    }

    fn find(state: &BlockFsState, name: &str) -> Option<usize> {
        state.entries.iter().position(|e| e.in_use && e.name_str() == name)
    }

    fn find_free(state: &BlockFsState) -> Option<usize> {
        state.entries.iter().position(|e| !e.in_use)
    }

    /// Read-modify-write `count` bytes starting at `offset` within one
    /// file's slot, crossing block boundaries as needed.
    fn slot_read_at(&self, base_lba: u64, offset: u64, out: &mut [u8]) -> bool {
        let mut lba = base_lba + offset / BLOCK_SIZE as u64;
        let mut block_off = (offset % BLOCK_SIZE as u64) as usize;
        let mut written = 0;
        let mut block = [0u8; 512];

        while written < out.len() {
            if self.device.read_block(lba, &mut block).is_err() {
                return false;
            }
            let take = (BLOCK_SIZE as usize - block_off).min(out.len() - written);
            out[written..written + take].copy_from_slice(&block[block_off..block_off + take]);
            written += take;
            lba += 1;
            block_off = 0;
        }
        true
    }

    fn slot_write_at(&self, base_lba: u64, offset: u64, data: &[u8]) -> bool {
        let mut lba = base_lba + offset / BLOCK_SIZE as u64;
        let mut block_off = (offset % BLOCK_SIZE as u64) as usize;
        let mut read = 0;
        let mut block = [0u8; 512];

        while read < data.len() {
            let take = (BLOCK_SIZE as usize - block_off).min(data.len() - read);
            if take != BLOCK_SIZE as usize {
                if self.device.read_block(lba, &mut block).is_err() {
                    return false;
                }
            }
            block[block_off..block_off + take].copy_from_slice(&data[read..read + take]);
            if self.device.write_block(lba, &block).is_err() {
                return false;
            }
            read += take;
            lba += 1;
            block_off = 0;
        }
        true
    }

    fn rel_name<'a>(&self, path: &'a str) -> FsResult<&'a str> {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() || trimmed.contains('/') {
            return Err(FsError::InvalidPath);
        }
        Ok(trimmed)
    }
}

impl FileSystem for BlockFs {
    fn name(&self) -> &str {
        "blockfs"
    }

    fn create(&self, path: &str) -> FsResult<Inode> {
        let name = self.rel_name(path)?;
        let mut state = self.state.lock();
        if !state.mounted { return Err(FsError::NotMounted); }
        if Self::find(&state, name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let idx = Self::find_free(&state).ok_or(FsError::NoSpace)?;
        state.entries[idx].set_name(name);
        state.entries[idx].size = 0;
        state.entries[idx].in_use = true;
        if !self.sync_entries(&state) {
            return Err(FsError::IoError);
        }
        Ok(Inode { id: idx as u64, file_type: FileType::File, size: 0 })
    }

    fn mkdir(&self, _path: &str) -> FsResult<Inode> {
        Err(FsError::NotADirectory)
    }

    fn lookup(&self, path: &str) -> FsResult<Inode> {
        let name = self.rel_name(path)?;
        let state = self.state.lock();
        if !state.mounted { return Err(FsError::NotMounted); }
        let idx = Self::find(&state, name).ok_or(FsError::NotFound)?;
        let e = &state.entries[idx];
        Ok(Inode { id: idx as u64, file_type: FileType::File, size: e.size as usize })
    }

    fn read(&self, path: &str, offset: usize, buf: &mut [u8]) -> FsResult<usize> {
        let name = self.rel_name(path)?;
        let state = self.state.lock();
        if !state.mounted { return Err(FsError::NotMounted); }
        let idx = Self::find(&state, name).ok_or(FsError::NotFound)?;
        let entry = state.entries[idx];

        if offset as u64 >= entry.size as u64 {
            return Ok(0);
        }
        let available = entry.size as usize - offset;
        let to_read = buf.len().min(available);
        if to_read == 0 {
            return Ok(0);
        }
        let base_lba = state.header.data_start_lba + entry.slot_index as u64 * state.slot_blocks as u64;
        if !self.slot_read_at(base_lba, offset as u64, &mut buf[..to_read]) {
            return Err(FsError::IoError);
        }
        Ok(to_read)
    }

    fn write(&self, path: &str, offset: usize, data: &[u8]) -> FsResult<usize> {
        let name = self.rel_name(path)?;
        let mut state = self.state.lock();
        if !state.mounted { return Err(FsError::NotMounted); }
        let idx = Self::find(&state, name).ok_or(FsError::NotFound)?;

        let slot_size = state.header.slot_size as u64;
        if offset as u64 >= slot_size {
            return Ok(0);
        }
        let max_len = (slot_size - offset as u64) as usize;
        let to_write = data.len().min(max_len);
        if to_write == 0 {
            return Ok(0);
        }

        let base_lba = state.header.data_start_lba + state.entries[idx].slot_index as u64 * state.slot_blocks as u64;
        if !self.slot_write_at(base_lba, offset as u64, &data[..to_write]) {
            return Err(FsError::IoError);
        }

        let new_size = offset as u64 + to_write as u64;
        if new_size > state.entries[idx].size as u64 {
            state.entries[idx].size = new_size as u32;
            if !self.sync_entries(&state) {
                return Err(FsError::IoError);
            }
        }
        Ok(to_write)
    }

    fn readdir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        if path != "/" && !path.is_empty() {
            return Err(FsError::NotFound);
        }
        let state = self.state.lock();
        if !state.mounted { return Err(FsError::NotMounted); }
        Ok(state.entries.iter().enumerate()
            .filter(|(_, e)| e.in_use)
            .map(|(i, e)| DirEntry {
                name: e.name_str(),
                inode: Inode { id: i as u64, file_type: FileType::File, size: e.size as usize },
            })
            .collect())
    }

    fn unlink(&self, path: &str) -> FsResult<()> {
        let name = self.rel_name(path)?;
        let mut state = self.state.lock();
        if !state.mounted { return Err(FsError::NotMounted); }
        let idx = Self::find(&state, name).ok_or(FsError::NotFound)?;
        let slot = state.entries[idx].slot_index;
        state.entries[idx] = BlockFsEntry::empty(slot);
        if !self.sync_entries(&state) {
            return Err(FsError::IoError);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// An in-memory stand-in for a raw disk, sized like the original
    /// reference implementation's default (8192 × 512-byte blocks).
    struct MemBlockDevice {
        blocks: StdMutex<Vec<[u8; 512]>>,
    }

    impl MemBlockDevice {
        fn new(total_blocks: usize) -> Self {
            MemBlockDevice { blocks: StdMutex::new(vec![[0u8; 512]; total_blocks]) }
        }
    }

    impl BlockDevice for MemBlockDevice {
        fn read_block(&self, lba: u64, buf: &mut [u8; 512]) -> Result<(), ()> {
            let blocks = self.blocks.lock().unwrap();
            let block = blocks.get(lba as usize).ok_or(())?;
            *buf = *block;
            Ok(())
        }

        fn write_block(&self, lba: u64, buf: &[u8; 512]) -> Result<(), ()> {
            let mut blocks = self.blocks.lock().unwrap();
            let block = blocks.get_mut(lba as usize).ok_or(())?;
            *block = *buf;
            Ok(())
        }

        fn total_blocks(&self) -> u64 {
            self.blocks.lock().unwrap().len() as u64
        }
    }

    use std::boxed::Box;

    /// Leaks a fresh backing device for the duration of the test
    /// process — simplest way to get a `&'static dyn BlockDevice` for
    /// `BlockFs::new` without threading lifetimes through every test.
    fn new_device(total_blocks: usize) -> &'static MemBlockDevice {
        Box::leak(Box::new(MemBlockDevice::new(total_blocks)))
    }

    fn mounted_fs() -> BlockFs {
        let fs = BlockFs::new(new_device(8192));
        assert!(fs.mount());
        fs
    }

    #[test]
    fn mount_fails_when_device_too_small() {
        let fs = BlockFs::new(new_device(64));
        assert!(!fs.mount());
    }

    #[test]
    fn create_then_lookup_round_trips() {
        let fs = mounted_fs();
        let inode = fs.create("/notes.txt").unwrap();
        assert_eq!(inode.size, 0);
        let found = fs.lookup("/notes.txt").unwrap();
        assert_eq!(found.file_type, FileType::File);
    }

    #[test]
    fn write_then_read_round_trips_across_block_boundary() {
        let fs = mounted_fs();
        fs.create("/data.bin").unwrap();
        let payload: Vec<u8> = (0..1200u32).map(|i| (i % 251) as u8).collect();
        let written = fs.write("/data.bin", 37, &payload).unwrap();
        assert_eq!(written, payload.len());

        let mut out = vec![0u8; payload.len()];
        let read = fs.read("/data.bin", 37, &mut out).unwrap();
        assert_eq!(read, payload.len());
        assert_eq!(out, payload);
    }

    #[test]
    fn write_past_slot_size_is_truncated_not_erroring() {
        let fs = mounted_fs();
        fs.create("/big.bin").unwrap();
        let slot_size = 16 * 1024usize;
        let payload = vec![7u8; slot_size + 500];
        let written = fs.write("/big.bin", 0, &payload).unwrap();
        assert_eq!(written, slot_size);
    }

    #[test]
    fn unlink_frees_the_slot_for_reuse() {
        let fs = mounted_fs();
        fs.create("/a.txt").unwrap();
        fs.unlink("/a.txt").unwrap();
        assert!(fs.lookup("/a.txt").is_err());
        assert!(fs.create("/a.txt").is_ok());
    }

    #[test]
    fn remount_over_existing_data_preserves_entries() {
        let device = new_device(8192);
        let fs = BlockFs::new(device);
        assert!(fs.mount());
        fs.create("/persisted.txt").unwrap();
        fs.write("/persisted.txt", 0, b"hello").unwrap();

        let fs2 = BlockFs::new(device);
        assert!(fs2.mount());
        let mut out = [0u8; 5];
        let n = fs2.read("/persisted.txt", 0, &mut out).unwrap();
        assert_eq!(&out[..n], b"hello");
    }

    #[test]
    fn rejects_nested_paths_flat_namespace() {
        let fs = mounted_fs();
        assert!(matches!(fs.create("/a/b.txt"), Err(FsError::InvalidPath)));
    }
}
