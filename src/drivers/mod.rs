pub mod ata;
pub mod device;
pub mod keyboard;
pub mod mouse;
pub mod tty;
pub mod virtio;

/// Common interface for anything BlockFS can format and mount — the ATA
/// PIO driver today, virtio-blk once that's wired up. One sector per
/// call, matching the PIO driver's own granularity.
pub trait BlockDevice: Send + Sync {
    fn read_block(&self, lba: u64, buf: &mut [u8; 512]) -> Result<(), ()>;
    fn write_block(&self, lba: u64, buf: &[u8; 512]) -> Result<(), ()>;
    fn total_blocks(&self) -> u64;
}

pub fn init() {
    ata::init();
    virtio::init();
    keyboard::init();
    mouse::init();
    tty::init();
    crate::log_info!("Drivers subsystem initialized.");
}
