pub mod pio;

use pio::AtaDevice;
use spin::Mutex;
use lazy_static::lazy_static;

lazy_static! {
    pub static ref PRIMARY_ATA: Mutex<AtaDevice> = Mutex::new(AtaDevice::new(0x1F0, 0x3F6, true));
}

pub fn init() {
    let mut dev = PRIMARY_ATA.lock();
    if dev.identify().is_ok() {
        crate::log_info!("ATA PIO: Primary master disk detected.");
    } else {
        crate::log_warn!("ATA PIO: No disk detected.");
    }
}

/// Assumed capacity for a PIO-addressed LBA28 disk when IDENTIFY doesn't
/// hand back a usable sector count. Real geometry detection belongs in
/// `identify`; until then BlockFS needs *some* total to size its region.
const ASSUMED_TOTAL_BLOCKS: u64 = 8192;

impl super::BlockDevice for Mutex<AtaDevice> {
    fn read_block(&self, lba: u64, buf: &mut [u8; 512]) -> Result<(), ()> {
        self.lock().read_sector(lba as u32, buf).map_err(|_| ())
    }

    fn write_block(&self, lba: u64, buf: &[u8; 512]) -> Result<(), ()> {
        self.lock().write_sector(lba as u32, buf).map_err(|_| ())
    }

    fn total_blocks(&self) -> u64 {
        ASSUMED_TOTAL_BLOCKS
    }
}
