pub mod blk;

use blk::VirtioBlkDevice;
use spin::Mutex;
use lazy_static::lazy_static;

/// Conventional legacy virtio-pci I/O base for the first virtio-blk
/// function under QEMU (`-device virtio-blk-pci`). There is no PCI bus
/// enumeration in this kernel, the same simplification
/// `drivers::ata::PRIMARY_ATA` makes for its fixed 0x1F0 base.
const PRIMARY_VIRTIO_BLK_IO_BASE: u16 = 0xC000;

lazy_static! {
    pub static ref PRIMARY_VIRTIO_BLK: Mutex<VirtioBlkDevice> = Mutex::new(VirtioBlkDevice::new(PRIMARY_VIRTIO_BLK_IO_BASE));
}

pub fn init() {
    let mut dev = PRIMARY_VIRTIO_BLK.lock();
    if dev.init().is_ok() {
        crate::log_info!("virtio-blk: device found at I/O base {:#06x}, {} sectors.", PRIMARY_VIRTIO_BLK_IO_BASE, dev.capacity_sectors());
    } else {
        crate::log_warn!("virtio-blk: no device at I/O base {:#06x}.", PRIMARY_VIRTIO_BLK_IO_BASE);
    }
}
