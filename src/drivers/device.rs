//! Device capability table consulted by the shell's `probe` command.
//! Each entry names a device class and reports whether a backing driver
//! actually detected hardware, the same detected/not-detected split
//! `drivers::ata::pio::AtaDevice` already tracks with its own `detected`
//! flag.

use alloc::string::String;
use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Console,
    Null,
    Zero,
    Loopback,
    Block,
    Net,
}

impl DeviceClass {
    pub fn name(&self) -> &'static str {
        match self {
            DeviceClass::Console => "console",
            DeviceClass::Null => "null",
            DeviceClass::Zero => "zero",
            DeviceClass::Loopback => "loopback",
            DeviceClass::Block => "block",
            DeviceClass::Net => "net",
        }
    }
}

pub struct DeviceInfo {
    pub class: DeviceClass,
    pub present: bool,
    pub detail: String,
}

/// List every device class this kernel knows about, each tagged with
/// whether it actually found hardware (or is simply always present, for
/// the pseudo-devices that need none).
pub fn enumerate() -> Vec<DeviceInfo> {
    use alloc::string::ToString;

    let ata_detected = super::ata::PRIMARY_ATA.lock().detected;

    alloc::vec![
        DeviceInfo { class: DeviceClass::Console, present: true, detail: "VGA text + serial".to_string() },
        DeviceInfo { class: DeviceClass::Null, present: true, detail: "discards all writes".to_string() },
        DeviceInfo { class: DeviceClass::Zero, present: true, detail: "infinite zero bytes".to_string() },
        DeviceInfo { class: DeviceClass::Loopback, present: true, detail: "reflects writes back".to_string() },
        DeviceInfo {
            class: DeviceClass::Block,
            present: ata_detected,
            detail: if ata_detected { "ATA PIO primary master".to_string() } else { "no disk detected".to_string() },
        },
        DeviceInfo { class: DeviceClass::Net, present: false, detail: "no virtio-net device configured".to_string() },
    ]
}

/// Look up one device class by name, as the shell's `probe <device>`
/// command does.
pub fn probe(name: &str) -> Option<DeviceInfo> {
    enumerate().into_iter().find(|d| d.class.name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerate_lists_all_six_classes_exactly_once() {
        let devices = enumerate();
        assert_eq!(devices.len(), 6);
        for class in [DeviceClass::Console, DeviceClass::Null, DeviceClass::Zero, DeviceClass::Loopback, DeviceClass::Block, DeviceClass::Net] {
            assert_eq!(devices.iter().filter(|d| d.class == class).count(), 1);
        }
    }

    #[test]
    fn probe_finds_a_known_class_by_name() {
        let found = probe("console").expect("console should always be listed");
        assert_eq!(found.class, DeviceClass::Console);
        assert!(found.present);
    }

    #[test]
    fn probe_returns_none_for_an_unknown_name() {
        assert!(probe("frobnicator").is_none());
    }
}
