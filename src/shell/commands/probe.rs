use crate::println;
use crate::drivers::device;

/// probe [device] — list every known device class, or report on one by
/// name (console, null, zero, loopback, block, net).
pub fn run(args: &str) {
    let name = args.trim();
    if name.is_empty() {
        for info in device::enumerate() {
            println!("{:<10} {:<5} {}", info.class.name(), if info.present { "up" } else { "down" }, info.detail);
        }
        return;
    }

    match device::probe(name) {
        Some(info) => println!("{:<10} {:<5} {}", info.class.name(), if info.present { "up" } else { "down" }, info.detail),
        None => println!("probe: unknown device '{}'", name),
    }
}
