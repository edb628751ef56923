//! List commands implementation

use crate::devices::available_devices;

/// List all supported devices
pub fn list_devices() {
    println!("Supported devices:");
    println!();
    for device in available_devices() {
        let name = if device.aliases.is_empty() {
            device.name.to_string()
        } else {
            format!("{} ({})", device.name, device.aliases.join(", "))
        };
        println!("  {:<16} - {}", name, device.description);
    }
}
