//! Device registration and dispatch
//!
//! Devices are selected with a string of the form `name[:options]`, where
//! the options are passed to the device's own parser.

use eflash_serial::{SerialConnection, SerialTransport, Transport};

/// Information about a device type
pub struct DeviceInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available devices (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_devices() -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    devices.push(DeviceInfo {
        name: "serial",
        aliases: &["uart"],
        description: "Sensor on a serial port (dev=<port>[:<baud>])",
    });

    #[cfg(feature = "dummy")]
    devices.push(DeviceInfo {
        name: "dummy",
        aliases: &[],
        description: "In-memory sensor emulator for testing (pages=<n>,start=<page>,chunk=<bytes>)",
    });

    devices
}

/// Generate a short list of device names for CLI help
pub fn device_names_short() -> String {
    let devices = available_devices();
    let names: Vec<&str> = devices.iter().map(|d| d.name).collect();
    names.join(", ")
}

/// Resolve a name or alias to the primary device name
pub fn find_device(name: &str) -> Option<&'static str> {
    available_devices()
        .into_iter()
        .find(|d| d.name == name || d.aliases.contains(&name))
        .map(|d| d.name)
}

/// Split a device string into name and options
pub fn split_device_string(s: &str) -> (&str, &str) {
    match s.split_once(':') {
        Some((name, options)) => (name, options),
        None => (s, ""),
    }
}

/// Parse `key=value,key=value` options
#[cfg(feature = "dummy")]
pub fn parse_options(options: &str) -> Result<Vec<(&str, &str)>, String> {
    options
        .split(',')
        .filter(|opt| !opt.is_empty())
        .map(|opt| {
            opt.split_once('=')
                .ok_or_else(|| format!("Invalid option '{}', expected key=value", opt))
        })
        .collect()
}

/// Parse an option value that can be hex (0x...) or decimal
#[cfg(feature = "dummy")]
fn parse_option_number(key: &str, value: &str) -> Result<u32, String> {
    let parsed = if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        value.parse()
    };
    parsed.map_err(|_| format!("Invalid value for {}: {}", key, value))
}

/// Connection settings that don't come from the device string
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Baud rate when the device string has none
    pub baud: Option<u32>,
    /// Read the port from a background thread
    pub listener: bool,
}

/// Open a device and return it as a type-erased transport
pub fn open_device(
    device: &str,
    options: &OpenOptions,
) -> Result<Box<dyn Transport>, Box<dyn std::error::Error>> {
    let (name, device_options) = split_device_string(device);
    let name = find_device(name).ok_or_else(|| {
        format!(
            "Unknown device: {} (available: {})",
            name,
            device_names_short()
        )
    })?;

    match name {
        "serial" => open_serial(device_options, options),
        #[cfg(feature = "dummy")]
        "dummy" => open_dummy(device_options),
        _ => Err(format!("Device {} is not supported", name).into()),
    }
}

fn open_serial(
    device_options: &str,
    options: &OpenOptions,
) -> Result<Box<dyn Transport>, Box<dyn std::error::Error>> {
    let conn = SerialConnection::parse(device_options)?;
    let transport = SerialTransport::open(&conn.device, conn.baud.or(options.baud))?;
    if options.listener {
        log::debug!("Reading {} from a listener thread", conn.device);
        Ok(Box::new(transport.into_listener()?))
    } else {
        Ok(Box::new(transport))
    }
}

/// Pages filled when `dummy` is given without `pages=`
#[cfg(feature = "dummy")]
const DUMMY_DEFAULT_PAGES: u32 = 4;

/// First timestamp of the dummy's synthetic records (2023-11-14 22:13:20 UTC)
#[cfg(feature = "dummy")]
const DUMMY_FIRST_TIMESTAMP: u32 = 1_700_000_000;

#[cfg(feature = "dummy")]
fn open_dummy(device_options: &str) -> Result<Box<dyn Transport>, Box<dyn std::error::Error>> {
    use eflash_dummy::{DummyConfig, DummySensor};

    let mut config = DummyConfig::default();
    let mut pages = DUMMY_DEFAULT_PAGES;
    let mut start = 0x40;

    for (key, value) in parse_options(device_options)? {
        match key {
            "pages" => pages = parse_option_number(key, value)?,
            "start" => start = parse_option_number(key, value)?,
            "chunk" => config.chunk_size = parse_option_number(key, value)?.max(1) as usize,
            _ => return Err(format!("Unknown dummy option: {}", key).into()),
        }
    }

    let end = start
        .checked_add(pages)
        .filter(|end| *end <= config.total_pages)
        .ok_or("Dummy pages do not fit in flash")?;

    let mut sensor = DummySensor::new(config);
    sensor.fill_pages(start..end, DUMMY_FIRST_TIMESTAMP);
    log::info!(
        "Dummy sensor with {} written pages at 0x{:x}",
        pages,
        start
    );
    Ok(Box::new(sensor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_device_string() {
        assert_eq!(split_device_string("dummy"), ("dummy", ""));
        assert_eq!(
            split_device_string("serial:dev=/dev/ttyUSB0:460800"),
            ("serial", "dev=/dev/ttyUSB0:460800")
        );
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_parse_options() {
        assert_eq!(
            parse_options("pages=3,start=0x80").unwrap(),
            vec![("pages", "3"), ("start", "0x80")]
        );
        assert!(parse_options("").unwrap().is_empty());
        assert!(parse_options("pages").is_err());
    }

    #[test]
    fn test_find_device() {
        assert_eq!(find_device("serial"), Some("serial"));
        assert_eq!(find_device("uart"), Some("serial"));
        assert_eq!(find_device("ch341a"), None);
    }

    #[test]
    fn test_unknown_device() {
        assert!(open_device("nope", &OpenOptions::default()).is_err());
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_open_dummy() {
        let transport = open_device("dummy:pages=2,chunk=64", &OpenOptions::default()).unwrap();
        assert!(transport.is_open());
        assert!(open_device("dummy:colour=red", &OpenOptions::default()).is_err());
        assert!(open_device("dummy:pages=0xFFFFFFFF", &OpenOptions::default()).is_err());
    }
}
