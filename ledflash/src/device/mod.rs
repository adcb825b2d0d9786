//! Serial device discovery and classification.
//!
//! LED controllers are Nano-class boards behind a USB-to-UART bridge. The
//! bridge is identified from its USB VID/PID so the console can highlight
//! likely candidates, but every enumerated serial port is reported: clone
//! boards frequently carry bridges we have never seen.

use log::{debug, trace};

/// Known USB bridge kinds found on Nano-class boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// CH340/CH341 USB-to-Serial converter (most clone boards).
    Ch340,
    /// FTDI FT232R USB-to-Serial converter (original Nano).
    Ftdi,
    /// Silicon Labs CP2102/CP2104.
    Cp210x,
    /// Prolific PL2303, seen on a few older clones.
    Prolific,
    /// Arduino-branded USB interface.
    Arduino,
    /// Anything else, including on-board UARTs.
    Unknown,
}

/// Known USB VID/PID pairs. An empty PID list matches any PID of the vendor.
const KNOWN_USB_DEVICES: &[(u16, &[u16], DeviceKind)] = &[
    (0x1A86, &[0x7523, 0x7522, 0x5523], DeviceKind::Ch340),
    (0x0403, &[0x6001, 0x6015], DeviceKind::Ftdi),
    (0x10C4, &[0xEA60], DeviceKind::Cp210x),
    (0x067B, &[0x2303, 0x23A3], DeviceKind::Prolific),
    (0x2341, &[], DeviceKind::Arduino),
    (0x2A03, &[], DeviceKind::Arduino),
];

impl DeviceKind {
    /// Classify a VID/PID combination.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        for (known_vid, pids, device) in KNOWN_USB_DEVICES {
            if vid == *known_vid && (pids.is_empty() || pids.contains(&pid)) {
                return *device;
            }
        }
        Self::Unknown
    }

    /// Short label shown next to the port.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ch340 => "CH340/CH341",
            Self::Ftdi => "FTDI",
            Self::Cp210x => "CP210x",
            Self::Prolific => "PL2303",
            Self::Arduino => "Arduino",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether the bridge is one Nano boards ship with.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// A serial port together with whatever USB metadata the OS exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedPort {
    /// Port address (e.g., "/dev/ttyUSB0" or "COM3").
    pub name: String,
    /// Bridge classified from VID/PID.
    pub device: DeviceKind,
    /// USB vendor ID, absent for non-USB ports.
    pub vid: Option<u16>,
    /// USB product ID, absent for non-USB ports.
    pub pid: Option<u16>,
    /// USB manufacturer string.
    pub manufacturer: Option<String>,
    /// USB product string.
    pub product: Option<String>,
    /// USB serial number string.
    pub serial: Option<String>,
}

impl DetectedPort {
    /// A port known only by its address.
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device: DeviceKind::Unknown,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial: None,
        }
    }

    /// Check if this port is likely an LED controller board.
    pub fn is_likely_controller(&self) -> bool {
        self.device.is_known()
    }
}

impl From<serialport::SerialPortInfo> for DetectedPort {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let mut detected = Self::bare(info.port_name);

        if let serialport::SerialPortType::UsbPort(usb_info) = info.port_type {
            detected.device = DeviceKind::from_vid_pid(usb_info.vid, usb_info.pid);
            detected.vid = Some(usb_info.vid);
            detected.pid = Some(usb_info.pid);
            detected.manufacturer = usb_info.manufacturer;
            detected.product = usb_info.product;
            detected.serial = usb_info.serial_number;

            trace!(
                "Found USB port: {} (VID: {:04X}, PID: {:04X}, Device: {:?})",
                detected.name, usb_info.vid, usb_info.pid, detected.device
            );
        }

        detected
    }
}

/// Enumerate all serial ports with metadata.
///
/// Enumeration failures are logged and reported as an empty list.
pub fn detect_ports() -> Vec<DetectedPort> {
    match serialport::available_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(DetectedPort::from)
            .collect(),
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
            Vec::new()
        },
    }
}
