//! Bootloader variant detection.
//!
//! Nano-class boards ship with one of two bootloaders that speak the same
//! STK500 dialect at different baud rates: the current Optiboot build listens
//! at 115200, the legacy ATmegaBOOT at 57600. The upload tool must be told
//! which one it is talking to, and nothing at that layer negotiates it, so we
//! reset the board ourselves and probe for an in-sync reply.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ledflash::bootloader::BootloaderDetector;
//! use ledflash::port::NativeOpener;
//!
//! fn main() -> ledflash::Result<()> {
//!     let detector = BootloaderDetector::new(NativeOpener);
//!     let variant = detector.resolve_variant("/dev/ttyUSB0")?;
//!     println!("Uploading with {}", variant.board_id());
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::io::{ErrorKind, Read};
use std::thread;
use std::time::Duration;

use log::{debug, info, trace};

use crate::error::Result;
use crate::port::{Port, PortOpener, SerialConfig};

/// STK_GET_SYNC followed by CRC_EOP.
pub const SYNC_COMMAND: [u8; 2] = [0x30, 0x20];

/// STK_INSYNC followed by STK_OK.
pub const IN_SYNC_RESPONSE: [u8; 2] = [0x14, 0x10];

/// Number of sync attempts per baud rate.
pub const SYNC_ATTEMPTS: usize = 4;

/// Bootloader protocol revision burned onto the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootloaderVariant {
    /// ATmegaBOOT found on older boards and many clones.
    Legacy,
    /// Optiboot found on current boards.
    Current,
}

impl BootloaderVariant {
    /// Baud rate the bootloader listens at.
    #[must_use]
    pub fn baud_rate(self) -> u32 {
        match self {
            Self::Legacy => 57600,
            Self::Current => 115200,
        }
    }

    /// Fully qualified board name handed to the toolchain.
    #[must_use]
    pub fn board_id(self) -> &'static str {
        match self {
            Self::Legacy => "arduino:avr:nano:cpu=atmega328old",
            Self::Current => "arduino:avr:nano:cpu=atmega328",
        }
    }
}

impl fmt::Display for BootloaderVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy bootloader"),
            Self::Current => write!(f, "current bootloader"),
        }
    }
}

/// Delays used while resetting and probing the bootloader.
///
/// These are hardware timing requirements of the bootloaders; the default
/// values must not be shortened for real devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectTiming {
    /// Serial read timeout.
    pub read_timeout: Duration,
    /// Time both control lines are held deasserted.
    pub reset_hold: Duration,
    /// Time after asserting the control lines, and after each sync write.
    pub settle: Duration,
}

impl Default for DetectTiming {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(250),
            reset_hold: Duration::from_millis(250),
            settle: Duration::from_millis(50),
        }
    }
}

impl DetectTiming {
    /// No delays at all, for scripted ports.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            read_timeout: Duration::ZERO,
            reset_hold: Duration::ZERO,
            settle: Duration::ZERO,
        }
    }
}

/// Probes a serial port for the STK500 sync reply.
#[derive(Debug, Clone)]
pub struct BootloaderDetector<O> {
    opener: O,
    timing: DetectTiming,
}

impl<O: PortOpener> BootloaderDetector<O> {
    /// Create a detector with the default hardware timing.
    pub fn new(opener: O) -> Self {
        Self {
            opener,
            timing: DetectTiming::default(),
        }
    }

    /// Override the reset and probe delays.
    #[must_use]
    pub fn with_timing(mut self, timing: DetectTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Check whether a bootloader answers the sync command at `baud_rate`.
    ///
    /// `Ok(false)` means the board stayed silent for every attempt, which
    /// is evidence about the variant rather than a failure. Only failing
    /// to open the port is an error.
    pub fn detect(&self, port_name: &str, baud_rate: u32) -> Result<bool> {
        let config = SerialConfig::new(port_name, baud_rate).with_timeout(self.timing.read_timeout);
        let mut port = self
            .opener
            .open(&config)?;

        let matched = self.probe(&mut port);
        if let Err(e) = port.close() {
            debug!("Closing {port_name} failed: {e}");
        }
        Ok(matched)
    }

    /// Detect the variant, falling back to [`BootloaderVariant::Legacy`]
    /// when neither baud rate gets an answer.
    pub fn resolve_variant(&self, port_name: &str) -> Result<BootloaderVariant> {
        if self.detect(port_name, BootloaderVariant::Current.baud_rate())? {
            info!("Detected {} on {port_name}", BootloaderVariant::Current);
            return Ok(BootloaderVariant::Current);
        }

        if self.detect(port_name, BootloaderVariant::Legacy.baud_rate())? {
            info!("Detected {} on {port_name}", BootloaderVariant::Legacy);
        } else {
            info!(
                "No bootloader answered on {port_name}, assuming {}",
                BootloaderVariant::Legacy
            );
        }
        Ok(BootloaderVariant::Legacy)
    }

    /// Reset the board and try to get in sync.
    ///
    /// Control line and flush failures are logged and the attempt carries
    /// on; some adapters lack DTR or RTS and a board may still answer.
    fn probe<P: Port>(&self, port: &mut P) -> bool {
        self.reset(port);
        clear_input(port);

        for attempt in 1..=SYNC_ATTEMPTS {
            if let Err(e) = port.write_all_bytes(&SYNC_COMMAND) {
                trace!("Write error (ignoring): {e}");
            }
            thread::sleep(self.timing.settle);

            let mut response = [0u8; 2];
            let n = read_response(port, &mut response);
            trace!("Sync attempt {attempt}/{SYNC_ATTEMPTS}: {:02X?}", &response[..n]);

            if n == response.len() && response == IN_SYNC_RESPONSE {
                debug!(
                    "In sync with {} after {attempt} attempt(s)",
                    port.name()
                );
                return true;
            }
            clear_input(port);
        }

        false
    }

    /// Pulse DTR/RTS so the auto-reset circuit restarts the bootloader.
    fn reset<P: Port>(&self, port: &mut P) {
        set_control_lines(port, false);
        thread::sleep(self.timing.reset_hold);

        set_control_lines(port, true);
        thread::sleep(self.timing.settle);
    }
}

fn set_control_lines<P: Port>(port: &mut P, level: bool) {
    if let Err(e) = port.set_dtr(level) {
        debug!("Setting DTR on {} failed (ignoring): {e}", port.name());
    }
    if let Err(e) = port.set_rts(level) {
        debug!("Setting RTS on {} failed (ignoring): {e}", port.name());
    }
}

fn clear_input<P: Port>(port: &mut P) {
    if let Err(e) = port.clear_input() {
        trace!("Input flush error (ignoring): {e}");
    }
}

/// Read until `buf` is full, the line times out, or it reports EOF.
fn read_response<P: Port>(port: &mut P, buf: &mut [u8]) -> usize {
    let mut filled = 0;
    while filled < buf.len() {
        match port.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {},
            Err(e) => {
                if e.kind() != ErrorKind::TimedOut {
                    trace!("Read error (ignoring): {e}");
                }
                break;
            },
        }
    }
    filled
}
