//! Serial line access for the bootloader handshake.
//!
//! Detection needs raw bytes, the DTR/RTS lines that drive the Nano's
//! auto-reset circuit and a way to drop stale input. Tests substitute
//! scripted boards for [`NativePort`].
//!
//! Each detection opens the line at one baud rate and closes it again before
//! the upload tool takes over, hence [`PortOpener`] instead of a long-lived
//! port.
//!
//! ```rust,no_run
//! use ledflash::port::{NativeOpener, Port, PortOpener, SerialConfig};
//!
//! fn pulse_reset() -> ledflash::Result<()> {
//!     let mut line = NativeOpener.open(&SerialConfig::new("/dev/ttyUSB0", 57600))?;
//!     line.set_dtr(false)?;
//!     line.set_dtr(true)?;
//!     line.close()
//! }
//! ```

pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// How long a read waits for the board unless told otherwise.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Where and how fast to open a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// OS address of the line ("/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Line speed; the bootloader variant decides it.
    pub baud_rate: u32,
    /// Upper bound for a single read.
    pub read_timeout: Duration,
}

impl SerialConfig {
    /// 8N1 line at `baud_rate` with [`DEFAULT_READ_TIMEOUT`].
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Replace the read timeout.
    #[must_use]
    pub fn with_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

/// An open serial line.
pub trait Port: Read + Write + Send {
    /// Address the line was opened at.
    fn name(&self) -> &str;

    /// Drop whatever the board sent that nobody read yet.
    fn clear_input(&mut self) -> Result<()>;

    /// Drive DTR.
    fn set_dtr(&mut self, level: bool) -> Result<()>;

    /// Drive RTS.
    fn set_rts(&mut self, level: bool) -> Result<()>;

    /// Release the line. I/O afterwards fails with `NotConnected`.
    fn close(&mut self) -> Result<()>;

    /// Send `buf` and flush it.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.write_all(buf)?;
        self.flush()?;
        Ok(())
    }
}

/// Opens lines on demand.
pub trait PortOpener {
    /// Line type handed out.
    type Port: Port;

    /// Open `config.port_name` with the given settings.
    fn open(&self, config: &SerialConfig) -> Result<Self::Port>;
}

pub use native::{NativeOpener, NativePort};
