//! # ledflash
//!
//! A library for updating the firmware of WingnutTech LED controllers.
//!
//! The controllers are Arduino Nano class boards behind a USB-serial bridge.
//! This crate provides:
//!
//! - Serial port discovery and a hotplug-style port watcher
//! - STK500 bootloader detection (legacy 57600 baud vs. current 115200 baud)
//! - A readiness gate that keeps flash attempts single-flight
//! - The flash pipeline: prebuilt image download or custom layout compile,
//!   bootloader detection and upload
//! - The release catalog and custom LED layout generation
//!
//! Compiling and uploading is delegated to `arduino-cli` through the
//! [`Toolchain`] trait.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ledflash::{
//!     ArduinoCli, BootloaderDetector, FlashSelection, Flasher, HttpFetcher, NativeOpener,
//!     NullStatus, Session,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Arc::new(Session::new(ledflash::default_work_dir(), Arc::new(NullStatus))?);
//!     let toolchain = ArduinoCli::locate()?;
//!     session.prepare(&toolchain)?;
//!     session.ready().set_port_selected(true);
//!
//!     let fetcher = HttpFetcher::new();
//!     let catalog = Arc::new(fetcher.fetch_version_catalog()?);
//!     let flasher = Flasher::new(
//!         Arc::clone(&session),
//!         catalog,
//!         toolchain,
//!         fetcher,
//!         BootloaderDetector::new(NativeOpener),
//!     );
//!
//!     flasher.flash(
//!         &FlashSelection::Prebuilt {
//!             version: "v2.1.0".into(),
//!             image: "radian_v2.1.0.hex".into(),
//!         },
//!         "/dev/ttyUSB0",
//!     )?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bootloader;
pub mod catalog;
pub mod device;
pub mod drivers;
pub mod error;
pub mod fetch;
pub mod flash;
pub mod layout;
pub mod port;
pub mod readiness;
pub mod session;
pub mod status;
pub mod toolchain;
pub mod watcher;

// Re-exports for convenience
pub use {
    bootloader::{BootloaderDetector, BootloaderVariant, DetectTiming},
    catalog::VersionCatalog,
    device::{DetectedPort, DeviceKind, detect_ports},
    drivers::{DriverInstall, install_ch340},
    error::{Error, Result},
    fetch::{Fetcher, HttpFetcher},
    flash::{FlashSelection, Flasher},
    layout::CustomLayout,
    port::{NativeOpener, NativePort, Port, PortOpener, SerialConfig},
    readiness::{FlashGuard, Readiness, ReadyState, Unmet},
    session::{Session, default_work_dir},
    status::{ChannelStatus, NullStatus, StatusSink},
    toolchain::{ArduinoCli, Toolchain},
    watcher::{PollingBoardEvents, PortEvent, PortSnapshot, PortWatcher, PortsHandle, scan_events},
};
