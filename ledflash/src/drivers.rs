//! CH340 USB-serial driver installer.
//!
//! Only Windows lacks a bundled CH340 driver; everywhere else installation
//! is a no-op.

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::Result;
use crate::fetch::Fetcher;
use crate::session::Session;

/// Installer archive published alongside the updater.
pub const CH340_URL: &str =
    "https://github.com/reyemxela/LEDControllerUpdater/releases/download/v1.0.0/CH34x_Install_Windows_v3_4.zip";

/// Installer executable inside [`CH340_URL`].
pub const CH340_INSTALLER: &str = "CH34x_Install_Windows_v3_4.EXE";

const CH340_ARCHIVE: &str = "ch340.zip";

/// Result of [`install_ch340`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverInstall {
    /// The installer was started from this path.
    Started(PathBuf),
    /// The platform ships a working driver.
    NotNeeded,
}

/// Make sure the installer executable exists below `work_dir`, downloading
/// and unpacking the archive only when neither is cached.
pub fn prepare_ch340_installer(fetcher: &impl Fetcher, work_dir: &Path) -> Result<PathBuf> {
    let installer = work_dir.join(CH340_INSTALLER);
    if installer.is_file() {
        debug!("Using cached {}", installer.display());
        return Ok(installer);
    }

    let archive = work_dir.join(CH340_ARCHIVE);
    if !archive.is_file() {
        fetcher.download(CH340_URL, &archive)?;
    }
    fetcher.extract_archive(&archive, work_dir)?;
    Ok(installer)
}

/// Fetch and launch the CH340 installer.
///
/// The installer runs detached; this returns as soon as it started.
pub fn install_ch340(fetcher: &impl Fetcher, session: &Session) -> Result<DriverInstall> {
    if !cfg!(windows) {
        session.report("No CH340 driver needed on this platform");
        return Ok(DriverInstall::NotNeeded);
    }

    session.report(&format!("Downloading {CH340_INSTALLER}"));
    let installer = match prepare_ch340_installer(fetcher, session.work_dir()) {
        Ok(path) => path,
        Err(e) => {
            session.report(&e.to_string());
            return Err(e);
        },
    };

    info!("Starting {}", installer.display());
    if let Err(e) = std::process::Command::new(&installer).spawn() {
        session.report(&e.to_string());
        return Err(e.into());
    }
    session.report("Started CH340 installer");
    Ok(DriverInstall::Started(installer))
}
