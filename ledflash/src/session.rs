//! Per-run context shared by the watcher, the toolchain setup and the flash
//! pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info};

use crate::error::Result;
use crate::readiness::ReadyState;
use crate::status::StatusSink;
use crate::toolchain::Toolchain;

/// Default working directory name below the system temp directory.
pub const WORK_DIR_NAME: &str = "ledflash";

/// Working directory, readiness flags and status sink of one application run.
pub struct Session {
    work_dir: PathBuf,
    ready: Arc<ReadyState>,
    status: Arc<dyn StatusSink>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("work_dir", &self.work_dir)
            .field("ready", &self.ready.snapshot())
            .finish_non_exhaustive()
    }
}

/// `<tmp>/ledflash`.
pub fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join(WORK_DIR_NAME)
}

impl Session {
    /// Create a session rooted at `work_dir`, creating the directory.
    pub fn new(work_dir: impl Into<PathBuf>, status: Arc<dyn StatusSink>) -> Result<Self> {
        let work_dir = work_dir.into();
        fs::create_dir_all(&work_dir)?;
        Ok(Self {
            work_dir,
            ready: Arc::new(ReadyState::default()),
            status,
        })
    }

    /// Root of every cached download and extracted source tree.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Shared readiness flags.
    pub fn ready(&self) -> &Arc<ReadyState> {
        &self.ready
    }

    /// Publish a status line.
    pub fn report(&self, text: &str) {
        self.status.report(text);
    }

    /// Install the board core and libraries, raising the matching readiness
    /// flags as each step succeeds.
    ///
    /// The first failure is reported and returned; its flag stays low.
    pub fn prepare(&self, toolchain: &impl Toolchain) -> Result<()> {
        self.report("Checking arduino core...");
        if let Err(e) = toolchain.install_core() {
            error!("Core installation failed: {e}");
            self.report(&e.to_string());
            return Err(e);
        }
        self.ready.set_core_installed(true);

        self.report("Checking arduino libraries...");
        if let Err(e) = toolchain.install_libraries() {
            error!("Library installation failed: {e}");
            self.report(&e.to_string());
            return Err(e);
        }
        self.ready.set_libraries_installed(true);

        info!("Toolchain ready");
        self.report("Ready");
        Ok(())
    }
}
