//! Compile and upload service backed by `arduino-cli`.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use log::{debug, info};

use crate::error::{Error, Result};

/// Board core the controller firmware builds against.
pub const CORE: &str = "arduino:avr";

/// Libraries the firmware needs, pinned to tested versions.
pub const LIBRARIES: &[(&str, &str)] = &[("FastLED", "3.4.0"), ("Adafruit BMP280 Library", "2.3.0")];

/// Executable name searched on `PATH`.
pub const ARDUINO_CLI: &str = "arduino-cli";

/// Sketch compiler and image uploader.
pub trait Toolchain {
    /// Make sure the board core is installed.
    fn install_core(&self) -> Result<()>;

    /// Make sure every library in [`LIBRARIES`] is installed.
    fn install_libraries(&self) -> Result<()>;

    /// Compile the sketch folder `sketch` for `board`, placing outputs in
    /// `export_dir`.
    fn compile(&self, board: &str, sketch: &Path, export_dir: &Path) -> Result<()>;

    /// Upload `image` to the device on `port` using `board`'s upload protocol.
    fn upload(&self, board: &str, port: &str, image: &Path) -> Result<()>;
}

/// Image produced by [`Toolchain::compile`] for a sketch named `sketch_name`.
pub fn compiled_image_path(export_dir: &Path, sketch_name: &str) -> PathBuf {
    export_dir.join(format!("{sketch_name}.ino.hex"))
}

/// [`Toolchain`] driving the `arduino-cli` executable.
#[derive(Debug, Clone)]
pub struct ArduinoCli {
    program: PathBuf,
}

impl ArduinoCli {
    /// Use an explicit executable path.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Locate `arduino-cli` on `PATH`.
    pub fn locate() -> Result<Self> {
        which::which(ARDUINO_CLI)
            .map(Self::new)
            .map_err(|e| Error::Toolchain(format!("{ARDUINO_CLI} not found: {e}")))
    }

    /// Use `program` when given, otherwise search `PATH`.
    pub fn from_config(program: Option<&Path>) -> Result<Self> {
        match program {
            Some(path) => Ok(Self::new(path)),
            None => Self::locate(),
        }
    }

    /// Path of the executable in use.
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run<I, S>(&self, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        debug!("Running {cmd:?}");
        cmd.output()
            .map_err(|e| Error::Toolchain(format!("failed to run {}: {e}", self.program.display())))
    }
}

fn stderr_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let text = stderr.trim_end();
    if text.is_empty() {
        format!("exited with {}", output.status)
    } else {
        text.to_string()
    }
}

impl Toolchain for ArduinoCli {
    fn install_core(&self) -> Result<()> {
        info!("Installing core {CORE}");
        let output = self.run(["core", "install", CORE])?;
        if !output.status.success() {
            return Err(Error::Toolchain(stderr_text(&output)));
        }
        Ok(())
    }

    fn install_libraries(&self) -> Result<()> {
        for (name, version) in LIBRARIES {
            info!("Installing library {name}@{version}");
            let spec = format!("{name}@{version}");
            let output = self.run(["lib", "install", spec.as_str()])?;
            if !output.status.success() {
                return Err(Error::Toolchain(stderr_text(&output)));
            }
        }
        Ok(())
    }

    fn compile(&self, board: &str, sketch: &Path, export_dir: &Path) -> Result<()> {
        info!("Compiling {} for {board}", sketch.display());
        let output = self.run([
            OsStr::new("compile"),
            OsStr::new("--fqbn"),
            OsStr::new(board),
            OsStr::new("--output-dir"),
            export_dir.as_os_str(),
            sketch.as_os_str(),
        ])?;
        if !output.status.success() {
            return Err(Error::Compile(stderr_text(&output)));
        }
        Ok(())
    }

    fn upload(&self, board: &str, port: &str, image: &Path) -> Result<()> {
        info!("Uploading {} to {port} as {board}", image.display());
        let output = self.run([
            OsStr::new("upload"),
            OsStr::new("--fqbn"),
            OsStr::new(board),
            OsStr::new("--port"),
            OsStr::new(port),
            OsStr::new("--input-file"),
            image.as_os_str(),
        ])?;
        if !output.status.success() {
            return Err(Error::Upload(stderr_text(&output)));
        }
        Ok(())
    }
}
