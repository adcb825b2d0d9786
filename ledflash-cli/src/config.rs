//! Configuration file support for ledflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (LEDFLASH_*)
//! 3. Local config file (./ledflash.toml)
//! 4. Global config file (~/.config/ledflash/config.toml)

use directories::ProjectDirs;
use ledflash::CustomLayout;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Local config file name, looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "ledflash.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
}

/// Toolchain configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Path of the `arduino-cli` executable; searched on `PATH` when unset.
    pub arduino_cli: Option<PathBuf>,
}

/// Session configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Working directory for downloads and source trees.
    pub work_dir: Option<PathBuf>,
}

/// Default custom layout values. Unset fields fall back to the stock layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Total wing LEDs.
    pub wing_leds: Option<u8>,
    /// Total nose LEDs.
    pub nose_leds: Option<u8>,
    /// Total fuselage LEDs.
    pub fuse_leds: Option<u8>,
    /// Total tail LEDs.
    pub tail_leds: Option<u8>,
    /// Wing LEDs used as navigation lights.
    pub wing_nav_leds: Option<u8>,
    /// Wing string reversed.
    pub wing_rev: Option<bool>,
    /// Nose string reversed.
    pub nose_rev: Option<bool>,
    /// Fuselage string reversed.
    pub fuse_rev: Option<bool>,
    /// Tail string reversed.
    pub tail_rev: Option<bool>,
    /// Nose and fuselage on one string.
    pub nose_fuse_join: Option<bool>,
}

impl LayoutConfig {
    /// Overlay the set fields of `other`.
    pub fn merge(&mut self, other: Self) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            };
        }
        take!(
            wing_leds,
            nose_leds,
            fuse_leds,
            tail_leds,
            wing_nav_leds,
            wing_rev,
            nose_rev,
            fuse_rev,
            tail_rev,
            nose_fuse_join
        );
    }

    /// Apply the set fields on top of `base`.
    pub fn apply(&self, base: CustomLayout) -> CustomLayout {
        CustomLayout {
            wing_leds: self.wing_leds.unwrap_or(base.wing_leds),
            nose_leds: self.nose_leds.unwrap_or(base.nose_leds),
            fuse_leds: self.fuse_leds.unwrap_or(base.fuse_leds),
            tail_leds: self.tail_leds.unwrap_or(base.tail_leds),
            wing_nav_leds: self.wing_nav_leds.unwrap_or(base.wing_nav_leds),
            wing_rev: self.wing_rev.unwrap_or(base.wing_rev),
            nose_rev: self.nose_rev.unwrap_or(base.nose_rev),
            fuse_rev: self.fuse_rev.unwrap_or(base.fuse_rev),
            tail_rev: self.tail_rev.unwrap_or(base.tail_rev),
            nose_fuse_join: self.nose_fuse_join.unwrap_or(base.nose_fuse_join),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Toolchain settings.
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    /// Session settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Custom layout defaults.
    #[serde(default)]
    pub layout: LayoutConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                if let Some(global_config) = Self::load_from_file(&global_path) {
                    debug!("Loaded global config from {}", global_path.display());
                    config.merge(global_config);
                }
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "ledflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Working directory, defaulting to `<tmp>/ledflash`.
    pub fn work_dir(&self) -> PathBuf {
        self.session
            .work_dir
            .clone()
            .unwrap_or_else(ledflash::default_work_dir)
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.connection.serial.is_some() {
            self.connection.serial = other.connection.serial;
        }
        if other.toolchain.arduino_cli.is_some() {
            self.toolchain.arduino_cli = other.toolchain.arduino_cli;
        }
        if other.session.work_dir.is_some() {
            self.session.work_dir = other.session.work_dir;
        }
        self.layout.merge(other.layout);
    }
}
