//! ledflash CLI - Command-line updater for WingnutTech LED controllers.
//!
//! ## Features
//!
//! - Flash prebuilt release images
//! - Compile and flash custom LED layouts
//! - Automatic bootloader detection
//! - Live serial port watching
//! - Interactive serial port, version and image selection
//! - Shell completion generation
//! - Environment variable support

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use ledflash::CustomLayout;
use log::debug;
use std::env;
use std::path::PathBuf;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(std::sync::atomic::Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether Ctrl-C was pressed since startup.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(std::sync::atomic::Ordering::Relaxed)
}

mod commands;
mod config;
mod serial;

use config::{Config, LayoutConfig};
use serial::SerialOptions;

/// Errors with a dedicated exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid invocation or setup problem (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// Cancelled by the user (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

/// Map an error to the process exit code.
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<CliError>() {
        Some(CliError::Usage(_)) => 2,
        Some(CliError::Cancelled(_)) => 130,
        None => 1,
    }
}

/// ledflash - Firmware updater for WingnutTech LED controllers.
///
/// Environment variables:
///   LEDFLASH_PORT              - Default serial port
///   LEDFLASH_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "ledflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "For more information, visit: https://github.com/wingnut-tech/LEDController")]
pub(crate) struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "LEDFLASH_PORT")]
    port: Option<String>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "LEDFLASH_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn serial_options(&self) -> SerialOptions {
        SerialOptions {
            port: self.port.clone(),
            non_interactive: self.non_interactive,
        }
    }
}

/// Custom layout overrides. Unset values come from `[layout]` in the
/// config file, then from the stock layout.
#[derive(Args, Debug, Default, Clone)]
pub(crate) struct LayoutArgs {
    /// Total wing LEDs.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(..=99))]
    wing_leds: Option<u8>,

    /// Total nose LEDs.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(..=99))]
    nose_leds: Option<u8>,

    /// Total fuselage LEDs.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(..=99))]
    fuse_leds: Option<u8>,

    /// Total tail LEDs.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(..=99))]
    tail_leds: Option<u8>,

    /// Wing LEDs used as navigation lights.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(..=99))]
    nav_leds: Option<u8>,

    /// Wing string reversed.
    #[arg(long, value_name = "BOOL")]
    wing_rev: Option<bool>,

    /// Nose string reversed.
    #[arg(long, value_name = "BOOL")]
    nose_rev: Option<bool>,

    /// Fuselage string reversed.
    #[arg(long, value_name = "BOOL")]
    fuse_rev: Option<bool>,

    /// Tail string reversed.
    #[arg(long, value_name = "BOOL")]
    tail_rev: Option<bool>,

    /// Nose and fuselage on one string.
    #[arg(long, value_name = "BOOL")]
    nose_fuse_join: Option<bool>,
}

impl LayoutArgs {
    /// Resolve the layout: stock values, then config, then flags.
    fn resolve(&self, config: &Config) -> CustomLayout {
        let mut layout = config.layout.clone();
        layout.merge(LayoutConfig {
            wing_leds: self.wing_leds,
            nose_leds: self.nose_leds,
            fuse_leds: self.fuse_leds,
            tail_leds: self.tail_leds,
            wing_nav_leds: self.nav_leds,
            wing_rev: self.wing_rev,
            nose_rev: self.nose_rev,
            fuse_rev: self.fuse_rev,
            tail_rev: self.tail_rev,
            nose_fuse_join: self.nose_fuse_join,
        });
        layout.apply(CustomLayout::default())
    }
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Flash a release image or a custom layout build.
    Flash {
        /// Release version (latest if not specified).
        #[arg(short, long)]
        release: Option<String>,

        /// Prebuilt image file name (prompted if not specified).
        #[arg(short, long, conflicts_with = "custom")]
        image: Option<String>,

        /// Compile the release with a custom LED layout.
        #[arg(long)]
        custom: bool,

        #[command(flatten)]
        layout: LayoutArgs,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// List released firmware versions and their images.
    Versions {
        /// Output the catalog as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Watch serial ports attach and detach until Ctrl-C.
    Watch,

    /// Install the Arduino core and libraries needed for custom builds.
    Setup,

    /// Install the CH340 USB-serial driver (Windows only).
    InstallDrivers,

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions (auto-detected if not specified with --install).
        #[arg(value_enum)]
        shell: Option<Shell>,

        /// Automatically install completions to your shell configuration.
        #[arg(long)]
        install: bool,
    },
}

fn main() {
    // NO_COLOR and TTY detection
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, std::sync::atomic::Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        // Disable all color output
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "ledflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(e) = ctrlc::set_handler(|| {
        INTERRUPTED.store(true, std::sync::atomic::Ordering::Relaxed);
    }) {
        debug!("Could not install Ctrl-C handler: {e}");
    }

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code(&err));
    }
}

fn run(cli: &Cli) -> Result<()> {
    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Flash {
            release,
            image,
            custom,
            layout,
        } => {
            let layout = custom.then(|| layout.resolve(&config));
            commands::flash::cmd_flash(cli, &config, release.as_deref(), image.as_deref(), layout)
        },
        Commands::ListPorts { json } => commands::ports::cmd_list_ports(*json),
        Commands::Versions { json } => commands::versions::cmd_versions(*json),
        Commands::Watch => commands::ports::cmd_watch(cli, &config),
        Commands::Setup => commands::setup::cmd_setup(cli, &config),
        Commands::InstallDrivers => commands::setup::cmd_install_drivers(cli, &config),
        Commands::Completions { shell, install } => {
            if *install {
                commands::completions::cmd_completions_install(*shell)
            } else {
                let shell = shell.ok_or_else(|| {
                    CliError::Usage(
                        "specify a shell type, e.g.: ledflash completions bash \
                         (or use ledflash completions --install)"
                            .to_string(),
                    )
                })?;
                commands::completions::cmd_completions(shell);
                Ok(())
            }
        },
    }
}
