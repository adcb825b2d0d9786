//! Toolchain preparation and driver installation.

use anyhow::{Context, Result};
use console::style;
use ledflash::{ArduinoCli, DriverInstall, HttpFetcher, install_ch340};

use crate::Cli;
use crate::commands::{open_session, status_reporter};
use crate::config::Config;

/// Find `arduino-cli`, preferring the configured path.
pub(crate) fn locate_toolchain(config: &Config) -> Result<ArduinoCli> {
    ArduinoCli::from_config(
        config
            .toolchain
            .arduino_cli
            .as_deref(),
    )
    .context("arduino-cli is required; install it or set `arduino_cli` under [toolchain] in ledflash.toml")
}

/// Setup command implementation.
pub(crate) fn cmd_setup(cli: &Cli, config: &Config) -> Result<()> {
    let toolchain = locate_toolchain(config)?;
    let (pb, status) = status_reporter(cli);
    let session = open_session(config, status)?;

    let result = session.prepare(&toolchain);
    pb.finish_and_clear();
    result.context("Toolchain setup failed")?;

    if !cli.quiet {
        eprintln!(
            "{} Arduino core and libraries installed ({})",
            style("✓").green(),
            toolchain.program().display()
        );
    }
    Ok(())
}

/// Install-drivers command implementation.
pub(crate) fn cmd_install_drivers(cli: &Cli, config: &Config) -> Result<()> {
    let (pb, status) = status_reporter(cli);
    let session = open_session(config, status)?;

    let result = install_ch340(&HttpFetcher::new(), &session);
    pb.finish_and_clear();

    match result.context("Driver installation failed")? {
        DriverInstall::Started(path) => {
            if !cli.quiet {
                eprintln!(
                    "{} Started {}; follow the installer's prompts",
                    style("✓").green(),
                    path.display()
                );
            }
        },
        DriverInstall::NotNeeded => {
            if !cli.quiet {
                eprintln!(
                    "{} The CH340 driver ships with this operating system",
                    style("ℹ").blue()
                );
            }
        },
    }
    Ok(())
}
