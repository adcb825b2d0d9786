//! Flash command implementation.

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Select, theme::ColorfulTheme};
use ledflash::{
    BootloaderDetector, CustomLayout, DetectedPort, FlashSelection, Flasher, HttpFetcher,
    NativeOpener, PortEvent, PortWatcher, VersionCatalog, scan_events,
};
use log::debug;
use std::sync::Arc;
use std::thread;

use crate::commands::setup::locate_toolchain;
use crate::commands::{ensure_not_interrupted, open_session, status_reporter};
use crate::config::Config;
use crate::serial::{ensure_interactive_terminal, map_prompt_error, select_serial_port};
use crate::{Cli, CliError};

/// Pick the release: the requested one, or the newest.
fn choose_version(catalog: &VersionCatalog, release: Option<&str>) -> Result<String> {
    match release {
        Some(version) if catalog.contains(version) => Ok(version.to_string()),
        Some(version) => Err(CliError::Usage(format!(
            "Unknown version {version}; run `ledflash versions` to list releases"
        ))
        .into()),
        None => catalog
            .latest()
            .map(str::to_string)
            .context("No firmware releases found"),
    }
}

/// Pick the prebuilt image of `version`.
fn choose_image(
    catalog: &VersionCatalog,
    version: &str,
    image: Option<&str>,
    non_interactive: bool,
) -> Result<String> {
    let images = catalog.images(version);

    if let Some(name) = image {
        return if images.contains(&name) {
            Ok(name.to_string())
        } else {
            Err(CliError::Usage(format!("Version {version} has no image named {name}")).into())
        };
    }

    match images.as_slice() {
        [] => Err(CliError::Usage(format!(
            "Version {version} has no prebuilt images; use --custom to build it"
        ))
        .into()),
        [only] => Ok((*only).to_string()),
        _ if non_interactive => Err(CliError::Usage(format!(
            "Version {version} has multiple images; pass --image in non-interactive mode"
        ))
        .into()),
        _ => {
            ensure_interactive_terminal()?;
            let selection = Select::with_theme(&ColorfulTheme::default())
                .with_prompt(format!("Select the {version} image for your plane"))
                .items(&images)
                .default(0)
                .interact_opt()
                .map_err(map_prompt_error)?;
            match selection {
                Some(index) => Ok(images[index].to_string()),
                None => Err(CliError::Cancelled("Selection cancelled".to_string()).into()),
            }
        },
    }
}

/// Flash command implementation.
///
/// Order matters: layout validation happens before any network or toolchain
/// work so a bad layout costs nothing.
pub(crate) fn cmd_flash(
    cli: &Cli,
    config: &Config,
    release: Option<&str>,
    image: Option<&str>,
    layout: Option<CustomLayout>,
) -> Result<()> {
    if let Some(layout) = &layout {
        layout
            .validate()
            .map_err(|e| CliError::Usage(e.to_string()))?;
    }

    let toolchain = locate_toolchain(config)?;

    let fetcher = HttpFetcher::new();
    let catalog = fetcher
        .fetch_version_catalog()
        .context("Failed to fetch the release list")?;
    let version = choose_version(&catalog, release)?;

    let selection = match layout {
        Some(layout) => FlashSelection::Custom {
            version: version.clone(),
            layout,
        },
        None => FlashSelection::Prebuilt {
            image: choose_image(&catalog, &version, image, cli.non_interactive)?,
            version: version.clone(),
        },
    };
    debug!("Selection: {selection:?}");

    let (pb, status) = status_reporter(cli);
    let session = open_session(config, status)?;

    // Port choice flows through the watcher so the readiness gate sees it.
    let watcher = PortWatcher::new(Arc::clone(session.ready()));
    for event in scan_events() {
        watcher.apply(&event);
    }
    let port = pb.suspend(|| select_serial_port(&cli.serial_options(), config, &watcher.handle().snapshot()))?;
    let snapshot = watcher.handle().snapshot();
    if snapshot.ports.contains_key(&port) {
        watcher.apply(&PortEvent::Selected(port.clone()));
    } else {
        debug!("{port} not enumerated, tracking it anyway");
        watcher.apply(&PortEvent::Attached(DetectedPort::bare(port.clone())));
    }

    if let Err(err) = session.prepare(&toolchain) {
        pb.finish_and_clear();
        return Err(err).context("Toolchain setup failed; try `ledflash setup`");
    }
    ensure_not_interrupted()?;

    let flasher = Flasher::new(
        Arc::clone(&session),
        Arc::new(catalog),
        toolchain,
        fetcher,
        BootloaderDetector::new(NativeOpener),
    );
    // The attempt runs on its own thread; this one only waits for it.
    let joined = thread::scope(|s| {
        s.spawn(|| flasher.flash(&selection, &port))
            .join()
    });
    pb.finish_and_clear();
    let Ok(result) = joined else {
        anyhow::bail!("Flash worker panicked");
    };
    result.with_context(|| format!("Flashing {version} to {port} failed"))?;

    if !cli.quiet {
        let what = match &selection {
            FlashSelection::Prebuilt { image, .. } => image.clone(),
            FlashSelection::Custom { .. } => format!("custom {version} layout"),
        };
        eprintln!(
            "\n{} Flashed {} to {}",
            style("✓").green().bold(),
            style(what).cyan(),
            style(&port).bold()
        );
    }
    Ok(())
}
