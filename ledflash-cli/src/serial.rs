//! Interactive serial port selection.
//!
//! Selection works on a watcher snapshot rather than a fresh scan, so the
//! choice the user makes is routed through the same port table the flash
//! pipeline reads:
//! - An explicit `--port` or configured port always wins
//! - A single likely controller is picked automatically
//! - Several candidates prompt via dialoguer
//! - Non-interactive mode never prompts

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme},
    ledflash::{DetectedPort, PortSnapshot},
    log::{debug, info},
    std::{cmp::Ordering, io::IsTerminal},
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// Non-interactive mode (fail if ambiguous).
    pub non_interactive: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    // Selection failures are setup problems, reported with the usage exit code.
    CliError::Usage(message.to_string()).into()
}

/// Candidates shown to the user: likely controllers, or every port when
/// none is recognised.
fn candidates(snapshot: &PortSnapshot) -> Vec<DetectedPort> {
    let ports: Vec<DetectedPort> = snapshot
        .ports
        .values()
        .cloned()
        .collect();
    let known: Vec<DetectedPort> = ports
        .iter()
        .filter(|p| p.is_likely_controller())
        .cloned()
        .collect();

    if known.is_empty() { ports } else { known }
}

/// Pick the port to flash.
///
/// Returns the port address; an explicit name is returned even when the
/// scan did not see it, since some adapters only enumerate once opened.
pub fn select_serial_port(
    options: &SerialOptions,
    config: &Config,
    snapshot: &PortSnapshot,
) -> Result<String> {
    if let Some(port_name) = &options.port {
        return Ok(find_port_by_name(port_name, snapshot));
    }

    if let Some(port_name) = &config.connection.serial {
        debug!("Using port from config: {port_name}");
        return Ok(find_port_by_name(port_name, snapshot));
    }

    if snapshot.ports.is_empty() {
        return Err(usage_err("No serial ports found. Is the controller plugged in?"));
    }

    let selection_ports = candidates(snapshot);

    if options.non_interactive {
        return match selection_ports.len().cmp(&1) {
            Ordering::Equal => Ok(selection_ports[0].name.clone()),
            Ordering::Greater => Err(usage_err(
                "Found multiple serial ports; pass --port in non-interactive mode",
            )),
            Ordering::Less => Err(usage_err("No serial ports available")),
        };
    }

    match selection_ports.len().cmp(&1) {
        Ordering::Greater => {
            ensure_interactive_terminal()?;
            select_port_interactive(&selection_ports, snapshot.current.as_deref())
        },
        Ordering::Equal => {
            let port = &selection_ports[0];
            if port.is_likely_controller() {
                info!("Auto-selected port: {} [{}]", port.name, port.device.name());
                Ok(port.name.clone())
            } else {
                ensure_interactive_terminal()?;
                confirm_single_port(port)
            }
        },
        Ordering::Less => Err(usage_err("No serial ports available")),
    }
}

pub(crate) fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "Interactive selection requires a terminal; use --non-interactive with explicit options",
        ))
    }
}

pub(crate) fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("Selection cancelled".to_string()).into()
            } else {
                usage_err("Prompt failed")
            }
        },
    }
}

/// Resolve a user-supplied name against the scanned ports.
fn find_port_by_name(name: &str, snapshot: &PortSnapshot) -> String {
    if snapshot.ports.contains_key(name) {
        return name.to_string();
    }

    // Windows port names are case-insensitive
    snapshot
        .addresses()
        .find(|addr| addr.eq_ignore_ascii_case(name))
        .map_or_else(|| name.to_string(), str::to_string)
}

/// Display label of one port.
pub(crate) fn port_label(port: &DetectedPort) -> String {
    let name = if port.is_likely_controller() {
        style(&port.name)
            .bold()
            .to_string()
    } else {
        port.name.clone()
    };

    let device_info = if port.device.is_known() {
        format!(" [{}]", style(port.device.name()).yellow())
    } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        format!(" ({vid:04X}:{pid:04X})")
    } else {
        String::new()
    };

    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();

    format!("{name}{device_info}{product}")
}

/// Interactive port selection, preselecting the watcher's current port.
fn select_port_interactive(ports: &[DetectedPort], current: Option<&str>) -> Result<String> {
    eprintln!(
        "{} Detected {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );

    // Truncate labels to fit terminal width to prevent wrapping in narrow
    // terminals.
    let term_width = console::Term::stderr()
        .size()
        .1 as usize;
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = ports
        .iter()
        .map(|port| console::truncate_str(&port_label(port), max_item_width, "\u{2026}").into_owned())
        .collect();

    let default = current
        .and_then(|addr| ports.iter().position(|p| p.name == addr))
        .unwrap_or(0);

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the controller's serial port")
        .items(&labels)
        .default(default)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => ports
            .get(index)
            .map(|p| p.name.clone())
            .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}")),
        None => Err(CliError::Cancelled("Selection cancelled".to_string()).into()),
    }
}

/// Confirm use of a single unrecognized port.
fn confirm_single_port(port: &DetectedPort) -> Result<String> {
    let product_info = port
        .product
        .as_ref()
        .map(|p| format!(" - {p}"))
        .unwrap_or_default();

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Use {}{product_info}?", port.name))
        .default(true)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        Ok(port.name.clone())
    } else {
        Err(CliError::Cancelled("Selection cancelled".to_string()).into())
    }
}
