//! Port listing and live port watching.

use {
    crate::{Cli, config::Config, serial::port_label, was_interrupted},
    anyhow::Result,
    console::style,
    ledflash::{
        PollingBoardEvents, PortEvent, PortSnapshot, PortWatcher, ReadyState, detect_ports,
        watcher::EVENT_QUEUE_DEPTH,
    },
    log::debug,
    std::{
        sync::{
            Arc,
            atomic::Ordering,
            mpsc::sync_channel,
        },
        thread,
        time::Duration,
    },
};

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let detected = detect_ports();

    if json {
        let ports: Vec<serde_json::Value> = detected
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "device": p.device.name(),
                    "known": p.device.is_known(),
                    "vid": p.vid,
                    "pid": p.pid,
                    "manufacturer": p.manufacturer,
                    "product": p.product,
                    "serial": p.serial,
                })
            })
            .collect();
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "ports": ports,
            }
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output)?
        );
        return Ok(());
    }

    eprintln!(
        "{}",
        style("Serial ports")
            .bold()
            .underlined()
    );

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for port in &detected {
        eprintln!("  {} {}", style("•").green(), port_label(port));
    }

    // Same pick the watcher makes: the controller that enumerated last.
    if let Some(pick) = detected
        .iter()
        .rev()
        .find(|p| p.is_likely_controller())
    {
        eprintln!(
            "\n{} Likely controller: {}",
            style("→")
                .green()
                .bold(),
            style(&pick.name)
                .cyan()
                .bold()
        );
    }

    Ok(())
}

/// Lines describing the step from `before` to `after`.
fn describe_change(before: &PortSnapshot, after: &PortSnapshot) -> Vec<String> {
    let mut lines: Vec<String> = before
        .addresses()
        .filter(|addr| !after.ports.contains_key(*addr))
        .map(|addr| format!("{} {addr}", style("-").red()))
        .collect();

    lines.extend(
        after
            .ports
            .values()
            .filter(|p| !before.ports.contains_key(&p.name))
            .map(|p| format!("{} {}", style("+").green(), port_label(p))),
    );

    if before.current != after.current {
        lines.push(match &after.current {
            Some(addr) => format!("{} Current port: {}", style("→").cyan(), style(addr).bold()),
            None => format!("{} No port selected", style("→").yellow()),
        });
    }
    lines
}

/// Watch command implementation.
///
/// Prints every attach, detach and change of the current port until Ctrl-C.
/// An explicit or configured port is pinned as soon as it shows up.
pub(crate) fn cmd_watch(cli: &Cli, config: &Config) -> Result<()> {
    let preferred = cli
        .port
        .clone()
        .or_else(|| {
            config
                .connection
                .serial
                .clone()
        });

    let watcher = PortWatcher::new(Arc::new(ReadyState::default()));
    let (tx, rx) = sync_channel(EVENT_QUEUE_DEPTH);

    let poller = PollingBoardEvents::default();
    let stop = poller.stop_flag();
    let scanner = poller.spawn(tx);

    // Relay Ctrl-C into the poller; the watch loop ends once it stops.
    thread::spawn(move || {
        while !was_interrupted() {
            thread::sleep(Duration::from_millis(100));
        }
        stop.store(true, Ordering::Relaxed);
    });

    if !cli.quiet {
        eprintln!(
            "{} Watching serial ports, press Ctrl-C to stop",
            style("ℹ").blue()
        );
    }

    let mut shown = PortSnapshot::default();
    let mut pinned = preferred.is_none();
    watcher.watch(&rx, |snapshot| {
        let mut latest = snapshot.clone();
        let wanted = preferred
            .as_deref()
            .filter(|_| !pinned)
            .and_then(|want| {
                latest
                    .addresses()
                    .find(|addr| addr.eq_ignore_ascii_case(want))
                    .map(str::to_string)
            });
        if let Some(addr) = wanted {
            pinned = true;
            latest = watcher.apply(&PortEvent::Selected(addr));
        }

        for line in describe_change(&shown, &latest) {
            eprintln!("{line}");
        }
        shown = latest;
    });

    if scanner.join().is_err() {
        debug!("Port scanner thread panicked");
    }
    Ok(())
}
