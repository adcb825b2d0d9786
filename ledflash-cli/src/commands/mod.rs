//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod completions;
pub(crate) mod flash;
pub(crate) mod ports;
pub(crate) mod setup;
pub(crate) mod versions;

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use ledflash::{NullStatus, Session, StatusSink};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::{Cli, CliError, use_fancy_output, was_interrupted};

/// Spinner plus the sink that feeds it.
///
/// With fancy output the latest status line is the spinner message; plain
/// terminals get one line per status, quiet mode gets nothing.
pub(crate) fn status_reporter(cli: &Cli) -> (ProgressBar, Arc<dyn StatusSink>) {
    if cli.quiet {
        return (ProgressBar::hidden(), Arc::new(NullStatus));
    }

    if !use_fancy_output() {
        let sink: Arc<dyn StatusSink> = Arc::new(|text: &str| eprintln!("{} {text}", style("→").cyan()));
        return (ProgressBar::hidden(), sink);
    }

    let pb = ProgressBar::new_spinner();
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(100));

    let bar = pb.clone();
    let sink: Arc<dyn StatusSink> = Arc::new(move |text: &str| bar.set_message(text.to_string()));
    (pb, sink)
}

/// Open the session in the configured working directory.
pub(crate) fn open_session(config: &Config, status: Arc<dyn StatusSink>) -> Result<Arc<Session>> {
    let work_dir = config.work_dir();
    let session = Session::new(&work_dir, status)
        .with_context(|| format!("Failed to create working directory {}", work_dir.display()))?;
    Ok(Arc::new(session))
}

pub(crate) fn ensure_not_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(CliError::Cancelled("Interrupted".to_string()).into())
    } else {
        Ok(())
    }
}
