//! Shell completion generation and installation.

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Shell, generate};
use console::style;
use std::env;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use crate::Cli;

const BIN_NAME: &str = "ledflash";

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    write_completions(shell, &mut io::stdout());
}

fn write_completions(shell: Shell, out: &mut dyn io::Write) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, BIN_NAME, out);
}

/// Detect the user's current shell from `$SHELL`, or PowerShell on Windows.
fn detect_shell_type() -> Option<Shell> {
    if let Ok(shell_path) = env::var("SHELL") {
        return shell_from_path(&shell_path);
    }
    if cfg!(windows) && env::var("PSModulePath").is_ok() {
        return Some(Shell::PowerShell);
    }
    None
}

fn shell_from_path(shell_path: &str) -> Option<Shell> {
    match Path::new(shell_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
    {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        "elvish" => Some(Shell::Elvish),
        "pwsh" | "powershell" => Some(Shell::PowerShell),
        _ => None,
    }
}

fn home_dir() -> Result<PathBuf> {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .context("Could not determine home directory")
}

/// `$var`, or `$HOME/<fallback>`.
fn xdg_dir(var: &str, fallback: &[&str]) -> PathBuf {
    env::var(var).map_or_else(
        |_| {
            fallback
                .iter()
                .fold(home_dir().unwrap_or_default(), |dir, part| dir.join(part))
        },
        PathBuf::from,
    )
}

/// Where the completion script for `shell` is installed.
fn get_completion_install_path(shell: Shell) -> Result<PathBuf> {
    let path = match shell {
        Shell::Bash => xdg_dir("XDG_DATA_HOME", &[".local", "share"])
            .join("bash-completion/completions")
            .join(BIN_NAME),
        Shell::Zsh => home_dir()?
            .join(".zfunc")
            .join(format!("_{BIN_NAME}")),
        Shell::Fish => xdg_dir("XDG_CONFIG_HOME", &[".config"])
            .join("fish/completions")
            .join(format!("{BIN_NAME}.fish")),
        Shell::Elvish => xdg_dir("XDG_CONFIG_HOME", &[".config"])
            .join("elvish/lib")
            .join(format!("{BIN_NAME}.elv")),
        Shell::PowerShell => {
            let dir = match env::var("PROFILE") {
                Ok(profile) => PathBuf::from(profile)
                    .parent()
                    .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
                Err(_) => home_dir()?.join(".config/powershell/completions"),
            };
            dir.join(format!("{BIN_NAME}.ps1"))
        },
        _ => anyhow::bail!("Unsupported shell for auto-install"),
    };
    Ok(path)
}

/// Install shell completions automatically.
pub(crate) fn cmd_completions_install(shell_arg: Option<Shell>) -> Result<()> {
    let shell = match shell_arg {
        Some(s) => s,
        None => detect_shell_type().context(
            "Could not detect your shell. Please specify it explicitly:\n  \
             ledflash completions --install bash",
        )?,
    };

    let path = get_completion_install_path(shell)?;
    let mut buf = Vec::new();
    write_completions(shell, &mut buf);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(&path, &buf)
        .with_context(|| format!("Failed to write completion file: {}", path.display()))?;

    eprintln!(
        "{} Installed {} completions to {}",
        style("✓").green().bold(),
        style(format!("{shell:?}")).cyan(),
        style(path.display()).yellow()
    );

    match shell {
        Shell::Bash => eprintln!(
            "To activate now: {}",
            style(format!("source {}", path.display())).cyan()
        ),
        Shell::Zsh => {
            let zshrc = home_dir()?.join(".zshrc");
            let fpath_line = "fpath=(~/.zfunc $fpath)";
            let present = fs::read_to_string(&zshrc).is_ok_and(|content| content.contains(fpath_line));
            if !present {
                let mut file = fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&zshrc)
                    .with_context(|| format!("Failed to update {}", zshrc.display()))?;
                writeln!(file, "\n# {BIN_NAME} completions\n{fpath_line}\nautoload -Uz compinit && compinit")?;
                eprintln!("Added fpath to {}", style(zshrc.display()).yellow());
            }
            eprintln!("Restart your shell or run: {}", style("exec zsh").cyan());
        },
        Shell::PowerShell => eprintln!(
            "Add to your PowerShell profile: {}",
            style(format!("Import-Module {}", path.display())).cyan()
        ),
        _ => eprintln!("Completions load automatically in new sessions."),
    }

    Ok(())
}
