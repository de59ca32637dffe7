//! CLI subcommands: run the daemon, stop it, inspect status and config.

mod config_cmd;
mod run;
mod status;
mod stop;

use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use unokb_lib::config::Config;
pub(super) use unokb_lib::error::Result;
pub(super) use unokb_lib::pidfile::{self, InstanceStatus};

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

// ── Config loading ──

/// Config file in effect: `--config` if given, else the platform default.
pub(super) fn config_path(custom: Option<&Path>) -> Option<PathBuf> {
    custom.map(Path::to_path_buf).or_else(Config::path)
}

/// Load config leniently: parse problems are logged and defaults used.
pub(super) fn load_config(custom: Option<&Path>) -> Config {
    let Some(path) = config_path(custom) else {
        return Config::default();
    };
    let (config, warnings) = Config::load_from(&path);
    for w in &warnings {
        log::warn!("[config] {w}");
    }
    config
}

/// Load config strictly: a malformed file is an error.
pub(super) fn load_config_strict(custom: Option<&Path>) -> Result<Config> {
    match config_path(custom) {
        Some(path) => Config::try_load_from(&path),
        None => Ok(Config::default()),
    }
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct StatusOutput {
    pub version: String,
    pub running: bool,
    pub pid: Option<i32>,
    pub pid_file: String,
    pub stale_pid_file: bool,
    pub serial_port: String,
    pub serial_port_present: bool,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub pid_file: String,
    pub problems: Vec<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the daemon in the foreground (default)
    Run,

    /// Stop the running daemon
    Stop,

    /// Show whether the daemon is running
    Status,

    /// Show current configuration and file paths
    Config,
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, json: bool, config_path: Option<&Path>) -> Result<()> {
    match cmd {
        Command::Run => {
            if json {
                warn_json_unsupported("run");
            }
            run::cmd_run(config_path)
        }
        Command::Stop => {
            if json {
                warn_json_unsupported("stop");
            }
            stop::cmd_stop(config_path)
        }
        Command::Status => status::cmd_status(json, config_path),
        Command::Config => config_cmd::cmd_config(json, config_path),
    }
}



#[cfg(test)]
mod load_tests {
    use super::*;

    #[test]
    fn strict_load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "modes = \"nope\"").unwrap();
        assert!(load_config_strict(Some(&path)).is_err());
        // The lenient loader falls back to defaults.
        assert_eq!(load_config(Some(&path)).baud_rate, 9600);
    }

    #[test]
    fn custom_path_wins() {
        let p = Path::new("/tmp/x.toml");
        assert_eq!(config_path(Some(p)).as_deref(), Some(p));
    }
}
