//! `stop` subcommand: signal the running daemon.

use std::path::Path;

use super::{InstanceStatus, Result, pidfile};

/// Send SIGTERM to the instance recorded at `pid_path`.
///
/// Returns the PID that was signalled, if any.
fn stop_instance(pid_path: &Path) -> Result<Option<i32>> {
    match pidfile::status(pid_path)? {
        InstanceStatus::Running(pid) => {
            pidfile::send_terminate(pid)?;
            Ok(Some(pid))
        }
        InstanceStatus::Stale(pid) => {
            log::warn!(
                "stale PID file {} ({}), nothing to stop",
                pid_path.display(),
                pid.map_or_else(|| "unreadable".to_string(), |p| format!("PID {p}"))
            );
            Ok(None)
        }
        InstanceStatus::NotRunning => Ok(None),
    }
}

pub(super) fn cmd_stop(config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path);
    match stop_instance(&config.pid_path())? {
        Some(pid) => println!("Stopped unokbd (PID {pid})"),
        None => println!("unokbd is not running"),
    }
    Ok(())
}
