//! `status` subcommand: show whether the daemon is running.

use std::path::Path;

use super::{Config, InstanceStatus, Result, StatusOutput, kv, kv_indent, kv_width, pidfile};

/// Collect the status of the instance recorded in the PID file.
fn collect_status(config: &Config) -> Result<StatusOutput> {
    let pid_path = config.pid_path();
    let instance = pidfile::status(&pid_path)?;
    let (running, pid, stale) = match instance {
        InstanceStatus::NotRunning => (false, None, false),
        InstanceStatus::Running(pid) => (true, Some(pid), false),
        InstanceStatus::Stale(pid) => (false, pid, true),
    };
    Ok(StatusOutput {
        version: env!("CARGO_PKG_VERSION").to_string(),
        running,
        pid,
        pid_file: pid_path.display().to_string(),
        stale_pid_file: stale,
        serial_port: config.serial_port.clone(),
        serial_port_present: Path::new(&config.serial_port).exists(),
    })
}

/// Print or serialize the status output.
fn print_status(status: &StatusOutput, json: bool) -> Result<()> {
    if json {
        let json_str = serde_json::to_string_pretty(status).map_err(|e| {
            unokb_lib::UnokbError::Config(format!("JSON serialization failed: {e}"))
        })?;
        println!("{json_str}");
        return Ok(());
    }

    let w = kv_width(&["Version:", "Daemon:", "Keypad:"], &["PID file:", "Port:"]);

    kv("Version:", &status.version, w);
    println!();

    match (status.running, status.pid) {
        (true, Some(pid)) => kv("Daemon:", format_args!("RUNNING (PID {pid})"), w),
        (false, Some(pid)) if status.stale_pid_file => {
            kv("Daemon:", format_args!("NOT RUNNING (stale PID {pid})"), w)
        }
        (false, None) if status.stale_pid_file => {
            kv("Daemon:", "NOT RUNNING (unreadable PID file)", w)
        }
        _ => kv("Daemon:", "NOT RUNNING", w),
    }
    kv_indent("PID file:", &status.pid_file, w);
    println!();

    kv(
        "Keypad:",
        if status.serial_port_present {
            "PRESENT"
        } else {
            "NOT CONNECTED"
        },
        w,
    );
    kv_indent("Port:", &status.serial_port, w);

    Ok(())
}

pub(super) fn cmd_status(json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path);
    let status = collect_status(&config)?;
    print_status(&status, json)
}
