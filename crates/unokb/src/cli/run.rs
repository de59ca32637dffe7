//! `run` subcommand: the daemon itself.

use std::path::Path;

use super::{RUNNING, Result};
use unokb_lib::action::ActionRegistry;
use unokb_lib::daemon::{Daemon, Exit};
use unokb_lib::launcher::SystemLauncher;
use unokb_lib::link::SerialPortConnector;
use unokb_lib::mode::ModeController;
use unokb_lib::pidfile::{Acquire, PidFile};

pub(super) fn cmd_run(config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config_strict(config_path)?;

    let pid_file = match PidFile::acquire(&config.pid_path())? {
        Acquire::Acquired(pid_file) => pid_file,
        Acquire::StoppedExisting(pid) => {
            println!("Stopped running unokbd (PID {pid})");
            return Ok(());
        }
    };

    let actions = match config.build_actions() {
        Ok(actions) => actions,
        Err(e) => {
            if let Err(rm) = pid_file.remove() {
                log::warn!("{rm}");
            }
            return Err(e);
        }
    };

    let mut launcher = SystemLauncher::new();
    let registry = ActionRegistry::new(actions, &mut launcher);
    let modes = ModeController::new(config.modes.clone());
    let connector = SerialPortConnector::new(&config.serial_port, config.baud_rate);

    log::info!(
        "{} modes, {} macros, serial port {} @ {} baud{}",
        modes.mode_count(),
        registry.len(),
        config.serial_port,
        config.baud_rate,
        if config.keep_alive { ", keep-alive" } else { "" }
    );

    let mut daemon =
        Daemon::new(connector, modes, registry, launcher, config.keep_alive).with_pid_file(pid_file);

    match daemon.run(&RUNNING) {
        Exit::Signalled => log::info!("stop requested, shutting down"),
        Exit::LinkLost(e) => log::info!("serial link gone ({e}), shutting down"),
        Exit::Fatal(e) => log::info!("stopping after error: {e}"),
    }
    daemon.shutdown();
    log::info!("bye");
    Ok(())
}
