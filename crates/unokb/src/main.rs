//! unokbd: serial macro-keypad daemon.
//!
//! Runs in the foreground; use a service manager or the shell to background it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use signal_hook::consts::SIGTERM;

mod cli;

/// Shared shutdown flag, cleared by the termination signal handler.
pub static RUNNING: AtomicBool = AtomicBool::new(true);

#[derive(Parser)]
#[command(
    name = "unokbd",
    version,
    about = "Turns button presses on a serial macro keypad into commands"
)]
struct Args {
    /// Config file (default: <config dir>/unokb/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write log output to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON (for status, config)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<cli::Command>,
}

/// Initialize the logger, directing output to `log_file` when given.
///
/// Falls back to stderr if the log file can't be opened.
fn init_logger(verbose: bool, log_file: Option<&Path>) {
    let default_level = if verbose { "debug" } else { "info" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    builder.format_target(false);

    if let Some(log_path) = log_file {
        if let Some(dir) = log_path.parent()
            && !dir.as_os_str().is_empty()
        {
            let _ = std::fs::create_dir_all(dir);
        }
        match std::fs::File::create(log_path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!(
                "Warning: cannot open log file {}: {e}, logging to stderr",
                log_path.display()
            ),
        }
    }

    builder.init();
}

fn main() {
    let args = Args::parse();
    init_logger(args.verbose, args.log_file.as_deref());

    // SIGTERM only records the stop request; the daemon loop notices it and
    // shuts down on the main thread. Every other signal keeps its default action.
    // SAFETY: the handler does nothing but an atomic store.
    let installed =
        unsafe { signal_hook::low_level::register(SIGTERM, || RUNNING.store(false, Ordering::SeqCst)) };
    if let Err(e) = installed {
        log::warn!("could not install SIGTERM handler: {e}");
    }

    let command = args.command.unwrap_or(cli::Command::Run);
    if let Err(e) = cli::run(command, args.json, args.config.as_deref()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
