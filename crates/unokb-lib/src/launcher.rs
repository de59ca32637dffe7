//! Process launch boundary: detached macro processes, probes, termination.
//!
//! Commands are always executed from an explicit argument vector, never through
//! a shell. Detached processes get their own session so they outlive the daemon
//! and are not hit by signals aimed at its process group.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

/// OS process id of a launched macro.
pub type ProcessId = u32;

/// A program plus its arguments. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    argv: Vec<String>,
}

impl CommandLine {
    /// Build from an explicit argv. Returns `None` if the program is missing or blank.
    pub fn new(argv: Vec<String>) -> Option<Self> {
        match argv.first() {
            Some(program) if !program.trim().is_empty() => Some(Self { argv }),
            _ => None,
        }
    }

    /// Build from a single string, split on whitespace.
    ///
    /// `"/path/to/script"` → one-element argv; `"pactl set-sink-mute 0"` → three.
    pub fn parse(line: &str) -> Option<Self> {
        Self::new(line.split_whitespace().map(String::from).collect())
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

/// Launches and signals host processes on behalf of macros.
pub trait Launcher {
    /// Start `cmd` detached (own session, no wait, output not captured).
    fn spawn_detached(&mut self, cmd: &CommandLine) -> io::Result<ProcessId>;

    /// Run `cmd` in the foreground and report whether it exited successfully.
    fn run_to_completion(&mut self, cmd: &CommandLine) -> io::Result<bool>;

    /// Ask a previously spawned process to terminate. Does not wait for it.
    ///
    /// A process that has already exited is not an error.
    fn terminate(&mut self, pid: ProcessId) -> io::Result<()>;

    /// Collect exit statuses of finished detached processes. Default: nothing to do.
    fn reap(&mut self) {}
}

/// [`Launcher`] backed by `std::process`.
///
/// Keeps the `Child` handles of detached processes, keyed by pid, so that
/// finished ones can be reaped and only owned children are ever signalled.
/// It never waits on a running child.
#[derive(Debug, Default)]
pub struct SystemLauncher {
    children: HashMap<ProcessId, Child>,
}

impl SystemLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of detached children not yet reaped.
    pub fn live_children(&self) -> usize {
        self.children.len()
    }
}

impl Launcher for SystemLauncher {
    fn spawn_detached(&mut self, cmd: &CommandLine) -> io::Result<ProcessId> {
        let mut command = Command::new(cmd.program());
        command.args(cmd.args()).stdin(Stdio::null());
        // SAFETY: setsid is async-signal-safe and touches no memory shared with the parent.
        unsafe {
            command.pre_exec(|| {
                nix::unistd::setsid()
                    .map(drop)
                    .map_err(io::Error::from)
            });
        }
        let child = command.spawn()?;
        let pid = child.id();
        log::debug!("spawned {cmd} (pid {pid})");
        self.children.insert(pid, child);
        Ok(pid)
    }

    fn run_to_completion(&mut self, cmd: &CommandLine) -> io::Result<bool> {
        let status = Command::new(cmd.program())
            .args(cmd.args())
            .stdin(Stdio::null())
            .status()?;
        log::debug!("{cmd} exited with {status}");
        Ok(status.success())
    }

    fn terminate(&mut self, pid: ProcessId) -> io::Result<()> {
        // A reaped pid may already belong to another process: never signal it.
        let Some(child) = self.children.get_mut(&pid) else {
            log::debug!("macro process {pid} already exited, nothing to terminate");
            return Ok(());
        };
        if let Ok(Some(status)) = child.try_wait() {
            log::debug!("macro process {pid} already exited with {status}");
            self.children.remove(&pid);
            return Ok(());
        }

        let raw = i32::try_from(pid).map_err(io::Error::other)?;
        match signal::kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) => Ok(()),
            Err(nix::errno::Errno::ESRCH) => {
                log::debug!("macro process {pid} vanished before SIGTERM");
                Ok(())
            }
            Err(e) => Err(io::Error::from(e)),
        }
    }

    fn reap(&mut self) {
        self.children.retain(|pid, child| match child.try_wait() {
            Ok(Some(status)) => {
                if !status.success() {
                    log::debug!("macro process {pid} exited with {status}");
                }
                false
            }
            Ok(None) => true,
            Err(e) => {
                log::warn!("could not poll macro process {pid}: {e}");
                false
            }
        });
    }
}

// ── Mock launcher for testing ──

/// Recording launcher for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;

    /// Records every call instead of touching the OS.
    #[derive(Debug)]
    pub struct MockLauncher {
        /// Detached spawns, in call order.
        pub spawned: Vec<CommandLine>,
        /// Foreground runs (probes), in call order.
        pub ran: Vec<CommandLine>,
        /// Termination requests, in call order.
        pub terminated: Vec<ProcessId>,
        /// Result of `run_to_completion` keyed by program. Missing = success.
        pub run_results: HashMap<String, bool>,
        /// Programs whose spawn fails with `NotFound`.
        pub missing_programs: Vec<String>,
        /// Number of `reap` calls.
        pub reaps: usize,
        next_pid: ProcessId,
    }

    impl Default for MockLauncher {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockLauncher {
        pub fn new() -> Self {
            Self {
                spawned: Vec::new(),
                ran: Vec::new(),
                terminated: Vec::new(),
                run_results: HashMap::new(),
                missing_programs: Vec::new(),
                reaps: 0,
                next_pid: 1000,
            }
        }

        /// Make `run_to_completion(program …)` report `success`.
        pub fn set_run_result(&mut self, program: &str, success: bool) {
            self.run_results.insert(program.to_string(), success);
        }

        /// Make spawning or running `program` fail.
        pub fn set_missing(&mut self, program: &str) {
            self.missing_programs.push(program.to_string());
        }

        /// Programs spawned so far, in order.
        pub fn spawned_programs(&self) -> Vec<&str> {
            self.spawned.iter().map(|c| c.program()).collect()
        }

        fn check_missing(&self, cmd: &CommandLine) -> io::Result<()> {
            if self.missing_programs.iter().any(|p| p == cmd.program()) {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("mock: {} not found", cmd.program()),
                ));
            }
            Ok(())
        }
    }

    impl Launcher for MockLauncher {
        fn spawn_detached(&mut self, cmd: &CommandLine) -> io::Result<ProcessId> {
            self.check_missing(cmd)?;
            self.spawned.push(cmd.clone());
            self.next_pid += 1;
            Ok(self.next_pid)
        }

        fn run_to_completion(&mut self, cmd: &CommandLine) -> io::Result<bool> {
            self.check_missing(cmd)?;
            self.ran.push(cmd.clone());
            Ok(self.run_results.get(cmd.program()).copied().unwrap_or(true))
        }

        fn terminate(&mut self, pid: ProcessId) -> io::Result<()> {
            self.terminated.push(pid);
            Ok(())
        }

        fn reap(&mut self) {
            self.reaps += 1;
        }
    }
}
