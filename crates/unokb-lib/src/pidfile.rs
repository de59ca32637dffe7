//! Single-instance enforcement through a PID file.
//!
//! Starting while another instance is recorded stops that instance instead:
//! it is sent SIGTERM and the new invocation exits. A file naming a process
//! that no longer exists is stale and is taken over.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

// ── Error type ──

#[derive(Debug)]
pub enum PidFileError {
    /// Creating, reading, writing or removing the file failed.
    Io { path: PathBuf, source: io::Error },
    /// Signalling the recorded process failed for a reason other than "no such process".
    Signal { pid: i32, source: Errno },
}

impl fmt::Display for PidFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PidFileError::Io { path, source } => {
                write!(f, "PID file {}: {source}", path.display())
            }
            PidFileError::Signal { pid, source } => {
                write!(f, "Failed to signal process {pid}: {source}")
            }
        }
    }
}

impl std::error::Error for PidFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PidFileError::Io { source, .. } => Some(source),
            PidFileError::Signal { source, .. } => Some(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, PidFileError>;

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> PidFileError + '_ {
    move |source| PidFileError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Outcome of [`PidFile::acquire`].
#[derive(Debug)]
pub enum Acquire {
    /// This process is now the recorded instance.
    Acquired(PidFile),
    /// A live instance was found and sent SIGTERM. The caller should exit.
    StoppedExisting(i32),
}

/// What the PID file says about a running instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    /// No PID file.
    NotRunning,
    /// The recorded process is alive.
    Running(i32),
    /// A PID file exists but its process is gone (or the content is unusable).
    Stale(Option<i32>),
}

/// The PID file owned by the running instance.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Become the single instance, or stop the one already running.
    pub fn acquire(path: &Path) -> Result<Acquire> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).map_err(io_err(dir))?;
        }

        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                write!(file, "{}", std::process::id()).map_err(io_err(path))?;
                log::info!("PID file created at {}", path.display());
                return Ok(Acquire::Acquired(PidFile::owned(path)));
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(io_err(path)(e)),
        }

        match status(path)? {
            InstanceStatus::Running(pid) => {
                send_terminate(pid)?;
                log::info!("running daemon (PID {pid}) terminated");
                return Ok(Acquire::StoppedExisting(pid));
            }
            InstanceStatus::Stale(Some(pid)) => {
                log::warn!(
                    "no process with PID {pid}; the last daemon must have exited abnormally. \
                     The PID file will be overwritten."
                );
            }
            InstanceStatus::Stale(None) => {
                log::warn!("PID file {} has no valid PID, overwriting", path.display());
            }
            // Removed between our create attempt and the read.
            InstanceStatus::NotRunning => {}
        }

        fs::write(path, std::process::id().to_string()).map_err(io_err(path))?;
        Ok(Acquire::Acquired(PidFile::owned(path)))
    }

    fn owned(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file. Called on graceful shutdown only.
    pub fn remove(self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&self.path)(e)),
        }
    }
}

/// Read the PID recorded at `path`. `Ok(None)` if the file is missing.
///
/// Content that is not a positive PID reads as `Some(None)`.
fn read_recorded(path: &Path) -> Result<Option<Option<i32>>> {
    match fs::read_to_string(path) {
        Ok(s) => {
            let pid = s
                .lines()
                .next()
                .and_then(|l| l.trim().parse::<i32>().ok())
                .filter(|&pid| pid > 0);
            Ok(Some(pid))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path)(e)),
    }
}

/// Inspect the PID file without modifying anything.
pub fn status(path: &Path) -> Result<InstanceStatus> {
    let Some(recorded) = read_recorded(path)? else {
        return Ok(InstanceStatus::NotRunning);
    };
    let Some(pid) = recorded else {
        return Ok(InstanceStatus::Stale(None));
    };
    // Our own PID in the file can only be a leftover from an earlier boot.
    if pid as u32 == std::process::id() || !is_alive(pid) {
        return Ok(InstanceStatus::Stale(Some(pid)));
    }
    Ok(InstanceStatus::Running(pid))
}

/// Whether a process with `pid` exists (signal 0 probe).
///
/// A process owned by another user still counts as alive.
pub fn is_alive(pid: i32) -> bool {
    match signal::kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Send SIGTERM to `pid`.
pub fn send_terminate(pid: i32) -> Result<()> {
    signal::kill(Pid::from_raw(pid), Signal::SIGTERM)
        .map_err(|source| PidFileError::Signal { pid, source })
}
