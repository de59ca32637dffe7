//! Unified error type for the unokb-lib crate.
//!
//! [`UnokbError`] wraps the module-specific errors (`LinkError`,
//! `DispatchError`, `PidFileError`) plus plain I/O and configuration errors.
//! `From` impls allow `?` to propagate across module boundaries seamlessly.

use std::fmt;

use crate::daemon::DispatchError;
use crate::link::LinkError;
use crate::pidfile::PidFileError;

/// Unified error type for unokb-lib operations.
#[derive(Debug)]
pub enum UnokbError {
    /// Serial link failure (open, read, write).
    Link(LinkError),
    /// Failure while handling a decoded frame.
    Dispatch(DispatchError),
    /// PID file handling failure.
    PidFile(PidFileError),
    /// Standard I/O error.
    Io(std::io::Error),
    /// Configuration parse or validation error.
    Config(String),
}

impl fmt::Display for UnokbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnokbError::Link(e) => write!(f, "{e}"),
            UnokbError::Dispatch(e) => write!(f, "{e}"),
            UnokbError::PidFile(e) => write!(f, "{e}"),
            UnokbError::Io(e) => write!(f, "I/O error: {e}"),
            UnokbError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for UnokbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UnokbError::Link(e) => Some(e),
            UnokbError::Dispatch(e) => Some(e),
            UnokbError::PidFile(e) => Some(e),
            UnokbError::Io(e) => Some(e),
            UnokbError::Config(_) => None,
        }
    }
}

impl From<LinkError> for UnokbError {
    fn from(e: LinkError) -> Self {
        UnokbError::Link(e)
    }
}

impl From<DispatchError> for UnokbError {
    fn from(e: DispatchError) -> Self {
        UnokbError::Dispatch(e)
    }
}

impl From<PidFileError> for UnokbError {
    fn from(e: PidFileError) -> Self {
        UnokbError::PidFile(e)
    }
}

impl From<std::io::Error> for UnokbError {
    fn from(e: std::io::Error) -> Self {
        UnokbError::Io(e)
    }
}

/// Crate-level Result alias using [`UnokbError`].
pub type Result<T> = std::result::Result<T, UnokbError>;
