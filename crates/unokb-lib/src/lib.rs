//! unokb: serial macro-keypad daemon: decodes button and mode frames from the
//! keypad and launches the configured commands.

pub mod action;
pub mod config;
pub mod daemon;
pub mod error;
pub mod launcher;
pub mod link;
pub mod mode;
pub mod pidfile;
pub mod protocol;

pub use error::UnokbError;
