//! Event loop: reads frames from the keypad and dispatches them.
//!
//! [`Daemon`] is the single context object shared by the read loop and the
//! shutdown routine: link, modes, actions, launcher and PID file all live here.
//! The binary drives it as `run()` followed by exactly one `shutdown()`,
//! whatever made `run()` return.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::action::ActionRegistry;
use crate::error::{Result, UnokbError};
use crate::launcher::Launcher;
use crate::link::{Connector, LinkError, SerialLink};
use crate::mode::ModeController;
use crate::pidfile::PidFile;
use crate::protocol::{self, CMD_BTN_PRESSED, CMD_MODE_CHANGED, Frame};

// ── Error type ──

/// Errors raised while handling a well-formed frame. All are fatal.
#[derive(Debug)]
pub enum DispatchError {
    /// The frame argument is not a valid integer.
    BadArgument { command: String, argument: String },
    /// Button number outside `1..=4`.
    ButtonOutOfRange(i64),
    /// A mode slot names a macro that is not configured.
    UnknownMacro(String),
    /// The macro's process could not be launched.
    Launch { name: String, source: io::Error },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::BadArgument { command, argument } => {
                write!(f, "Invalid argument for {command}: {argument:?}")
            }
            DispatchError::ButtonOutOfRange(n) => write!(f, "Button {n} is out of range (1-4)"),
            DispatchError::UnknownMacro(name) => write!(f, "Unknown macro: {name}"),
            DispatchError::Launch { name, source } => {
                write!(f, "Failed to run macro {name}: {source}")
            }
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Launch { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// What a handled line did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The mode changed and was announced to the keypad.
    ModeAnnounced(usize),
    /// A macro was executed.
    MacroLaunched(String),
    /// Malformed line or unknown command.
    Ignored,
}

/// Why [`Daemon::run`] returned.
#[derive(Debug)]
pub enum Exit {
    /// A stop was requested (termination signal or external request).
    Signalled,
    /// The serial link failed and `keep_alive` is off.
    LinkLost(LinkError),
    /// Any other failure while handling a frame.
    Fatal(UnokbError),
}

/// The daemon context.
pub struct Daemon<C: Connector, P: Launcher> {
    connector: C,
    link: Option<C::Link>,
    modes: ModeController,
    actions: ActionRegistry,
    launcher: P,
    keep_alive: bool,
    pid_file: Option<PidFile>,
    shut_down: bool,
}

impl<C: Connector, P: Launcher> Daemon<C, P> {
    pub fn new(
        connector: C,
        modes: ModeController,
        actions: ActionRegistry,
        launcher: P,
        keep_alive: bool,
    ) -> Self {
        Self {
            connector,
            link: None,
            modes,
            actions,
            launcher,
            keep_alive,
            pid_file: None,
            shut_down: false,
        }
    }

    /// Hand over the PID file so `shutdown()` removes it.
    pub fn with_pid_file(mut self, pid_file: PidFile) -> Self {
        self.pid_file = Some(pid_file);
        self
    }

    pub fn modes(&self) -> &ModeController {
        &self.modes
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn launcher(&self) -> &P {
        &self.launcher
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(|l| l.is_open())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Decode and dispatch one received line.
    pub fn handle_line(&mut self, line: &str) -> Result<Dispatch> {
        match protocol::decode(line) {
            Some(frame) => self.handle_frame(&frame),
            None => {
                log::debug!("ignoring malformed line {line:?}");
                Ok(Dispatch::Ignored)
            }
        }
    }

    /// Dispatch one decoded frame.
    ///
    /// Link failures while announcing a mode come back as
    /// `UnokbError::Link`; everything else is a `DispatchError`.
    pub fn handle_frame(&mut self, frame: &Frame) -> Result<Dispatch> {
        match frame.name.as_str() {
            CMD_BTN_PRESSED => {
                let button = int_argument(frame)?;
                let name = self.modes.resolve(button)?.to_string();
                match self.actions.execute(&name, &mut self.launcher) {
                    None => Err(DispatchError::UnknownMacro(name).into()),
                    Some(Err(source)) => Err(DispatchError::Launch { name, source }.into()),
                    Some(Ok(())) => {
                        log::info!("button {button} -> {name}");
                        Ok(Dispatch::MacroLaunched(name))
                    }
                }
            }
            CMD_MODE_CHANGED => {
                // Any integer is a valid step; only its residue matters.
                let step = frame
                    .argument_mod(self.modes.mode_count())
                    .ok_or_else(|| bad_argument(frame))?;
                self.modes.advance(step);
                let index = self.modes.current_index();
                log::info!("mode {index}: {}", self.modes.current().join(", "));
                let frames = self.modes.announce();
                let link = self.link.as_mut().ok_or(LinkError::Closed)?;
                link.write_all(&frames)?;
                Ok(Dispatch::ModeAnnounced(index))
            }
            other => {
                log::debug!("ignoring unknown command {other:?}");
                Ok(Dispatch::Ignored)
            }
        }
    }

    /// Run the read/dispatch loop until a stop is requested, the link is lost
    /// without `keep_alive`, or a fatal error occurs.
    pub fn run(&mut self, running: &AtomicBool) -> Exit {
        if self.link.is_none() {
            match self.connector.connect(running) {
                Some(link) => self.link = Some(link),
                None => return Exit::Signalled,
            }
        }

        while running.load(Ordering::SeqCst) {
            self.launcher.reap();

            let Some(link) = self.link.as_mut() else {
                return Exit::Signalled;
            };
            let result = match link.read_line() {
                Ok(Some(line)) => self.handle_line(&line),
                Ok(None) => continue,
                Err(e) => Err(UnokbError::Link(e)),
            };

            match result {
                Ok(dispatch) => log::debug!("{dispatch:?}"),
                Err(UnokbError::Link(e)) => {
                    if let Some(exit) = self.on_link_failure(e, running) {
                        return exit;
                    }
                }
                Err(e) => {
                    log::error!("An error has occurred. The daemon will be stopped: {e}");
                    return Exit::Fatal(e);
                }
            }
        }
        Exit::Signalled
    }

    /// Apply the keep-alive policy. `None` means the loop may continue.
    fn on_link_failure(&mut self, e: LinkError, running: &AtomicBool) -> Option<Exit> {
        if !self.keep_alive {
            log::warn!("serial link lost: {e}");
            return Some(Exit::LinkLost(e));
        }
        log::warn!("serial link lost: {e}; waiting for the keypad to come back");
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        match self.connector.connect(running) {
            Some(link) => {
                self.link = Some(link);
                None
            }
            None => Some(Exit::Signalled),
        }
    }

    /// Restore toggles, say goodbye to the keypad, remove the PID file.
    ///
    /// Runs at most once; later calls return `false` and do nothing.
    pub fn shutdown(&mut self) -> bool {
        if self.shut_down {
            return false;
        }
        self.shut_down = true;

        let restored = self.actions.restore_toggles(&mut self.launcher);
        if !restored.is_empty() {
            log::info!("restored toggles: {}", restored.join(", "));
        }

        if let Some(link) = self.link.as_mut()
            && link.is_open()
        {
            if let Err(e) = link.write_all(protocol::HOST_DISCONNECT) {
                log::warn!(
                    "could not notify the keypad ({e}). This is expected if the board was disconnected."
                );
            }
            link.close();
        }
        self.link = None;

        if let Some(pid_file) = self.pid_file.take()
            && let Err(e) = pid_file.remove()
        {
            log::warn!("{e}");
        }
        true
    }
}

fn int_argument(frame: &Frame) -> std::result::Result<i64, DispatchError> {
    frame.int_argument().ok_or_else(|| bad_argument(frame))
}

fn bad_argument(frame: &Frame) -> DispatchError {
    DispatchError::BadArgument {
        command: frame.name.clone(),
        argument: frame.argument.clone(),
    }
}
