//! Mode controller: current mode index and button → macro resolution.

use crate::daemon::DispatchError;
use crate::protocol;

/// Number of physical buttons, and therefore macro slots per mode.
pub const BUTTONS_PER_MODE: usize = 4;

/// One macro name per button, in button order.
pub type Mode = [String; BUTTONS_PER_MODE];

/// Holds the configured modes and the currently selected one.
///
/// The index starts at 0 and only changes through [`handle_mode_changed`].
///
/// [`handle_mode_changed`]: ModeController::handle_mode_changed
#[derive(Debug, Clone)]
pub struct ModeController {
    modes: Vec<Mode>,
    current: usize,
}

impl ModeController {
    /// Create a controller. `modes` must not be empty (checked by config validation).
    pub fn new(modes: Vec<Mode>) -> Self {
        debug_assert!(!modes.is_empty(), "at least one mode is required");
        Self { modes, current: 0 }
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn mode_count(&self) -> usize {
        self.modes.len()
    }

    pub fn current(&self) -> &Mode {
        &self.modes[self.current]
    }

    /// Step the mode index by `delta` (may be negative), wrapping around.
    pub fn handle_mode_changed(&mut self, delta: i64) -> &Mode {
        let step = delta.rem_euclid(self.modes.len() as i64) as usize;
        self.advance(step)
    }

    /// Move forward by `step` modes, wrapping around. Callers holding an
    /// arbitrarily large step reduce it modulo [`mode_count`](Self::mode_count) first.
    pub fn advance(&mut self, step: usize) -> &Mode {
        let count = self.modes.len();
        self.current = (self.current + step % count) % count;
        &self.modes[self.current]
    }

    /// Outbound announcement frames for the current mode.
    pub fn announce(&self) -> Vec<u8> {
        protocol::encode_mode_setup(self.current())
    }

    /// Macro name bound to the 1-based `button` in the current mode.
    pub fn resolve(&self, button: i64) -> Result<&str, DispatchError> {
        if !(1..=BUTTONS_PER_MODE as i64).contains(&button) {
            return Err(DispatchError::ButtonOutOfRange(button));
        }
        Ok(&self.current()[(button - 1) as usize])
    }
}
