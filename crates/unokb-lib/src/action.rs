//! Macro actions and the registry that executes them.
//!
//! Every configured macro resolves, once at load time, to one [`Action`]
//! variant. Only [`Toggleable`] carries state: an on/off flag, the state it
//! started with, and the pid of the process it launched.

use std::collections::HashMap;
use std::io;

use crate::launcher::{CommandLine, Launcher, ProcessId};

/// A long-running process switched on and off by the same button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toggleable {
    on: CommandLine,
    probe: Option<CommandLine>,
    fallback_kill: Option<CommandLine>,
    state: bool,
    initial_state: bool,
    running: Option<ProcessId>,
}

impl Toggleable {
    /// A toggle that starts Off. Call [`seed`](Self::seed) to run the probe.
    pub fn new(
        on: CommandLine,
        probe: Option<CommandLine>,
        fallback_kill: Option<CommandLine>,
    ) -> Self {
        Self {
            on,
            probe,
            fallback_kill,
            state: false,
            initial_state: false,
            running: None,
        }
    }

    /// Seed the initial state from the probe command, if any.
    ///
    /// A probe that exits successfully means the process is already on. A probe
    /// that cannot be launched leaves the toggle Off.
    pub fn seed(&mut self, launcher: &mut impl Launcher) {
        let state = match &self.probe {
            None => false,
            Some(probe) => match launcher.run_to_completion(probe) {
                Ok(success) => success,
                Err(e) => {
                    log::warn!("probe {probe} failed to run, assuming off: {e}");
                    false
                }
            },
        };
        self.state = state;
        self.initial_state = state;
    }

    pub fn is_on(&self) -> bool {
        self.state
    }

    pub fn initial_state(&self) -> bool {
        self.initial_state
    }

    /// Pid of the on-process this toggle launched, while it is tracked.
    pub fn running(&self) -> Option<ProcessId> {
        self.running
    }

    pub fn differs_from_initial(&self) -> bool {
        self.state != self.initial_state
    }

    /// Flip the state, launching or stopping the managed process.
    ///
    /// Turning off always leaves the toggle Off, even if the termination
    /// request or fallback command fails.
    pub fn toggle(&mut self, launcher: &mut impl Launcher) -> io::Result<()> {
        if !self.state {
            let pid = launcher.spawn_detached(&self.on)?;
            self.running = Some(pid);
            self.state = true;
            return Ok(());
        }

        self.state = false;
        match (self.running.take(), &self.fallback_kill) {
            (Some(pid), _) => launcher.terminate(pid),
            (None, Some(kill)) => launcher.spawn_detached(kill).map(drop),
            (None, None) => Ok(()),
        }
    }
}

/// What a macro does when its button is pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// One program or whitespace-separated command line.
    Simple(CommandLine),
    /// One program with an explicit argument list.
    Composite(CommandLine),
    /// Independent commands, all launched at once. Not chained: a failing
    /// entry does not stop the others.
    Sequence(Vec<CommandLine>),
    /// On/off process.
    Toggle(Toggleable),
}

impl Action {
    /// Execute the action. Spawned processes are never waited on.
    pub fn execute(&mut self, launcher: &mut impl Launcher) -> io::Result<()> {
        match self {
            Action::Simple(cmd) | Action::Composite(cmd) => launcher.spawn_detached(cmd).map(drop),
            Action::Sequence(cmds) => {
                let mut first_err = None;
                for cmd in cmds.iter() {
                    if let Err(e) = launcher.spawn_detached(cmd) {
                        first_err.get_or_insert(e);
                    }
                }
                first_err.map_or(Ok(()), Err)
            }
            Action::Toggle(t) => t.toggle(launcher),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Action::Simple(_) => "simple",
            Action::Composite(_) => "composite",
            Action::Sequence(_) => "sequence",
            Action::Toggle(_) => "toggle",
        }
    }
}

/// Macro name → action.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Action>,
}

impl ActionRegistry {
    /// Build the registry, running every toggle's probe synchronously.
    pub fn new(actions: HashMap<String, Action>, launcher: &mut impl Launcher) -> Self {
        let mut registry = Self { actions };
        for (name, action) in registry.actions.iter_mut() {
            log::debug!("macro {name}: {}", action.kind());
            if let Action::Toggle(t) = action {
                t.seed(launcher);
                log::info!(
                    "toggle {name} starts {}",
                    if t.is_on() { "on" } else { "off" }
                );
            }
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Execute the macro named `name`. `None` if no such macro exists.
    pub fn execute(&mut self, name: &str, launcher: &mut impl Launcher) -> Option<io::Result<()>> {
        self.actions
            .get_mut(name)
            .map(|action| action.execute(launcher))
    }

    /// Toggle back every toggle whose state differs from its initial state.
    ///
    /// Failures are logged and do not stop the remaining restores. Returns the
    /// names of the toggles that were restored, sorted.
    pub fn restore_toggles(&mut self, launcher: &mut impl Launcher) -> Vec<String> {
        let mut restored = Vec::new();
        for (name, action) in self.actions.iter_mut() {
            let Action::Toggle(t) = action else { continue };
            if !t.differs_from_initial() {
                continue;
            }
            if let Err(e) = t.toggle(launcher) {
                log::warn!("could not restore toggle {name}: {e}");
            }
            restored.push(name.clone());
        }
        restored.sort();
        restored
    }
}
