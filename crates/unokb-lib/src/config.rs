//! Daemon configuration: TOML-based, platform-aware paths.
//!
//! ```toml
//! serial_port = "/dev/ttyACM0"
//! keep_alive = false
//! modes = [
//!     ["Mic", "Reverb", "VolUp", "VolDown"],
//!     ["Mute", "Deafen", "StartMic", "StopMic"],
//! ]
//!
//! [macros]
//! Mute = "/home/me/scripts/discord-mute.sh"
//! VolUp = ["pactl", "set-sink-volume", "@DEFAULT_SINK@", "+10%"]
//! Both = [["echo", "a"], ["echo", "b"]]
//! Mic = { toggle = "/home/me/scripts/mic_start.sh", probe = "/home/me/scripts/mic_check.sh", fallback_kill = "/home/me/scripts/mic_kill.sh" }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::action::{Action, Toggleable};
use crate::launcher::CommandLine;
use crate::mode::Mode;

/// File name of the PID file inside the runtime directory.
const PID_FILE_NAME: &str = "unokb.pid";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Serial device of the keypad. Default: "/dev/ttyACM0".
    #[serde(default = "default_serial_port")]
    pub serial_port: String,

    /// Serial baud rate. Default: 9600.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// PID file location. Empty = `<runtime dir>/unokb.pid`.
    #[serde(default)]
    pub pid_path: String,

    /// Keep running (and wait for the keypad) when the serial link drops.
    #[serde(default)]
    pub keep_alive: bool,

    /// Modes in cycling order, each naming the macros of buttons 1–4.
    #[serde(default)]
    pub modes: Vec<Mode>,

    /// Macro name → action.
    #[serde(default)]
    pub macros: BTreeMap<String, MacroSpec>,
}

fn default_serial_port() -> String {
    "/dev/ttyACM0".into()
}

fn default_baud_rate() -> u32 {
    9600
}

impl Default for Config {
    fn default() -> Self {
        Config {
            serial_port: default_serial_port(),
            baud_rate: default_baud_rate(),
            pid_path: String::new(),
            keep_alive: false,
            modes: Vec::new(),
            macros: BTreeMap::new(),
        }
    }
}

/// A command as written in the config: one string or an explicit argv.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Line(String),
    Argv(Vec<String>),
}

impl CommandSpec {
    pub fn to_command(&self) -> Option<CommandLine> {
        match self {
            CommandSpec::Line(s) => CommandLine::parse(s),
            CommandSpec::Argv(v) => CommandLine::new(v.clone()),
        }
    }
}

/// A macro as written in the config.
///
/// The variant is picked from the TOML shape: string, array of strings, array
/// containing arrays, or table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MacroSpec {
    Simple(String),
    Composite(Vec<String>),
    Sequence(Vec<CommandSpec>),
    Toggle {
        toggle: CommandSpec,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        probe: Option<CommandSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback_kill: Option<CommandSpec>,
    },
}

impl MacroSpec {
    /// Resolve into an [`Action`]. Toggle state is not probed here.
    pub fn to_action(&self) -> std::result::Result<Action, String> {
        let required = |spec: &CommandSpec, what: &str| {
            spec.to_command()
                .ok_or_else(|| format!("{what} command is empty"))
        };
        let optional = |spec: &Option<CommandSpec>, what: &str| {
            spec.as_ref().map(|s| required(s, what)).transpose()
        };
        match self {
            MacroSpec::Simple(line) => CommandLine::parse(line)
                .map(Action::Simple)
                .ok_or_else(|| "command is empty".to_string()),
            MacroSpec::Composite(argv) => CommandLine::new(argv.clone())
                .map(Action::Composite)
                .ok_or_else(|| "command is empty".to_string()),
            MacroSpec::Sequence(entries) => {
                if entries.is_empty() {
                    return Err("sequence has no commands".into());
                }
                entries
                    .iter()
                    .enumerate()
                    .map(|(i, e)| required(e, &format!("sequence entry {}", i + 1)))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map(Action::Sequence)
            }
            MacroSpec::Toggle {
                toggle,
                probe,
                fallback_kill,
            } => Ok(Action::Toggle(Toggleable::new(
                required(toggle, "toggle")?,
                optional(probe, "probe")?,
                optional(fallback_kill, "fallback_kill")?,
            ))),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `serial_port` is empty.
    EmptySerialPort,
    /// `baud_rate` is zero.
    ZeroBaudRate,
    /// `modes` is empty.
    NoModes,
    /// A mode slot names a macro that is not defined (`mode` and `button` are 1-based).
    UndefinedMacro {
        mode: usize,
        button: usize,
        name: String,
    },
    /// A macro definition cannot be turned into an action.
    InvalidMacro { name: String, reason: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptySerialPort => write!(f, "serial_port cannot be empty"),
            ValidationError::ZeroBaudRate => write!(f, "baud_rate must be greater than zero"),
            ValidationError::NoModes => write!(f, "at least one mode must be configured"),
            ValidationError::UndefinedMacro { mode, button, name } => {
                write!(f, "mode {mode}, button {button}: macro \"{name}\" is not defined")
            }
            ValidationError::InvalidMacro { name, reason } => {
                write!(f, "Invalid macro \"{name}\": {reason}")
            }
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("unokb"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Default PID file location: the user runtime dir, else the temp dir.
    pub fn default_pid_path() -> PathBuf {
        dirs::runtime_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(PID_FILE_NAME)
    }

    /// Effective PID file path.
    pub fn pid_path(&self) -> PathBuf {
        let p = self.pid_path.trim();
        if p.is_empty() {
            Self::default_pid_path()
        } else {
            PathBuf::from(p)
        }
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match Self::try_load_from(path) {
            Ok(config) => (config, vec![]),
            Err(e) => {
                let warning = format!("{e}, using defaults");
                (Self::default(), vec![warning])
            }
        }
    }

    /// Load config from an arbitrary path, failing on parse errors.
    ///
    /// A missing file yields the defaults.
    pub fn try_load_from(path: &Path) -> crate::error::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(|e| {
                crate::UnokbError::Config(format!("parse error ({}): {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(crate::UnokbError::Config(format!(
                "cannot read {}: {e}",
                path.display()
            ))),
        }
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.serial_port.trim().is_empty() {
            errors.push(ValidationError::EmptySerialPort);
        }
        if self.baud_rate == 0 {
            errors.push(ValidationError::ZeroBaudRate);
        }
        if self.modes.is_empty() {
            errors.push(ValidationError::NoModes);
        }

        for (m, mode) in self.modes.iter().enumerate() {
            for (b, name) in mode.iter().enumerate() {
                if !self.macros.contains_key(name) {
                    errors.push(ValidationError::UndefinedMacro {
                        mode: m + 1,
                        button: b + 1,
                        name: name.clone(),
                    });
                }
            }
        }

        for (name, spec) in &self.macros {
            if let Err(reason) = spec.to_action() {
                errors.push(ValidationError::InvalidMacro {
                    name: name.clone(),
                    reason,
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and resolve every macro into an action.
    pub fn build_actions(&self) -> crate::error::Result<HashMap<String, Action>> {
        if let Err(errors) = self.validate() {
            let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            return Err(crate::UnokbError::Config(joined.join("; ")));
        }
        self.macros
            .iter()
            .map(|(name, spec)| {
                spec.to_action()
                    .map(|a| (name.clone(), a))
                    .map_err(crate::UnokbError::Config)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
serial_port = "/dev/ttyUSB1"
keep_alive = true
modes = [
    ["Mic", "Reverb", "VolUp", "VolDown"],
    ["Mute", "Deafen", "VolUp", "Both"],
]

[macros]
Mute = "/home/me/scripts/discord-mute.sh"
Deafen = "/home/me/scripts/discord-deafen.sh --force"
VolUp = ["pactl", "set-sink-volume", "@DEFAULT_SINK@", "+10%"]
VolDown = ["pactl", "set-sink-volume", "@DEFAULT_SINK@", "-10%"]
Both = [["echo", "a"], "echo b"]
Reverb = { toggle = "/home/me/scripts/reverb.sh" }

[macros.Mic]
toggle = "/home/me/scripts/mic_start.sh"
probe = "/home/me/scripts/mic_check.sh"
fallback_kill = ["/home/me/scripts/mic_kill.sh", "--all"]
"##;

    fn sample() -> Config {
        toml::from_str(SAMPLE).unwrap()
    }

    // ── Defaults ──

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.serial_port, "/dev/ttyACM0");
        assert_eq!(c.baud_rate, 9600);
        assert!(!c.keep_alive);
        assert!(c.modes.is_empty());
        assert!(c.macros.is_empty());
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let c: Config = toml::from_str("").unwrap();
        assert_eq!(c.serial_port, "/dev/ttyACM0");
        assert_eq!(c.baud_rate, 9600);
        assert!(c.pid_path.is_empty());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c: Config = toml::from_str("keep_alive = true").unwrap();
        assert!(c.keep_alive);
        assert_eq!(c.serial_port, "/dev/ttyACM0");
    }

    #[test]
    fn wrong_type_toml_is_error() {
        let result: std::result::Result<Config, _> = toml::from_str("keep_alive = \"yes\"");
        assert!(result.is_err());
    }

    #[test]
    fn mode_with_wrong_button_count_is_error() {
        let result: std::result::Result<Config, _> =
            toml::from_str("modes = [[\"a\", \"b\", \"c\"]]");
        assert!(result.is_err());
    }

    // ── Macro shapes ──

    #[test]
    fn parses_every_macro_shape() {
        let c = sample();
        assert!(matches!(c.macros["Mute"], MacroSpec::Simple(_)));
        assert!(matches!(c.macros["VolUp"], MacroSpec::Composite(_)));
        assert!(matches!(c.macros["Both"], MacroSpec::Sequence(_)));
        assert!(matches!(c.macros["Reverb"], MacroSpec::Toggle { probe: None, .. }));
        assert!(matches!(
            c.macros["Mic"],
            MacroSpec::Toggle {
                probe: Some(_),
                fallback_kill: Some(CommandSpec::Argv(_)),
                ..
            }
        ));
    }

    #[test]
    fn simple_string_with_spaces_becomes_argv() {
        let action = sample().macros["Deafen"].to_action().unwrap();
        let Action::Simple(cmd) = action else {
            panic!("expected simple action");
        };
        assert_eq!(cmd.program(), "/home/me/scripts/discord-deafen.sh");
        assert_eq!(cmd.args(), &["--force".to_string()]);
    }

    #[test]
    fn sequence_mixes_strings_and_arrays() {
        let action = sample().macros["Both"].to_action().unwrap();
        let Action::Sequence(cmds) = action else {
            panic!("expected sequence");
        };
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[1].argv(), &["echo".to_string(), "b".to_string()]);
    }

    #[test]
    fn toggle_starts_off_before_probe() {
        let Action::Toggle(t) = sample().macros["Mic"].to_action().unwrap() else {
            panic!("expected toggle");
        };
        assert!(!t.is_on());
    }

    #[test]
    fn empty_commands_rejected() {
        assert!(MacroSpec::Simple("  ".into()).to_action().is_err());
        assert!(MacroSpec::Composite(vec![]).to_action().is_err());
        assert!(MacroSpec::Sequence(vec![]).to_action().is_err());
        let err = MacroSpec::Sequence(vec![
            CommandSpec::Line("ok".into()),
            CommandSpec::Argv(vec![]),
        ])
        .to_action()
        .unwrap_err();
        assert!(err.contains("sequence entry 2"), "{err}");
        let err = MacroSpec::Toggle {
            toggle: CommandSpec::Line("on".into()),
            probe: Some(CommandSpec::Line("".into())),
            fallback_kill: None,
        }
        .to_action()
        .unwrap_err();
        assert!(err.contains("probe"), "{err}");
    }

    // ── validate ──

    #[test]
    fn sample_is_valid() {
        assert_eq!(sample().validate(), Ok(()));
        assert_eq!(sample().build_actions().unwrap().len(), 7);
    }

    #[test]
    fn default_config_has_no_modes() {
        let errors = Config::default().validate().unwrap_err();
        assert_eq!(errors, vec![ValidationError::NoModes]);
    }

    #[test]
    fn validate_reports_undefined_macro_position() {
        let mut c = sample();
        c.modes[1][2] = "Missing".into();
        let errors = c.validate().unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::UndefinedMacro {
                mode: 2,
                button: 3,
                name: "Missing".into()
            }]
        );
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut c = sample();
        c.serial_port = " ".into();
        c.baud_rate = 0;
        c.macros.insert("Broken".into(), MacroSpec::Composite(vec![]));
        let errors = c.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::EmptySerialPort));
        assert!(errors.contains(&ValidationError::ZeroBaudRate));
        assert!(matches!(
            errors[2],
            ValidationError::InvalidMacro { ref name, .. } if name == "Broken"
        ));
    }

    #[test]
    fn build_actions_fails_on_invalid_config() {
        let err = Config::default().build_actions().unwrap_err();
        assert!(err.to_string().contains("at least one mode"));
    }

    #[test]
    fn validation_error_display() {
        let e = ValidationError::UndefinedMacro {
            mode: 1,
            button: 4,
            name: "X".into(),
        };
        assert_eq!(e.to_string(), "mode 1, button 4: macro \"X\" is not defined");
    }

    // ── Paths ──

    #[test]
    fn config_path_ends_with_toml() {
        if let Some(path) = Config::path() {
            assert_eq!(path.file_name().unwrap(), "config.toml");
        }
    }

    #[test]
    fn default_pid_path_file_name() {
        assert_eq!(
            Config::default_pid_path().file_name().unwrap(),
            PID_FILE_NAME
        );
        assert_eq!(Config::default().pid_path(), Config::default_pid_path());
    }

    #[test]
    fn explicit_pid_path_wins() {
        let c = Config {
            pid_path: "/tmp/custom.pid".into(),
            ..Config::default()
        };
        assert_eq!(c.pid_path(), PathBuf::from("/tmp/custom.pid"));
    }

    // ── Loading ──

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (c, warnings) = Config::load_from(&dir.path().join("nope.toml"));
        assert!(warnings.is_empty());
        assert_eq!(c.serial_port, "/dev/ttyACM0");
    }

    #[test]
    fn load_from_invalid_toml_returns_defaults_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is { not valid toml").unwrap();
        let (c, warnings) = Config::load_from(&path);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("parse error"));
        assert!(c.modes.is_empty());
    }

    #[test]
    fn try_load_from_invalid_toml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "modes = 3").unwrap();
        assert!(matches!(
            Config::try_load_from(&path),
            Err(crate::UnokbError::Config(_))
        ));
    }

    #[test]
    fn try_load_from_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let c = Config::try_load_from(&path).unwrap();
        assert_eq!(c.serial_port, "/dev/ttyUSB1");
        assert!(c.keep_alive);
        assert_eq!(c.modes.len(), 2);
    }

    #[test]
    fn serializes_to_json() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["macros"]["VolUp"][0], "pactl");
        assert_eq!(json["macros"]["Reverb"]["toggle"], "/home/me/scripts/reverb.sh");
        assert!(json["macros"]["Reverb"].get("probe").is_none());
    }
}
