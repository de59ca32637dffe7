//! `config` subcommand: show current configuration and file paths.

use std::path::Path;

use super::{Config, ConfigOutput, Result, kv, kv_indent, kv_width};
use unokb_lib::config::{CommandSpec, MacroSpec};

fn describe_command(cmd: &CommandSpec) -> String {
    match cmd {
        CommandSpec::Line(s) => s.clone(),
        CommandSpec::Argv(v) => v.join(" "),
    }
}

/// One-line summary of a macro definition.
fn describe_macro(spec: &MacroSpec) -> String {
    match spec {
        MacroSpec::Simple(line) => line.clone(),
        MacroSpec::Composite(argv) => argv.join(" "),
        MacroSpec::Sequence(entries) => {
            let parts: Vec<String> = entries.iter().map(describe_command).collect();
            format!("[{}]", parts.join("; "))
        }
        MacroSpec::Toggle {
            toggle,
            probe,
            fallback_kill,
        } => {
            let mut s = format!("toggle: {}", describe_command(toggle));
            if let Some(p) = probe {
                s.push_str(&format!(", probe: {}", describe_command(p)));
            }
            if let Some(k) = fallback_kill {
                s.push_str(&format!(", fallback_kill: {}", describe_command(k)));
            }
            s
        }
    }
}

fn problems(config: &Config) -> Vec<String> {
    match config.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
    }
}

pub(super) fn cmd_config(json: bool, custom_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(custom_path);
    let config_path = super::config_path(custom_path);
    let config_exists = config_path.as_ref().map(|p| p.exists()).unwrap_or(false);
    let problems = problems(&config);

    if json {
        let output = ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            pid_file: config.pid_path().display().to_string(),
            settings: config,
            problems,
        };
        let json_str = serde_json::to_string_pretty(&output).map_err(|e| {
            unokb_lib::UnokbError::Config(format!("JSON serialization failed: {e}"))
        })?;
        println!("{json_str}");
        return Ok(());
    }

    // Human-readable output
    let mut indent_keys: Vec<String> = vec![
        "serial_port:".into(),
        "baud_rate:".into(),
        "keep_alive:".into(),
        "PID file:".into(),
    ];
    indent_keys.extend(config.modes.iter().enumerate().map(|(i, _)| format!("mode {}:", i + 1)));
    indent_keys.extend(config.macros.keys().map(|k| format!("{k}:")));
    let indent_refs: Vec<&str> = indent_keys.iter().map(String::as_str).collect();
    let w = kv_width(&["Config file:"], &indent_refs);

    match &config_path {
        Some(p) => {
            if config_exists {
                kv("Config file:", format_args!("{} (loaded)", p.display()), w);
            } else {
                kv(
                    "Config file:",
                    format_args!("{} (not found, using defaults)", p.display()),
                    w,
                );
            }
        }
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    println!("Settings:");
    kv_indent("serial_port:", &config.serial_port, w);
    kv_indent("baud_rate:", config.baud_rate, w);
    kv_indent("keep_alive:", config.keep_alive, w);
    kv_indent("PID file:", config.pid_path().display(), w);
    println!();

    println!("Modes:");
    if config.modes.is_empty() {
        println!("  (none)");
    }
    for (i, mode) in config.modes.iter().enumerate() {
        kv_indent(&format!("mode {}:", i + 1), mode.join(", "), w);
    }
    println!();

    println!("Macros:");
    if config.macros.is_empty() {
        println!("  (none)");
    }
    for (name, spec) in &config.macros {
        kv_indent(&format!("{name}:"), describe_macro(spec), w);
    }

    if !problems.is_empty() {
        println!();
        println!("Problems:");
        for p in &problems {
            println!("  {p}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_each_macro_shape() {
        assert_eq!(describe_macro(&MacroSpec::Simple("a.sh -x".into())), "a.sh -x");
        assert_eq!(
            describe_macro(&MacroSpec::Composite(vec!["pactl".into(), "up".into()])),
            "pactl up"
        );
        assert_eq!(
            describe_macro(&MacroSpec::Sequence(vec![
                CommandSpec::Line("a".into()),
                CommandSpec::Argv(vec!["b".into(), "c".into()]),
            ])),
            "[a; b c]"
        );
        assert_eq!(
            describe_macro(&MacroSpec::Toggle {
                toggle: CommandSpec::Line("on.sh".into()),
                probe: None,
                fallback_kill: Some(CommandSpec::Line("kill.sh".into())),
            }),
            "toggle: on.sh, fallback_kill: kill.sh"
        );
    }

    #[test]
    fn default_config_reports_missing_modes() {
        let p = problems(&Config::default());
        assert_eq!(p, vec!["at least one mode must be configured".to_string()]);
    }

    #[test]
    fn cmd_config_with_missing_file_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert!(cmd_config(false, Some(&path)).is_ok());
        assert!(cmd_config(true, Some(&path)).is_ok());
    }
}
