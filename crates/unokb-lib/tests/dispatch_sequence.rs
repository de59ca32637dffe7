//! Integration tests: end-to-end keypad sessions using MockConnector and MockLauncher.
//!
//! A config is parsed from TOML, turned into actions and driven through the
//! public `Daemon` API, verifying which commands launch, what goes back over
//! the wire, and what shutdown leaves behind.

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

use unokb_lib::action::ActionRegistry;
use unokb_lib::config::Config;
use unokb_lib::daemon::{Daemon, DispatchError, Exit};
use unokb_lib::launcher::mock::MockLauncher;
use unokb_lib::link::LinkError;
use unokb_lib::link::mock::{Incoming, MockConnector, MockLink, MockWire};
use unokb_lib::mode::ModeController;
use unokb_lib::pidfile::{Acquire, PidFile};
use unokb_lib::protocol::{HOST_DISCONNECT, encode_mode_setup};
use unokb_lib::UnokbError;

const CONFIG: &str = r#"
modes = [
    ["Mic", "Reverb", "VolUp", "VolDown"],
    ["Mute", "Deafen", "Both", "VolUp"],
]

[macros]
Mute = "/scripts/discord-mute.sh"
Deafen = "/scripts/discord-deafen.sh"
VolUp = ["pactl", "set-sink-volume", "@DEFAULT_SINK@", "+10%"]
VolDown = ["pactl", "set-sink-volume", "@DEFAULT_SINK@", "-10%"]
Both = [["/scripts/discord-mute.sh"], ["/scripts/discord-deafen.sh"]]
Reverb = { toggle = "/scripts/reverb.sh" }

[macros.Mic]
toggle = "/scripts/mic_start.sh"
probe = "/scripts/mic_check.sh"
fallback_kill = "/scripts/mic_kill.sh"
"#;

type TestDaemon = Daemon<MockConnector, MockLauncher>;

/// Helper: build a daemon from CONFIG whose links share the given wires.
fn build(wires: &[Rc<MockWire>], running: &Rc<AtomicBool>, keep_alive: bool, mic_on: bool) -> TestDaemon {
    let config: Config = toml::from_str(CONFIG).unwrap();
    let actions = config.build_actions().unwrap();
    let mut launcher = MockLauncher::new();
    launcher.set_run_result("/scripts/mic_check.sh", mic_on);
    let registry = ActionRegistry::new(actions, &mut launcher);
    let links = wires
        .iter()
        .map(|w| MockLink::new(Rc::clone(w)).stop_when_drained(Rc::clone(running)))
        .collect();
    Daemon::new(
        MockConnector::new(links),
        ModeController::new(config.modes.clone()),
        registry,
        launcher,
        keep_alive,
    )
}

fn mode(names: [&str; 4]) -> [String; 4] {
    names.map(String::from)
}

#[test]
fn full_session_then_shutdown() {
    let running = Rc::new(AtomicBool::new(true));
    let wire = MockWire::new();
    for line in [
        "btn_pressed=3",  // VolUp
        "mode_changed=1", // → mode 1
        "btn_pressed=1",  // Mute
        "btn_pressed=3",  // Both
        "mode_changed=-1",
        "btn_pressed=2", // Reverb on
    ] {
        wire.push_line(line);
    }
    let mut d = build(&[Rc::clone(&wire)], &running, false, false);

    assert!(matches!(d.run(&running), Exit::Signalled));
    assert_eq!(
        d.launcher().spawned_programs(),
        vec![
            "pactl",
            "/scripts/discord-mute.sh",
            "/scripts/discord-mute.sh",
            "/scripts/discord-deafen.sh",
            "/scripts/reverb.sh",
        ]
    );

    let mut expected = encode_mode_setup(&mode(["Mute", "Deafen", "Both", "VolUp"]));
    expected.extend(encode_mode_setup(&mode(["Mic", "Reverb", "VolUp", "VolDown"])));
    assert_eq!(wire.written(), expected);

    // Reverb was switched on during the session and is restored on shutdown.
    assert!(d.shutdown());
    assert_eq!(d.launcher().terminated.len(), 1);
    assert!(wire.written().ends_with(HOST_DISCONNECT));
    assert_eq!(wire.closes.get(), 1);

    // Second shutdown is a no-op.
    assert!(!d.shutdown());
    assert_eq!(wire.closes.get(), 1);
    assert_eq!(d.launcher().terminated.len(), 1);
}

#[test]
fn probed_toggle_restores_through_fallback_kill() {
    let running = Rc::new(AtomicBool::new(true));
    let wire = MockWire::new();
    // Mic probed on at startup, switched off, then on again.
    wire.push_line("btn_pressed=1");
    wire.push_line("btn_pressed=1");
    let mut d = build(&[Rc::clone(&wire)], &running, false, true);

    assert!(matches!(d.run(&running), Exit::Signalled));
    assert_eq!(
        d.launcher().spawned_programs(),
        vec!["/scripts/mic_kill.sh", "/scripts/mic_start.sh"]
    );
    // Back in its initial state: nothing to restore.
    d.shutdown();
    assert!(d.launcher().terminated.is_empty());
    assert_eq!(d.launcher().spawned.len(), 2);
}

#[test]
fn bad_argument_stops_the_loop() {
    let running = Rc::new(AtomicBool::new(true));
    let wire = MockWire::new();
    wire.push_line("btn_pressed=9");
    wire.push_line("btn_pressed=1");
    let mut d = build(&[Rc::clone(&wire)], &running, false, false);

    let exit = d.run(&running);
    assert!(
        matches!(
            exit,
            Exit::Fatal(UnokbError::Dispatch(DispatchError::ButtonOutOfRange(9)))
        ),
        "{exit:?}"
    );
    assert!(d.launcher().spawned.is_empty());
    assert!(running.load(Ordering::SeqCst));
}

#[test]
fn unplug_without_keep_alive_exits() {
    let running = Rc::new(AtomicBool::new(true));
    let wire = MockWire::new();
    wire.push_line("btn_pressed=3");
    wire.push(Incoming::Fail);
    let mut d = build(&[Rc::clone(&wire)], &running, false, false);

    assert!(matches!(d.run(&running), Exit::LinkLost(LinkError::ReadFailed(_))));
    assert_eq!(d.launcher().spawned_programs(), vec!["pactl"]);
}

#[test]
fn unplug_with_keep_alive_reconnects_and_keeps_mode() {
    let running = Rc::new(AtomicBool::new(true));
    let first = MockWire::new();
    first.push_line("mode_changed=1");
    first.push(Incoming::Fail);
    let second = MockWire::new();
    second.push(Incoming::Idle);
    second.push_line("btn_pressed=2");
    let mut d = build(&[Rc::clone(&first), Rc::clone(&second)], &running, true, false);

    assert!(matches!(d.run(&running), Exit::Signalled));
    assert_eq!(first.closes.get(), 1);
    assert_eq!(d.connector().connects.get(), 2);
    // Mode survived the reconnect: button 2 of mode 1 is Deafen.
    assert_eq!(d.launcher().spawned_programs(), vec!["/scripts/discord-deafen.sh"]);
    assert_eq!(d.modes().current_index(), 1);
}

#[test]
fn stop_before_connect_runs_clean_shutdown() {
    let running = Rc::new(AtomicBool::new(false));
    let mut d = build(&[], &running, false, false);
    assert!(matches!(d.run(&running), Exit::Signalled));
    assert!(!d.is_connected());
    assert!(d.shutdown());
}

#[test]
fn shutdown_removes_pid_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unokb.pid");
    let Acquire::Acquired(pid_file) = PidFile::acquire(&path).unwrap() else {
        panic!("expected to acquire the PID file");
    };
    assert!(path.exists());

    let running = Rc::new(AtomicBool::new(true));
    let wire = MockWire::new();
    wire.fail_writes.set(true);
    wire.push_line("btn_pressed=4");
    let mut d = build(&[Rc::clone(&wire)], &running, false, false).with_pid_file(pid_file);

    assert!(matches!(d.run(&running), Exit::Signalled));
    // Farewell write fails, shutdown still completes.
    assert!(d.shutdown());
    assert!(!path.exists());
    assert_eq!(wire.closes.get(), 1);
}
