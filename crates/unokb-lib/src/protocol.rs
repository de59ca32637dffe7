//! Serial wire protocol between the keypad and the host.
//!
//! Device → host: one ASCII line per frame, `name=value`, terminated by `\n`.
//!
//! Host → device: `mode_setup\0\n` followed by the four macro names of the
//! selected mode (each terminated by `\0\n`), and `host_disconnect\0\n` once
//! before the link is closed on shutdown.

use crate::mode::Mode;

// ── Inbound command names ──

/// A button on the keypad was pressed. Argument: 1-based button number.
pub const CMD_BTN_PRESSED: &str = "btn_pressed";

/// The mode knob was turned. Argument: signed step added to the mode index.
pub const CMD_MODE_CHANGED: &str = "mode_changed";

// ── Outbound frames ──

/// Header sent before the macro names of a newly selected mode.
pub const MODE_SETUP_HEADER: &[u8] = b"mode_setup\0\n";

/// Sent once, right before the host closes the link.
pub const HOST_DISCONNECT: &[u8] = b"host_disconnect\0\n";

/// Terminator appended to every macro name in a mode announcement.
pub const NAME_TERMINATOR: &[u8] = b"\0\n";

/// A decoded inbound frame.
///
/// The argument is kept as text; it is parsed to an integer only by the
/// handler of the command that needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub name: String,
    pub argument: String,
}

impl Frame {
    /// Parse the argument as a signed integer.
    pub fn int_argument(&self) -> Option<i64> {
        self.argument.parse().ok()
    }

    /// Reduce the argument, an integer of any magnitude, into `0..modulus`
    /// (Euclidean remainder). `None` if it is not an integer or `modulus` is 0.
    pub fn argument_mod(&self, modulus: usize) -> Option<usize> {
        if modulus == 0 {
            return None;
        }
        let (negative, digits) = match self.argument.as_bytes() {
            [b'-', rest @ ..] => (true, rest),
            [b'+', rest @ ..] => (false, rest),
            all => (false, all),
        };
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return None;
        }
        let m = modulus as u128;
        let rem = digits
            .iter()
            .fold(0u128, |acc, d| (acc * 10 + u128::from(d - b'0')) % m);
        let rem = if negative { (m - rem) % m } else { rem };
        Some(rem as usize)
    }
}

/// Decode one received line (terminator already stripped).
///
/// Returns `None` if the line is not of the shape `<token>=<value>`, where
/// `<token>` contains no `=` and `<value>` is a non-empty run of digits and
/// sign characters. A value like `+-3` passes the shape check but fails to
/// parse later, which is fatal for the daemon.
pub fn decode(line: &str) -> Option<Frame> {
    let (name, argument) = line.trim().split_once('=')?;
    if argument.is_empty()
        || !argument
            .bytes()
            .all(|b| b.is_ascii_digit() || b == b'+' || b == b'-')
    {
        return None;
    }
    Some(Frame {
        name: name.to_string(),
        argument: argument.to_string(),
    })
}

/// Encode the mode announcement for `mode`.
pub fn encode_mode_setup(mode: &Mode) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        MODE_SETUP_HEADER.len()
            + mode
                .iter()
                .map(|n| n.len() + NAME_TERMINATOR.len())
                .sum::<usize>(),
    );
    out.extend_from_slice(MODE_SETUP_HEADER);
    for name in mode {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(NAME_TERMINATOR);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(names: [&str; 4]) -> Mode {
        names.map(String::from)
    }

    // ── decode ──

    #[test]
    fn decode_button_press() {
        let f = decode("btn_pressed=3").unwrap();
        assert_eq!(f.name, "btn_pressed");
        assert_eq!(f.argument, "3");
        assert_eq!(f.int_argument(), Some(3));
    }

    #[test]
    fn decode_negative_mode_change() {
        let f = decode("mode_changed=-1").unwrap();
        assert_eq!(f.name, CMD_MODE_CHANGED);
        assert_eq!(f.int_argument(), Some(-1));
    }

    #[test]
    fn decode_explicit_plus_sign() {
        let f = decode("mode_changed=+2").unwrap();
        assert_eq!(f.int_argument(), Some(2));
    }

    #[test]
    fn decode_strips_carriage_return() {
        let f = decode("btn_pressed=1\r").unwrap();
        assert_eq!(f.argument, "1");
    }

    #[test]
    fn decode_recovers_arbitrary_token_and_value() {
        for (name, value) in [("x", 0i64), ("a b", -42), ("", 7), ("btn", i64::MAX)] {
            let line = format!("{name}={value}");
            let f = decode(&line).unwrap();
            assert_eq!(f.name, name);
            assert_eq!(f.int_argument(), Some(value));
        }
    }

    #[test]
    fn decode_rejects_missing_equals() {
        assert_eq!(decode("btn_pressed"), None);
        assert_eq!(decode(""), None);
    }

    #[test]
    fn decode_rejects_empty_value() {
        assert_eq!(decode("btn_pressed="), None);
    }

    #[test]
    fn decode_rejects_non_numeric_value() {
        assert_eq!(decode("btn_pressed=abc"), None);
        assert_eq!(decode("btn_pressed=1.5"), None);
    }

    #[test]
    fn decode_rejects_second_equals() {
        assert_eq!(decode("a=b=1"), None);
    }

    #[test]
    fn decode_keeps_unparsable_sign_runs() {
        // Shape-valid, so the frame is produced; the handler rejects it.
        let f = decode("btn_pressed=+-3").unwrap();
        assert_eq!(f.int_argument(), None);
    }

    // ── argument_mod ──

    fn frame(argument: &str) -> Frame {
        Frame {
            name: CMD_MODE_CHANGED.to_string(),
            argument: argument.to_string(),
        }
    }

    #[test]
    fn argument_mod_matches_rem_euclid_for_small_values() {
        for v in -20i64..=20 {
            let f = frame(&v.to_string());
            assert_eq!(f.argument_mod(3), Some(v.rem_euclid(3) as usize), "value {v}");
        }
        assert_eq!(frame("+4").argument_mod(3), Some(1));
    }

    #[test]
    fn argument_mod_handles_values_beyond_i64() {
        // 10^20 - 1 = 99999999999999999999, and 10^20 ≡ 1 (mod 3).
        assert_eq!(frame("99999999999999999999").argument_mod(3), Some(0));
        assert_eq!(frame("100000000000000000000").argument_mod(3), Some(1));
        assert_eq!(frame("-100000000000000000000").argument_mod(3), Some(2));
        let huge = "7".repeat(200);
        assert!(frame(&huge).argument_mod(5).unwrap() < 5);
    }

    #[test]
    fn argument_mod_rejects_non_integers() {
        for bad in ["+-3", "-", "+", "1-2", "--1"] {
            assert_eq!(frame(bad).argument_mod(3), None, "{bad}");
        }
        assert_eq!(frame("1").argument_mod(0), None);
    }

    // ── encode ──

    #[test]
    fn mode_setup_layout() {
        let bytes = encode_mode_setup(&mode(["Mic", "Reverb", "VolUp", "VolDown"]));
        assert_eq!(
            bytes,
            b"mode_setup\0\nMic\0\nReverb\0\nVolUp\0\nVolDown\0\n".to_vec()
        );
    }

    #[test]
    fn mode_setup_empty_names_still_terminated() {
        let bytes = encode_mode_setup(&mode(["", "", "", ""]));
        assert_eq!(bytes, b"mode_setup\0\n\0\n\0\n\0\n\0\n".to_vec());
    }
}
