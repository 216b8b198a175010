//! Key mapping for terminal input
//!
//! Converts key presses to the byte sequences an xterm-compatible child
//! expects on its input.

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyModifiers};

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        result
    }
}

/// Child-controlled modes that change key encoding
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InputModes {
    /// DECCKM: cursor keys send `ESC O x`
    pub application_cursor: bool,
}

const ESC: u8 = 0x1B;
const DEL: u8 = 0x7F;

/// Key mapper for converting key events to bytes
pub struct KeyMapper;

impl KeyMapper {
    /// Bytes to send to the PTY for a key press, if the key produces any
    pub fn map(code: KeyCode, mods: Modifiers, modes: InputModes) -> Option<Vec<u8>> {
        let meta = |byte: u8| {
            if mods.contains(Modifiers::ALT) {
                vec![ESC, byte]
            } else {
                vec![byte]
            }
        };

        let bytes = match code {
            KeyCode::Char(ch) => Self::encode_char(ch, mods),
            KeyCode::Enter => meta(b'\r'),
            KeyCode::Backspace => meta(DEL),
            KeyCode::Tab if mods.contains(Modifiers::SHIFT) => b"\x1b[Z".to_vec(),
            KeyCode::Tab => vec![b'\t'],
            KeyCode::BackTab => b"\x1b[Z".to_vec(),
            KeyCode::Esc => vec![ESC],

            KeyCode::Up => Self::cursor(b'A', mods, modes),
            KeyCode::Down => Self::cursor(b'B', mods, modes),
            KeyCode::Right => Self::cursor(b'C', mods, modes),
            KeyCode::Left => Self::cursor(b'D', mods, modes),
            KeyCode::Home => Self::cursor(b'H', mods, modes),
            KeyCode::End => Self::cursor(b'F', mods, modes),

            KeyCode::Insert => Self::tilde(2, mods),
            KeyCode::Delete => Self::tilde(3, mods),
            KeyCode::PageUp => Self::tilde(5, mods),
            KeyCode::PageDown => Self::tilde(6, mods),

            // F1-F4 use SS3 like application-mode cursor keys.
            KeyCode::F(n @ 1..=4) => {
                let ss3 = InputModes { application_cursor: true };
                Self::cursor(b"PQRS"[n as usize - 1], mods, ss3)
            }
            KeyCode::F(n) => Self::tilde(Self::function_code(n)?, mods),

            _ => return None,
        };
        Some(bytes)
    }

    fn encode_char(ch: char, mods: Modifiers) -> Vec<u8> {
        let alt = mods.contains(Modifiers::ALT);
        if mods.contains(Modifiers::CTRL) {
            if let Some(byte) = Self::control_byte(ch) {
                return if alt { vec![ESC, byte] } else { vec![byte] };
            }
        }

        let mut bytes = Vec::with_capacity(5);
        if alt {
            bytes.push(ESC);
        }
        bytes.extend_from_slice(ch.encode_utf8(&mut [0u8; 4]).as_bytes());
        bytes
    }

    /// C0 byte produced by Ctrl+`ch`
    fn control_byte(ch: char) -> Option<u8> {
        let byte = match ch {
            'a'..='z' => ch as u8 - b'a' + 1,
            'A'..='Z' => ch as u8 - b'A' + 1,
            '@' | '`' | ' ' | '2' => 0x00,
            '[' | '3' => ESC,
            '\\' | '4' => 0x1C,
            ']' | '5' => 0x1D,
            '^' | '~' | '6' => 0x1E,
            '_' | '7' => 0x1F,
            '?' | '8' => DEL,
            _ => return None,
        };
        Some(byte)
    }

    /// `CSI 1 ; m X` when modified, otherwise `CSI X` or `SS3 X`
    fn cursor(key: u8, mods: Modifiers, modes: InputModes) -> Vec<u8> {
        if !mods.is_empty() {
            format!("\x1b[1;{}{}", Self::modifier_param(mods), key as char).into_bytes()
        } else if modes.application_cursor {
            vec![ESC, b'O', key]
        } else {
            vec![ESC, b'[', key]
        }
    }

    /// `CSI n ~`, or `CSI n ; m ~` when modified
    fn tilde(n: u8, mods: Modifiers) -> Vec<u8> {
        if mods.is_empty() {
            format!("\x1b[{}~", n).into_bytes()
        } else {
            format!("\x1b[{};{}~", n, Self::modifier_param(mods)).into_bytes()
        }
    }

    /// xterm's parameter for F5-F12
    fn function_code(n: u8) -> Option<u8> {
        match n {
            5 => Some(15),
            6..=10 => Some(n + 11),
            11 | 12 => Some(n + 12),
            _ => None,
        }
    }

    /// xterm modifier parameter: 1 + shift + 2*alt + 4*ctrl
    fn modifier_param(mods: Modifiers) -> u8 {
        1 + u8::from(mods.contains(Modifiers::SHIFT))
            + 2 * u8::from(mods.contains(Modifiers::ALT))
            + 4 * u8::from(mods.contains(Modifiers::CTRL))
    }
}
