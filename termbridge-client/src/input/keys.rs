//! Key translation for terminal input
//!
//! Maps crossterm key events to the byte sequences an xterm-compatible
//! terminal would send, so the remote shell sees ordinary keystrokes.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Translate a key event to its terminal byte sequence
///
/// Returns `None` for keys without a terminal representation, such as
/// bare modifiers or media keys.
pub fn translate_key(key: &KeyEvent) -> Option<Vec<u8>> {
    let modifiers = key.modifiers;

    let bytes = match key.code {
        KeyCode::Char(c) => return Some(translate_char(c, modifiers)),
        KeyCode::Enter => vec![b'\r'],
        KeyCode::Tab if modifiers.contains(KeyModifiers::SHIFT) => b"\x1b[Z".to_vec(),
        KeyCode::Tab => vec![b'\t'],
        KeyCode::BackTab => b"\x1b[Z".to_vec(),
        KeyCode::Backspace if modifiers.contains(KeyModifiers::ALT) => vec![0x1b, 0x7f],
        KeyCode::Backspace => vec![0x7f],
        KeyCode::Esc => vec![0x1b],
        KeyCode::Null => vec![0x00],

        KeyCode::Up => csi_letter('A', modifiers),
        KeyCode::Down => csi_letter('B', modifiers),
        KeyCode::Right => csi_letter('C', modifiers),
        KeyCode::Left => csi_letter('D', modifiers),
        KeyCode::Home => csi_letter('H', modifiers),
        KeyCode::End => csi_letter('F', modifiers),

        KeyCode::Insert => csi_tilde(2, modifiers),
        KeyCode::Delete => csi_tilde(3, modifiers),
        KeyCode::PageUp => csi_tilde(5, modifiers),
        KeyCode::PageDown => csi_tilde(6, modifiers),

        KeyCode::F(n) => function_key(n, modifiers)?,

        _ => return None,
    };
    Some(bytes)
}

fn translate_char(c: char, modifiers: KeyModifiers) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(4);

    // Alt prefixes the key with ESC
    if modifiers.contains(KeyModifiers::ALT) {
        bytes.push(0x1b);
    }

    if modifiers.contains(KeyModifiers::CONTROL) {
        if let Some(code) = control_code(c) {
            bytes.push(code);
            return bytes;
        }
    }

    let mut buf = [0u8; 4];
    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    bytes
}

/// Control byte for `Ctrl+c`, if the combination has one
pub(crate) fn control_code(c: char) -> Option<u8> {
    match c {
        'a'..='z' | 'A'..='Z' => Some(c.to_ascii_lowercase() as u8 - b'a' + 1),
        '@' | ' ' => Some(0x00),
        '[' => Some(0x1b),
        '\\' => Some(0x1c),
        ']' => Some(0x1d),
        '^' => Some(0x1e),
        '_' => Some(0x1f),
        '?' => Some(0x7f),
        _ => None,
    }
}

/// xterm modifier parameter: 1 + shift(1) + alt(2) + ctrl(4)
fn modifier_param(modifiers: KeyModifiers) -> u8 {
    let mut param = 1;
    if modifiers.contains(KeyModifiers::SHIFT) {
        param += 1;
    }
    if modifiers.contains(KeyModifiers::ALT) {
        param += 2;
    }
    if modifiers.contains(KeyModifiers::CONTROL) {
        param += 4;
    }
    param
}

fn csi_letter(letter: char, modifiers: KeyModifiers) -> Vec<u8> {
    match modifier_param(modifiers) {
        1 => format!("\x1b[{}", letter).into_bytes(),
        param => format!("\x1b[1;{}{}", param, letter).into_bytes(),
    }
}

fn csi_tilde(code: u8, modifiers: KeyModifiers) -> Vec<u8> {
    match modifier_param(modifiers) {
        1 => format!("\x1b[{}~", code).into_bytes(),
        param => format!("\x1b[{};{}~", code, param).into_bytes(),
    }
}

fn function_key(n: u8, modifiers: KeyModifiers) -> Option<Vec<u8>> {
    // F1-F4 use SS3 unmodified, CSI with a modifier
    let ss3 = match n {
        1 => Some('P'),
        2 => Some('Q'),
        3 => Some('R'),
        4 => Some('S'),
        _ => None,
    };
    if let Some(letter) = ss3 {
        return Some(match modifier_param(modifiers) {
            1 => format!("\x1bO{}", letter).into_bytes(),
            param => format!("\x1b[1;{}{}", param, letter).into_bytes(),
        });
    }

    let code = match n {
        5 => 15,
        6 => 17,
        7 => 18,
        8 => 19,
        9 => 20,
        10 => 21,
        11 => 23,
        12 => 24,
        _ => return None,
    };
    Some(csi_tilde(code, modifiers))
}
