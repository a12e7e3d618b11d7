//! X keysym names
//!
//! `xdotool key` takes keysym names, not characters, for everything outside
//! the alphanumerics.

use crate::input::{KeyCode, KeyStroke};

/// Keysym for a printable ASCII character that is not its own name
fn punctuation(c: char) -> Option<&'static str> {
    Some(match c {
        ' ' => "space",
        '!' => "exclam",
        '"' => "quotedbl",
        '#' => "numbersign",
        '$' => "dollar",
        '%' => "percent",
        '&' => "ampersand",
        '\'' => "apostrophe",
        '(' => "parenleft",
        ')' => "parenright",
        '*' => "asterisk",
        '+' => "plus",
        ',' => "comma",
        '-' => "minus",
        '.' => "period",
        '/' => "slash",
        ':' => "colon",
        ';' => "semicolon",
        '<' => "less",
        '=' => "equal",
        '>' => "greater",
        '?' => "question",
        '@' => "at",
        '[' => "bracketleft",
        '\\' => "backslash",
        ']' => "bracketright",
        '^' => "asciicircum",
        '_' => "underscore",
        '`' => "grave",
        '{' => "braceleft",
        '|' => "bar",
        '}' => "braceright",
        '~' => "asciitilde",
        _ => return None,
    })
}

fn key_name(key: &KeyCode) -> Option<String> {
    let name = match key {
        KeyCode::Char(c) if c.is_ascii_alphanumeric() => return Some(c.to_string()),
        KeyCode::Char(c) if c.is_ascii() => punctuation(*c)?,
        KeyCode::Char(c) => return Some(format!("U{:04X}", u32::from(*c))),
        KeyCode::Enter => "Return",
        KeyCode::Tab => "Tab",
        KeyCode::BackTab => "ISO_Left_Tab",
        KeyCode::Backspace => "BackSpace",
        KeyCode::Escape => "Escape",
        KeyCode::Up => "Up",
        KeyCode::Down => "Down",
        KeyCode::Left => "Left",
        KeyCode::Right => "Right",
        KeyCode::Home => "Home",
        KeyCode::End => "End",
        KeyCode::PageUp => "Page_Up",
        KeyCode::PageDown => "Page_Down",
        KeyCode::Insert => "Insert",
        KeyCode::Delete => "Delete",
        KeyCode::F(n @ 1..=12) => return Some(format!("F{n}")),
        KeyCode::F(_) | KeyCode::Unknown(_) => return None,
    };
    Some(name.to_string())
}

/// Keysym chord for a keystroke, e.g. `ctrl+a` or `shift+Up`.
///
/// Shift is only spelled out for non-character keys; for characters it is
/// already part of the character. `None` for keys with no keysym.
pub fn keysym_name(stroke: &KeyStroke) -> Option<String> {
    let base = key_name(&stroke.key)?;
    let mut chord = String::new();
    if stroke.modifiers.ctrl {
        chord.push_str("ctrl+");
    }
    if stroke.modifiers.alt {
        chord.push_str("alt+");
    }
    if stroke.modifiers.shift && !matches!(stroke.key, KeyCode::Char(_)) {
        chord.push_str("shift+");
    }
    chord.push_str(&base);
    Some(chord)
}
