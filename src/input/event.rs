//! Input Events
//!
//! Events decoded from a viewer's terminal, in terminal terms: cells,
//! keystrokes and wheel clicks.

use crate::core::GridSize;

/// Keyboard modifiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        alt: false,
    };

    pub const CTRL: Modifiers = Modifiers {
        shift: false,
        ctrl: true,
        alt: false,
    };

    pub const ALT: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        alt: true,
    };

    /// Decode the xterm modifier parameter (1 + bitmask)
    /// Shift=1, Alt=2, Ctrl=4; Meta (8) is folded into Alt
    pub fn from_csi_param(param: u16) -> Self {
        let bits = param.saturating_sub(1);
        Self {
            shift: bits & 1 != 0,
            alt: bits & 2 != 0 || bits & 8 != 0,
            ctrl: bits & 4 != 0,
        }
    }
}

/// A key as the terminal reported it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Char(char),
    Enter,
    Tab,
    /// Shift+Tab (`CSI Z`)
    BackTab,
    Backspace,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    /// Function key, 1-12
    F(u8),
    /// Complete sequence the decoder does not know, forwarded as-is
    Unknown(Vec<u8>),
}

/// Key plus the modifiers held with it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyStroke {
    pub key: KeyCode,
    pub modifiers: Modifiers,
}

impl KeyStroke {
    pub fn new(key: KeyCode, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }

    pub fn plain(key: KeyCode) -> Self {
        Self::new(key, Modifiers::NONE)
    }

    pub fn char(c: char) -> Self {
        Self::plain(KeyCode::Char(c))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    Back,
    Forward,
}

impl MouseButton {
    /// Button number as X11 numbers it
    pub fn x11_number(self) -> u8 {
        match self {
            MouseButton::Left => 1,
            MouseButton::Middle => 2,
            MouseButton::Right => 3,
            MouseButton::Back => 8,
            MouseButton::Forward => 9,
        }
    }
}

/// One decoded input event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    KeyPress(KeyStroke),
    /// Synthesised by key-hold emulation; terminals never report releases
    KeyRelease(KeyStroke),
    /// Pointer at a 0-based cell
    PointerMove { col: u16, row: u16 },
    ButtonPress(MouseButton),
    ButtonRelease(MouseButton),
    /// Wheel clicks, positive is up
    ScrollDelta(i32),
    ToggleMouseMode,
    /// Terminal text area size reported by the terminal
    Resize(GridSize),
    /// Ctrl+C
    Interrupt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifiers_from_csi_param() {
        assert_eq!(Modifiers::from_csi_param(1), Modifiers::NONE);
        assert_eq!(Modifiers::from_csi_param(5), Modifiers::CTRL);
        let all = Modifiers::from_csi_param(8);
        assert!(all.shift && all.alt && all.ctrl);
        assert_eq!(Modifiers::from_csi_param(0), Modifiers::NONE);
    }
}
