//! Input Decoder
//!
//! Streaming decoder for the bytes a terminal sends: keystrokes, mouse
//! tracking reports and replies to queries. Built on the same state machine
//! model as a VT500 parser, seen from the other end of the wire.
//!
//! States:
//! - Ground: printable text and C0 controls
//! - Utf8: inside a multi-byte character
//! - Escape: after ESC, waiting for the next byte
//! - CsiEntry / CsiParam: collecting a CSI sequence
//! - SgrMouse: collecting an SGR mouse report (`CSI <`)
//! - X10Mouse: collecting the three raw bytes of an X10 report (`CSI M`)
//! - Ss3: after `ESC O`
//!
//! Sequences may be split across `feed` calls at any byte. A sequence that
//! grows past `MAX_SEQUENCE_LEN` or receives a byte that cannot continue it
//! is dropped as malformed, and the byte that broke it is decoded again from
//! the ground state.

use tracing::debug;

use super::event::{InputEvent, KeyCode, KeyStroke, Modifiers, MouseButton};
use crate::core::GridSize;

/// Longest escape sequence the decoder will buffer
pub const MAX_SEQUENCE_LEN: usize = 32;

/// Mouse-mode toggle key, never forwarded to the display
pub const TOGGLE_KEY: u8 = b'`';

const ESC: u8 = 0x1b;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ground,
    Utf8 { remaining: u8 },
    Escape,
    CsiEntry,
    CsiParam,
    SgrMouse,
    X10Mouse,
    Ss3,
}

/// Terminal input decoder
#[derive(Debug)]
pub struct InputDecoder {
    state: State,
    /// Raw bytes of the sequence being collected
    pending: Vec<u8>,
    params: Vec<u16>,
    current_param: u16,
    param_has_digit: bool,
    /// `?`, `>` or `=` after the CSI
    private_marker: bool,
    /// Intermediate bytes seen in a CSI sequence
    has_intermediates: bool,
    /// Button held according to X10 reports, which do not say which button
    /// was released
    x10_pressed: Option<MouseButton>,
    malformed: u64,
}

impl Default for InputDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl InputDecoder {
    pub fn new() -> Self {
        Self {
            state: State::Ground,
            pending: Vec::with_capacity(MAX_SEQUENCE_LEN),
            params: Vec::with_capacity(4),
            current_param: 0,
            param_has_digit: false,
            private_marker: false,
            has_intermediates: false,
            x10_pressed: None,
            malformed: 0,
        }
    }

    /// Decode a chunk of bytes, returning the events it completes
    pub fn feed(&mut self, data: &[u8]) -> Vec<InputEvent> {
        let mut events = Vec::new();
        for &byte in data {
            self.process_byte(byte, &mut events);
        }
        events
    }

    /// Resolve whatever is pending after the input went quiet.
    ///
    /// A lone ESC becomes the Escape key; any other fragment is malformed.
    pub fn flush(&mut self) -> Vec<InputEvent> {
        let mut events = Vec::new();
        match self.state {
            State::Ground => {}
            State::Escape => {
                events.push(key(KeyCode::Escape, Modifiers::NONE));
                self.reset();
            }
            _ => self.discard_malformed(),
        }
        events
    }

    /// Whether bytes of an unfinished sequence are buffered
    pub fn has_pending(&self) -> bool {
        self.state != State::Ground
    }

    /// Number of fragments discarded since creation
    pub fn malformed_count(&self) -> u64 {
        self.malformed
    }

    fn reset(&mut self) {
        self.state = State::Ground;
        self.pending.clear();
        self.params.clear();
        self.current_param = 0;
        self.param_has_digit = false;
        self.private_marker = false;
        self.has_intermediates = false;
    }

    fn discard_malformed(&mut self) {
        self.malformed += 1;
        debug!(bytes = ?self.pending, "Discarding malformed input sequence");
        self.reset();
    }

    /// Drop the current fragment and decode `byte` from the ground state
    fn resync(&mut self, byte: u8, out: &mut Vec<InputEvent>) {
        self.discard_malformed();
        self.process_ground(byte, out);
    }

    /// Collect `byte` into the pending sequence, enforcing the length cap
    fn collect(&mut self, byte: u8, out: &mut Vec<InputEvent>) -> bool {
        if self.pending.len() >= MAX_SEQUENCE_LEN {
            self.resync(byte, out);
            return false;
        }
        self.pending.push(byte);
        true
    }

    fn process_byte(&mut self, byte: u8, out: &mut Vec<InputEvent>) {
        // The toggle is intercepted ahead of key handling. Inside an X10
        // report or a UTF-8 character the byte is data, not a key.
        if byte == TOGGLE_KEY && !matches!(self.state, State::X10Mouse | State::Utf8 { .. }) {
            match self.state {
                State::Ground => {}
                State::Escape => {
                    out.push(key(KeyCode::Escape, Modifiers::NONE));
                    self.reset();
                }
                _ => self.discard_malformed(),
            }
            out.push(InputEvent::ToggleMouseMode);
            return;
        }

        match self.state {
            State::Ground => self.process_ground(byte, out),
            State::Utf8 { remaining } => self.process_utf8(byte, remaining, out),
            State::Escape => self.process_escape(byte, out),
            State::CsiEntry => self.process_csi_entry(byte, out),
            State::CsiParam => self.process_csi_param(byte, out),
            State::SgrMouse => self.process_sgr_mouse(byte, out),
            State::X10Mouse => self.process_x10_mouse(byte, out),
            State::Ss3 => self.process_ss3(byte, out),
        }
    }

    fn process_ground(&mut self, byte: u8, out: &mut Vec<InputEvent>) {
        let event = match byte {
            TOGGLE_KEY => InputEvent::ToggleMouseMode,
            0x03 => InputEvent::Interrupt,
            b'\r' | b'\n' => key(KeyCode::Enter, Modifiers::NONE),
            b'\t' => key(KeyCode::Tab, Modifiers::NONE),
            0x7f | 0x08 => key(KeyCode::Backspace, Modifiers::NONE),
            ESC => {
                self.state = State::Escape;
                self.pending.push(byte);
                return;
            }
            0x00 => key(KeyCode::Char(' '), Modifiers::CTRL),
            0x01..=0x1a => key(KeyCode::Char((b'a' + byte - 1) as char), Modifiers::CTRL),
            // Ctrl+\ Ctrl+] Ctrl+^ Ctrl+_
            0x1c..=0x1f => key(KeyCode::Char((byte + 0x40) as char), Modifiers::CTRL),
            0x20..=0x7e => key(KeyCode::Char(byte as char), Modifiers::NONE),
            0xc2..=0xdf => return self.start_utf8(byte, 1),
            0xe0..=0xef => return self.start_utf8(byte, 2),
            0xf0..=0xf4 => return self.start_utf8(byte, 3),
            _ => {
                self.pending.push(byte);
                self.discard_malformed();
                return;
            }
        };
        out.push(event);
    }

    fn start_utf8(&mut self, byte: u8, remaining: u8) {
        self.pending.clear();
        self.pending.push(byte);
        self.state = State::Utf8 { remaining };
    }

    fn process_utf8(&mut self, byte: u8, remaining: u8, out: &mut Vec<InputEvent>) {
        if !(0x80..=0xbf).contains(&byte) {
            return self.resync(byte, out);
        }
        self.pending.push(byte);
        if remaining > 1 {
            self.state = State::Utf8 {
                remaining: remaining - 1,
            };
            return;
        }

        match std::str::from_utf8(&self.pending).ok().and_then(|s| s.chars().next()) {
            Some(c) => {
                out.push(key(KeyCode::Char(c), Modifiers::NONE));
                self.reset();
            }
            None => self.discard_malformed(),
        }
    }

    fn process_escape(&mut self, byte: u8, out: &mut Vec<InputEvent>) {
        match byte {
            b'[' => {
                self.pending.push(byte);
                self.state = State::CsiEntry;
            }
            b'O' => {
                self.pending.push(byte);
                self.state = State::Ss3;
            }
            // ESC ESC: the first one was the Escape key
            ESC => {
                out.push(key(KeyCode::Escape, Modifiers::NONE));
            }
            0x20..=0x7e => {
                out.push(key(KeyCode::Char(byte as char), Modifiers::ALT));
                self.reset();
            }
            0x7f => {
                out.push(key(KeyCode::Backspace, Modifiers::ALT));
                self.reset();
            }
            _ => {
                out.push(key(KeyCode::Escape, Modifiers::NONE));
                self.reset();
                self.process_ground(byte, out);
            }
        }
    }

    fn process_csi_entry(&mut self, byte: u8, out: &mut Vec<InputEvent>) {
        if !self.collect(byte, out) {
            return;
        }
        match byte {
            b'<' => self.state = State::SgrMouse,
            b'M' => self.state = State::X10Mouse,
            b'?' | b'>' | b'=' => {
                self.private_marker = true;
                self.state = State::CsiParam;
            }
            b'0'..=b'9' | b';' | b':' | 0x20..=0x2f => {
                self.state = State::CsiParam;
                self.pending.pop();
                self.process_csi_param(byte, out);
            }
            0x40..=0x7e => self.dispatch_csi(byte, out),
            _ => {
                self.pending.pop();
                self.resync(byte, out);
            }
        }
    }

    fn process_csi_param(&mut self, byte: u8, out: &mut Vec<InputEvent>) {
        if !self.collect(byte, out) {
            return;
        }
        match byte {
            b'0'..=b'9' => self.push_digit(byte),
            b';' | b':' => self.end_param(),
            0x20..=0x2f => self.has_intermediates = true,
            0x40..=0x7e => {
                if self.param_has_digit || !self.params.is_empty() {
                    self.end_param();
                }
                self.dispatch_csi(byte, out);
            }
            _ => {
                self.pending.pop();
                self.resync(byte, out);
            }
        }
    }

    fn process_sgr_mouse(&mut self, byte: u8, out: &mut Vec<InputEvent>) {
        if !self.collect(byte, out) {
            return;
        }
        match byte {
            b'0'..=b'9' => self.push_digit(byte),
            b';' => self.end_param(),
            b'M' | b'm' => {
                self.end_param();
                match self.params[..] {
                    [cb, x, y] => {
                        let col = x.saturating_sub(1);
                        let row = y.saturating_sub(1);
                        mouse_report(cb, col, row, Some(byte == b'm'), &mut self.x10_pressed, out);
                        self.reset();
                    }
                    _ => self.discard_malformed(),
                }
            }
            _ => {
                self.pending.pop();
                self.resync(byte, out);
            }
        }
    }

    fn process_x10_mouse(&mut self, byte: u8, out: &mut Vec<InputEvent>) {
        // Raw bytes: pending is ESC [ M cb cx cy
        self.pending.push(byte);
        if self.pending.len() < 6 {
            return;
        }
        let value = |b: u8| u16::from(b).saturating_sub(32);
        let cb = value(self.pending[3]);
        let col = value(self.pending[4]).saturating_sub(1);
        let row = value(self.pending[5]).saturating_sub(1);
        mouse_report(cb, col, row, None, &mut self.x10_pressed, out);
        self.reset();
    }

    fn process_ss3(&mut self, byte: u8, out: &mut Vec<InputEvent>) {
        if !self.collect(byte, out) {
            return;
        }
        match byte {
            b'0'..=b'9' => self.push_digit(byte),
            0x40..=0x7e => {
                let modifiers = if self.param_has_digit {
                    Modifiers::from_csi_param(self.current_param)
                } else {
                    Modifiers::NONE
                };
                let code = match byte {
                    b'A' => KeyCode::Up,
                    b'B' => KeyCode::Down,
                    b'C' => KeyCode::Right,
                    b'D' => KeyCode::Left,
                    b'H' => KeyCode::Home,
                    b'F' => KeyCode::End,
                    b'M' => KeyCode::Enter,
                    b'P'..=b'S' => KeyCode::F(byte - b'P' + 1),
                    _ => KeyCode::Unknown(self.pending.clone()),
                };
                out.push(key(code, modifiers));
                self.reset();
            }
            _ => {
                self.pending.pop();
                self.resync(byte, out);
            }
        }
    }

    fn push_digit(&mut self, byte: u8) {
        self.current_param = self
            .current_param
            .saturating_mul(10)
            .saturating_add(u16::from(byte - b'0'));
        self.param_has_digit = true;
    }

    fn end_param(&mut self) {
        self.params.push(self.current_param);
        self.current_param = 0;
        self.param_has_digit = false;
    }

    fn dispatch_csi(&mut self, final_byte: u8, out: &mut Vec<InputEvent>) {
        if let Some(event) = self.csi_event(final_byte) {
            out.push(event);
        }
        self.reset();
    }

    fn csi_event(&self, final_byte: u8) -> Option<InputEvent> {
        let unknown = || Some(key(KeyCode::Unknown(self.pending.clone()), Modifiers::NONE));
        if self.private_marker || self.has_intermediates {
            return unknown();
        }

        let param = |i: usize| self.params.get(i).copied().unwrap_or(0);
        let modifiers = Modifiers::from_csi_param(param(1));

        let code = match final_byte {
            b'A' => KeyCode::Up,
            b'B' => KeyCode::Down,
            b'C' => KeyCode::Right,
            b'D' => KeyCode::Left,
            b'H' => KeyCode::Home,
            b'F' => KeyCode::End,
            b'P'..=b'S' => KeyCode::F(final_byte - b'P' + 1),
            b'Z' => KeyCode::BackTab,
            b'~' => match tilde_key(param(0)) {
                Some(code) => code,
                None => return unknown(),
            },
            b't' if param(0) == 8 && self.params.len() >= 3 => {
                let (rows, columns) = (param(1), param(2));
                if rows == 0 || columns == 0 {
                    return None;
                }
                return Some(InputEvent::Resize(GridSize::new(columns, rows)));
            }
            // Focus in / focus out
            b'I' | b'O' if self.params.is_empty() => return None,
            _ => return unknown(),
        };
        Some(key(code, modifiers))
    }
}

fn key(code: KeyCode, modifiers: Modifiers) -> InputEvent {
    InputEvent::KeyPress(KeyStroke::new(code, modifiers))
}

fn tilde_key(code: u16) -> Option<KeyCode> {
    Some(match code {
        1 | 7 => KeyCode::Home,
        2 => KeyCode::Insert,
        3 => KeyCode::Delete,
        4 | 8 => KeyCode::End,
        5 => KeyCode::PageUp,
        6 => KeyCode::PageDown,
        11..=15 => KeyCode::F((code - 10) as u8),
        17..=21 => KeyCode::F((code - 11) as u8),
        23 | 24 => KeyCode::F((code - 12) as u8),
        _ => return None,
    })
}

/// Turn one mouse report into events: always a pointer move, then the
/// button or wheel event it carries.
///
/// `release` is `Some` for SGR reports (final `m`), `None` for X10 reports
/// where button 3 means "released".
fn mouse_report(
    cb: u16,
    col: u16,
    row: u16,
    release: Option<bool>,
    x10_pressed: &mut Option<MouseButton>,
    out: &mut Vec<InputEvent>,
) {
    out.push(InputEvent::PointerMove { col, row });

    let extra = cb & 128 != 0;
    if cb & 64 != 0 && !extra {
        // Wheel. Horizontal wheel (66, 67) has no target.
        if release != Some(true) {
            match cb & 3 {
                0 => out.push(InputEvent::ScrollDelta(1)),
                1 => out.push(InputEvent::ScrollDelta(-1)),
                _ => {}
            }
        }
        return;
    }
    if cb & 32 != 0 {
        return;
    }

    let button = match (extra, cb & 3) {
        (false, 0) => MouseButton::Left,
        (false, 1) => MouseButton::Middle,
        (false, 2) => MouseButton::Right,
        (true, 0) => MouseButton::Back,
        (true, 1) => MouseButton::Forward,
        (false, 3) if release.is_none() => {
            if let Some(button) = x10_pressed.take() {
                out.push(InputEvent::ButtonRelease(button));
            }
            return;
        }
        _ => return,
    };

    if release == Some(true) {
        out.push(InputEvent::ButtonRelease(button));
    } else {
        if release.is_none() {
            *x10_pressed = Some(button);
        }
        out.push(InputEvent::ButtonPress(button));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn press(c: char) -> InputEvent {
        key(KeyCode::Char(c), Modifiers::NONE)
    }

    #[test]
    fn test_printable_and_utf8() {
        let mut decoder = InputDecoder::new();
        let events = decoder.feed("wé世".as_bytes());
        assert_eq!(events, vec![press('w'), press('é'), press('世')]);
    }

    #[test]
    fn test_control_bytes() {
        let mut decoder = InputDecoder::new();
        let events = decoder.feed(b"\r\t\x7f\x01\x03");
        assert_eq!(
            events,
            vec![
                key(KeyCode::Enter, Modifiers::NONE),
                key(KeyCode::Tab, Modifiers::NONE),
                key(KeyCode::Backspace, Modifiers::NONE),
                key(KeyCode::Char('a'), Modifiers::CTRL),
                InputEvent::Interrupt,
            ]
        );
    }

    #[test]
    fn test_toggle_key() {
        let mut decoder = InputDecoder::new();
        assert_eq!(decoder.feed(b"`"), vec![InputEvent::ToggleMouseMode]);
    }

    #[test]
    fn test_toggle_inside_x10_report_is_data() {
        let mut decoder = InputDecoder::new();
        // column byte 0x60 is '`'
        let events = decoder.feed(&[ESC, b'[', b'M', 32, 0x60, 33]);
        assert_eq!(
            events,
            vec![
                InputEvent::PointerMove { col: 63, row: 0 },
                InputEvent::ButtonPress(MouseButton::Left),
            ]
        );
    }

    #[test]
    fn test_alt_and_lone_escape() {
        let mut decoder = InputDecoder::new();
        assert_eq!(decoder.feed(b"\x1bx"), vec![key(KeyCode::Char('x'), Modifiers::ALT)]);

        assert!(decoder.feed(b"\x1b").is_empty());
        assert!(decoder.has_pending());
        assert_eq!(decoder.flush(), vec![key(KeyCode::Escape, Modifiers::NONE)]);
        assert!(!decoder.has_pending());
        assert_eq!(decoder.malformed_count(), 0);
    }

    #[test]
    fn test_cursor_and_function_keys() {
        let mut decoder = InputDecoder::new();
        let events = decoder.feed(b"\x1b[A\x1bOB\x1b[1;5C\x1b[3~\x1b[15~\x1b[24~\x1bOP\x1b[Z");
        assert_eq!(
            events,
            vec![
                key(KeyCode::Up, Modifiers::NONE),
                key(KeyCode::Down, Modifiers::NONE),
                key(KeyCode::Right, Modifiers::CTRL),
                key(KeyCode::Delete, Modifiers::NONE),
                key(KeyCode::F(5), Modifiers::NONE),
                key(KeyCode::F(12), Modifiers::NONE),
                key(KeyCode::F(1), Modifiers::NONE),
                key(KeyCode::BackTab, Modifiers::NONE),
            ]
        );
    }

    #[test]
    fn test_sgr_mouse_press_release() {
        let mut decoder = InputDecoder::new();
        let events = decoder.feed(b"\x1b[<0;41;13M\x1b[<2;1;1m");
        assert_eq!(
            events,
            vec![
                InputEvent::PointerMove { col: 40, row: 12 },
                InputEvent::ButtonPress(MouseButton::Left),
                InputEvent::PointerMove { col: 0, row: 0 },
                InputEvent::ButtonRelease(MouseButton::Right),
            ]
        );
    }

    #[test]
    fn test_sgr_motion_and_wheel() {
        let mut decoder = InputDecoder::new();
        let events = decoder.feed(b"\x1b[<35;5;6M\x1b[<64;5;6M\x1b[<65;5;6M");
        assert_eq!(
            events,
            vec![
                InputEvent::PointerMove { col: 4, row: 5 },
                InputEvent::PointerMove { col: 4, row: 5 },
                InputEvent::ScrollDelta(1),
                InputEvent::PointerMove { col: 4, row: 5 },
                InputEvent::ScrollDelta(-1),
            ]
        );
    }

    #[test]
    fn test_x10_release_reports_pressed_button() {
        let mut decoder = InputDecoder::new();
        let events = decoder.feed(&[ESC, b'[', b'M', 34, 33, 33, ESC, b'[', b'M', 35, 34, 33]);
        assert_eq!(
            events,
            vec![
                InputEvent::PointerMove { col: 0, row: 0 },
                InputEvent::ButtonPress(MouseButton::Right),
                InputEvent::PointerMove { col: 1, row: 0 },
                InputEvent::ButtonRelease(MouseButton::Right),
            ]
        );
    }

    #[test]
    fn test_size_report_and_focus() {
        let mut decoder = InputDecoder::new();
        let events = decoder.feed(b"\x1b[I\x1b[8;50;132t\x1b[O");
        assert_eq!(events, vec![InputEvent::Resize(GridSize::new(132, 50))]);
    }

    #[test]
    fn test_malformed_sgr_resyncs() {
        let mut decoder = InputDecoder::new();
        let events = decoder.feed(b"\x1b[<a");
        assert_eq!(events, vec![press('a')]);
        assert_eq!(decoder.malformed_count(), 1);
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_overlong_sequence_is_dropped() {
        let mut decoder = InputDecoder::new();
        let mut bytes = b"\x1b[".to_vec();
        bytes.extend(std::iter::repeat(b'1').take(MAX_SEQUENCE_LEN - 1));
        let events = decoder.feed(&bytes);
        assert_eq!(events, vec![press('1')]);
        assert_eq!(decoder.malformed_count(), 1);
    }

    #[test]
    fn test_unknown_sequence_forwarded() {
        let mut decoder = InputDecoder::new();
        let events = decoder.feed(b"\x1b[99~\x1b[?1;2c");
        assert_eq!(
            events,
            vec![
                key(KeyCode::Unknown(b"\x1b[99~".to_vec()), Modifiers::NONE),
                key(KeyCode::Unknown(b"\x1b[?1;2c".to_vec()), Modifiers::NONE),
            ]
        );
    }

    #[test]
    fn test_flush_discards_fragment() {
        let mut decoder = InputDecoder::new();
        assert!(decoder.feed(b"\x1b[<0;1").is_empty());
        assert!(decoder.flush().is_empty());
        assert_eq!(decoder.malformed_count(), 1);
        assert_eq!(decoder.feed(b"q"), vec![press('q')]);
    }

    #[test]
    fn test_chunk_boundary() {
        let mut decoder = InputDecoder::new();
        assert!(decoder.feed(b"\x1b[").is_empty());
        assert!(decoder.feed(b"5").is_empty());
        assert_eq!(decoder.feed(b"~"), vec![key(KeyCode::PageUp, Modifiers::NONE)]);
    }

    fn mouse_report_bytes() -> impl Strategy<Value = Vec<u8>> {
        prop_oneof![
            (0u16..256, 1u16..400, 1u16..200, any::<bool>()).prop_map(|(cb, x, y, release)| {
                format!("\x1b[<{};{};{}{}", cb, x, y, if release { 'm' } else { 'M' })
                    .into_bytes()
            }),
            (0u8..96, 33u8..=255, 33u8..=255)
                .prop_map(|(cb, x, y)| vec![ESC, b'[', b'M', cb + 32, x, y]),
        ]
    }

    proptest! {
        #[test]
        fn split_report_decodes_like_whole(
            report in mouse_report_bytes(),
            a in any::<prop::sample::Index>(),
            b in any::<prop::sample::Index>(),
        ) {
            let whole = InputDecoder::new().feed(&report);

            let mut i = a.index(report.len() + 1);
            let mut j = b.index(report.len() + 1);
            if i > j {
                std::mem::swap(&mut i, &mut j);
            }
            let mut decoder = InputDecoder::new();
            let mut split = decoder.feed(&report[..i]);
            split.extend(decoder.feed(&report[i..j]));
            split.extend(decoder.feed(&report[j..]));

            prop_assert_eq!(split, whole);
            prop_assert!(!decoder.has_pending());
        }

        #[test]
        fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..128)) {
            let mut decoder = InputDecoder::new();
            let _ = decoder.feed(&bytes);
            let _ = decoder.flush();
            prop_assert!(!decoder.has_pending());
        }
    }
}
