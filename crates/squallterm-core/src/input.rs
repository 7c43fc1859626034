//! Input byte-stream generation: the encoding dual of the parser.
//!
//! Keyboard, mouse, focus and paste events arrive from the host as typed
//! events; this module turns them into the byte sequences hosted programs
//! expect, honouring the cursor-key/keypad modes, mouse protocol and
//! transport, bracketed paste and focus-event flags the screen switches via
//! DEC modes. Generated bytes collect in an internal queue the host drains
//! with [`peek`](InputGenerator::peek) / [`consume`](InputGenerator::consume).

use bitflags::bitflags;

bitflags! {
    /// Keyboard modifier state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Modifier: u8 {
        const SHIFT   = 1;
        const ALT     = 2;
        const CONTROL = 4;
        const META    = 8;
    }
}

impl Modifier {
    /// CSI parameter encoding a modifier set (`1 + bits`).
    #[must_use]
    pub fn vt_param(self) -> u8 {
        1 + self.bits()
    }
}

/// Non-character keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Key {
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    F13,
    F14,
    F15,
    F16,
    F17,
    F18,
    F19,
    F20,
    UpArrow,
    DownArrow,
    LeftArrow,
    RightArrow,
    Insert,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    NumpadEnter,
    NumpadEqual,
    NumpadMultiply,
    NumpadAdd,
    NumpadSubtract,
    NumpadDecimal,
    NumpadDivide,
    Numpad0,
    Numpad1,
    Numpad2,
    Numpad3,
    Numpad4,
    Numpad5,
    Numpad6,
    Numpad7,
    Numpad8,
    Numpad9,
}

/// Normal vs application encoding for cursor/keypad keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KeyMode {
    #[default]
    Normal,
    Application,
}

/// Which classes of mouse activity are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MouseProtocol {
    /// Presses only, no modifiers (DECSET 9).
    X10,
    /// Presses and releases (DECSET 1000).
    NormalTracking,
    /// Highlight tracking (DECSET 1001); reported like normal tracking.
    HighlightTracking,
    /// Presses, releases, and motion while a button is held (DECSET 1002).
    ButtonTracking,
    /// All of the above plus passive motion (DECSET 1003).
    AnyEventTracking,
}

/// Byte encoding used for mouse reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MouseTransport {
    /// `CSI M Cb Cx Cy`, coordinates offset by 32 (X10 encoding).
    #[default]
    Default,
    /// Like `Default` but coordinates UTF-8 encoded (DECSET 1005).
    Extended,
    /// `CSI < Cb ; Cx ; Cy M|m` (DECSET 1006).
    Sgr,
    /// `CSI Cb ; Cx ; Cy M`, button offset by 32 (DECSET 1015).
    Urxvt,
}

/// What the wheel generates: mouse reports or cursor keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MouseWheelMode {
    #[default]
    Default,
    NormalCursorKeys,
    ApplicationCursorKeys,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    /// No button / button went up.
    Release,
    WheelUp,
    WheelDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MouseEventKind {
    Press,
    Drag,
    Release,
}

/// Encodes host input events into the byte stream hosted programs read.
#[derive(Debug, Clone, Default)]
pub struct InputGenerator {
    cursor_keys_mode: KeyMode,
    numpad_keys_mode: KeyMode,
    bracketed_paste: bool,
    generate_focus_events: bool,
    mouse_protocol: Option<MouseProtocol>,
    mouse_transport: MouseTransport,
    mouse_wheel_mode: MouseWheelMode,
    pending: Vec<u8>,
    /// Bitmask of currently held buttons (Left=1, Middle=2, Right=4).
    held_buttons: u8,
    /// Last reported position (1-based row, column), for move dedup.
    mouse_position: (u16, u16),
}

impl InputGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ── Mode plumbing (driven by Screen's DEC mode side effects) ────

    pub fn set_cursor_keys_mode(&mut self, mode: KeyMode) {
        self.cursor_keys_mode = mode;
    }

    pub fn set_numpad_keys_mode(&mut self, mode: KeyMode) {
        self.numpad_keys_mode = mode;
    }

    pub fn set_application_keypad_mode(&mut self, enable: bool) {
        self.numpad_keys_mode = if enable {
            KeyMode::Application
        } else {
            KeyMode::Normal
        };
    }

    #[must_use]
    pub fn application_cursor_keys(&self) -> bool {
        self.cursor_keys_mode == KeyMode::Application
    }

    #[must_use]
    pub fn application_keypad(&self) -> bool {
        self.numpad_keys_mode == KeyMode::Application
    }

    pub fn set_bracketed_paste(&mut self, enable: bool) {
        self.bracketed_paste = enable;
    }

    #[must_use]
    pub fn bracketed_paste(&self) -> bool {
        self.bracketed_paste
    }

    pub fn set_generate_focus_events(&mut self, enable: bool) {
        self.generate_focus_events = enable;
    }

    pub fn set_mouse_protocol(&mut self, protocol: MouseProtocol, enable: bool) {
        if enable {
            self.mouse_protocol = Some(protocol);
        } else if self.mouse_protocol == Some(protocol) {
            self.mouse_protocol = None;
        }
    }

    #[must_use]
    pub fn mouse_protocol(&self) -> Option<MouseProtocol> {
        self.mouse_protocol
    }

    pub fn set_mouse_transport(&mut self, transport: MouseTransport) {
        self.mouse_transport = transport;
    }

    #[must_use]
    pub fn mouse_transport(&self) -> MouseTransport {
        self.mouse_transport
    }

    pub fn set_mouse_wheel_mode(&mut self, mode: MouseWheelMode) {
        self.mouse_wheel_mode = mode;
    }

    /// Reset to power-on state, as RIS requires.
    pub fn reset(&mut self) {
        *self = Self {
            pending: std::mem::take(&mut self.pending),
            ..Self::default()
        };
    }

    // ── Queue ───────────────────────────────────────────────────────

    /// All pending bytes, without consuming them.
    #[must_use]
    pub fn peek(&self) -> &[u8] {
        &self.pending
    }

    /// Drop the first `n` pending bytes.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.pending.len());
        self.pending.drain(..n);
    }

    /// Append raw bytes (used for reply sequences routed through input).
    pub fn generate_raw(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    fn push_str(&mut self, s: &str) {
        self.pending.extend_from_slice(s.as_bytes());
    }

    // ── Characters ─────────────────────────────────────────────────

    /// Encode a character keypress. Returns whether bytes were produced.
    pub fn generate_char(&mut self, ch: char, modifier: Modifier) -> bool {
        if modifier.contains(Modifier::ALT) {
            self.pending.push(0x1B);
        }

        if modifier.contains(Modifier::CONTROL) {
            if let Some(byte) = control_byte(ch) {
                self.pending.push(byte);
                return true;
            }
        }

        let mut buf = [0u8; 4];
        self.push_str(ch.encode_utf8(&mut buf));
        true
    }

    // ── Special keys ───────────────────────────────────────────────

    /// Encode a special-key press. Returns whether bytes were produced.
    pub fn generate_key(&mut self, key: Key, modifier: Modifier) -> bool {
        if modifier.contains(Modifier::ALT) {
            self.pending.push(0x1B);
        }

        if let Some(letter) = cursor_style_final(key) {
            // Arrows, Home, End: ESC O X in application mode, ESC [ X
            // otherwise; modifiers force the CSI 1;n X form.
            if modifier.is_empty() {
                if self.cursor_keys_mode == KeyMode::Application {
                    self.push_str(&format!("\x1bO{letter}"));
                } else {
                    self.push_str(&format!("\x1b[{letter}"));
                }
            } else {
                self.push_str(&format!("\x1b[1;{}{letter}", modifier.vt_param()));
            }
            return true;
        }

        if let Some(letter) = ss3_function_final(key) {
            // F1..F4 use the SS3 forms; with modifiers xterm switches to
            // CSI 1;n P..S.
            if modifier.is_empty() {
                self.push_str(&format!("\x1bO{letter}"));
            } else {
                self.push_str(&format!("\x1b[1;{}{letter}", modifier.vt_param()));
            }
            return true;
        }

        if let Some(code) = tilde_code(key) {
            if modifier.is_empty() {
                self.push_str(&format!("\x1b[{code}~"));
            } else {
                self.push_str(&format!("\x1b[{code};{}~", modifier.vt_param()));
            }
            return true;
        }

        if let Some(out) = self.numpad_bytes(key) {
            self.push_str(&out);
            return true;
        }

        false
    }

    fn numpad_bytes(&self, key: Key) -> Option<String> {
        let app = self.numpad_keys_mode == KeyMode::Application;
        let (plain, app_final) = match key {
            Key::NumpadEnter => ('\r', 'M'),
            Key::NumpadEqual => ('=', 'X'),
            Key::NumpadMultiply => ('*', 'j'),
            Key::NumpadAdd => ('+', 'k'),
            Key::NumpadSubtract => ('-', 'm'),
            Key::NumpadDecimal => ('.', 'n'),
            Key::NumpadDivide => ('/', 'o'),
            Key::Numpad0 => ('0', 'p'),
            Key::Numpad1 => ('1', 'q'),
            Key::Numpad2 => ('2', 'r'),
            Key::Numpad3 => ('3', 's'),
            Key::Numpad4 => ('4', 't'),
            Key::Numpad5 => ('5', 'u'),
            Key::Numpad6 => ('6', 'v'),
            Key::Numpad7 => ('7', 'w'),
            Key::Numpad8 => ('8', 'x'),
            Key::Numpad9 => ('9', 'y'),
            _ => return None,
        };
        Some(if app {
            format!("\x1bO{app_final}")
        } else {
            plain.to_string()
        })
    }

    // ── Paste ──────────────────────────────────────────────────────

    /// Encode pasted text, bracketing it when bracketed paste is on.
    pub fn generate_paste(&mut self, text: &str) {
        if self.bracketed_paste {
            self.push_str("\x1b[200~");
            self.push_str(text);
            self.push_str("\x1b[201~");
        } else {
            self.push_str(text);
        }
    }

    // ── Focus ──────────────────────────────────────────────────────

    /// Encode focus-in. Returns whether bytes were produced.
    pub fn generate_focus_in(&mut self) -> bool {
        if self.generate_focus_events {
            self.push_str("\x1b[I");
            true
        } else {
            false
        }
    }

    /// Encode focus-out. Returns whether bytes were produced.
    pub fn generate_focus_out(&mut self) -> bool {
        if self.generate_focus_events {
            self.push_str("\x1b[O");
            true
        } else {
            false
        }
    }

    // ── Mouse ──────────────────────────────────────────────────────

    /// Encode a mouse button press at a 1-based (row, column) position.
    pub fn generate_mouse_press(
        &mut self,
        button: MouseButton,
        modifier: Modifier,
        row: u16,
        column: u16,
    ) -> bool {
        self.mouse_position = (row, column);

        // Wheel may be rerouted to cursor keys regardless of protocol.
        if matches!(button, MouseButton::WheelUp | MouseButton::WheelDown)
            && self.mouse_wheel_mode != MouseWheelMode::Default
        {
            let letter = if button == MouseButton::WheelUp { 'A' } else { 'B' };
            let intro = if self.mouse_wheel_mode == MouseWheelMode::ApplicationCursorKeys {
                "\x1bO"
            } else {
                "\x1b["
            };
            self.push_str(&format!("{intro}{letter}"));
            return true;
        }

        let Some(protocol) = self.mouse_protocol else {
            return false;
        };

        if let Some(bit) = button_bit(button) {
            self.held_buttons |= bit;
        }

        let modifier = if protocol == MouseProtocol::X10 {
            Modifier::empty()
        } else {
            modifier
        };
        self.emit_mouse(button, modifier, row, column, MouseEventKind::Press);
        true
    }

    /// Encode a mouse button release.
    pub fn generate_mouse_release(
        &mut self,
        button: MouseButton,
        modifier: Modifier,
        row: u16,
        column: u16,
    ) -> bool {
        self.mouse_position = (row, column);
        if let Some(bit) = button_bit(button) {
            self.held_buttons &= !bit;
        }
        let Some(protocol) = self.mouse_protocol else {
            return false;
        };
        if protocol == MouseProtocol::X10 {
            return false;
        }
        self.emit_mouse(button, modifier, row, column, MouseEventKind::Release);
        true
    }

    /// Encode mouse motion. Only button- and any-event tracking report it.
    pub fn generate_mouse_move(&mut self, modifier: Modifier, row: u16, column: u16) -> bool {
        if self.mouse_position == (row, column) {
            return false;
        }
        self.mouse_position = (row, column);

        let report = match self.mouse_protocol {
            Some(MouseProtocol::ButtonTracking) => self.held_buttons != 0,
            Some(MouseProtocol::AnyEventTracking) => true,
            _ => false,
        };
        if !report {
            return false;
        }

        let button = if self.held_buttons & 1 != 0 {
            MouseButton::Left
        } else if self.held_buttons & 2 != 0 {
            MouseButton::Middle
        } else if self.held_buttons & 4 != 0 {
            MouseButton::Right
        } else {
            MouseButton::Release
        };
        self.emit_mouse(button, modifier, row, column, MouseEventKind::Drag);
        true
    }

    fn emit_mouse(
        &mut self,
        button: MouseButton,
        modifier: Modifier,
        row: u16,
        column: u16,
        kind: MouseEventKind,
    ) {
        let mut code = match kind {
            // The legacy encodings report a release as button 3.
            MouseEventKind::Release if self.mouse_transport != MouseTransport::Sgr => 3,
            _ => button_code(button),
        };
        if kind == MouseEventKind::Drag {
            code += 32;
        }
        code += modifier_code(modifier);

        match self.mouse_transport {
            MouseTransport::Default | MouseTransport::Extended => {
                self.push_str("\x1b[M");
                self.pending.push(32 + code);
                // Coordinates offset by 32; Extended would UTF-8 encode
                // values past 127, which the +32 byte form already covers
                // for the ASCII range.
                self.pending.push(32u8.saturating_add(column.min(222) as u8));
                self.pending.push(32u8.saturating_add(row.min(222) as u8));
            }
            MouseTransport::Sgr => {
                let final_byte = if kind == MouseEventKind::Release {
                    'm'
                } else {
                    'M'
                };
                self.push_str(&format!("\x1b[<{code};{column};{row}{final_byte}"));
            }
            MouseTransport::Urxvt => {
                self.push_str(&format!("\x1b[{};{column};{row}M", 32 + code));
            }
        }
    }
}

/// C0 byte for Ctrl+character, per the VT100 keyboard matrix.
fn control_byte(ch: char) -> Option<u8> {
    match ch {
        ' ' | '@' => Some(0x00),
        'A'..='Z' => Some(ch as u8 - b'A' + 1),
        'a'..='z' => Some(ch.to_ascii_uppercase() as u8 - b'A' + 1),
        '[' => Some(0x1B),
        '\\' => Some(0x1C),
        ']' => Some(0x1D),
        '^' => Some(0x1E),
        '_' => Some(0x1F),
        '?' => Some(0x7F),
        _ => None,
    }
}

fn cursor_style_final(key: Key) -> Option<char> {
    Some(match key {
        Key::UpArrow => 'A',
        Key::DownArrow => 'B',
        Key::RightArrow => 'C',
        Key::LeftArrow => 'D',
        Key::Home => 'H',
        Key::End => 'F',
        _ => return None,
    })
}

fn ss3_function_final(key: Key) -> Option<char> {
    Some(match key {
        Key::F1 => 'P',
        Key::F2 => 'Q',
        Key::F3 => 'R',
        Key::F4 => 'S',
        _ => return None,
    })
}

fn tilde_code(key: Key) -> Option<u8> {
    Some(match key {
        Key::Insert => 2,
        Key::Delete => 3,
        Key::PageUp => 5,
        Key::PageDown => 6,
        Key::F5 => 15,
        Key::F6 => 17,
        Key::F7 => 18,
        Key::F8 => 19,
        Key::F9 => 20,
        Key::F10 => 21,
        Key::F11 => 23,
        Key::F12 => 24,
        Key::F13 => 25,
        Key::F14 => 26,
        Key::F15 => 28,
        Key::F16 => 29,
        Key::F17 => 31,
        Key::F18 => 32,
        Key::F19 => 33,
        Key::F20 => 34,
        _ => return None,
    })
}

fn button_code(button: MouseButton) -> u8 {
    match button {
        MouseButton::Left => 0,
        MouseButton::Middle => 1,
        MouseButton::Right => 2,
        MouseButton::Release => 3,
        MouseButton::WheelUp => 64,
        MouseButton::WheelDown => 65,
    }
}

fn button_bit(button: MouseButton) -> Option<u8> {
    match button {
        MouseButton::Left => Some(1),
        MouseButton::Middle => Some(2),
        MouseButton::Right => Some(4),
        _ => None,
    }
}

fn modifier_code(modifier: Modifier) -> u8 {
    let mut code = 0;
    if modifier.contains(Modifier::SHIFT) {
        code += 4;
    }
    if modifier.contains(Modifier::META) {
        code += 8;
    }
    if modifier.contains(Modifier::CONTROL) {
        code += 16;
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Queue semantics ────────────────────────────────────────────

    #[test]
    fn peek_and_consume() {
        let mut input = InputGenerator::new();
        input.generate_raw(b"ABCDEF");
        assert_eq!(input.peek(), b"ABCDEF");
        input.consume(2);
        assert_eq!(input.peek(), b"CDEF");
        input.consume(3);
        assert_eq!(input.peek(), b"F");

        input.generate_raw(b"abcdef");
        assert_eq!(input.peek(), b"Fabcdef");
        input.consume(7);
        assert_eq!(input.peek(), b"");
    }

    #[test]
    fn consume_past_end_is_safe() {
        let mut input = InputGenerator::new();
        input.generate_raw(b"xy");
        input.consume(10);
        assert_eq!(input.peek(), b"");
    }

    // ── Ctrl encodings ─────────────────────────────────────────────

    #[test]
    fn ctrl_space_is_nul() {
        let mut input = InputGenerator::new();
        input.generate_char(' ', Modifier::CONTROL);
        assert_eq!(input.peek(), &[0x00]);
    }

    #[test]
    fn ctrl_letters_map_to_c0() {
        for (i, ch) in ('A'..='Z').enumerate() {
            let mut input = InputGenerator::new();
            input.generate_char(ch, Modifier::CONTROL);
            assert_eq!(input.peek(), &[(i + 1) as u8], "Ctrl+{ch}");
        }
    }

    #[test]
    fn ctrl_lowercase_matches_uppercase() {
        let mut input = InputGenerator::new();
        input.generate_char('c', Modifier::CONTROL);
        assert_eq!(input.peek(), &[0x03]);
    }

    #[test]
    fn ctrl_punctuation_row() {
        let cases = [
            ('[', 0x1B),
            ('\\', 0x1C),
            (']', 0x1D),
            ('^', 0x1E),
            ('_', 0x1F),
        ];
        for (ch, expected) in cases {
            let mut input = InputGenerator::new();
            input.generate_char(ch, Modifier::CONTROL);
            assert_eq!(input.peek(), &[expected], "Ctrl+{ch}");
        }
    }

    #[test]
    fn plain_char_is_utf8() {
        let mut input = InputGenerator::new();
        input.generate_char('é', Modifier::empty());
        assert_eq!(input.peek(), "é".as_bytes());
    }

    #[test]
    fn alt_prefixes_escape() {
        let mut input = InputGenerator::new();
        input.generate_char('x', Modifier::ALT);
        assert_eq!(input.peek(), b"\x1bx");
    }

    // ── Cursor and function keys ───────────────────────────────────

    #[test]
    fn arrows_follow_cursor_keys_mode() {
        let mut input = InputGenerator::new();
        input.generate_key(Key::UpArrow, Modifier::empty());
        assert_eq!(input.peek(), b"\x1b[A");
        input.consume(3);

        input.set_cursor_keys_mode(KeyMode::Application);
        input.generate_key(Key::UpArrow, Modifier::empty());
        assert_eq!(input.peek(), b"\x1bOA");
    }

    #[test]
    fn modified_arrow_uses_csi_param_form() {
        let mut input = InputGenerator::new();
        input.set_cursor_keys_mode(KeyMode::Application);
        input.generate_key(Key::LeftArrow, Modifier::SHIFT);
        // Modifier forces the CSI form even in application mode.
        assert_eq!(input.peek(), b"\x1b[1;2D");
    }

    #[test]
    fn home_and_end() {
        let mut input = InputGenerator::new();
        input.generate_key(Key::Home, Modifier::empty());
        input.generate_key(Key::End, Modifier::empty());
        assert_eq!(input.peek(), b"\x1b[H\x1b[F");
    }

    #[test]
    fn f1_to_f4_use_ss3() {
        let mut input = InputGenerator::new();
        input.generate_key(Key::F1, Modifier::empty());
        input.generate_key(Key::F4, Modifier::empty());
        assert_eq!(input.peek(), b"\x1bOP\x1bOS");
    }

    #[test]
    fn f1_with_modifier_uses_csi() {
        let mut input = InputGenerator::new();
        input.generate_key(Key::F1, Modifier::CONTROL);
        assert_eq!(input.peek(), b"\x1b[1;5P");
    }

    #[test]
    fn f5_and_up_use_tilde_codes() {
        let mut input = InputGenerator::new();
        input.generate_key(Key::F5, Modifier::empty());
        assert_eq!(input.peek(), b"\x1b[15~");
        input.consume(5);

        input.generate_key(Key::F12, Modifier::SHIFT);
        assert_eq!(input.peek(), b"\x1b[24;2~");
    }

    #[test]
    fn editing_pad_keys() {
        let mut input = InputGenerator::new();
        input.generate_key(Key::Insert, Modifier::empty());
        input.generate_key(Key::Delete, Modifier::empty());
        input.generate_key(Key::PageUp, Modifier::empty());
        assert_eq!(input.peek(), b"\x1b[2~\x1b[3~\x1b[5~");
    }

    #[test]
    fn numpad_follows_keypad_mode() {
        let mut input = InputGenerator::new();
        input.generate_key(Key::Numpad5, Modifier::empty());
        assert_eq!(input.peek(), b"5");
        input.consume(1);

        input.set_application_keypad_mode(true);
        input.generate_key(Key::Numpad5, Modifier::empty());
        assert_eq!(input.peek(), b"\x1bOu");
    }

    // ── Paste ──────────────────────────────────────────────────────

    #[test]
    fn paste_literal_when_unbracketed() {
        let mut input = InputGenerator::new();
        input.generate_paste("hello");
        assert_eq!(input.peek(), b"hello");
    }

    #[test]
    fn paste_bracketed_when_enabled() {
        let mut input = InputGenerator::new();
        input.set_bracketed_paste(true);
        input.generate_paste("hi");
        assert_eq!(input.peek(), b"\x1b[200~hi\x1b[201~");
    }

    // ── Focus ──────────────────────────────────────────────────────

    #[test]
    fn focus_events_gated_by_flag() {
        let mut input = InputGenerator::new();
        assert!(!input.generate_focus_in());
        assert_eq!(input.peek(), b"");

        input.set_generate_focus_events(true);
        assert!(input.generate_focus_in());
        assert!(input.generate_focus_out());
        assert_eq!(input.peek(), b"\x1b[I\x1b[O");
    }

    // ── Mouse ──────────────────────────────────────────────────────

    #[test]
    fn mouse_silent_without_protocol() {
        let mut input = InputGenerator::new();
        assert!(!input.generate_mouse_press(MouseButton::Left, Modifier::empty(), 1, 1));
        assert_eq!(input.peek(), b"");
    }

    #[test]
    fn default_transport_offsets_by_32() {
        let mut input = InputGenerator::new();
        input.set_mouse_protocol(MouseProtocol::NormalTracking, true);
        input.generate_mouse_press(MouseButton::Left, Modifier::empty(), 5, 10);
        // ESC [ M, button 0+32, col 10+32, row 5+32
        assert_eq!(input.peek(), &[0x1B, b'[', b'M', 32, 42, 37]);
    }

    #[test]
    fn default_transport_release_reports_button_3() {
        let mut input = InputGenerator::new();
        input.set_mouse_protocol(MouseProtocol::NormalTracking, true);
        input.generate_mouse_release(MouseButton::Left, Modifier::empty(), 1, 1);
        assert_eq!(input.peek(), &[0x1B, b'[', b'M', 35, 33, 33]);
    }

    #[test]
    fn sgr_transport_press_and_release() {
        let mut input = InputGenerator::new();
        input.set_mouse_protocol(MouseProtocol::NormalTracking, true);
        input.set_mouse_transport(MouseTransport::Sgr);
        input.generate_mouse_press(MouseButton::Left, Modifier::empty(), 5, 10);
        assert_eq!(input.peek(), b"\x1b[<0;10;5M");
        input.consume(input.peek().len());

        input.generate_mouse_release(MouseButton::Left, Modifier::empty(), 5, 10);
        assert_eq!(input.peek(), b"\x1b[<0;10;5m");
    }

    #[test]
    fn urxvt_transport_form() {
        let mut input = InputGenerator::new();
        input.set_mouse_protocol(MouseProtocol::NormalTracking, true);
        input.set_mouse_transport(MouseTransport::Urxvt);
        input.generate_mouse_press(MouseButton::Middle, Modifier::empty(), 3, 7);
        assert_eq!(input.peek(), b"\x1b[33;7;3M");
    }

    #[test]
    fn sgr_modifiers_add_bits() {
        let mut input = InputGenerator::new();
        input.set_mouse_protocol(MouseProtocol::NormalTracking, true);
        input.set_mouse_transport(MouseTransport::Sgr);
        input.generate_mouse_press(
            MouseButton::Left,
            Modifier::SHIFT | Modifier::CONTROL,
            1,
            1,
        );
        assert_eq!(input.peek(), b"\x1b[<20;1;1M");
    }

    #[test]
    fn x10_protocol_drops_modifiers_and_releases() {
        let mut input = InputGenerator::new();
        input.set_mouse_protocol(MouseProtocol::X10, true);
        input.generate_mouse_press(MouseButton::Left, Modifier::CONTROL, 1, 1);
        assert_eq!(input.peek(), &[0x1B, b'[', b'M', 32, 33, 33]);
        input.consume(6);
        assert!(!input.generate_mouse_release(MouseButton::Left, Modifier::empty(), 1, 1));
    }

    #[test]
    fn button_tracking_reports_drag_only_while_held() {
        let mut input = InputGenerator::new();
        input.set_mouse_protocol(MouseProtocol::ButtonTracking, true);
        input.set_mouse_transport(MouseTransport::Sgr);

        assert!(!input.generate_mouse_move(Modifier::empty(), 2, 2));

        input.generate_mouse_press(MouseButton::Left, Modifier::empty(), 2, 2);
        input.consume(input.peek().len());
        assert!(input.generate_mouse_move(Modifier::empty(), 2, 3));
        // Drag adds 32 to the button code.
        assert_eq!(input.peek(), b"\x1b[<32;3;2M");
    }

    #[test]
    fn any_event_tracking_reports_passive_motion() {
        let mut input = InputGenerator::new();
        input.set_mouse_protocol(MouseProtocol::AnyEventTracking, true);
        input.set_mouse_transport(MouseTransport::Sgr);
        assert!(input.generate_mouse_move(Modifier::empty(), 4, 4));
        // No button held: motion reports button 3 (+32 for motion).
        assert_eq!(input.peek(), b"\x1b[<35;4;4M");
    }

    #[test]
    fn duplicate_position_moves_are_suppressed() {
        let mut input = InputGenerator::new();
        input.set_mouse_protocol(MouseProtocol::AnyEventTracking, true);
        assert!(input.generate_mouse_move(Modifier::empty(), 4, 4));
        input.consume(input.peek().len());
        assert!(!input.generate_mouse_move(Modifier::empty(), 4, 4));
    }

    #[test]
    fn wheel_as_cursor_keys() {
        let mut input = InputGenerator::new();
        input.set_mouse_wheel_mode(MouseWheelMode::NormalCursorKeys);
        input.generate_mouse_press(MouseButton::WheelUp, Modifier::empty(), 1, 1);
        assert_eq!(input.peek(), b"\x1b[A");
        input.consume(3);

        input.set_mouse_wheel_mode(MouseWheelMode::ApplicationCursorKeys);
        input.generate_mouse_press(MouseButton::WheelDown, Modifier::empty(), 1, 1);
        assert_eq!(input.peek(), b"\x1bOB");
    }

    #[test]
    fn wheel_as_mouse_report() {
        let mut input = InputGenerator::new();
        input.set_mouse_protocol(MouseProtocol::NormalTracking, true);
        input.set_mouse_transport(MouseTransport::Sgr);
        input.generate_mouse_press(MouseButton::WheelUp, Modifier::empty(), 2, 2);
        assert_eq!(input.peek(), b"\x1b[<64;2;2M");
    }

    #[test]
    fn disabling_other_protocol_keeps_current() {
        let mut input = InputGenerator::new();
        input.set_mouse_protocol(MouseProtocol::NormalTracking, true);
        input.set_mouse_protocol(MouseProtocol::ButtonTracking, false);
        assert_eq!(input.mouse_protocol(), Some(MouseProtocol::NormalTracking));
        input.set_mouse_protocol(MouseProtocol::NormalTracking, false);
        assert_eq!(input.mouse_protocol(), None);
    }

    #[test]
    fn reset_restores_defaults_but_keeps_queue() {
        let mut input = InputGenerator::new();
        input.set_bracketed_paste(true);
        input.set_cursor_keys_mode(KeyMode::Application);
        input.set_mouse_protocol(MouseProtocol::AnyEventTracking, true);
        input.generate_raw(b"zz");
        input.reset();
        assert!(!input.bracketed_paste());
        assert!(!input.application_cursor_keys());
        assert_eq!(input.mouse_protocol(), None);
        assert_eq!(input.peek(), b"zz");
    }
}
