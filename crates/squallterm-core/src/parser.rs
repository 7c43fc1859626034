//! VT control-sequence parser.
//!
//! A byte-at-a-time state machine following Paul Williams' published VT500
//! parser model, extended with OSC, DCS, APC/SOS/PM strings and streaming
//! UTF-8 decoding. The parser holds no terminal state of its own: every
//! complete token is handed to a [`Perform`] implementation (the sequencer).
//!
//! The parser never fails. Malformed UTF-8 prints U+FFFD and resynchronizes;
//! CAN/SUB abort the sequence in progress; a fresh ESC restarts from any
//! state. The same byte sequence fed from the same state always produces the
//! same event sequence.

use smallvec::SmallVec;

/// Hard cap on CSI/DCS parameter groups; further parameters are dropped.
pub const MAX_PARAMS: usize = 32;
/// Hard cap on subparameters within one group.
pub const MAX_SUBPARAMS: usize = 6;
/// Hard cap on collected intermediate/private bytes.
pub const MAX_INTERMEDIATES: usize = 4;

/// Parsed CSI/DCS parameter list.
///
/// Each group is one semicolon-separated parameter; colon-separated
/// subparameters extend the current group (`38:2:r:g:b`). Values saturate at
/// `u16::MAX`; groups past [`MAX_PARAMS`] are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    groups: SmallVec<[SmallVec<[u16; 2]>; 8]>,
    overflow: bool,
}

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of parameter groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// The subparameters of group `index` (empty slice when absent).
    #[must_use]
    pub fn group(&self, index: usize) -> &[u16] {
        self.groups.get(index).map_or(&[], |g| g.as_slice())
    }

    /// First value of group `index`, defaulting to 0.
    #[must_use]
    pub fn get(&self, index: usize) -> u16 {
        self.group(index).first().copied().unwrap_or(0)
    }

    /// First value of group `index`, with 0/absent mapping to `default`.
    #[must_use]
    pub fn get_or(&self, index: usize, default: u16) -> u16 {
        match self.get(index) {
            0 => default,
            v => v,
        }
    }

    /// Iterate over groups as subparameter slices.
    pub fn iter(&self) -> impl Iterator<Item = &[u16]> {
        self.groups.iter().map(|g| g.as_slice())
    }

    fn clear(&mut self) {
        self.groups.clear();
        self.overflow = false;
    }

    fn digit(&mut self, digit: u8) {
        if self.overflow {
            return;
        }
        if self.groups.is_empty() {
            self.groups.push(SmallVec::new());
        }
        let Some(group) = self.groups.last_mut() else {
            return;
        };
        if group.is_empty() {
            group.push(0);
        }
        let Some(value) = group.last_mut() else {
            return;
        };
        *value = value.saturating_mul(10).saturating_add(u16::from(digit));
    }

    fn next_param(&mut self) {
        if self.groups.len() >= MAX_PARAMS {
            self.overflow = true;
            return;
        }
        if self.groups.is_empty() {
            // An initial `;` stands for an empty first parameter.
            self.groups.push(SmallVec::new());
        }
        self.ensure_value();
        self.groups.push(SmallVec::new());
    }

    fn next_subparam(&mut self) {
        if self.groups.is_empty() {
            self.groups.push(SmallVec::new());
        }
        let Some(group) = self.groups.last_mut() else {
            return;
        };
        if group.is_empty() {
            group.push(0);
        }
        if group.len() < MAX_SUBPARAMS {
            group.push(0);
        }
    }

    /// Make sure the trailing group has at least one explicit value.
    fn ensure_value(&mut self) {
        if let Some(group) = self.groups.last_mut()
            && group.is_empty()
        {
            group.push(0);
        }
    }

    #[cfg(test)]
    pub(crate) fn from_slice(values: &[u16]) -> Self {
        let mut params = Self::new();
        for &v in values {
            let mut group = SmallVec::new();
            group.push(v);
            params.groups.push(group);
        }
        params
    }
}

/// Receiver for parser events.
///
/// The parser calls exactly one of these per byte consumed (often none).
/// All methods have empty defaults so tests can implement just what they
/// observe.
pub trait Perform {
    /// A printable codepoint reached ground.
    fn print(&mut self, ch: char) {
        let _ = ch;
    }

    /// A C0 control (or DEL) to execute immediately.
    fn execute(&mut self, byte: u8) {
        let _ = byte;
    }

    /// A complete ESC sequence.
    fn esc_dispatch(&mut self, intermediates: &[u8], final_byte: u8) {
        let _ = (intermediates, final_byte);
    }

    /// A complete CSI sequence.
    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], final_byte: u8) {
        let _ = (params, intermediates, final_byte);
    }

    /// An OSC string is opening.
    fn osc_start(&mut self) {}

    /// One payload byte of the current OSC string.
    fn osc_put(&mut self, byte: u8) {
        let _ = byte;
    }

    /// The current OSC string terminated (ST or BEL).
    fn osc_end(&mut self) {}

    /// A DCS header completed; payload bytes follow via `put`.
    fn hook(&mut self, params: &Params, intermediates: &[u8], final_byte: u8) {
        let _ = (params, intermediates, final_byte);
    }

    /// One payload byte of the current DCS string.
    fn put(&mut self, byte: u8) {
        let _ = byte;
    }

    /// The current DCS string terminated.
    fn unhook(&mut self) {}
}

/// Parser states, after Williams' VT500 model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    CsiIgnore,
    DcsEntry,
    DcsParam,
    DcsIntermediate,
    DcsPassthrough,
    DcsIgnore,
    OscString,
    SosPmApcString,
}

/// Streaming UTF-8 decoder state for the ground path.
#[derive(Debug, Clone, Copy, Default)]
struct Utf8Decoder {
    buf: [u8; 4],
    len: u8,
    want: u8,
}

impl Utf8Decoder {
    fn pending(&self) -> bool {
        self.want != 0
    }

    fn reset(&mut self) {
        self.len = 0;
        self.want = 0;
    }

    /// Start a sequence from its leading byte. Returns false for bytes that
    /// cannot lead a sequence.
    fn start(&mut self, byte: u8) -> bool {
        let want = match byte {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return false,
        };
        self.buf[0] = byte;
        self.len = 1;
        self.want = want;
        true
    }

    /// Feed a continuation byte. Returns `Ok(Some(ch))` on completion,
    /// `Ok(None)` while incomplete, and `Err(())` when `byte` is not a valid
    /// continuation (the byte must then be reprocessed).
    fn continuation(&mut self, byte: u8) -> Result<Option<char>, ()> {
        if !(0x80..=0xBF).contains(&byte) {
            self.reset();
            return Err(());
        }
        self.buf[self.len as usize] = byte;
        self.len += 1;
        if self.len < self.want {
            return Ok(None);
        }
        let decoded = core::str::from_utf8(&self.buf[..self.len as usize])
            .ok()
            .and_then(|s| s.chars().next());
        self.reset();
        // Overlong or surrogate encodings decode to None; report U+FFFD.
        Ok(Some(decoded.unwrap_or('\u{FFFD}')))
    }
}

/// The escape-sequence state machine.
#[derive(Debug, Clone)]
pub struct Parser {
    state: State,
    params: Params,
    intermediates: SmallVec<[u8; MAX_INTERMEDIATES]>,
    intermediates_overflow: bool,
    utf8: Utf8Decoder,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::Ground,
            params: Params::new(),
            intermediates: SmallVec::new(),
            intermediates_overflow: false,
            utf8: Utf8Decoder::default(),
        }
    }

    /// Whether the parser is in the ground state with no partial sequence.
    #[must_use]
    pub fn in_ground(&self) -> bool {
        self.state == State::Ground && !self.utf8.pending()
    }

    /// Feed a chunk of bytes, dispatching events to `perform`.
    pub fn feed<P: Perform>(&mut self, bytes: &[u8], perform: &mut P) {
        for &byte in bytes {
            self.advance(byte, perform);
        }
    }

    /// Advance by one byte.
    pub fn advance<P: Perform>(&mut self, byte: u8, perform: &mut P) {
        // A pending UTF-8 sequence swallows continuation bytes wherever we
        // are; anything else aborts it with a replacement character first.
        if self.utf8.pending() {
            match self.utf8.continuation(byte) {
                Ok(Some(ch)) => {
                    perform.print(ch);
                    return;
                }
                Ok(None) => return,
                Err(()) => {
                    perform.print('\u{FFFD}');
                    // fall through and reprocess `byte`
                }
            }
        }

        // CAN and SUB abort any sequence in progress without dispatching it;
        // ESC terminates a string sequence (it is usually the start of ST)
        // and restarts.
        match byte {
            0x18 | 0x1A => {
                self.state = State::Ground;
                return;
            }
            0x1B => {
                self.terminate_string(perform);
                self.enter_escape();
                return;
            }
            _ => {}
        }

        match self.state {
            State::Ground => self.ground(byte, perform),
            State::Escape => self.escape(byte, perform),
            State::EscapeIntermediate => self.escape_intermediate(byte, perform),
            State::CsiEntry => self.csi_entry(byte, perform),
            State::CsiParam => self.csi_param(byte, perform),
            State::CsiIntermediate => self.csi_intermediate(byte, perform),
            State::CsiIgnore => self.csi_ignore(byte),
            State::DcsEntry => self.dcs_entry(byte, perform),
            State::DcsParam => self.dcs_param(byte, perform),
            State::DcsIntermediate => self.dcs_intermediate(byte, perform),
            State::DcsPassthrough => perform.put(byte),
            State::DcsIgnore => {}
            State::OscString => self.osc_string(byte, perform),
            State::SosPmApcString => {
                if byte == 0x07 {
                    self.state = State::Ground;
                }
            }
        }
    }

    fn enter_escape(&mut self) {
        self.state = State::Escape;
        self.intermediates.clear();
        self.intermediates_overflow = false;
        self.params.clear();
    }

    /// Close out a string-type sequence on ESC (normally the start of ST).
    fn terminate_string<P: Perform>(&mut self, perform: &mut P) {
        match self.state {
            State::OscString => perform.osc_end(),
            State::DcsPassthrough => perform.unhook(),
            _ => {}
        }
    }

    fn collect(&mut self, byte: u8) {
        if self.intermediates.len() < MAX_INTERMEDIATES {
            self.intermediates.push(byte);
        } else {
            self.intermediates_overflow = true;
        }
    }

    fn ground<P: Perform>(&mut self, byte: u8, perform: &mut P) {
        match byte {
            0x00 => {}
            0x01..=0x17 | 0x19 | 0x1C..=0x1F => perform.execute(byte),
            0x20..=0x7E => perform.print(byte as char),
            0x7F => perform.print('\u{7F}'),
            _ => {
                if !self.utf8.start(byte) {
                    perform.print('\u{FFFD}');
                }
            }
        }
    }

    fn escape<P: Perform>(&mut self, byte: u8, perform: &mut P) {
        match byte {
            0x00..=0x17 | 0x19 | 0x1C..=0x1F => perform.execute(byte),
            0x20..=0x2F => {
                self.collect(byte);
                self.state = State::EscapeIntermediate;
            }
            b'[' => {
                self.state = State::CsiEntry;
            }
            b']' => {
                perform.osc_start();
                self.state = State::OscString;
            }
            b'P' => {
                self.state = State::DcsEntry;
            }
            b'X' | b'^' | b'_' => {
                self.state = State::SosPmApcString;
            }
            0x30..=0x7E => {
                self.state = State::Ground;
                perform.esc_dispatch(&self.intermediates, byte);
            }
            _ => self.state = State::Ground,
        }
    }

    fn escape_intermediate<P: Perform>(&mut self, byte: u8, perform: &mut P) {
        match byte {
            0x00..=0x17 | 0x19 | 0x1C..=0x1F => perform.execute(byte),
            0x20..=0x2F => self.collect(byte),
            0x30..=0x7E => {
                self.state = State::Ground;
                if !self.intermediates_overflow {
                    perform.esc_dispatch(&self.intermediates, byte);
                }
            }
            _ => self.state = State::Ground,
        }
    }

    fn csi_entry<P: Perform>(&mut self, byte: u8, perform: &mut P) {
        match byte {
            0x00..=0x17 | 0x19 | 0x1C..=0x1F => perform.execute(byte),
            b'0'..=b'9' => {
                self.params.digit(byte - b'0');
                self.state = State::CsiParam;
            }
            b';' => {
                self.params.next_param();
                self.state = State::CsiParam;
            }
            b':' => {
                self.params.next_subparam();
                self.state = State::CsiParam;
            }
            0x3C..=0x3F => {
                // Private markers collect like intermediates.
                self.collect(byte);
                self.state = State::CsiParam;
            }
            0x20..=0x2F => {
                self.collect(byte);
                self.state = State::CsiIntermediate;
            }
            0x40..=0x7E => self.csi_finish(byte, perform),
            _ => self.state = State::CsiIgnore,
        }
    }

    fn csi_param<P: Perform>(&mut self, byte: u8, perform: &mut P) {
        match byte {
            0x00..=0x17 | 0x19 | 0x1C..=0x1F => perform.execute(byte),
            b'0'..=b'9' => self.params.digit(byte - b'0'),
            b';' => self.params.next_param(),
            b':' => self.params.next_subparam(),
            0x3C..=0x3F => self.state = State::CsiIgnore,
            0x20..=0x2F => {
                self.collect(byte);
                self.state = State::CsiIntermediate;
            }
            0x40..=0x7E => self.csi_finish(byte, perform),
            _ => self.state = State::CsiIgnore,
        }
    }

    fn csi_intermediate<P: Perform>(&mut self, byte: u8, perform: &mut P) {
        match byte {
            0x00..=0x17 | 0x19 | 0x1C..=0x1F => perform.execute(byte),
            0x20..=0x2F => self.collect(byte),
            0x30..=0x3F => self.state = State::CsiIgnore,
            0x40..=0x7E => self.csi_finish(byte, perform),
            _ => self.state = State::CsiIgnore,
        }
    }

    fn csi_ignore(&mut self, byte: u8) {
        if (0x40..=0x7E).contains(&byte) {
            self.state = State::Ground;
        }
    }

    fn csi_finish<P: Perform>(&mut self, byte: u8, perform: &mut P) {
        self.state = State::Ground;
        self.params.ensure_value();
        if !self.intermediates_overflow {
            perform.csi_dispatch(&self.params, &self.intermediates, byte);
        }
        self.params.clear();
    }

    fn dcs_entry<P: Perform>(&mut self, byte: u8, perform: &mut P) {
        match byte {
            // C0 controls inside a DCS header are ignored.
            0x00..=0x17 | 0x19 | 0x1C..=0x1F => {}
            b'0'..=b'9' => {
                self.params.digit(byte - b'0');
                self.state = State::DcsParam;
            }
            b';' => {
                self.params.next_param();
                self.state = State::DcsParam;
            }
            b':' => {
                self.params.next_subparam();
                self.state = State::DcsParam;
            }
            0x3C..=0x3F => {
                self.collect(byte);
                self.state = State::DcsParam;
            }
            0x20..=0x2F => {
                self.collect(byte);
                self.state = State::DcsIntermediate;
            }
            0x40..=0x7E => self.dcs_finish(byte, perform),
            _ => self.state = State::DcsIgnore,
        }
    }

    fn dcs_param<P: Perform>(&mut self, byte: u8, perform: &mut P) {
        match byte {
            0x00..=0x17 | 0x19 | 0x1C..=0x1F => {}
            b'0'..=b'9' => self.params.digit(byte - b'0'),
            b';' => self.params.next_param(),
            b':' => self.params.next_subparam(),
            0x3C..=0x3F => self.state = State::DcsIgnore,
            0x20..=0x2F => {
                self.collect(byte);
                self.state = State::DcsIntermediate;
            }
            0x40..=0x7E => self.dcs_finish(byte, perform),
            _ => self.state = State::DcsIgnore,
        }
    }

    fn dcs_intermediate<P: Perform>(&mut self, byte: u8, perform: &mut P) {
        match byte {
            0x00..=0x17 | 0x19 | 0x1C..=0x1F => {}
            0x20..=0x2F => self.collect(byte),
            0x30..=0x3F => self.state = State::DcsIgnore,
            0x40..=0x7E => self.dcs_finish(byte, perform),
            _ => self.state = State::DcsIgnore,
        }
    }

    fn dcs_finish<P: Perform>(&mut self, byte: u8, perform: &mut P) {
        self.params.ensure_value();
        if self.intermediates_overflow {
            self.state = State::DcsIgnore;
        } else {
            self.state = State::DcsPassthrough;
            perform.hook(&self.params, &self.intermediates, byte);
        }
        self.params.clear();
    }

    fn osc_string<P: Perform>(&mut self, byte: u8, perform: &mut P) {
        match byte {
            0x07 => {
                perform.osc_end();
                self.state = State::Ground;
            }
            0x00..=0x06 | 0x08..=0x17 | 0x19 | 0x1C..=0x1F => {}
            _ => perform.osc_put(byte),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every callback for assertion.
    #[derive(Debug, Default)]
    struct Recorder {
        events: Vec<Event>,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Print(char),
        Execute(u8),
        Esc(Vec<u8>, u8),
        Csi(Params, Vec<u8>, u8),
        OscStart,
        OscPut(u8),
        OscEnd,
        Hook(Params, Vec<u8>, u8),
        Put(u8),
        Unhook,
    }

    impl Perform for Recorder {
        fn print(&mut self, ch: char) {
            self.events.push(Event::Print(ch));
        }
        fn execute(&mut self, byte: u8) {
            self.events.push(Event::Execute(byte));
        }
        fn esc_dispatch(&mut self, intermediates: &[u8], final_byte: u8) {
            self.events
                .push(Event::Esc(intermediates.to_vec(), final_byte));
        }
        fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], final_byte: u8) {
            self.events
                .push(Event::Csi(params.clone(), intermediates.to_vec(), final_byte));
        }
        fn osc_start(&mut self) {
            self.events.push(Event::OscStart);
        }
        fn osc_put(&mut self, byte: u8) {
            self.events.push(Event::OscPut(byte));
        }
        fn osc_end(&mut self) {
            self.events.push(Event::OscEnd);
        }
        fn hook(&mut self, params: &Params, intermediates: &[u8], final_byte: u8) {
            self.events
                .push(Event::Hook(params.clone(), intermediates.to_vec(), final_byte));
        }
        fn put(&mut self, byte: u8) {
            self.events.push(Event::Put(byte));
        }
        fn unhook(&mut self) {
            self.events.push(Event::Unhook);
        }
    }

    fn run(bytes: &[u8]) -> Vec<Event> {
        let mut parser = Parser::new();
        let mut rec = Recorder::default();
        parser.feed(bytes, &mut rec);
        rec.events
    }

    // ── Ground ─────────────────────────────────────────────────────

    #[test]
    fn printable_ascii_prints() {
        assert_eq!(run(b"hi"), vec![Event::Print('h'), Event::Print('i')]);
    }

    #[test]
    fn c0_controls_execute() {
        assert_eq!(
            run(b"\r\n\t\x08\x07"),
            vec![
                Event::Execute(0x0D),
                Event::Execute(0x0A),
                Event::Execute(0x09),
                Event::Execute(0x08),
                Event::Execute(0x07),
            ]
        );
    }

    #[test]
    fn nul_is_ignored() {
        assert_eq!(run(b"\x00"), vec![]);
    }

    #[test]
    fn del_prints_for_screen_mapping() {
        assert_eq!(run(&[0x7F]), vec![Event::Print('\u{7F}')]);
    }

    // ── UTF-8 ──────────────────────────────────────────────────────

    #[test]
    fn utf8_multibyte_prints() {
        assert_eq!(
            run("aé中🎉".as_bytes()),
            vec![
                Event::Print('a'),
                Event::Print('é'),
                Event::Print('中'),
                Event::Print('🎉'),
            ]
        );
    }

    #[test]
    fn utf8_split_across_feeds() {
        let mut parser = Parser::new();
        let mut rec = Recorder::default();
        parser.feed(&[0xF0, 0x9F], &mut rec);
        assert!(rec.events.is_empty());
        parser.feed(&[0x8E, 0x89], &mut rec);
        assert_eq!(rec.events, vec![Event::Print('🎉')]);
    }

    #[test]
    fn malformed_utf8_yields_replacement() {
        // Truncated 2-byte sequence followed by ASCII: U+FFFD, then 'a'.
        assert_eq!(
            run(&[0xC3, b'a']),
            vec![Event::Print('\u{FFFD}'), Event::Print('a')]
        );
        // Lone continuation byte.
        assert_eq!(run(&[0x85]), vec![Event::Print('\u{FFFD}')]);
    }

    #[test]
    fn utf8_interrupted_by_escape_recovers() {
        assert_eq!(
            run(&[0xC3, 0x1B, b'7']),
            vec![Event::Print('\u{FFFD}'), Event::Esc(vec![], b'7')]
        );
    }

    // ── ESC ────────────────────────────────────────────────────────

    #[test]
    fn esc_final_dispatches() {
        assert_eq!(run(b"\x1b7"), vec![Event::Esc(vec![], b'7')]);
        assert_eq!(run(b"\x1bM"), vec![Event::Esc(vec![], b'M')]);
    }

    #[test]
    fn esc_intermediate_collects() {
        assert_eq!(run(b"\x1b#8"), vec![Event::Esc(vec![b'#'], b'8')]);
        assert_eq!(run(b"\x1b(0"), vec![Event::Esc(vec![b'('], b'0')]);
    }

    // ── CSI ────────────────────────────────────────────────────────

    #[test]
    fn csi_no_params() {
        let events = run(b"\x1b[H");
        assert_eq!(events, vec![Event::Csi(Params::new(), vec![], b'H')]);
    }

    #[test]
    fn csi_numeric_params() {
        let events = run(b"\x1b[5;10H");
        assert_eq!(
            events,
            vec![Event::Csi(Params::from_slice(&[5, 10]), vec![], b'H')]
        );
    }

    #[test]
    fn csi_empty_params_read_as_zero() {
        let events = run(b"\x1b[;5m");
        let Event::Csi(params, _, b'm') = &events[0] else {
            panic!("expected CSI: {events:?}");
        };
        assert_eq!(params.len(), 2);
        assert_eq!(params.get(0), 0);
        assert_eq!(params.get(1), 5);
    }

    #[test]
    fn csi_subparams_group() {
        let events = run(b"\x1b[4:3m");
        let Event::Csi(params, _, b'm') = &events[0] else {
            panic!("expected CSI: {events:?}");
        };
        assert_eq!(params.len(), 1);
        assert_eq!(params.group(0), &[4, 3]);
    }

    #[test]
    fn csi_private_marker_collects() {
        let events = run(b"\x1b[?25h");
        assert_eq!(
            events,
            vec![Event::Csi(Params::from_slice(&[25]), vec![b'?'], b'h')]
        );
    }

    #[test]
    fn csi_intermediate_before_final() {
        let events = run(b"\x1b[2 q");
        assert_eq!(
            events,
            vec![Event::Csi(Params::from_slice(&[2]), vec![b' '], b'q')]
        );
    }

    #[test]
    fn csi_param_value_saturates() {
        let events = run(b"\x1b[99999999999999A");
        let Event::Csi(params, _, b'A') = &events[0] else {
            panic!("expected CSI: {events:?}");
        };
        assert_eq!(params.get(0), u16::MAX);
    }

    #[test]
    fn csi_param_count_caps() {
        let mut seq = b"\x1b[".to_vec();
        for _ in 0..100 {
            seq.extend_from_slice(b"1;");
        }
        seq.push(b'm');
        let events = run(&seq);
        let Event::Csi(params, _, b'm') = &events[0] else {
            panic!("expected CSI: {events:?}");
        };
        assert!(params.len() <= MAX_PARAMS);
    }

    #[test]
    fn csi_embedded_c0_executes() {
        // A C0 control inside a CSI sequence executes without aborting it.
        assert_eq!(
            run(b"\x1b[2\x08C"),
            vec![
                Event::Execute(0x08),
                Event::Csi(Params::from_slice(&[2]), vec![], b'C'),
            ]
        );
    }

    #[test]
    fn can_aborts_csi() {
        assert_eq!(run(b"\x1b[12\x18A"), vec![Event::Print('A')]);
    }

    #[test]
    fn esc_restarts_csi() {
        assert_eq!(run(b"\x1b[12\x1b7"), vec![Event::Esc(vec![], b'7')]);
    }

    #[test]
    fn csi_ignore_discards_malformed() {
        // Private marker after digits is invalid; sequence is consumed
        // through its final byte with no dispatch.
        assert_eq!(run(b"\x1b[1?2h"), vec![]);
    }

    // ── OSC ────────────────────────────────────────────────────────

    fn osc_payload(events: &[Event]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::OscPut(b) => Some(*b),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn osc_bel_terminated() {
        let events = run(b"\x1b]0;title\x07");
        assert_eq!(events.first(), Some(&Event::OscStart));
        assert_eq!(events.last(), Some(&Event::OscEnd));
        assert_eq!(osc_payload(&events), b"0;title");
    }

    #[test]
    fn osc_st_terminated() {
        let events = run(b"\x1b]2;hi\x1b\\");
        assert_eq!(events.first(), Some(&Event::OscStart));
        assert_eq!(osc_payload(&events), b"2;hi");
        // ESC ends the string, then `\` dispatches as ST (ignored upstream).
        assert!(events.contains(&Event::OscEnd));
    }

    #[test]
    fn osc_can_aborted_without_dispatch() {
        let events = run(b"\x1b]0;tit\x18");
        // Payload bytes streamed, but the string never terminates.
        assert!(!events.contains(&Event::OscEnd));
        assert_eq!(events.last(), Some(&Event::OscPut(b't')));
    }

    // ── DCS ────────────────────────────────────────────────────────

    #[test]
    fn dcs_hook_put_unhook() {
        let events = run(b"\x1bPq#0;AB\x1b\\");
        let Event::Hook(params, intermediates, final_byte) = &events[0] else {
            panic!("expected hook: {events:?}");
        };
        assert!(params.is_empty());
        assert!(intermediates.is_empty());
        assert_eq!(*final_byte, b'q');
        let payload: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                Event::Put(b) => Some(*b),
                _ => None,
            })
            .collect();
        assert_eq!(payload, b"#0;AB");
        assert!(events.contains(&Event::Unhook));
    }

    #[test]
    fn dcs_with_params_and_intermediates() {
        let events = run(b"\x1bP1$q\"p\x1b\\");
        let Event::Hook(params, intermediates, final_byte) = &events[0] else {
            panic!("expected hook: {events:?}");
        };
        assert_eq!(params.get(0), 1);
        assert_eq!(intermediates.as_slice(), b"$");
        assert_eq!(*final_byte, b'q');
    }

    #[test]
    fn sos_pm_apc_consumed_silently() {
        // The payload produces no events; only the trailing ST dispatch and
        // the following printable surface.
        assert_eq!(
            run(b"\x1b_payload\x1b\\x"),
            vec![Event::Esc(vec![], b'\\'), Event::Print('x')]
        );
        assert_eq!(run(b"\x1b^ignored\x07x"), vec![Event::Print('x')]);
    }

    #[test]
    fn parser_returns_to_ground() {
        let mut parser = Parser::new();
        let mut rec = Recorder::default();
        parser.feed(b"\x1b[1;2", &mut rec);
        assert!(!parser.in_ground());
        parser.feed(b"H", &mut rec);
        assert!(parser.in_ground());
    }
}
