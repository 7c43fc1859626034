//! ANSI and DEC private mode state, with the XTSAVE/XTRESTORE stack.
//!
//! Modes are tracked by their numeric protocol code so that codes we do not
//! interpret are still remembered: setting an unknown mode is inert, but a
//! later DECRQM for it reports set/reset rather than not-recognized.

use std::collections::{BTreeMap, BTreeSet};

/// ANSI (ECMA-48) modes the screen interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnsiMode {
    /// KAM: lock the keyboard.
    KeyboardAction,
    /// IRM: insert rather than replace on text output.
    Insert,
    /// SRM: local echo suppression.
    SendReceive,
    /// LNM: linefeed implies carriage return.
    AutomaticNewline,
}

impl AnsiMode {
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::KeyboardAction => 2,
            Self::Insert => 4,
            Self::SendReceive => 12,
            Self::AutomaticNewline => 20,
        }
    }

    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            2 => Some(Self::KeyboardAction),
            4 => Some(Self::Insert),
            12 => Some(Self::SendReceive),
            20 => Some(Self::AutomaticNewline),
            _ => None,
        }
    }
}

/// DEC private modes the screen interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecMode {
    /// DECCKM: cursor keys send application sequences.
    ApplicationCursorKeys,
    /// DECCOLM: 132-column mode.
    Columns132,
    /// DECSCLM: smooth scroll (accepted, visually inert here).
    SmoothScroll,
    /// DECSCNM: reverse video.
    ReverseVideo,
    /// DECOM: cursor addressing relative to the scrolling region.
    Origin,
    /// DECAWM: wrap at the right margin.
    AutoWrap,
    /// DECARM: keyboard auto-repeat.
    AutoRepeat,
    /// X10 mouse protocol.
    MouseProtocolX10,
    /// Blinking text cursor.
    BlinkingCursor,
    /// DECTCEM: text cursor visible.
    VisibleCursor,
    /// Plain alternate screen buffer.
    AlternateScreen,
    /// DECLRMM: left/right margins honoured.
    LeftRightMargin,
    /// Sixel output scrolls the page (mode 80 disables when set... the
    /// protocol bit is "no sixel scrolling", we store it as named here).
    NoSixelScrolling,
    /// Normal mouse tracking (press/release).
    MouseProtocolNormalTracking,
    /// Highlight mouse tracking.
    MouseProtocolHighlightTracking,
    /// Button-event mouse tracking (press/release/drag).
    MouseProtocolButtonTracking,
    /// Any-event mouse tracking (all motion).
    MouseProtocolAnyEventTracking,
    /// Focus in/out reporting.
    FocusTracking,
    /// UTF-8 extended mouse coordinates (superseded by SGR).
    MouseExtended,
    /// SGR mouse transport.
    MouseSgr,
    /// Wheel events become cursor keys outside the alternate screen.
    MouseAlternateScroll,
    /// URXVT mouse transport.
    MouseUrxvt,
    /// Alternate screen, cleared when leaving.
    AlternateScreenErase,
    /// Save cursor as part of alternate-screen entry (used alone: DECSC).
    SaveCursor,
    /// Alternate screen + save/restore cursor + clear on enter.
    AlternateScreenSaveCursor,
    /// Sixel images allocate private color registers.
    PrivateColorRegisters,
    /// Bracketed paste.
    BracketedPaste,
    /// Synchronized output batching.
    BatchedRendering,
    /// Rewrap lines when the column count changes.
    TextReflow,
    /// Leave the cursor beside a sixel image instead of below it.
    SixelCursorNextToGraphic,
}

impl DecMode {
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::ApplicationCursorKeys => 1,
            Self::Columns132 => 3,
            Self::SmoothScroll => 4,
            Self::ReverseVideo => 5,
            Self::Origin => 6,
            Self::AutoWrap => 7,
            Self::AutoRepeat => 8,
            Self::MouseProtocolX10 => 9,
            Self::BlinkingCursor => 12,
            Self::VisibleCursor => 25,
            Self::AlternateScreen => 47,
            Self::LeftRightMargin => 69,
            Self::NoSixelScrolling => 80,
            Self::MouseProtocolNormalTracking => 1000,
            Self::MouseProtocolHighlightTracking => 1001,
            Self::MouseProtocolButtonTracking => 1002,
            Self::MouseProtocolAnyEventTracking => 1003,
            Self::FocusTracking => 1004,
            Self::MouseExtended => 1005,
            Self::MouseSgr => 1006,
            Self::MouseAlternateScroll => 1007,
            Self::MouseUrxvt => 1015,
            Self::AlternateScreenErase => 1047,
            Self::SaveCursor => 1048,
            Self::AlternateScreenSaveCursor => 1049,
            Self::PrivateColorRegisters => 1070,
            Self::BracketedPaste => 2004,
            Self::BatchedRendering => 2026,
            Self::TextReflow => 2028,
            Self::SixelCursorNextToGraphic => 8452,
        }
    }

    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1 => Self::ApplicationCursorKeys,
            3 => Self::Columns132,
            4 => Self::SmoothScroll,
            5 => Self::ReverseVideo,
            6 => Self::Origin,
            7 => Self::AutoWrap,
            8 => Self::AutoRepeat,
            9 => Self::MouseProtocolX10,
            12 => Self::BlinkingCursor,
            25 => Self::VisibleCursor,
            47 => Self::AlternateScreen,
            69 => Self::LeftRightMargin,
            80 => Self::NoSixelScrolling,
            1000 => Self::MouseProtocolNormalTracking,
            1001 => Self::MouseProtocolHighlightTracking,
            1002 => Self::MouseProtocolButtonTracking,
            1003 => Self::MouseProtocolAnyEventTracking,
            1004 => Self::FocusTracking,
            1005 => Self::MouseExtended,
            1006 => Self::MouseSgr,
            1007 => Self::MouseAlternateScroll,
            1015 => Self::MouseUrxvt,
            1047 => Self::AlternateScreenErase,
            1048 => Self::SaveCursor,
            1049 => Self::AlternateScreenSaveCursor,
            1070 => Self::PrivateColorRegisters,
            2004 => Self::BracketedPaste,
            2026 => Self::BatchedRendering,
            2028 => Self::TextReflow,
            8452 => Self::SixelCursorNextToGraphic,
            _ => return None,
        })
    }
}

/// DECRQM reply classification.
///
/// The permanent classes exist in the protocol but nothing here is reported
/// as permanent; replies use only the first three.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeResponse {
    NotRecognized,
    Set,
    Reset,
    PermanentlySet,
    PermanentlyReset,
}

impl ModeResponse {
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::NotRecognized => 0,
            Self::Set => 1,
            Self::Reset => 2,
            Self::PermanentlySet => 3,
            Self::PermanentlyReset => 4,
        }
    }
}

/// Mode state: two code-keyed sets plus the DEC save/restore stack.
#[derive(Debug, Clone, Default)]
pub struct Modes {
    ansi: BTreeSet<u16>,
    dec: BTreeSet<u16>,
    touched_ansi: BTreeSet<u16>,
    touched_dec: BTreeSet<u16>,
    saved: BTreeMap<u16, Vec<bool>>,
}

impl Modes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, mode: DecMode, enable: bool) {
        self.set_dec_code(mode.code(), enable);
    }

    pub fn set_ansi(&mut self, mode: AnsiMode, enable: bool) {
        self.set_ansi_code(mode.code(), enable);
    }

    /// Record a DEC mode by numeric code, interpreted or not.
    pub fn set_dec_code(&mut self, code: u16, enable: bool) {
        self.touched_dec.insert(code);
        if enable {
            self.dec.insert(code);
        } else {
            self.dec.remove(&code);
        }
    }

    /// Record an ANSI mode by numeric code, interpreted or not.
    pub fn set_ansi_code(&mut self, code: u16, enable: bool) {
        self.touched_ansi.insert(code);
        if enable {
            self.ansi.insert(code);
        } else {
            self.ansi.remove(&code);
        }
    }

    #[must_use]
    pub fn enabled(&self, mode: DecMode) -> bool {
        self.dec.contains(&mode.code())
    }

    #[must_use]
    pub fn ansi_enabled(&self, mode: AnsiMode) -> bool {
        self.ansi.contains(&mode.code())
    }

    /// Push the current value of each given mode onto its save stack.
    pub fn save(&mut self, codes: &[u16]) {
        for &code in codes {
            let value = self.dec.contains(&code);
            self.saved.entry(code).or_default().push(value);
        }
    }

    /// Pop each given mode's save stack, restoring the popped value.
    ///
    /// A mode with an empty stack is left untouched.
    pub fn restore(&mut self, codes: &[u16]) -> Vec<(u16, bool)> {
        let mut restored = Vec::new();
        for &code in codes {
            if let Some(stack) = self.saved.get_mut(&code)
                && let Some(value) = stack.pop()
            {
                self.set_dec_code(code, value);
                restored.push((code, value));
            }
        }
        restored
    }

    /// DECRQM classification for an ANSI mode code.
    #[must_use]
    pub fn query_ansi(&self, code: u16) -> ModeResponse {
        self.classify(
            AnsiMode::from_code(code).is_some() || self.touched_ansi.contains(&code),
            self.ansi.contains(&code),
        )
    }

    /// DECRQM classification for a DEC private mode code.
    #[must_use]
    pub fn query_dec(&self, code: u16) -> ModeResponse {
        self.classify(
            DecMode::from_code(code).is_some() || self.touched_dec.contains(&code),
            self.dec.contains(&code),
        )
    }

    fn classify(&self, recognized: bool, enabled: bool) -> ModeResponse {
        if !recognized {
            ModeResponse::NotRecognized
        } else if enabled {
            ModeResponse::Set
        } else {
            ModeResponse::Reset
        }
    }
}
