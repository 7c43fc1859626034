#![forbid(unsafe_code)]

//! Host-agnostic VT terminal engine.
//!
//! `squallterm-core` is the control-sequence interpreter and screen model of
//! a VT100/VT220/VT420/VT510-family terminal, plus the common xterm/DEC
//! extensions (mouse tracking, bracketed paste, OSC 8 hyperlinks, sixel
//! imagery, window manipulation, 24-bit color, scrollback with reflow). It
//! consumes the byte stream of a process attached to a pseudo-terminal,
//! maintains an in-memory cell grid, and produces device replies and host
//! notifications — all without any I/O of its own.
//!
//! # Primary responsibilities
//!
//! - **Parser**: byte-at-a-time escape-sequence state machine (Paul
//!   Williams' VT500 model, extended with OSC/DCS/APC/SOS/PM and a sixel
//!   sub-parser).
//! - **Sequencer**: decodes parameters and dispatches each complete
//!   sequence onto the screen.
//! - **Grid**: lines with bounded history, margin-aware scrolling, and
//!   reflow on resize.
//! - **Screen**: dual buffers, cursor, margins, modes, palette, tab stops,
//!   hyperlink registry, image pool, and the reply protocol.
//! - **InputGenerator**: the inverse direction — keyboard/mouse/paste
//!   events to the byte sequences hosted programs expect.
//!
//! # Design principles
//!
//! - **No I/O**: bytes in, state + reply bytes out; the host owns the PTY.
//! - **Deterministic**: identical byte sequences always produce identical
//!   state.
//! - **Single-threaded**: one session is driven from one thread; callbacks
//!   are synchronous.
//! - **`#![forbid(unsafe_code)]`**: safety enforced at compile time.

pub mod cell;
pub mod charset;
pub mod event;
pub mod grid;
pub mod image;
pub mod input;
mod log;
pub mod modes;
pub mod palette;
pub mod parser;
pub mod screen;
pub mod sequencer;
pub mod sixel;

pub use cell::{
    Cell, CellFlags, Color, Hyperlink, HyperlinkId, HyperlinkRegistry, Rendition, StyleFlags,
};
pub use charset::{CharsetId, Charsets};
pub use event::{
    Clock, CursorDisplay, CursorShape, EventSink, ManualClock, MouseCursorShape, NullSink,
    ScreenType,
};
pub use grid::{CellPos, Grid, Line, LineFlags, LineOffset, Margin, PageSize};
pub use image::{Image, ImageFormat, ImageFragment, ImageId, ImagePool, PixelSize};
pub use input::{
    InputGenerator, Key, KeyMode, Modifier, MouseButton, MouseProtocol, MouseTransport,
    MouseWheelMode,
};
pub use modes::{AnsiMode, DecMode, ModeResponse, Modes};
pub use palette::{ColorPalette, ColorTarget, RgbColor};
pub use parser::{Params, Parser, Perform};
pub use screen::{Cursor, DynamicColorName, Screen, StatusStringRequest, VtType};
pub use sequencer::Sequencer;
pub use sixel::SixelDecoder;
