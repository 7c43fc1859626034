//! The authoritative terminal state and every operation the sequencer
//! dispatches onto it.
//!
//! A [`Screen`] owns two grids (primary with history, alternate without),
//! the cursor, margins, modes, palette, tab stops, hyperlink registry and
//! image pool. It emits device replies into an internal byte queue the host
//! drains, and host notifications through its [`EventSink`].
//!
//! Stream operations never fail: out-of-range arguments clamp, unknown
//! parameters default, and structural invariants are checked in debug
//! builds.

use crate::cell::{
    Cell, Color, HyperlinkId, HyperlinkRegistry, Rendition, StyleFlags, char_width,
};
use crate::charset::{CharsetId, Charsets};
use crate::event::{Clock, CursorDisplay, CursorShape, EventSink, ScreenType};
use crate::grid::{CellPos, Grid, Line, LineFlags, LineOffset, Margin, PageSize};
use crate::image::{ImageFormat, ImageFragment, ImagePool, PixelSize};
use crate::log::debug;
use crate::modes::{AnsiMode, DecMode, Modes};
use crate::palette::{ColorPalette, ColorTarget, RgbColor};
use crate::parser::Parser;
use crate::sequencer::Sequencer;
use unicode_segmentation::UnicodeSegmentation;

/// Milliseconds per cursor blink phase.
const CURSOR_BLINK_INTERVAL_MS: u64 = 500;

/// Conformance level advertised in DA1/DA2/DECSCL replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VtType {
    VT100,
    VT220,
    VT240,
    VT320,
    VT330,
    VT340,
    VT420,
    VT510,
    VT520,
    #[default]
    VT525,
}

impl VtType {
    /// Leading parameter of the DA1 reply.
    #[must_use]
    pub fn da1_id(self) -> u16 {
        match self {
            Self::VT100 => 1,
            Self::VT220 | Self::VT240 => 62,
            Self::VT320 | Self::VT330 | Self::VT340 => 63,
            Self::VT420 => 64,
            Self::VT510 | Self::VT520 | Self::VT525 => 65,
        }
    }

    /// Conformance level for the DECSCL status string (61..65).
    #[must_use]
    pub fn decscl_level(self) -> u16 {
        match self {
            Self::VT100 => 61,
            Self::VT220 | Self::VT240 => 62,
            Self::VT320 | Self::VT330 | Self::VT340 => 63,
            Self::VT420 => 64,
            Self::VT510 | Self::VT520 | Self::VT525 => 65,
        }
    }

    /// Terminal-type parameter of the DA2 reply.
    #[must_use]
    pub fn da2_id(self) -> u16 {
        match self {
            Self::VT100 => 0,
            Self::VT220 | Self::VT240 => 1,
            Self::VT320 | Self::VT330 | Self::VT340 => 24,
            Self::VT420 => 41,
            Self::VT510 => 61,
            Self::VT520 => 64,
            Self::VT525 => 65,
        }
    }
}

/// The cursor: position plus the state DECSC snapshots alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub pos: CellPos,
    pub rendition: Rendition,
    pub charsets: Charsets,
    pub auto_wrap: bool,
    pub origin_mode: bool,
    pub visible: bool,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            pos: CellPos::new(0, 0),
            rendition: Rendition::default(),
            charsets: Charsets::default(),
            auto_wrap: true,
            origin_mode: false,
            visible: true,
        }
    }
}

/// DECSC snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct SavedCursor {
    cursor: Option<Cursor>,
}

/// Tab-stop layout: explicit stops once any were set, otherwise implicit
/// stops every `tab_width` columns.
const DEFAULT_TAB_WIDTH: u16 = 8;

/// Authoritative terminal state.
pub struct Screen {
    size: PageSize,
    primary: Grid,
    alternate: Grid,
    active: ScreenType,
    cursor: Cursor,
    saved_cursor: SavedCursor,
    /// Cursor stashed by DECSET 1049 while the alternate screen is active.
    saved_primary_cursor: SavedCursor,
    wrap_pending: bool,
    margin: Margin,
    modes: Modes,
    /// Explicit tab-stop columns (0-based, sorted). Empty means implicit.
    tabs: Vec<u16>,
    tab_width: u16,
    palette: ColorPalette,
    default_palette: ColorPalette,
    hyperlinks: HyperlinkRegistry,
    current_hyperlink: HyperlinkId,
    images: ImagePool,
    window_title: String,
    saved_titles: Vec<String>,
    working_directory: Option<String>,
    replies: Vec<u8>,
    terminal_id: VtType,
    cursor_shape: CursorShape,
    cursor_display: CursorDisplay,
    /// Most recent printed character, for REP.
    last_graphic: Option<char>,
    /// Cell last written by text output, for grapheme continuation.
    last_write: Option<CellPos>,
    cell_pixel_size: (u16, u16),
    max_image_size: PixelSize,
    max_image_size_limit: PixelSize,
    color_register_count: u32,
    pub(crate) use_private_color_registers: bool,
    max_history: usize,
    sink: Box<dyn EventSink>,
    pub(crate) parser: Parser,
    pub(crate) sequencer: Sequencer,
}

impl std::fmt::Debug for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Screen")
            .field("size", &self.size)
            .field("active", &self.active)
            .field("cursor", &self.cursor)
            .field("margin", &self.margin)
            .finish_non_exhaustive()
    }
}

impl Screen {
    /// Construct with the given page size and history bound.
    pub fn new(size: PageSize, max_history: usize, sink: Box<dyn EventSink>) -> Self {
        let mut screen = Self {
            size,
            primary: Grid::new(size, max_history),
            alternate: Grid::new(size, 0),
            active: ScreenType::Primary,
            cursor: Cursor::default(),
            saved_cursor: SavedCursor::default(),
            saved_primary_cursor: SavedCursor::default(),
            wrap_pending: false,
            margin: Margin::full(size),
            modes: Modes::new(),
            tabs: Vec::new(),
            tab_width: DEFAULT_TAB_WIDTH,
            palette: ColorPalette::default(),
            default_palette: ColorPalette::default(),
            hyperlinks: HyperlinkRegistry::new(),
            current_hyperlink: 0,
            images: ImagePool::new(),
            window_title: String::new(),
            saved_titles: Vec::new(),
            working_directory: None,
            replies: Vec::new(),
            terminal_id: VtType::default(),
            cursor_shape: CursorShape::default(),
            cursor_display: CursorDisplay::default(),
            last_graphic: None,
            last_write: None,
            cell_pixel_size: (8, 16),
            max_image_size: PixelSize::new(4096, 4096),
            max_image_size_limit: PixelSize::new(4096, 4096),
            color_register_count: 256,
            use_private_color_registers: false,
            max_history,
            sink,
            parser: Parser::new(),
            sequencer: Sequencer::new(),
        };
        screen.modes.set(DecMode::AutoWrap, true);
        screen.modes.set(DecMode::TextReflow, true);
        screen.modes.set(DecMode::VisibleCursor, true);
        screen
    }

    // ── Introspection ───────────────────────────────────────────────

    #[must_use]
    pub fn page_size(&self) -> PageSize {
        self.size
    }

    #[must_use]
    pub fn screen_type(&self) -> ScreenType {
        self.active
    }

    #[must_use]
    pub fn grid(&self) -> &Grid {
        match self.active {
            ScreenType::Primary => &self.primary,
            ScreenType::Alternate => &self.alternate,
        }
    }

    fn grid_mut(&mut self) -> &mut Grid {
        match self.active {
            ScreenType::Primary => &mut self.primary,
            ScreenType::Alternate => &mut self.alternate,
        }
    }

    #[must_use]
    pub fn primary_grid(&self) -> &Grid {
        &self.primary
    }

    #[must_use]
    pub fn alternate_grid(&self) -> &Grid {
        &self.alternate
    }

    #[must_use]
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// The cursor position as reports see it: origin-relative when DECOM is
    /// on, 0-based.
    #[must_use]
    pub fn logical_cursor_position(&self) -> CellPos {
        if self.cursor.origin_mode {
            CellPos::new(
                self.cursor.pos.line.saturating_sub(self.margin.top),
                self.cursor.pos.column.saturating_sub(self.margin.left),
            )
        } else {
            self.cursor.pos
        }
    }

    #[must_use]
    pub fn wrap_pending(&self) -> bool {
        self.wrap_pending
    }

    #[must_use]
    pub fn margin(&self) -> Margin {
        self.margin
    }

    #[must_use]
    pub fn modes(&self) -> &Modes {
        &self.modes
    }

    #[must_use]
    pub fn window_title(&self) -> &str {
        &self.window_title
    }

    #[must_use]
    pub fn working_directory(&self) -> Option<&str> {
        self.working_directory.as_deref()
    }

    #[must_use]
    pub fn hyperlinks(&self) -> &HyperlinkRegistry {
        &self.hyperlinks
    }

    #[must_use]
    pub fn images(&self) -> &ImagePool {
        &self.images
    }

    #[must_use]
    pub fn palette(&self) -> &ColorPalette {
        &self.palette
    }

    #[must_use]
    pub fn cursor_style(&self) -> (CursorDisplay, CursorShape) {
        (self.cursor_display, self.cursor_shape)
    }

    /// Whether the cursor is in its visible blink phase at `clock`'s now.
    #[must_use]
    pub fn cursor_blink_visible(&self, clock: &dyn Clock) -> bool {
        if !self.cursor.visible {
            return false;
        }
        if self.cursor_display == CursorDisplay::Steady {
            return true;
        }
        (clock.now_millis() / CURSOR_BLINK_INTERVAL_MS) % 2 == 0
    }

    /// The visible page as text, one `\n`-terminated row per line.
    #[must_use]
    pub fn render_text(&self) -> String {
        self.grid().render_page_text()
    }

    /// Take all pending device-reply bytes.
    pub fn drain_replies(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.replies)
    }

    /// Pending device-reply bytes, without consuming.
    #[must_use]
    pub fn pending_replies(&self) -> &[u8] {
        &self.replies
    }

    pub(crate) fn reply_str(&mut self, s: &str) {
        self.replies.extend_from_slice(s.as_bytes());
    }

    pub(crate) fn sink(&mut self) -> &mut dyn EventSink {
        &mut *self.sink
    }

    /// Change the cell pixel geometry reported by XTWINOPS 14/16 and used
    /// for sixel cell math.
    pub fn set_cell_pixel_size(&mut self, width: u16, height: u16) {
        self.cell_pixel_size = (width.max(1), height.max(1));
    }

    // ── Text output ─────────────────────────────────────────────────

    /// Write one printable codepoint at the cursor.
    ///
    /// `consecutive` is true when the immediately preceding operation was
    /// also text output; only then may this codepoint merge into the
    /// previous cell's grapheme cluster.
    pub fn write_text(&mut self, ch: char, consecutive: bool) {
        if ch == '\0' {
            return;
        }

        if self.wrap_pending && self.cursor.auto_wrap {
            let left = self.margin.left;
            self.linefeed_to_column(left);
            if self.modes.enabled(DecMode::TextReflow) {
                let line = self.cursor.pos.line;
                if let Some(line) = self.grid_mut().page_line_mut(line) {
                    line.set_wrapped(true);
                }
            }
        }

        let ch = if (ch as u32) < 0x7F {
            self.cursor.charsets.map(ch)
        } else if ch == '\u{7F}' {
            ' '
        } else {
            ch
        };

        let appended = consecutive
            && self.last_write.is_some_and(|pos| {
                self.grid()
                    .cell(pos)
                    .and_then(|cell| cell.codepoints().last().copied())
                    .is_some_and(|prev| nonbreakable(prev, ch))
            });

        if appended {
            let pos = self.last_write.unwrap_or_default();
            let grown = self
                .grid_mut()
                .cell_mut(pos)
                .map_or(0, |cell| cell.append(ch));
            if grown > 0 {
                self.clear_and_advance(grown);
            }
        } else {
            self.write_char_and_advance(ch);
        }
        self.last_graphic = Some(ch);
    }

    fn write_char_and_advance(&mut self, ch: char) {
        let width = char_width(ch);

        if self.modes.ansi_enabled(AnsiMode::Insert) && width > 0 {
            self.insert_characters(u16::from(width));
        }

        let pos = self.cursor.pos;
        self.release_cell_payload(pos);
        let link = self.current_hyperlink;
        self.hyperlinks.acquire(link);
        let rendition = self.cursor.rendition;
        let mut cell = Cell::default();
        cell.write(ch, width.max(1).min(2), rendition, link);
        if width == 0 {
            // A standalone zero-width mark occupies the cell without
            // advancing the cursor.
            self.grid_mut().write_cell(pos, cell);
            self.last_write = Some(pos);
            return;
        }
        self.grid_mut().write_cell(pos, cell);
        self.last_write = Some(pos);

        let span = u16::from(width);
        let right = self.right_boundary();
        if pos.column + span - 1 <= right {
            // The whole character fits: lay down continuation cells, then
            // advance (parking at the margin when the advance would cross).
            for i in 1..span {
                let cont_pos = CellPos::new(pos.line, pos.column + i);
                self.release_cell_payload(cont_pos);
                self.hyperlinks.acquire(link);
                if let Some(cell) = self.grid_mut().cell_mut(cont_pos) {
                    cell.make_continuation(rendition, link);
                }
            }
            self.cursor.pos.column = pos.column + span;
            if self.cursor.pos.column > right {
                self.cursor.pos.column = right;
                if self.cursor.auto_wrap {
                    self.wrap_pending = true;
                }
            }
        } else if self.cursor.auto_wrap {
            // A wide character on the last column: the head is written
            // clipped and the next glyph wraps first.
            self.wrap_pending = true;
        }
    }

    /// Advance over `n` cells, turning them into continuations of the last
    /// written cell (used when a grapheme append widened that cell).
    fn clear_and_advance(&mut self, n: u8) {
        let base = self.last_write.unwrap_or(self.cursor.pos);
        let right = self.right_boundary();
        if base.column + u16::from(n) > right {
            if self.cursor.auto_wrap {
                self.wrap_pending = true;
            }
            return;
        }
        let rendition = self.cursor.rendition;
        let link = self.current_hyperlink;
        for i in 1..=u16::from(n) {
            let pos = CellPos::new(base.line, base.column + i);
            self.release_cell_payload(pos);
            self.hyperlinks.acquire(link);
            if let Some(cell) = self.grid_mut().cell_mut(pos) {
                cell.make_continuation(rendition, link);
            }
        }
        self.cursor.pos.column += u16::from(n);
        if self.cursor.pos.column > right {
            self.cursor.pos.column = right;
            if self.cursor.auto_wrap {
                self.wrap_pending = true;
            }
        }
    }

    /// REP: repeat the last printed graphic character.
    pub fn repeat_last_character(&mut self, count: u16) {
        if let Some(ch) = self.last_graphic {
            for _ in 0..count.max(1) {
                self.write_char_and_advance(ch);
            }
        }
    }

    /// Rightmost addressable column for the cursor's current line.
    fn right_boundary(&self) -> u16 {
        if self.modes.enabled(DecMode::LeftRightMargin) && self.margin.contains(self.cursor.pos) {
            self.margin.right
        } else {
            self.size.columns - 1
        }
    }

    // ── C0 / cursor primitives ──────────────────────────────────────

    pub fn linefeed(&mut self) {
        if self.modes.ansi_enabled(AnsiMode::AutomaticNewline) {
            let left = self.margin.left;
            self.linefeed_to_column(left);
        } else {
            let col = self.cursor.pos.column;
            self.linefeed_to_column(col);
        }
    }

    fn linefeed_to_column(&mut self, column: u16) {
        self.wrap_pending = false;
        if self.cursor.pos.line == self.margin.bottom
            || self.cursor.pos.line == self.size.lines - 1
        {
            self.scroll_up(1);
            self.cursor.pos.column = column.min(self.size.columns - 1);
        } else {
            self.cursor.pos.line += 1;
            self.cursor.pos.column = column.min(self.size.columns - 1);
        }
    }

    pub fn carriage_return(&mut self) {
        self.wrap_pending = false;
        self.cursor.pos.column = if self.modes.enabled(DecMode::LeftRightMargin)
            && self.cursor.pos.column >= self.margin.left
        {
            self.margin.left
        } else {
            0
        };
    }

    pub fn backspace(&mut self) {
        // Never wraps to the prior line.
        self.wrap_pending = false;
        self.cursor.pos.column = self.cursor.pos.column.saturating_sub(1);
    }

    pub fn bell(&mut self) {
        self.sink.bell();
    }

    /// IND: down one line, scrolling at the bottom margin.
    pub fn index(&mut self) {
        if self.cursor.pos.line == self.margin.bottom {
            self.scroll_up(1);
        } else if self.cursor.pos.line < self.size.lines - 1 {
            self.cursor.pos.line += 1;
        }
        self.wrap_pending = false;
    }

    /// RI: up one line, scrolling at the top margin.
    pub fn reverse_index(&mut self) {
        if self.cursor.pos.line == self.margin.top {
            self.scroll_down(1);
        } else {
            self.cursor.pos.line = self.cursor.pos.line.saturating_sub(1);
        }
        self.wrap_pending = false;
    }

    /// DECBI: left one column, at the left margin the region shifts right.
    pub fn back_index(&mut self) {
        if self.cursor.pos.column == self.margin.left {
            self.insert_columns_at(self.margin.left, 1);
        } else {
            self.cursor.pos.column -= 1;
        }
        self.wrap_pending = false;
    }

    /// DECFI: right one column, at the right margin the region shifts left.
    pub fn forward_index(&mut self) {
        if self.cursor.pos.column == self.margin.right {
            self.delete_columns_at(self.margin.left, 1);
        } else if self.cursor.pos.column < self.size.columns - 1 {
            self.cursor.pos.column += 1;
        }
        self.wrap_pending = false;
    }

    /// NEL: first column of the next line.
    pub fn next_line(&mut self) {
        let left = self.margin.left;
        self.linefeed_to_column(left);
    }

    // ── Cursor movement ─────────────────────────────────────────────

    /// Move to a logical position: origin-relative when DECOM is on,
    /// clamped into the addressable region.
    pub fn move_cursor_to(&mut self, line: u16, column: u16) {
        self.wrap_pending = false;
        self.cursor.pos = self.to_real(line, column);
    }

    fn to_real(&self, line: u16, column: u16) -> CellPos {
        if self.cursor.origin_mode {
            CellPos::new(
                self.margin.top.saturating_add(line).min(self.margin.bottom),
                self.margin.left.saturating_add(column).min(self.margin.right),
            )
        } else {
            CellPos::new(
                line.min(self.size.lines - 1),
                column.min(self.size.columns - 1),
            )
        }
    }

    pub fn move_cursor_up(&mut self, n: u16) {
        let n = n.max(1);
        let limit = if self.cursor.pos.line > self.margin.top {
            self.cursor.pos.line - self.margin.top
        } else {
            self.cursor.pos.line
        };
        self.cursor.pos.line -= n.min(limit);
    }

    pub fn move_cursor_down(&mut self, n: u16) {
        let n = n.max(1);
        let line = self.cursor.pos.line;
        let limit = if line <= self.margin.bottom {
            self.margin.bottom - line
        } else {
            self.size.lines - 1 - line
        };
        self.cursor.pos.line += n.min(limit);
    }

    pub fn move_cursor_forward(&mut self, n: u16) {
        let n = n.max(1);
        let limit = self.right_boundary().saturating_sub(self.cursor.pos.column);
        self.cursor.pos.column += n.min(limit);
    }

    pub fn move_cursor_backward(&mut self, n: u16) {
        self.wrap_pending = false;
        let n = n.max(1);
        let left = if self.modes.enabled(DecMode::LeftRightMargin)
            && self.cursor.pos.column >= self.margin.left
        {
            self.margin.left
        } else {
            0
        };
        let limit = self.cursor.pos.column - left;
        self.cursor.pos.column -= n.min(limit);
    }

    /// CHA: absolute column (logical, 0-based).
    pub fn move_cursor_to_column(&mut self, column: u16) {
        self.wrap_pending = false;
        let col = if self.cursor.origin_mode {
            self.margin.left.saturating_add(column).min(self.margin.right)
        } else {
            column.min(self.size.columns - 1)
        };
        self.cursor.pos.column = col;
    }

    /// VPA: absolute line (logical, 0-based), column unchanged.
    pub fn move_cursor_to_line(&mut self, line: u16) {
        let column = self.logical_cursor_position().column;
        self.move_cursor_to(line, column);
    }

    /// CNL: down `n`, column 1.
    pub fn move_cursor_to_next_line(&mut self, n: u16) {
        let line = self.logical_cursor_position().line;
        self.move_cursor_to(line.saturating_add(n.max(1)), 0);
    }

    /// CPL: up `n`, column 1.
    pub fn move_cursor_to_prev_line(&mut self, n: u16) {
        let line = self.logical_cursor_position().line;
        self.move_cursor_to(line.saturating_sub(n.max(1)), 0);
    }

    // ── Tabs ────────────────────────────────────────────────────────

    /// HT: advance to the next tab stop (right margin when none remain,
    /// next line when already there).
    pub fn move_cursor_to_next_tab(&mut self) {
        self.wrap_pending = false;
        let col = self.cursor.pos.column;
        let right = self.margin.right;
        if let Some(stop) = self.next_tab_stop(col) {
            self.cursor.pos.column = stop.min(right);
        } else if col < right {
            self.cursor.pos.column = right;
        } else {
            self.move_cursor_to_next_line(1);
        }
    }

    /// CHT: `n` forward tabulations.
    pub fn cursor_forward_tab(&mut self, n: u16) {
        for _ in 0..n.max(1) {
            self.move_cursor_to_next_tab();
        }
    }

    /// CBT: `n` backward tabulations; stops at the left margin.
    pub fn cursor_backward_tab(&mut self, n: u16) {
        self.wrap_pending = false;
        for _ in 0..n.max(1) {
            let col = self.cursor.pos.column;
            match self.prev_tab_stop(col) {
                Some(stop) => self.cursor.pos.column = stop,
                None => {
                    self.cursor.pos.column = self.margin.left;
                    break;
                }
            }
        }
    }

    fn next_tab_stop(&self, after: u16) -> Option<u16> {
        if !self.tabs.is_empty() {
            self.tabs.iter().copied().find(|&stop| stop > after)
        } else if self.tab_width > 0 {
            let width = u32::from(self.tab_width);
            let next = (u32::from(after) / width + 1) * width;
            (next < u32::from(self.size.columns)).then_some(next as u16)
        } else {
            None
        }
    }

    fn prev_tab_stop(&self, before: u16) -> Option<u16> {
        if !self.tabs.is_empty() {
            self.tabs.iter().rev().copied().find(|&stop| stop < before)
        } else if self.tab_width > 0 && before > 0 {
            Some((before - 1) / self.tab_width * self.tab_width)
        } else {
            None
        }
    }

    /// HTS: set a stop at the cursor column.
    pub fn set_tab_under_cursor(&mut self) {
        self.materialize_tabs();
        let col = self.cursor.pos.column;
        if let Err(at) = self.tabs.binary_search(&col) {
            self.tabs.insert(at, col);
        }
    }

    /// TBC 0: clear the stop at the cursor column.
    pub fn clear_tab_under_cursor(&mut self) {
        self.materialize_tabs();
        let col = self.cursor.pos.column;
        self.tabs.retain(|&stop| stop != col);
    }

    /// TBC 3: clear all stops.
    pub fn clear_all_tabs(&mut self) {
        self.tabs.clear();
        self.tab_width = 0;
    }

    /// Convert implicit `tab_width` stops into the explicit list so that
    /// individual stops can be edited.
    fn materialize_tabs(&mut self) {
        if self.tabs.is_empty() && self.tab_width > 0 {
            let mut col = self.tab_width;
            while col < self.size.columns {
                self.tabs.push(col);
                col += self.tab_width;
            }
        }
    }

    // ── Save / restore cursor ───────────────────────────────────────

    pub fn save_cursor(&mut self) {
        self.saved_cursor.cursor = Some(self.cursor);
    }

    pub fn restore_cursor(&mut self) {
        if let Some(saved) = self.saved_cursor.cursor {
            self.restore_cursor_state(saved);
        } else {
            // DECRC without a prior DECSC restores the power-on cursor.
            self.restore_cursor_state(Cursor::default());
        }
    }

    fn restore_cursor_state(&mut self, saved: Cursor) {
        self.wrap_pending = false;
        self.cursor = saved;
        self.cursor.pos = CellPos::new(
            saved.pos.line.min(self.size.lines - 1),
            saved.pos.column.min(self.size.columns - 1),
        );
        self.modes.set(DecMode::AutoWrap, saved.auto_wrap);
        self.modes.set(DecMode::Origin, saved.origin_mode);
    }

    // ── Erase / edit ────────────────────────────────────────────────

    /// ED 0.
    pub fn clear_to_end_of_screen(&mut self) {
        self.clear_to_end_of_line();
        for line in self.cursor.pos.line + 1..self.size.lines {
            self.erase_line_range(line, 0, self.size.columns);
        }
    }

    /// ED 1.
    pub fn clear_to_begin_of_screen(&mut self) {
        self.clear_to_begin_of_line();
        for line in 0..self.cursor.pos.line {
            self.erase_line_range(line, 0, self.size.columns);
        }
    }

    /// ED 2: the page scrolls into history rather than being destroyed, so
    /// cleared content stays reachable in scrollback.
    pub fn clear_screen(&mut self) {
        self.scroll_up(self.size.lines);
    }

    /// ED 3.
    pub fn clear_scrollback(&mut self) {
        let dropped = self.primary.clear_history();
        for line in dropped {
            self.release_line_payload(&line);
        }
        self.sink.scrollback_buffer_cleared();
    }

    /// EL 0.
    pub fn clear_to_end_of_line(&mut self) {
        let (line, col) = (self.cursor.pos.line, self.cursor.pos.column);
        self.erase_line_range(line, col, self.size.columns);
    }

    /// EL 1.
    pub fn clear_to_begin_of_line(&mut self) {
        let (line, col) = (self.cursor.pos.line, self.cursor.pos.column);
        self.erase_line_range(line, 0, col + 1);
    }

    /// EL 2.
    pub fn clear_line(&mut self) {
        let line = self.cursor.pos.line;
        self.erase_line_range(line, 0, self.size.columns);
    }

    /// ECH: erase `n` cells rightward from the cursor without moving it.
    pub fn erase_characters(&mut self, n: u16) {
        let (line, col) = (self.cursor.pos.line, self.cursor.pos.column);
        let end = col.saturating_add(n.max(1)).min(self.size.columns);
        self.erase_line_range(line, col, end);
    }

    /// Erase `[from, to)` on a page line with the current background,
    /// releasing any cell payloads first.
    fn erase_line_range(&mut self, line: u16, from: u16, to: u16) {
        let bg = self.cursor.rendition.bg;
        self.release_range_payload(line, from, to);
        if let Some(line) = self.grid_mut().page_line_mut(line) {
            let to = (to as usize).min(line.cells().len());
            for cell in &mut line.cells_mut()[from as usize..to] {
                cell.erase(bg);
            }
        }
    }

    /// IL: insert `n` blank lines at the cursor, inside the scroll region.
    pub fn insert_lines(&mut self, n: u16) {
        if !self.cursor_inside_margins() {
            return;
        }
        let region = Margin {
            top: self.cursor.pos.line,
            ..self.margin
        };
        self.scroll_down_region(n.max(1), region);
    }

    /// DL: delete `n` lines at the cursor, inside the scroll region.
    pub fn delete_lines(&mut self, n: u16) {
        if !self.cursor_inside_margins() {
            return;
        }
        let region = Margin {
            top: self.cursor.pos.line,
            ..self.margin
        };
        self.scroll_up_region(n.max(1), region);
    }

    /// ICH: insert `n` blanks at the cursor, shifting the rest of the line
    /// toward the right margin.
    pub fn insert_characters(&mut self, n: u16) {
        if self.cursor_inside_margins() {
            let line = self.cursor.pos.line;
            self.insert_chars_in_line(line, n.max(1));
        }
    }

    fn insert_chars_in_line(&mut self, line: u16, n: u16) {
        let col = self.cursor.pos.column.max(self.margin.left);
        let right = self.margin.right;
        if col > right {
            return;
        }
        let n = n.min(right - col + 1);
        let bg = self.cursor.rendition.bg;
        // The n cells at the right margin fall off.
        self.release_range_payload(line, right + 1 - n, right + 1);
        if let Some(line) = self.grid_mut().page_line_mut(line) {
            let span = &mut line.cells_mut()[col as usize..=right as usize];
            span.rotate_right(n as usize);
            for cell in &mut span[..n as usize] {
                cell.erase(bg);
            }
        }
    }

    /// DCH: delete `n` cells at the cursor, closing the gap from the right
    /// margin.
    pub fn delete_characters(&mut self, n: u16) {
        if self.cursor_inside_margins() && n != 0 {
            let line = self.cursor.pos.line;
            self.delete_chars_in_line(line, n);
        }
    }

    fn delete_chars_in_line(&mut self, line: u16, n: u16) {
        let col = self.cursor.pos.column.max(self.margin.left);
        let right = self.margin.right;
        if col > right {
            return;
        }
        let n = n.min(right - col + 1);
        let bg = self.cursor.rendition.bg;
        self.release_range_payload(line, col, col + n);
        if let Some(line) = self.grid_mut().page_line_mut(line) {
            let span = &mut line.cells_mut()[col as usize..=right as usize];
            span.rotate_left(n as usize);
            let len = span.len();
            for cell in &mut span[len - n as usize..] {
                cell.erase(bg);
            }
        }
    }

    /// DECIC: insert `n` blank columns at the cursor within the margins.
    pub fn insert_columns(&mut self, n: u16) {
        if self.cursor_inside_margins() {
            self.insert_columns_at(self.cursor.pos.column, n.max(1));
        }
    }

    fn insert_columns_at(&mut self, column: u16, n: u16) {
        let saved = self.cursor.pos.column;
        self.cursor.pos.column = column;
        for line in self.margin.top..=self.margin.bottom {
            self.insert_chars_in_line(line, n);
        }
        self.cursor.pos.column = saved;
    }

    /// DECDC: delete `n` columns at the cursor within the margins.
    pub fn delete_columns(&mut self, n: u16) {
        if self.cursor_inside_margins() {
            self.delete_columns_at(self.cursor.pos.column, n.max(1));
        }
    }

    fn delete_columns_at(&mut self, column: u16, n: u16) {
        let saved = self.cursor.pos.column;
        self.cursor.pos.column = column;
        for line in self.margin.top..=self.margin.bottom {
            self.delete_chars_in_line(line, n);
        }
        self.cursor.pos.column = saved;
    }

    fn cursor_inside_margins(&self) -> bool {
        let vertical = (self.margin.top..=self.margin.bottom).contains(&self.cursor.pos.line);
        let horizontal = !self.modes.enabled(DecMode::LeftRightMargin)
            || (self.margin.left..=self.margin.right).contains(&self.cursor.pos.column);
        vertical && horizontal
    }

    // ── Rectangular operations ──────────────────────────────────────

    /// DECCRA: copy a rectangle. Page parameters are accepted and ignored.
    pub fn copy_area(&mut self, top: u16, left: u16, bottom: u16, right: u16, to_top: u16, to_left: u16) {
        let bottom = bottom.min(self.size.lines - 1);
        let right = right.min(self.size.columns - 1);
        if bottom < top || right < left {
            return;
        }
        if top == to_top && left == to_left {
            return;
        }
        let height = bottom - top + 1;
        let width = right - left + 1;
        // Iterate away from the overlap so a self-overlapping copy reads
        // each source cell before it is overwritten.
        let rows: Vec<u16> = if to_top > top {
            (0..height).rev().collect()
        } else {
            (0..height).collect()
        };
        let cols: Vec<u16> = if to_left > left {
            (0..width).rev().collect()
        } else {
            (0..width).collect()
        };
        for &dy in &rows {
            for &dx in &cols {
                let src = CellPos::new(top + dy, left + dx);
                let dst = CellPos::new(to_top.saturating_add(dy), to_left.saturating_add(dx));
                if dst.line >= self.size.lines || dst.column >= self.size.columns {
                    continue;
                }
                let Some(cell) = self.grid().cell(src).cloned() else {
                    continue;
                };
                self.release_cell_payload(dst);
                self.hyperlinks.acquire(cell.hyperlink);
                if let Some(fragment) = cell.image {
                    self.images.acquire(fragment.image);
                }
                self.grid_mut().write_cell(dst, cell);
            }
        }
    }

    /// DECERA: erase a rectangle to default blanks.
    pub fn erase_area(&mut self, top: u16, left: u16, bottom: u16, right: u16) {
        if top > bottom || left > right || left >= self.size.columns {
            return;
        }
        let right = right.min(self.size.columns - 1);
        for line in top..=bottom.min(self.size.lines - 1) {
            self.release_range_payload(line, left, right + 1);
            if let Some(line) = self.grid_mut().page_line_mut(line) {
                for cell in &mut line.cells_mut()[left as usize..=right as usize] {
                    cell.clear();
                }
            }
        }
    }

    /// DECFRA: fill a rectangle with a character in the current rendition.
    pub fn fill_area(&mut self, ch: char, top: u16, left: u16, bottom: u16, right: u16) {
        let code = ch as u32;
        if !(32..=126).contains(&code) && !(160..=255).contains(&code) {
            return;
        }
        if top > bottom || left > right || left >= self.size.columns {
            return;
        }
        let right = right.min(self.size.columns - 1);
        let rendition = self.cursor.rendition;
        for line in top..=bottom.min(self.size.lines - 1) {
            self.release_range_payload(line, left, right + 1);
            if let Some(line) = self.grid_mut().page_line_mut(line) {
                for cell in &mut line.cells_mut()[left as usize..=right as usize] {
                    cell.write(ch, 1, rendition, 0);
                }
            }
        }
    }

    // ── Scrolling ───────────────────────────────────────────────────

    /// SU: scroll the region up by `n`.
    pub fn scroll_up(&mut self, n: u16) {
        let margin = self.margin;
        self.scroll_up_region(n, margin);
    }

    /// SD: scroll the region down by `n`.
    pub fn scroll_down(&mut self, n: u16) {
        let margin = self.margin;
        self.scroll_down_region(n, margin);
    }

    fn scroll_up_region(&mut self, n: u16, region: Margin) {
        let bg = self.cursor.rendition.bg;
        if !region.is_full(self.size) {
            // The top n line-spans are destroyed rather than archived.
            let dropped = n.min(region.height());
            for line in region.top..region.top + dropped {
                self.release_range_payload(line, region.left, region.right + 1);
            }
        }
        let evicted = self.grid_mut().scroll_up(n, region, bg);
        for line in evicted {
            self.release_line_payload(&line);
        }
        self.last_write = None;
    }

    fn scroll_down_region(&mut self, n: u16, region: Margin) {
        let bg = self.cursor.rendition.bg;
        let dropped = n.min(region.height());
        for line in region.bottom + 1 - dropped..=region.bottom {
            self.release_range_payload(line, region.left, region.right + 1);
        }
        self.grid_mut().scroll_down(n, region, bg);
        self.last_write = None;
    }

    // ── Margins ─────────────────────────────────────────────────────

    /// DECSTBM. Parameters are 1-based; 0/absent means the page edge.
    pub fn set_top_bottom_margin(&mut self, top: Option<u16>, bottom: Option<u16>) {
        let top = top.unwrap_or(1).max(1) - 1;
        let bottom = bottom
            .unwrap_or(self.size.lines)
            .min(self.size.lines)
            .max(1)
            - 1;
        if top < bottom {
            self.margin.top = top;
            self.margin.bottom = bottom;
            self.move_cursor_to(0, 0);
        }
    }

    /// DECSLRM: only honoured while DECLRMM is enabled.
    pub fn set_left_right_margin(&mut self, left: Option<u16>, right: Option<u16>) {
        if !self.modes.enabled(DecMode::LeftRightMargin) {
            return;
        }
        let left = left.unwrap_or(1).max(1) - 1;
        let right = right
            .unwrap_or(self.size.columns)
            .min(self.size.columns)
            .max(1)
            - 1;
        if left < right {
            self.margin.left = left;
            self.margin.right = right;
            self.move_cursor_to(0, 0);
        }
    }

    // ── Modes ───────────────────────────────────────────────────────

    /// SM / RM.
    pub fn set_ansi_mode(&mut self, code: u16, enable: bool) {
        if let Some(mode) = AnsiMode::from_code(code) {
            debug!(code, enable, "ANSI mode");
            self.modes.set_ansi(mode, enable);
        } else {
            self.modes.set_ansi_code(code, enable);
        }
    }

    /// DECSET / DECRST, with side effects.
    pub fn set_dec_mode(&mut self, code: u16, enable: bool) {
        let Some(mode) = DecMode::from_code(code) else {
            self.modes.set_dec_code(code, enable);
            return;
        };
        debug!(code, enable, "DEC mode");
        match mode {
            DecMode::AutoWrap => self.cursor.auto_wrap = enable,
            DecMode::Origin => {
                self.cursor.origin_mode = enable;
                self.modes.set(mode, enable);
                self.move_cursor_to(0, 0);
            }
            DecMode::LeftRightMargin => {
                if !enable {
                    self.margin.left = 0;
                    self.margin.right = self.size.columns - 1;
                    self.wrap_pending = false;
                }
            }
            DecMode::Columns132 => {
                let columns = if enable { 132 } else { 80 };
                self.resize_columns(columns);
            }
            DecMode::TextReflow => {
                if self.active == ScreenType::Primary {
                    self.primary.reflow = enable;
                    let from = if enable { 0 } else { self.cursor.pos.line };
                    for line in from..self.size.lines {
                        if let Some(line) = self.primary.page_line_mut(line) {
                            line.flags.set(LineFlags::WRAPPABLE, enable);
                        }
                    }
                }
            }
            DecMode::AlternateScreen | DecMode::AlternateScreenErase => {
                self.set_buffer(if enable {
                    ScreenType::Alternate
                } else {
                    ScreenType::Primary
                });
            }
            DecMode::AlternateScreenSaveCursor => {
                if enable {
                    self.saved_primary_cursor.cursor = Some(self.cursor);
                    self.set_buffer(ScreenType::Alternate);
                    self.clear_alternate_buffer();
                } else {
                    self.set_buffer(ScreenType::Primary);
                    if let Some(saved) = self.saved_primary_cursor.cursor.take() {
                        self.restore_cursor_state(saved);
                    }
                }
            }
            DecMode::SaveCursor => {
                if enable {
                    self.save_cursor();
                } else {
                    self.restore_cursor();
                }
            }
            DecMode::ApplicationCursorKeys => {
                self.sink.use_application_cursor_keys(enable);
                if self.active == ScreenType::Alternate {
                    self.sink.set_mouse_wheel_mode(if enable {
                        crate::input::MouseWheelMode::ApplicationCursorKeys
                    } else {
                        crate::input::MouseWheelMode::NormalCursorKeys
                    });
                }
            }
            DecMode::BracketedPaste => self.sink.set_bracketed_paste(enable),
            DecMode::MouseSgr => {
                self.sink.set_mouse_transport(if enable {
                    crate::input::MouseTransport::Sgr
                } else {
                    crate::input::MouseTransport::Default
                });
            }
            DecMode::MouseExtended => {
                if enable {
                    self.sink
                        .set_mouse_transport(crate::input::MouseTransport::Extended);
                }
            }
            DecMode::MouseUrxvt => {
                if enable {
                    self.sink
                        .set_mouse_transport(crate::input::MouseTransport::Urxvt);
                }
            }
            DecMode::MouseAlternateScroll => {
                self.sink.set_mouse_wheel_mode(if enable {
                    crate::input::MouseWheelMode::ApplicationCursorKeys
                } else {
                    crate::input::MouseWheelMode::NormalCursorKeys
                });
            }
            DecMode::FocusTracking => self.sink.set_generate_focus_events(enable),
            DecMode::PrivateColorRegisters => self.use_private_color_registers = enable,
            DecMode::VisibleCursor => {
                self.cursor.visible = enable;
                self.sink.set_cursor_visibility(enable);
            }
            DecMode::BlinkingCursor => {
                self.cursor_display = if enable {
                    CursorDisplay::Blinking
                } else {
                    CursorDisplay::Steady
                };
                let (display, shape) = (self.cursor_display, self.cursor_shape);
                self.sink.set_cursor_style(display, shape);
            }
            DecMode::MouseProtocolX10 => self.send_mouse_events(crate::input::MouseProtocol::X10, enable),
            DecMode::MouseProtocolNormalTracking => {
                self.send_mouse_events(crate::input::MouseProtocol::NormalTracking, enable);
            }
            DecMode::MouseProtocolHighlightTracking => {
                self.send_mouse_events(crate::input::MouseProtocol::HighlightTracking, enable);
            }
            DecMode::MouseProtocolButtonTracking => {
                self.send_mouse_events(crate::input::MouseProtocol::ButtonTracking, enable);
            }
            DecMode::MouseProtocolAnyEventTracking => {
                self.send_mouse_events(crate::input::MouseProtocol::AnyEventTracking, enable);
            }
            DecMode::ReverseVideo => self.sink.screen_updated(),
            DecMode::SmoothScroll
            | DecMode::AutoRepeat
            | DecMode::NoSixelScrolling
            | DecMode::BatchedRendering
            | DecMode::SixelCursorNextToGraphic => {}
        }
        self.modes.set(mode, enable);
    }

    fn send_mouse_events(&mut self, protocol: crate::input::MouseProtocol, enable: bool) {
        self.sink.set_mouse_protocol(protocol, enable);
    }

    /// XTSAVE.
    pub fn save_modes(&mut self, codes: &[u16]) {
        self.modes.save(codes);
    }

    /// XTRESTORE: restored values re-run their side effects.
    pub fn restore_modes(&mut self, codes: &[u16]) {
        for (code, value) in self.modes.restore(codes) {
            self.set_dec_mode(code, value);
        }
    }

    fn set_buffer(&mut self, target: ScreenType) {
        if self.active == target {
            return;
        }
        self.active = target;
        match target {
            ScreenType::Primary => {
                self.sink
                    .set_mouse_wheel_mode(crate::input::MouseWheelMode::Default);
            }
            ScreenType::Alternate => {
                self.sink.set_mouse_wheel_mode(
                    if self.modes.enabled(DecMode::MouseAlternateScroll) {
                        crate::input::MouseWheelMode::ApplicationCursorKeys
                    } else {
                        crate::input::MouseWheelMode::NormalCursorKeys
                    },
                );
            }
        }
        self.last_write = None;
        self.sink.buffer_changed(target);
    }

    fn clear_alternate_buffer(&mut self) {
        for line in 0..self.size.lines {
            let cells: Vec<(HyperlinkId, Option<ImageFragment>)> = self
                .alternate
                .page_line(line)
                .map(|l| {
                    l.cells()
                        .iter()
                        .map(|c| (c.hyperlink, c.image))
                        .collect()
                })
                .unwrap_or_default();
            for (link, image) in cells {
                self.hyperlinks.release(link);
                if let Some(fragment) = image {
                    if self.images.release(fragment.image) {
                        self.sink.discard_image(fragment.image);
                    }
                }
            }
            if let Some(l) = self.alternate.page_line_mut(line) {
                l.erase(Color::Default);
            }
        }
    }

    // ── SGR ─────────────────────────────────────────────────────────

    pub fn set_foreground_color(&mut self, color: Color) {
        self.cursor.rendition.fg = color;
    }

    pub fn set_background_color(&mut self, color: Color) {
        self.cursor.rendition.bg = color;
    }

    pub fn set_underline_color(&mut self, color: Color) {
        self.cursor.rendition.underline_color = color;
    }

    pub fn rendition_mut(&mut self) -> &mut Rendition {
        &mut self.cursor.rendition
    }

    #[must_use]
    pub fn rendition(&self) -> Rendition {
        self.cursor.rendition
    }

    // ── Hyperlinks ──────────────────────────────────────────────────

    /// OSC 8: empty URI ends the current link.
    pub fn hyperlink(&mut self, tag: Option<&str>, uri: &str) {
        self.current_hyperlink = self.hyperlinks.open(tag, uri);
    }

    #[must_use]
    pub fn current_hyperlink_uri(&self) -> Option<&str> {
        self.hyperlinks
            .get(self.current_hyperlink)
            .map(|link| link.uri.as_str())
    }

    // ── Device reports ──────────────────────────────────────────────

    /// DSR 5: operating status.
    pub fn device_status_report(&mut self) {
        self.reply_str("\x1b[0n");
    }

    /// DSR 6: cursor position report.
    pub fn report_cursor_position(&mut self) {
        let pos = self.logical_cursor_position();
        self.reply_str(&format!("\x1b[{};{}R", pos.line + 1, pos.column + 1));
    }

    /// DECXCPR: cursor position including the (always 1) page.
    pub fn report_extended_cursor_position(&mut self) {
        let pos = self.logical_cursor_position();
        self.reply_str(&format!("\x1b[{};{};1R", pos.line + 1, pos.column + 1));
    }

    /// DA1.
    pub fn send_device_attributes(&mut self) {
        // 1: 132 columns, 4: sixel, 8: UDK, 22: ANSI color,
        // 28: rectangular editing, 29: ANSI text locator,
        // 314: screen-capture extension.
        let attrs = "1;4;8;22;28;29;314";
        let id = self.terminal_id.da1_id();
        self.reply_str(&format!("\x1b[?{id};{attrs}c"));
    }

    /// DA2.
    pub fn send_terminal_id(&mut self) {
        let id = self.terminal_id.da2_id();
        let version = version_number();
        self.reply_str(&format!("\x1b[>{id};{version};0c"));
    }

    /// DA3 / DECRPTUI: report the unit id.
    pub fn send_unit_id(&mut self) {
        self.reply_str("\x1bP!|00000000\x1b\\");
    }

    /// DECSCL: remember the requested level, never enforce it.
    pub fn select_conformance_level(&mut self, level: VtType) {
        self.terminal_id = level;
    }

    /// DECRQM for an ANSI mode.
    pub fn request_ansi_mode(&mut self, code: u16) {
        let response = self.modes.query_ansi(code);
        self.reply_str(&format!("\x1b[{};{}$y", code, response.code()));
    }

    /// DECRQM for a DEC private mode.
    pub fn request_dec_mode(&mut self, code: u16) {
        let response = self.modes.query_dec(code);
        self.reply_str(&format!("\x1b[?{};{}$y", code, response.code()));
    }

    /// DECRQSS.
    pub fn request_status_string(&mut self, what: StatusStringRequest) {
        let payload: Option<String> = match what {
            StatusStringRequest::Sgr => Some(format!("0;{}m", sgr_parameter_string(&self.cursor.rendition))),
            StatusStringRequest::ConformanceLevel => {
                Some(format!("{};1\"p", self.terminal_id.decscl_level()))
            }
            StatusStringRequest::CursorStyle => {
                let base = match self.cursor_shape {
                    CursorShape::Block => 1,
                    CursorShape::Underscore => 3,
                    CursorShape::Bar => 5,
                    CursorShape::Rectangle => 7,
                };
                let steady = u16::from(self.cursor_display == CursorDisplay::Steady);
                Some(format!("{} q", base + steady))
            }
            StatusStringRequest::TopBottomMargin => Some(format!(
                "{};{}r",
                self.margin.top + 1,
                self.margin.bottom + 1
            )),
            StatusStringRequest::LeftRightMargin => Some(format!(
                "{};{}s",
                self.margin.left + 1,
                self.margin.right + 1
            )),
            StatusStringRequest::ColumnsPerPage => Some(format!("{}|$", self.size.columns)),
            StatusStringRequest::LinesPerScreen => Some(format!("{}*|", self.size.lines)),
            StatusStringRequest::LinesPerPage => {
                (self.size.lines >= 24).then(|| format!("{}t", self.size.lines))
            }
        };
        match payload {
            Some(p) => self.reply_str(&format!("\x1bP1$r{p}\x1b\\")),
            None => self.reply_str("\x1bP0$r\x1b\\"),
        }
    }

    /// Report an unrecognized DECRQSS request.
    pub fn reply_status_string_invalid(&mut self) {
        self.reply_str("\x1bP0$r\x1b\\");
    }

    /// DECRQPSR 2: tab-stop report.
    pub fn request_tab_stops(&mut self) {
        let mut list = String::new();
        if !self.tabs.is_empty() {
            for (i, stop) in self.tabs.iter().enumerate() {
                if i > 0 {
                    list.push('/');
                }
                list.push_str(&(stop + 1).to_string());
            }
        } else if self.tab_width > 0 {
            list.push('1');
            let mut col = self.tab_width;
            while col < self.size.columns {
                list.push('/');
                list.push_str(&(col + 1).to_string());
                col += self.tab_width;
            }
        }
        self.reply_str(&format!("\x1bP2$u{list}\x1b\\"));
    }

    /// XTGETTCAP for one capability name.
    pub fn request_capability(&mut self, name: &str) {
        let hex_name = hex_encode(name.as_bytes());
        if is_boolean_capability(name) {
            self.reply_str(&format!("\x1bP1+r{hex_name}\x1b\\"));
        } else if let Some(value) = numeric_capability(name, self.size) {
            let mut hex = format!("{value:X}");
            if hex.len() % 2 == 1 {
                hex.insert(0, '0');
            }
            self.reply_str(&format!("\x1bP1+r{hex_name}={hex}\x1b\\"));
        } else if let Some(value) = string_capability(name) {
            self.reply_str(&format!(
                "\x1bP1+r{hex_name}={}\x1b\\",
                hex_encode(value.as_bytes())
            ));
        } else {
            self.reply_str("\x1bP0+r\x1b\\");
        }
    }

    /// XTSMGRAPHICS.
    pub fn sm_graphics(&mut self, item: u16, action: u16, values: &[u16]) {
        const SUCCESS: u16 = 0;
        const FAILURE: u16 = 3;
        match item {
            // Color registers.
            1 => match action {
                1 => {
                    let value = self.color_register_count;
                    self.reply_str(&format!("\x1b[?1;{SUCCESS};{value}S"));
                }
                2 => self.reply_str(&format!("\x1b[?1;{SUCCESS};4096S")),
                3 => {
                    self.color_register_count = 256;
                    self.reply_str(&format!("\x1b[?1;{SUCCESS};256S"));
                }
                4 => match values.first() {
                    Some(&n) if n > 0 => {
                        self.color_register_count = u32::from(n).min(4096);
                        let value = self.color_register_count;
                        self.reply_str(&format!("\x1b[?1;{SUCCESS};{value}S"));
                    }
                    _ => self.reply_str(&format!("\x1b[?1;{FAILURE};0S")),
                },
                _ => self.reply_str(&format!("\x1b[?1;{FAILURE};0S")),
            },
            // Sixel geometry.
            2 => match action {
                1 => {
                    let (w, h) = (self.max_image_size.width, self.max_image_size.height);
                    self.reply_str(&format!("\x1b[?1;{SUCCESS};{w};{h}S"));
                }
                2 => {
                    let (w, h) = (
                        self.max_image_size_limit.width,
                        self.max_image_size_limit.height,
                    );
                    self.reply_str(&format!("\x1b[?1;{SUCCESS};{w};{h}S"));
                }
                3 => self.max_image_size = self.max_image_size_limit,
                4 => {
                    if let (Some(&w), Some(&h)) = (values.first(), values.get(1)) {
                        self.max_image_size = PixelSize::new(
                            u32::from(w).min(self.max_image_size_limit.width),
                            u32::from(h).min(self.max_image_size_limit.height),
                        );
                    }
                }
                _ => self.reply_str(&format!("\x1b[?1;{FAILURE};0S")),
            },
            _ => {}
        }
    }

    // ── Dynamic colors (OSC 4 / 10 / 11 / 12 / 104 / 110-112) ───────

    pub fn set_indexed_color(&mut self, index: u8, color: RgbColor) {
        self.palette.set_indexed(index, color);
    }

    pub fn request_indexed_color(&mut self, index: u8) {
        let color = self.palette.indexed(index);
        self.reply_str(&format!("\x1b]4;{index};{}\x1b\\", color.to_x11_spec()));
    }

    pub fn reset_indexed_color(&mut self, index: Option<u8>) {
        match index {
            Some(index) => {
                let color = self.default_palette.indexed(index);
                self.palette.set_indexed(index, color);
            }
            None => self.palette = self.default_palette.clone(),
        }
    }

    pub fn set_dynamic_color(&mut self, name: DynamicColorName, color: RgbColor) {
        match name {
            DynamicColorName::Foreground => self.palette.default_foreground = color,
            DynamicColorName::Background => self.palette.default_background = color,
            DynamicColorName::Cursor => self.palette.cursor = color,
        }
    }

    pub fn request_dynamic_color(&mut self, name: DynamicColorName) {
        let (code, color) = match name {
            DynamicColorName::Foreground => (10, self.palette.default_foreground),
            DynamicColorName::Background => (11, self.palette.default_background),
            DynamicColorName::Cursor => (12, self.palette.cursor),
        };
        self.reply_str(&format!("\x1b]{code};{}\x1b\\", color.to_x11_spec()));
    }

    pub fn reset_dynamic_color(&mut self, name: DynamicColorName) {
        match name {
            DynamicColorName::Foreground => {
                self.palette.default_foreground = self.default_palette.default_foreground;
            }
            DynamicColorName::Background => {
                self.palette.default_background = self.default_palette.default_background;
            }
            DynamicColorName::Cursor => self.palette.cursor = self.default_palette.cursor,
        }
    }

    /// Resolve a cell color against the live palette.
    #[must_use]
    pub fn resolve_color(&self, color: Color, target: ColorTarget) -> RgbColor {
        self.palette.resolve(color, target)
    }

    // ── Title / window ──────────────────────────────────────────────

    pub fn set_window_title(&mut self, title: &str) {
        self.window_title = title.to_string();
        self.sink.set_window_title(title);
    }

    pub fn save_window_title(&mut self) {
        self.saved_titles.push(self.window_title.clone());
    }

    pub fn restore_window_title(&mut self) {
        if let Some(title) = self.saved_titles.pop() {
            self.set_window_title(&title);
        }
    }

    pub fn set_working_directory(&mut self, url: &str) {
        self.working_directory = Some(url.to_string());
    }

    pub fn notify(&mut self, title: &str, body: &str) {
        self.sink.notify(title, body);
    }

    pub fn copy_to_clipboard(&mut self, data: &str) {
        self.sink.copy_to_clipboard(data);
    }

    /// XTWINOPS (CSI Ps ; Ps ; Ps t).
    pub fn window_op(&mut self, op: u16, a: u16, b: u16) {
        match op {
            // Resize in pixels / characters: forwarded verbatim.
            4 => self.sink.resize_window(u32::from(b), u32::from(a), true),
            8 => self.sink.resize_window(u32::from(b), u32::from(a), false),
            // Text-area pixel size.
            14 => {
                let (cw, ch) = self.cell_pixel_size;
                let h = u32::from(ch) * u32::from(self.size.lines);
                let w = u32::from(cw) * u32::from(self.size.columns);
                self.reply_str(&format!("\x1b[4;{h};{w}t"));
            }
            // Cell pixel size.
            16 => {
                let (cw, ch) = self.cell_pixel_size;
                self.reply_str(&format!("\x1b[6;{ch};{cw}t"));
            }
            // Text-area character size.
            18 => {
                let reply = format!("\x1b[8;{};{}t", self.size.lines, self.size.columns);
                self.reply_str(&reply);
            }
            19 => {
                let reply = format!("\x1b[9;{};{}t", self.size.lines, self.size.columns);
                self.reply_str(&reply);
            }
            22 => self.save_window_title(),
            23 => self.restore_window_title(),
            _ => {}
        }
    }

    /// Screen capture: emit the last `line_count` page lines as OSC 314
    /// chunks, terminated by an empty chunk.
    pub fn capture_buffer(&mut self, line_count: u16, logical_lines: bool) {
        let count = line_count.clamp(1, self.size.lines);
        let start = self.size.lines - count;
        let mut captured = String::new();
        for index in start..self.size.lines {
            let Some(line) = self.grid().page_line(index) else {
                continue;
            };
            if logical_lines && line.is_wrapped() && captured.ends_with('\n') {
                captured.pop();
            }
            let mut text = line.text();
            while text.ends_with(' ') {
                text.pop();
            }
            captured.push_str(&text);
            captured.push('\n');
        }
        while captured.ends_with("\n\n") {
            captured.pop();
        }

        const CHUNK: usize = 4096;
        let bytes = captured.as_bytes();
        let mut at = 0;
        while at < bytes.len() {
            let end = (at + CHUNK).min(bytes.len());
            self.reply_str("\x1b]314;");
            self.replies.extend_from_slice(&bytes[at..end]);
            self.reply_str("\x1b\\");
            at = end;
        }
        self.reply_str("\x1b]314;\x1b\\");
    }

    // ── Cursor style / charsets ─────────────────────────────────────

    /// DECSCUSR.
    pub fn set_cursor_style(&mut self, display: CursorDisplay, shape: CursorShape) {
        self.cursor_display = display;
        self.cursor_shape = shape;
        self.sink.set_cursor_style(display, shape);
    }

    pub fn designate_charset(&mut self, slot: usize, id: CharsetId) {
        self.cursor.charsets.designate(slot, id);
    }

    pub fn single_shift(&mut self, slot: usize) {
        self.cursor.charsets.single_shift(slot);
    }

    pub fn lock_shift(&mut self, slot: usize) {
        self.cursor.charsets.lock_gl(slot);
    }

    /// DECKPAM / DECKPNM.
    pub fn set_application_keypad_mode(&mut self, enable: bool) {
        self.sink.set_application_keypad_mode(enable);
    }

    // ── Marks ───────────────────────────────────────────────────────

    /// Mark the cursor's line for marker navigation.
    pub fn set_mark(&mut self) {
        let line = self.cursor.pos.line;
        if let Some(line) = self.grid_mut().page_line_mut(line) {
            line.set_marked(true);
        }
    }

    /// Nearest marked line above `from` (history reachable via negative
    /// offsets). Only the primary screen has markers.
    #[must_use]
    pub fn find_marker_backward(&self, from: LineOffset) -> Option<LineOffset> {
        (self.active == ScreenType::Primary)
            .then(|| self.primary.find_marker_backward(from))
            .flatten()
    }

    /// Nearest marked line below `from`.
    #[must_use]
    pub fn find_marker_forward(&self, from: LineOffset) -> Option<LineOffset> {
        (self.active == ScreenType::Primary)
            .then(|| self.primary.find_marker_forward(from))
            .flatten()
    }

    // ── DECALN ──────────────────────────────────────────────────────

    /// Fill the page with `E`, reset margins, home the cursor.
    pub fn screen_alignment_pattern(&mut self) {
        self.margin = Margin::full(self.size);
        for line in 0..self.size.lines {
            self.release_range_payload(line, 0, self.size.columns);
            if let Some(line) = self.grid_mut().page_line_mut(line) {
                for cell in line.cells_mut() {
                    cell.write('E', 1, Rendition::default(), 0);
                }
            }
        }
        self.cursor.pos = CellPos::new(0, 0);
        self.wrap_pending = false;
    }

    // ── Images ──────────────────────────────────────────────────────

    /// A completed sixel image: upload it and tile it over cells.
    pub fn sixel_image(&mut self, format: ImageFormat, size: PixelSize, pixels: Vec<u8>) {
        let size = PixelSize::new(
            size.width.min(self.max_image_size.width),
            size.height.min(self.max_image_size.height),
        );
        let (cell_w, cell_h) = self.cell_pixel_size;
        let grid_columns = size.width.div_ceil(u32::from(cell_w)).max(1) as u16;
        let grid_lines = size.height.div_ceil(u32::from(cell_h)).max(1) as u16;
        let scrolling = !self.modes.enabled(DecMode::NoSixelScrolling);
        let top_left = if scrolling {
            self.cursor.pos
        } else {
            CellPos::new(0, 0)
        };

        let handle = self.images.upload(format, size, pixels);
        self.render_image(handle, top_left, grid_lines, grid_columns, scrolling);

        if !self.modes.enabled(DecMode::SixelCursorNextToGraphic) {
            let column = top_left.column;
            self.linefeed_to_column(column);
        }
    }

    fn render_image(
        &mut self,
        handle: u32,
        top_left: CellPos,
        grid_lines: u16,
        grid_columns: u16,
        auto_scroll: bool,
    ) {
        let lines_available = self.size.lines - top_left.line;
        let lines_now = grid_lines.min(lines_available);
        let columns = grid_columns.min(self.size.columns - top_left.column);

        for dy in 0..lines_now {
            for dx in 0..columns {
                let pos = CellPos::new(top_left.line + dy, top_left.column + dx);
                self.place_fragment(pos, handle, (dy, dx));
            }
        }
        if lines_now > 0 {
            self.cursor.pos = CellPos::new(top_left.line + lines_now - 1, top_left.column);
        }

        // Rows that did not fit scroll in one at a time, when allowed;
        // otherwise the image is clipped to the page.
        if auto_scroll && lines_now < grid_lines {
            for extra in 0..grid_lines - lines_now {
                self.linefeed_to_column(top_left.column);
                for dx in 0..columns {
                    let pos = CellPos::new(self.size.lines - 1, top_left.column + dx);
                    self.place_fragment(pos, handle, (lines_now + extra, dx));
                }
            }
        }

        self.move_cursor_to_column(
            top_left
                .column
                .saturating_add(grid_columns)
                .min(self.size.columns - 1),
        );

        // Nothing referenced the image (zero-sized placement): reap it.
        for dead in self.images.sweep() {
            self.sink.discard_image(dead);
        }
    }

    fn place_fragment(&mut self, pos: CellPos, handle: u32, offset: (u16, u16)) {
        self.release_cell_payload(pos);
        let link = self.current_hyperlink;
        self.hyperlinks.acquire(link);
        self.images.acquire(handle);
        if let Some(cell) = self.grid_mut().cell_mut(pos) {
            cell.erase(Color::Default);
            cell.hyperlink = link;
            cell.image = Some(ImageFragment {
                image: handle,
                cell: offset,
            });
        }
    }

    // ── Resize ──────────────────────────────────────────────────────

    /// Resize both grids, carrying the cursor through reflow.
    pub fn resize(&mut self, new_size: PageSize) {
        if new_size.lines == 0 || new_size.columns == 0 || new_size == self.size {
            return;
        }
        let cursor = self.cursor.pos;
        let wrap = self.wrap_pending;
        let (new_cursor, new_wrap) = match self.active {
            ScreenType::Primary => {
                self.alternate.resize(new_size, CellPos::new(0, 0), false);
                self.primary.resize(new_size, cursor, wrap)
            }
            ScreenType::Alternate => {
                self.primary.resize(new_size, CellPos::new(0, 0), false);
                self.alternate.resize(new_size, cursor, wrap)
            }
        };
        self.size = new_size;
        self.margin = Margin::full(new_size);
        self.cursor.pos = new_cursor;
        self.wrap_pending = new_wrap;
        self.last_write = None;
        self.sink.screen_updated();
        #[cfg(debug_assertions)]
        self.assert_invariants();
    }

    /// DECCOLM: set the column count, clear the page, reset margins.
    pub fn resize_columns(&mut self, columns: u16) {
        self.resize(PageSize::new(self.size.lines, columns));
        self.clear_screen();
        self.margin = Margin::full(self.size);
        self.move_cursor_to(0, 0);
    }

    /// Change the scrollback bound.
    pub fn set_max_history(&mut self, max: usize) {
        self.max_history = max;
        self.primary.set_max_history(max);
    }

    // ── Reset ───────────────────────────────────────────────────────

    /// DECSTR.
    pub fn reset_soft(&mut self) {
        self.set_graphics_reset();
        self.saved_cursor = SavedCursor::default();
        self.set_dec_mode(DecMode::VisibleCursor.code(), true);
        self.set_dec_mode(DecMode::Origin.code(), false);
        self.set_ansi_mode(AnsiMode::KeyboardAction.code(), false);
        self.set_dec_mode(DecMode::AutoWrap.code(), true);
        self.set_ansi_mode(AnsiMode::Insert.code(), false);
        self.set_dec_mode(DecMode::ApplicationCursorKeys.code(), false);
        self.margin = Margin::full(self.size);
        self.current_hyperlink = 0;
        self.palette = self.default_palette.clone();
    }

    fn set_graphics_reset(&mut self) {
        self.cursor.rendition = Rendition::default();
    }

    /// RIS: observably identical to a freshly constructed screen.
    pub fn reset_hard(&mut self) {
        for id in self.images.clear() {
            self.sink.discard_image(id);
        }
        self.hyperlinks.clear();
        self.current_hyperlink = 0;

        self.primary = Grid::new(self.size, self.max_history);
        self.alternate = Grid::new(self.size, 0);
        self.active = ScreenType::Primary;
        self.cursor = Cursor::default();
        self.saved_cursor = SavedCursor::default();
        self.saved_primary_cursor = SavedCursor::default();
        self.wrap_pending = false;
        self.margin = Margin::full(self.size);
        self.modes = Modes::new();
        self.modes.set(DecMode::AutoWrap, true);
        self.modes.set(DecMode::TextReflow, true);
        self.modes.set(DecMode::VisibleCursor, true);
        self.tabs.clear();
        self.tab_width = DEFAULT_TAB_WIDTH;
        self.palette = self.default_palette.clone();
        self.window_title.clear();
        self.saved_titles.clear();
        self.working_directory = None;
        self.cursor_shape = CursorShape::default();
        self.cursor_display = CursorDisplay::default();
        self.last_graphic = None;
        self.last_write = None;
        self.use_private_color_registers = false;

        self.sink.hard_reset();
    }

    /// Forward a state-dump request to the host.
    pub fn dump_state(&mut self) {
        self.sink.dump_state();
    }

    // ── Payload bookkeeping ─────────────────────────────────────────

    fn release_cell_payload(&mut self, pos: CellPos) {
        let Some(cell) = self.grid().cell(pos) else {
            return;
        };
        let link = cell.hyperlink;
        let image = cell.image;
        self.hyperlinks.release(link);
        if let Some(fragment) = image {
            if self.images.release(fragment.image) {
                self.sink.discard_image(fragment.image);
            }
        }
    }

    fn release_range_payload(&mut self, line: u16, from: u16, to: u16) {
        let payloads: Vec<(HyperlinkId, Option<ImageFragment>)> = self
            .grid()
            .page_line(line)
            .map(|l| {
                let to = (to as usize).min(l.cells().len());
                let from = (from as usize).min(to);
                l.cells()[from..to]
                    .iter()
                    .map(|c| (c.hyperlink, c.image))
                    .collect()
            })
            .unwrap_or_default();
        for (link, image) in payloads {
            self.hyperlinks.release(link);
            if let Some(fragment) = image {
                if self.images.release(fragment.image) {
                    self.sink.discard_image(fragment.image);
                }
            }
        }
    }

    fn release_line_payload(&mut self, line: &Line) {
        let payloads: Vec<(HyperlinkId, Option<ImageFragment>)> = line
            .cells()
            .iter()
            .map(|c| (c.hyperlink, c.image))
            .collect();
        for (link, image) in payloads {
            self.hyperlinks.release(link);
            if let Some(fragment) = image {
                if self.images.release(fragment.image) {
                    self.sink.discard_image(fragment.image);
                }
            }
        }
    }

    #[cfg(debug_assertions)]
    pub(crate) fn assert_invariants(&self) {
        self.primary.assert_invariants();
        self.alternate.assert_invariants();
        debug_assert!(self.cursor.pos.line < self.size.lines);
        debug_assert!(self.cursor.pos.column < self.size.columns);
        debug_assert!(self.margin.top <= self.margin.bottom);
        debug_assert!(self.margin.left <= self.margin.right);
    }
}

/// What a DECRQSS request asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusStringRequest {
    Sgr,
    ConformanceLevel,
    CursorStyle,
    TopBottomMargin,
    LeftRightMargin,
    ColumnsPerPage,
    LinesPerScreen,
    LinesPerPage,
}

/// OSC 10/11/12 color slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicColorName {
    Foreground,
    Background,
    Cursor,
}

/// Whether two adjacent scalars belong to one grapheme cluster.
fn nonbreakable(prev: char, next: char) -> bool {
    let mut buf = String::with_capacity(8);
    buf.push(prev);
    buf.push(next);
    buf.graphemes(true).count() == 1
}

/// The DA2 version parameter: major*10000 + minor*100 + patch.
fn version_number() -> u32 {
    let major: u32 = env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0);
    let minor: u32 = env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0);
    let patch: u32 = env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0);
    (major * 100 + minor) * 100 + patch
}

/// Render the current SGR state back into its parameter string (DECRQSS).
fn sgr_parameter_string(rendition: &Rendition) -> String {
    let mut params: Vec<String> = Vec::new();
    let flags = rendition.flags;
    if flags.contains(StyleFlags::BOLD) {
        params.push("1".into());
    }
    if flags.contains(StyleFlags::FAINT) {
        params.push("2".into());
    }
    if flags.contains(StyleFlags::ITALIC) {
        params.push("3".into());
    }
    if flags.contains(StyleFlags::UNDERLINE) {
        params.push("4".into());
    }
    if flags.contains(StyleFlags::CURLY_UNDERLINE) {
        params.push("4:3".into());
    }
    if flags.contains(StyleFlags::DOTTED_UNDERLINE) {
        params.push("4:4".into());
    }
    if flags.contains(StyleFlags::DASHED_UNDERLINE) {
        params.push("4:5".into());
    }
    if flags.contains(StyleFlags::BLINK) {
        params.push("5".into());
    }
    if flags.contains(StyleFlags::INVERSE) {
        params.push("7".into());
    }
    if flags.contains(StyleFlags::HIDDEN) {
        params.push("8".into());
    }
    if flags.contains(StyleFlags::CROSSED_OUT) {
        params.push("9".into());
    }
    if flags.contains(StyleFlags::DOUBLE_UNDERLINE) {
        params.push("21".into());
    }
    if flags.contains(StyleFlags::FRAMED) {
        params.push("51".into());
    }
    if flags.contains(StyleFlags::OVERLINE) {
        params.push("53".into());
    }
    push_color_params(&mut params, rendition.fg, 30);
    push_color_params(&mut params, rendition.bg, 40);
    if let Color::Rgb(r, g, b) = rendition.underline_color {
        params.push(format!("58;2;{r};{g};{b}"));
    } else if let Color::Indexed(n) = rendition.underline_color {
        params.push(format!("58;5;{n}"));
    }
    params.join(";")
}

fn push_color_params(params: &mut Vec<String>, color: Color, base: u16) {
    match color {
        Color::Default | Color::Undefined => {}
        Color::Indexed(n) if n < 8 => params.push((base + u16::from(n)).to_string()),
        Color::Indexed(n) => params.push(format!("{};5;{n}", base + 8)),
        Color::Bright(n) => params.push((base + 60 + u16::from(n & 7)).to_string()),
        Color::Rgb(r, g, b) => params.push(format!("{};2;{r};{g};{b}", base + 8)),
    }
}

/// Capability tables for XTGETTCAP. A deliberately small, honest set.
fn is_boolean_capability(name: &str) -> bool {
    matches!(name, "am" | "bce" | "km" | "mir" | "msgr" | "xenl" | "AX")
}

fn numeric_capability(name: &str, size: PageSize) -> Option<u32> {
    match name {
        "colors" | "Co" => Some(256),
        "cols" | "co" => Some(u32::from(size.columns)),
        "lines" | "li" => Some(u32::from(size.lines)),
        "pairs" | "pa" => Some(32767),
        _ => None,
    }
}

fn string_capability(name: &str) -> Option<&'static str> {
    match name {
        "TN" | "name" => Some("xterm-256color"),
        "cr" => Some("\r"),
        "bel" => Some("\x07"),
        "kbs" => Some("\x7f"),
        _ => None,
    }
}

/// Hex-encode bytes uppercase, as tcap queries expect.
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02X}"));
    }
    out
}

/// Decode an XTGETTCAP hex-encoded name.
pub(crate) fn hex_decode(hex: &[u8]) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(hex.len() / 2);
    for pair in hex.chunks(2) {
        let s = core::str::from_utf8(pair).ok()?;
        out.push(u8::from_str_radix(s, 16).ok()?);
    }
    Some(out)
}
