//! Line grid: the visible page plus bounded history above it.
//!
//! The grid is an ordered sequence of [`Line`]s split into a history prefix
//! (primary screen only) and a main page of exactly `size.lines` rows. Lines
//! are addressed by [`LineOffset`]: zero is the top of the page, positive
//! offsets go down, negative offsets reach back into history.

use std::collections::VecDeque;

use bitflags::bitflags;

use crate::cell::{Cell, Color};

/// Page dimensions in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PageSize {
    pub lines: u16,
    pub columns: u16,
}

impl PageSize {
    #[must_use]
    pub const fn new(lines: u16, columns: u16) -> Self {
        Self { lines, columns }
    }
}

/// A cursor-addressable position on the page (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellPos {
    pub line: u16,
    pub column: u16,
}

impl CellPos {
    #[must_use]
    pub const fn new(line: u16, column: u16) -> Self {
        Self { line, column }
    }
}

/// Signed line address: 0 = top of page, negative reaches into history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineOffset(pub i32);

bitflags! {
    /// Per-line bookkeeping flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct LineFlags: u8 {
        /// Content continues from the previous line (soft wrap).
        const WRAPPED = 1 << 0;
        /// Participates in reflow when the column count changes.
        const WRAPPABLE = 1 << 1;
        /// User-level bookmark for marker navigation.
        const MARKED = 1 << 2;
    }
}

/// One row of cells. `cells.len()` always equals the grid's column count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    cells: Vec<Cell>,
    pub flags: LineFlags,
}

impl Line {
    /// A blank line of the given width carrying `bg`.
    #[must_use]
    pub fn blank(columns: u16, bg: Color) -> Self {
        Self {
            cells: vec![Cell::blank(bg); columns as usize],
            flags: LineFlags::WRAPPABLE,
        }
    }

    /// Build a line from explicit cells, padding/truncating to `columns`.
    #[must_use]
    pub fn from_cells(mut cells: Vec<Cell>, columns: u16, flags: LineFlags) -> Self {
        cells.resize(columns as usize, Cell::blank(Color::Default));
        Self { cells, flags }
    }

    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    #[must_use]
    pub fn cell(&self, column: u16) -> Option<&Cell> {
        self.cells.get(column as usize)
    }

    pub fn cell_mut(&mut self, column: u16) -> Option<&mut Cell> {
        self.cells.get_mut(column as usize)
    }

    #[must_use]
    pub fn is_wrapped(&self) -> bool {
        self.flags.contains(LineFlags::WRAPPED)
    }

    pub fn set_wrapped(&mut self, wrapped: bool) {
        self.flags.set(LineFlags::WRAPPED, wrapped);
    }

    #[must_use]
    pub fn is_marked(&self) -> bool {
        self.flags.contains(LineFlags::MARKED)
    }

    pub fn set_marked(&mut self, marked: bool) {
        self.flags.set(LineFlags::MARKED, marked);
    }

    /// Fill every cell with a blank carrying `bg`.
    pub fn erase(&mut self, bg: Color) {
        for cell in &mut self.cells {
            cell.erase(bg);
        }
        self.flags.remove(LineFlags::WRAPPED | LineFlags::MARKED);
    }

    /// Pad or truncate to the given width.
    pub fn resize(&mut self, columns: u16, bg: Color) {
        self.cells.resize(columns as usize, Cell::blank(bg));
    }

    /// Cell count ignoring the run of trailing default blanks.
    #[must_use]
    pub fn trimmed_len(&self) -> usize {
        let mut len = self.cells.len();
        while len > 0 {
            let cell = &self.cells[len - 1];
            if cell.is_blank() && cell.rendition.bg == Color::Default {
                len -= 1;
            } else {
                break;
            }
        }
        len
    }

    /// The line's text, one entry per occupied column (continuations skipped),
    /// blanks rendered as spaces.
    #[must_use]
    pub fn text(&self) -> String {
        self.cells
            .iter()
            .filter(|c| !c.is_wide_continuation())
            .map(|c| c.text())
            .collect()
    }
}

/// Rectangular scrolling region in page coordinates, inclusive on all sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Margin {
    pub top: u16,
    pub bottom: u16,
    pub left: u16,
    pub right: u16,
}

impl Margin {
    /// The whole page.
    #[must_use]
    pub const fn full(size: PageSize) -> Self {
        Self {
            top: 0,
            bottom: size.lines.saturating_sub(1),
            left: 0,
            right: size.columns.saturating_sub(1),
        }
    }

    #[must_use]
    pub fn is_full(&self, size: PageSize) -> bool {
        *self == Self::full(size)
    }

    /// Number of lines spanned.
    #[must_use]
    pub fn height(&self) -> u16 {
        self.bottom.saturating_sub(self.top) + 1
    }

    /// Number of columns spanned.
    #[must_use]
    pub fn width(&self) -> u16 {
        self.right.saturating_sub(self.left) + 1
    }

    #[must_use]
    pub fn contains(&self, pos: CellPos) -> bool {
        (self.top..=self.bottom).contains(&pos.line)
            && (self.left..=self.right).contains(&pos.column)
    }
}

/// The page plus its history, with scroll/resize/marker operations.
#[derive(Debug, Clone)]
pub struct Grid {
    history: VecDeque<Line>,
    page: Vec<Line>,
    size: PageSize,
    max_history: usize,
    /// Whether resize rejoins and resplits soft-wrapped lines.
    pub reflow: bool,
}

impl Grid {
    /// A blank grid. `max_history == 0` disables history entirely (the
    /// alternate-screen configuration).
    #[must_use]
    pub fn new(size: PageSize, max_history: usize) -> Self {
        let page = (0..size.lines)
            .map(|_| Line::blank(size.columns, Color::Default))
            .collect();
        Self {
            history: VecDeque::new(),
            page,
            size,
            max_history,
            reflow: true,
        }
    }

    #[must_use]
    pub fn size(&self) -> PageSize {
        self.size
    }

    #[must_use]
    pub fn columns(&self) -> u16 {
        self.size.columns
    }

    #[must_use]
    pub fn page_lines(&self) -> u16 {
        self.size.lines
    }

    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    #[must_use]
    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn set_max_history(&mut self, max: usize) {
        self.max_history = max;
        while self.history.len() > max {
            self.history.pop_front();
        }
    }

    /// The visible page, top to bottom.
    #[must_use]
    pub fn page(&self) -> &[Line] {
        &self.page
    }

    /// History lines, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Line> {
        self.history.iter()
    }

    /// Address a line by signed offset (negative reaches into history).
    #[must_use]
    pub fn line(&self, offset: LineOffset) -> Option<&Line> {
        if offset.0 >= 0 {
            self.page.get(offset.0 as usize)
        } else {
            let back = (-offset.0) as usize;
            if back <= self.history.len() {
                self.history.get(self.history.len() - back)
            } else {
                None
            }
        }
    }

    pub fn line_mut(&mut self, offset: LineOffset) -> Option<&mut Line> {
        if offset.0 >= 0 {
            self.page.get_mut(offset.0 as usize)
        } else {
            let back = (-offset.0) as usize;
            let len = self.history.len();
            if back <= len {
                self.history.get_mut(len - back)
            } else {
                None
            }
        }
    }

    /// A page line by unsigned row index.
    #[must_use]
    pub fn page_line(&self, line: u16) -> Option<&Line> {
        self.page.get(line as usize)
    }

    pub fn page_line_mut(&mut self, line: u16) -> Option<&mut Line> {
        self.page.get_mut(line as usize)
    }

    #[must_use]
    pub fn cell(&self, pos: CellPos) -> Option<&Cell> {
        self.page_line(pos.line)?.cell(pos.column)
    }

    pub fn cell_mut(&mut self, pos: CellPos) -> Option<&mut Cell> {
        self.page_line_mut(pos.line)?.cell_mut(pos.column)
    }

    /// Replace the cell at `pos`, maintaining wide-character pairing: writing
    /// over a continuation clears its owner, and writing over a wide head
    /// clears its continuation.
    pub fn write_cell(&mut self, pos: CellPos, cell: Cell) {
        let columns = self.size.columns;
        let Some(line) = self.page.get_mut(pos.line as usize) else {
            return;
        };
        let col = pos.column as usize;
        if col >= line.cells().len() {
            return;
        }
        if line.cells()[col].is_wide_continuation() && col > 0 {
            line.cells_mut()[col - 1].clear();
        }
        if line.cells()[col].is_wide() && (col + 1) < columns as usize {
            line.cells_mut()[col + 1].clear();
        }
        line.cells_mut()[col] = cell;
    }

    /// Scroll the margin rectangle up by `n` lines, filling the vacated
    /// bottom lines with blanks carrying `bg`.
    ///
    /// When the margin covers the entire page the displaced top lines are
    /// pushed into history (bounded by `max_history`). Returns the lines
    /// evicted from history so the caller can release cell payloads.
    pub fn scroll_up(&mut self, n: u16, margin: Margin, bg: Color) -> Vec<Line> {
        let n = n.min(margin.height());
        if n == 0 || margin.top > margin.bottom {
            return Vec::new();
        }

        let mut evicted = Vec::new();
        if margin.is_full(self.size) {
            for _ in 0..n {
                let displaced = std::mem::replace(
                    &mut self.page[0],
                    Line::blank(self.size.columns, bg),
                );
                self.page[..].rotate_left(1);
                if let Some(old) = self.push_history(displaced) {
                    evicted.push(old);
                }
            }
            return evicted;
        }

        let (top, bottom) = (margin.top as usize, margin.bottom as usize);
        if margin.width() == self.size.columns {
            // Full-width region: move whole lines within [top, bottom].
            for row in top..=bottom - n as usize {
                self.page[row] = self.page[row + n as usize].clone();
            }
            for row in (bottom + 1 - n as usize)..=bottom {
                self.page[row] = Line::blank(self.size.columns, bg);
            }
        } else {
            // Narrow region: only the [left, right] cell span moves.
            let (left, right) = (margin.left as usize, margin.right as usize);
            for row in top..=bottom - n as usize {
                let src = self.page[row + n as usize].cells()[left..=right].to_vec();
                self.page[row].cells_mut()[left..=right].clone_from_slice(&src);
            }
            for row in (bottom + 1 - n as usize)..=bottom {
                for cell in &mut self.page[row].cells_mut()[left..=right] {
                    cell.erase(bg);
                }
            }
        }
        evicted
    }

    /// Scroll the margin rectangle down by `n` lines. Never touches history.
    pub fn scroll_down(&mut self, n: u16, margin: Margin, bg: Color) {
        let n = n.min(margin.height());
        if n == 0 || margin.top > margin.bottom {
            return;
        }
        let (top, bottom) = (margin.top as usize, margin.bottom as usize);
        if margin.width() == self.size.columns {
            for row in (top + n as usize..=bottom).rev() {
                self.page[row] = self.page[row - n as usize].clone();
            }
            for row in top..top + n as usize {
                self.page[row] = Line::blank(self.size.columns, bg);
            }
        } else {
            let (left, right) = (margin.left as usize, margin.right as usize);
            for row in (top + n as usize..=bottom).rev() {
                let src = self.page[row - n as usize].cells()[left..=right].to_vec();
                self.page[row].cells_mut()[left..=right].clone_from_slice(&src);
            }
            for row in top..top + n as usize {
                for cell in &mut self.page[row].cells_mut()[left..=right] {
                    cell.erase(bg);
                }
            }
        }
    }

    fn push_history(&mut self, line: Line) -> Option<Line> {
        if self.max_history == 0 {
            return Some(line);
        }
        let evicted = if self.history.len() >= self.max_history {
            self.history.pop_front()
        } else {
            None
        };
        self.history.push_back(line);
        evicted
    }

    /// Drop all history lines, returning them for payload release.
    pub fn clear_history(&mut self) -> Vec<Line> {
        self.history.drain(..).collect()
    }

    /// Resize the grid, carrying the cursor to the cell that logically held
    /// the same character. Returns the adjusted cursor and wrap-pending flag.
    ///
    /// With reflow enabled and a changed column count, runs of wrappable
    /// lines are joined and re-split at the new width; otherwise lines are
    /// padded or truncated. Height growth promotes history lines back onto
    /// the page; shrinking pushes top lines into history.
    pub fn resize(
        &mut self,
        new_size: PageSize,
        cursor: CellPos,
        wrap_pending: bool,
    ) -> (CellPos, bool) {
        if new_size == self.size {
            return (cursor, wrap_pending);
        }
        if new_size.lines == 0 || new_size.columns == 0 {
            return (cursor, wrap_pending);
        }

        let mut cursor_abs = self.history.len() + cursor.line as usize;
        let mut cursor_col = cursor.column as usize;

        let mut all: Vec<Line> = self.history.drain(..).chain(self.page.drain(..)).collect();

        if self.reflow && new_size.columns != self.size.columns {
            (all, cursor_abs, cursor_col) =
                reflow_lines(all, new_size.columns, cursor_abs, cursor_col);
        } else if new_size.columns != self.size.columns {
            for line in &mut all {
                line.resize(new_size.columns, Color::Default);
            }
            cursor_col = cursor_col.min(new_size.columns as usize - 1);
        }

        // Partition into history + page so the cursor stays on the page.
        let page_lines = new_size.lines as usize;
        let mut history_len = all.len().saturating_sub(page_lines);
        if cursor_abs < history_len {
            history_len = cursor_abs;
        }

        let mut rest = all.split_off(history_len);
        let mut history: VecDeque<Line> = all.into();
        rest.truncate(page_lines);
        while rest.len() < page_lines {
            rest.push(Line::blank(new_size.columns, Color::Default));
        }

        while history.len() > self.max_history {
            history.pop_front();
        }

        self.history = history;
        self.page = rest;
        self.size = new_size;

        let new_line = cursor_abs.saturating_sub(history_len).min(page_lines - 1) as u16;
        let new_col = cursor_col.min(new_size.columns as usize - 1) as u16;
        let new_wrap = wrap_pending && cursor_col >= new_size.columns as usize;

        (CellPos::new(new_line, new_col), new_wrap)
    }

    /// The nearest marked line strictly above `from`.
    #[must_use]
    pub fn find_marker_backward(&self, from: LineOffset) -> Option<LineOffset> {
        let lo = -(self.history.len() as i32);
        let mut offset = from.0 - 1;
        while offset >= lo {
            if self.line(LineOffset(offset)).is_some_and(Line::is_marked) {
                return Some(LineOffset(offset));
            }
            offset -= 1;
        }
        None
    }

    /// The nearest marked line strictly below `from`.
    #[must_use]
    pub fn find_marker_forward(&self, from: LineOffset) -> Option<LineOffset> {
        let hi = self.size.lines as i32;
        let mut offset = from.0 + 1;
        while offset < hi {
            if self.line(LineOffset(offset)).is_some_and(Line::is_marked) {
                return Some(LineOffset(offset));
            }
            offset += 1;
        }
        None
    }

    /// The visible page as text: one `\n`-terminated row per line, trailing
    /// blanks preserved.
    #[must_use]
    pub fn render_page_text(&self) -> String {
        let mut out = String::new();
        for line in &self.page {
            out.push_str(&line.text());
            out.push('\n');
        }
        out
    }

    #[cfg(debug_assertions)]
    pub(crate) fn assert_invariants(&self) {
        debug_assert_eq!(self.page.len(), self.size.lines as usize);
        debug_assert!(self.history.len() <= self.max_history);
        for line in self.history.iter().chain(self.page.iter()) {
            debug_assert_eq!(line.cells().len(), self.size.columns as usize);
        }
    }
}

/// Join wrap-runs and re-split them at `columns`, tracking one cursor
/// position through the transformation.
///
/// Returns the rebuilt lines plus the cursor's new absolute line index and
/// column.
fn reflow_lines(
    lines: Vec<Line>,
    columns: u16,
    cursor_abs: usize,
    cursor_col: usize,
) -> (Vec<Line>, usize, usize) {
    let width = columns as usize;
    let mut out: Vec<Line> = Vec::with_capacity(lines.len());
    let mut new_cursor = (cursor_abs.min(lines.len().saturating_sub(1)), cursor_col);

    let mut idx = 0;
    while idx < lines.len() {
        // A run is a maximal sequence of wrappable lines whose successors
        // carry the wrapped flag.
        let run_start = idx;
        let wrappable = lines[idx].flags.contains(LineFlags::WRAPPABLE);
        let mut run_end = idx + 1;
        if wrappable {
            while run_end < lines.len()
                && lines[run_end].is_wrapped()
                && lines[run_end].flags.contains(LineFlags::WRAPPABLE)
            {
                run_end += 1;
            }
        }

        let marked = lines[run_start].is_marked();
        let run_flags = lines[run_start].flags & LineFlags::WRAPPABLE;

        // Cursor's flattened offset within this run, if it sits inside it.
        let mut cursor_run_offset: Option<usize> = None;

        // Flatten the run: all segments contribute their full width except
        // the last, which is trimmed of trailing default blanks.
        let mut cells: Vec<Cell> = Vec::new();
        for (seg, line) in lines[run_start..run_end].iter().enumerate() {
            let abs = run_start + seg;
            let seg_len = if abs + 1 == run_end {
                line.trimmed_len()
            } else {
                line.cells().len()
            };
            if abs == cursor_abs {
                cursor_run_offset = Some(cells.len() + cursor_col.min(line.cells().len()));
            }
            cells.extend_from_slice(&line.cells()[..seg_len]);
        }

        if !wrappable {
            let line = Line::from_cells(cells, columns, lines[run_start].flags);
            if cursor_abs == run_start {
                new_cursor = (out.len(), cursor_col.min(width - 1));
            }
            out.push(line);
            idx = run_end;
            continue;
        }

        // Re-split at the new width.
        let first_out = out.len();
        let mut chunk_start = 0;
        let mut emitted = 0;
        loop {
            let chunk_end = (chunk_start + width).min(cells.len());
            let mut flags = run_flags;
            if emitted > 0 {
                flags |= LineFlags::WRAPPED;
            }
            if emitted == 0 && marked {
                flags |= LineFlags::MARKED;
            }
            let chunk = cells[chunk_start..chunk_end].to_vec();
            out.push(Line::from_cells(chunk, columns, flags));
            emitted += 1;
            if chunk_end >= cells.len() {
                break;
            }
            chunk_start = chunk_end;
        }

        if let Some(offset) = cursor_run_offset {
            let line_in_run = (offset / width).min(emitted - 1);
            let col = if offset / width > line_in_run {
                width - 1
            } else {
                offset % width
            };
            new_cursor = (first_out + line_in_run, col);
        }

        idx = run_end;
    }

    if out.is_empty() {
        out.push(Line::blank(columns, Color::Default));
    }
    let cursor_abs = new_cursor.0.min(out.len() - 1);
    (out, cursor_abs, new_cursor.1)
}
