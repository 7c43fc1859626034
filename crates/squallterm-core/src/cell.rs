//! Screen cells and the per-cell payloads they carry.
//!
//! A cell holds a grapheme cluster (base character plus combining marks, up
//! to a small cap), its display width, the graphics rendition in effect when
//! it was written, and optional hyperlink / image-fragment handles. Wide
//! characters occupy two columns: a leading cell of width 2 followed by a
//! continuation cell of width 0 whose content is meaningless.

use bitflags::bitflags;
use smallvec::SmallVec;
use std::collections::HashMap;
use unicode_width::UnicodeWidthChar;

use crate::image::ImageFragment;

/// Maximum codepoints stored per cell (base + combining marks).
/// Further marks on an already-full cell are dropped.
pub const MAX_CODEPOINTS_PER_CELL: usize = 8;

bitflags! {
    /// SGR style attributes.
    ///
    /// The underline variants are mutually exclusive in practice; the SGR
    /// decoder clears the whole [`Self::ANY_UNDERLINE`] group before setting
    /// one of them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct StyleFlags: u32 {
        const BOLD             = 1 << 0;
        const FAINT            = 1 << 1;
        const ITALIC           = 1 << 2;
        const BLINK            = 1 << 3;
        const INVERSE          = 1 << 4;
        const HIDDEN           = 1 << 5;
        const CROSSED_OUT      = 1 << 6;
        const UNDERLINE        = 1 << 7;
        const DOUBLE_UNDERLINE = 1 << 8;
        const CURLY_UNDERLINE  = 1 << 9;
        const DOTTED_UNDERLINE = 1 << 10;
        const DASHED_UNDERLINE = 1 << 11;
        const FRAMED           = 1 << 12;
        const OVERLINE         = 1 << 13;

        /// All underline variants, cleared as a group by SGR 4/21/24 and 4:n.
        const ANY_UNDERLINE = Self::UNDERLINE.bits()
            | Self::DOUBLE_UNDERLINE.bits()
            | Self::CURLY_UNDERLINE.bits()
            | Self::DOTTED_UNDERLINE.bits()
            | Self::DASHED_UNDERLINE.bits();
    }
}

bitflags! {
    /// Cell-level flags orthogonal to SGR state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct CellFlags: u8 {
        /// Leading (left) half of a wide character.
        const WIDE = 1 << 0;
        /// Trailing half of a wide character; rendering uses the leader.
        const WIDE_CONTINUATION = 1 << 1;
    }
}

/// Cell color, before palette resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Color {
    /// Terminal default foreground/background (SGR 39 / 49).
    #[default]
    Default,
    /// 256-color palette index.
    Indexed(u8),
    /// Bright variant of a base color (SGR 90..97 / 100..107), index 0..7.
    Bright(u8),
    /// 24-bit color.
    Rgb(u8, u8, u8),
    /// No color chosen; resolution falls back per use site
    /// (e.g. an undefined underline color renders with the foreground).
    Undefined,
}

/// Graphics rendition: the SGR state stamped onto cells at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rendition {
    pub flags: StyleFlags,
    pub fg: Color,
    pub bg: Color,
    pub underline_color: Color,
}

impl Default for Rendition {
    fn default() -> Self {
        Self {
            flags: StyleFlags::empty(),
            fg: Color::Default,
            bg: Color::Default,
            underline_color: Color::Undefined,
        }
    }
}

impl Rendition {
    /// SGR 0: clear every attribute and color.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Handle into the [`HyperlinkRegistry`]. Zero means "no link".
pub type HyperlinkId = u32;

/// An OSC 8 hyperlink: optional application-chosen tag plus target URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hyperlink {
    /// Value of the `id=` parameter, when the application supplied one.
    pub tag: Option<String>,
    pub uri: String,
}

#[derive(Debug, Clone)]
struct LinkSlot {
    link: Hyperlink,
    ref_count: u32,
}

/// Registry of live hyperlinks, reference-counted by cell.
///
/// Links opened with an explicit `id=` parameter are shared: a second open
/// with the same tag and URI yields the same handle. Anonymous links get a
/// fresh handle every time, so two visually identical anonymous links stay
/// distinct targets. Entries are dropped once no cell references them.
#[derive(Debug, Clone, Default)]
pub struct HyperlinkRegistry {
    slots: Vec<Option<LinkSlot>>,
    tagged: HashMap<String, HyperlinkId>,
    free: Vec<HyperlinkId>,
}

impl HyperlinkRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: vec![None],
            tagged: HashMap::new(),
            free: Vec::new(),
        }
    }

    /// Begin a hyperlink, as dispatched from `OSC 8 ; params ; uri`.
    ///
    /// Returns the handle the screen should stamp onto subsequently written
    /// cells. An empty URI returns 0 ("no link"). The returned handle's
    /// refcount is not touched; cells acquire it individually.
    pub fn open(&mut self, tag: Option<&str>, uri: &str) -> HyperlinkId {
        if uri.is_empty() {
            return 0;
        }
        if let Some(tag) = tag.filter(|t| !t.is_empty()) {
            if let Some(&id) = self.tagged.get(tag) {
                if self.get(id).is_some_and(|l| l.uri == uri) {
                    return id;
                }
                // Same tag, different target: the tag now names the new link.
                self.tagged.remove(tag);
            }
            let id = self.insert(LinkSlot {
                link: Hyperlink {
                    tag: Some(tag.to_string()),
                    uri: uri.to_string(),
                },
                ref_count: 0,
            });
            if id != 0 {
                self.tagged.insert(tag.to_string(), id);
            }
            id
        } else {
            self.insert(LinkSlot {
                link: Hyperlink {
                    tag: None,
                    uri: uri.to_string(),
                },
                ref_count: 0,
            })
        }
    }

    fn insert(&mut self, slot: LinkSlot) -> HyperlinkId {
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                let id = self.slots.len() as HyperlinkId;
                self.slots.push(None);
                id
            }
        };
        if id == 0 {
            return 0;
        }
        self.slots[id as usize] = Some(slot);
        id
    }

    /// Increment the refcount for a handle. Zero and stale handles are ignored.
    pub fn acquire(&mut self, id: HyperlinkId) {
        if let Some(Some(slot)) = self.slots.get_mut(id as usize) {
            slot.ref_count = slot.ref_count.saturating_add(1);
        }
    }

    /// Decrement the refcount, dropping the entry when it reaches zero.
    pub fn release(&mut self, id: HyperlinkId) {
        let Some(entry) = self.slots.get_mut(id as usize) else {
            return;
        };
        let drop_entry = match entry.as_mut() {
            Some(slot) if slot.ref_count > 0 => {
                slot.ref_count -= 1;
                slot.ref_count == 0
            }
            _ => false,
        };
        if drop_entry {
            let removed = entry.take();
            if let Some(LinkSlot {
                link: Hyperlink { tag: Some(tag), .. },
                ..
            }) = removed
            {
                self.tagged.remove(&tag);
            }
            self.free.push(id);
        }
    }

    /// Release the hyperlink references held by a run of cells.
    pub fn release_cells<'a>(&mut self, cells: impl IntoIterator<Item = &'a Cell>) {
        for cell in cells {
            self.release(cell.hyperlink);
        }
    }

    /// Look up the link behind a handle.
    #[must_use]
    pub fn get(&self, id: HyperlinkId) -> Option<&Hyperlink> {
        self.slots
            .get(id as usize)
            .and_then(|s| s.as_ref())
            .map(|s| &s.link)
    }

    /// Number of live links.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Whether no links are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every link.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.slots.push(None);
        self.tagged.clear();
        self.free.clear();
    }
}

/// Display width of a single scalar in terminal columns.
///
/// Control characters and unassigned codepoints count as zero; everything
/// else follows East-Asian width rules.
#[must_use]
pub fn char_width(ch: char) -> u8 {
    UnicodeWidthChar::width(ch).unwrap_or(0).min(2) as u8
}

/// One screen position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// Base character plus combining marks. Empty for blank cells and
    /// wide-character continuations.
    codepoints: SmallVec<[char; 2]>,
    /// Display width in columns: 0 (continuation), 1, or 2.
    width: u8,
    pub flags: CellFlags,
    pub rendition: Rendition,
    /// Hyperlink handle; 0 means no link.
    pub hyperlink: HyperlinkId,
    /// Inline-graphics fragment shown in place of text content.
    pub image: Option<ImageFragment>,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            codepoints: SmallVec::new(),
            width: 1,
            flags: CellFlags::empty(),
            rendition: Rendition::default(),
            hyperlink: 0,
            image: None,
        }
    }
}

impl Cell {
    /// A blank cell carrying the given background (used by erase fills).
    #[must_use]
    pub fn blank(bg: Color) -> Self {
        Self {
            rendition: Rendition {
                bg,
                ..Rendition::default()
            },
            ..Self::default()
        }
    }

    /// Replace this cell's content with a single scalar.
    pub fn write(&mut self, ch: char, width: u8, rendition: Rendition, hyperlink: HyperlinkId) {
        self.codepoints.clear();
        self.codepoints.push(ch);
        self.width = width;
        self.flags = if width == 2 {
            CellFlags::WIDE
        } else {
            CellFlags::empty()
        };
        self.rendition = rendition;
        self.hyperlink = hyperlink;
        self.image = None;
    }

    /// Turn this cell into the trailing half of a wide character.
    pub fn make_continuation(&mut self, rendition: Rendition, hyperlink: HyperlinkId) {
        self.codepoints.clear();
        self.width = 0;
        self.flags = CellFlags::WIDE_CONTINUATION;
        self.rendition = rendition;
        self.hyperlink = hyperlink;
        self.image = None;
    }

    /// Append a combining mark / cluster extension to this cell.
    ///
    /// Returns the growth in display width (a variation selector can turn a
    /// narrow emoji presentation into a wide one). Marks past the per-cell
    /// cap are dropped.
    pub fn append(&mut self, ch: char) -> u8 {
        if self.codepoints.len() >= MAX_CODEPOINTS_PER_CELL {
            return 0;
        }
        self.codepoints.push(ch);
        // U+FE0F requests emoji presentation, which is two columns wide.
        if ch == '\u{FE0F}' && self.width == 1 {
            self.width = 2;
            self.flags.insert(CellFlags::WIDE);
            return 1;
        }
        let w = char_width(ch);
        if w > self.width {
            let grown = w - self.width;
            self.width = w;
            if w == 2 {
                self.flags.insert(CellFlags::WIDE);
            }
            return grown;
        }
        0
    }

    /// Reset to a blank carrying `bg`, as erase operations do.
    pub fn erase(&mut self, bg: Color) {
        self.codepoints.clear();
        self.width = 1;
        self.flags = CellFlags::empty();
        self.rendition = Rendition {
            bg,
            ..Rendition::default()
        };
        self.hyperlink = 0;
        self.image = None;
    }

    /// Reset to the default blank cell.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// The stored codepoints (empty for blanks and continuations).
    #[must_use]
    pub fn codepoints(&self) -> &[char] {
        &self.codepoints
    }

    /// The base character, or space for blank cells.
    #[must_use]
    pub fn base_char(&self) -> char {
        self.codepoints.first().copied().unwrap_or(' ')
    }

    /// Display width in columns.
    #[must_use]
    pub fn width(&self) -> u8 {
        self.width
    }

    #[must_use]
    pub fn is_wide(&self) -> bool {
        self.flags.contains(CellFlags::WIDE)
    }

    #[must_use]
    pub fn is_wide_continuation(&self) -> bool {
        self.flags.contains(CellFlags::WIDE_CONTINUATION)
    }

    /// Whether the cell shows nothing but background.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.codepoints.is_empty() && self.image.is_none() && !self.is_wide_continuation()
    }

    /// Content as text, with blanks rendering as a space.
    #[must_use]
    pub fn text(&self) -> String {
        if self.is_wide_continuation() {
            String::new()
        } else if self.codepoints.is_empty() {
            " ".to_string()
        } else {
            self.codepoints.iter().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cell_is_blank_space() {
        let cell = Cell::default();
        assert_eq!(cell.base_char(), ' ');
        assert_eq!(cell.width(), 1);
        assert!(cell.is_blank());
        assert_eq!(cell.hyperlink, 0);
        assert!(cell.image.is_none());
    }

    #[test]
    fn write_replaces_content_and_payloads() {
        let mut cell = Cell::default();
        cell.image = Some(ImageFragment {
            image: 7,
            cell: (0, 0),
        });
        let rendition = Rendition {
            flags: StyleFlags::BOLD,
            fg: Color::Bright(1),
            ..Rendition::default()
        };
        cell.write('x', 1, rendition, 9);
        assert_eq!(cell.base_char(), 'x');
        assert_eq!(cell.rendition.flags, StyleFlags::BOLD);
        assert_eq!(cell.hyperlink, 9);
        assert!(cell.image.is_none());
    }

    #[test]
    fn wide_write_sets_flag() {
        let mut cell = Cell::default();
        cell.write('中', 2, Rendition::default(), 0);
        assert!(cell.is_wide());
        assert_eq!(cell.width(), 2);
    }

    #[test]
    fn continuation_has_no_content() {
        let mut cell = Cell::default();
        cell.make_continuation(Rendition::default(), 3);
        assert!(cell.is_wide_continuation());
        assert_eq!(cell.width(), 0);
        assert_eq!(cell.text(), "");
        assert_eq!(cell.hyperlink, 3);
    }

    #[test]
    fn append_combining_mark_keeps_width() {
        let mut cell = Cell::default();
        cell.write('e', 1, Rendition::default(), 0);
        assert_eq!(cell.append('\u{0301}'), 0);
        assert_eq!(cell.text(), "e\u{0301}");
        assert_eq!(cell.width(), 1);
    }

    #[test]
    fn append_vs16_widens_emoji() {
        let mut cell = Cell::default();
        // U+2764 HEAVY BLACK HEART is narrow in text presentation.
        cell.write('\u{2764}', 1, Rendition::default(), 0);
        assert_eq!(cell.append('\u{FE0F}'), 1);
        assert_eq!(cell.width(), 2);
        assert!(cell.is_wide());
    }

    #[test]
    fn append_caps_out() {
        let mut cell = Cell::default();
        cell.write('a', 1, Rendition::default(), 0);
        for _ in 0..MAX_CODEPOINTS_PER_CELL {
            cell.append('\u{0301}');
        }
        assert_eq!(cell.codepoints().len(), MAX_CODEPOINTS_PER_CELL);
    }

    #[test]
    fn erase_keeps_background_only() {
        let mut cell = Cell::default();
        cell.write(
            'Z',
            1,
            Rendition {
                flags: StyleFlags::ITALIC | StyleFlags::CURLY_UNDERLINE,
                fg: Color::Rgb(1, 2, 3),
                bg: Color::Indexed(4),
                underline_color: Color::Indexed(5),
            },
            12,
        );
        cell.erase(Color::Indexed(2));
        assert!(cell.is_blank());
        assert_eq!(cell.rendition.bg, Color::Indexed(2));
        assert_eq!(cell.rendition.flags, StyleFlags::empty());
        assert_eq!(cell.hyperlink, 0);
    }

    // ── Hyperlink registry ─────────────────────────────────────────

    #[test]
    fn empty_uri_means_no_link() {
        let mut reg = HyperlinkRegistry::new();
        assert_eq!(reg.open(None, ""), 0);
        assert_eq!(reg.open(Some("x"), ""), 0);
    }

    #[test]
    fn tagged_links_share_a_handle() {
        let mut reg = HyperlinkRegistry::new();
        let a = reg.open(Some("doc"), "https://example.test/doc");
        let b = reg.open(Some("doc"), "https://example.test/doc");
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn anonymous_links_stay_distinct() {
        let mut reg = HyperlinkRegistry::new();
        let a = reg.open(None, "https://example.test");
        let b = reg.open(None, "https://example.test");
        assert_ne!(a, b);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn retagging_points_at_new_target() {
        let mut reg = HyperlinkRegistry::new();
        let a = reg.open(Some("t"), "https://one.test");
        reg.acquire(a);
        let b = reg.open(Some("t"), "https://two.test");
        assert_ne!(a, b);
        assert_eq!(reg.get(a).unwrap().uri, "https://one.test");
        assert_eq!(reg.get(b).unwrap().uri, "https://two.test");
    }

    #[test]
    fn refcount_drop_releases_slot() {
        let mut reg = HyperlinkRegistry::new();
        let id = reg.open(None, "https://gone.test");
        reg.acquire(id);
        reg.acquire(id);
        reg.release(id);
        assert!(reg.get(id).is_some());
        reg.release(id);
        assert!(reg.get(id).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn release_cells_drops_line_references() {
        let mut reg = HyperlinkRegistry::new();
        let id = reg.open(None, "https://row.test");
        let mut cells = vec![Cell::default(), Cell::default()];
        for cell in &mut cells {
            reg.acquire(id);
            cell.hyperlink = id;
        }
        reg.release_cells(cells.iter());
        assert!(reg.get(id).is_none());
    }

    #[test]
    fn char_width_classes() {
        assert_eq!(char_width('a'), 1);
        assert_eq!(char_width('中'), 2);
        assert_eq!(char_width('\u{0301}'), 0);
    }
}
