//! Color palette: resolves cell colors to concrete RGB values and backs the
//! OSC 4/10/11 dynamic-color protocol.

use crate::cell::Color;

/// A concrete 24-bit color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse an X11-style color spec: `rgb:RR/GG/BB` (1–4 hex digits per
    /// channel, scaled) or `#RRGGBB`.
    #[must_use]
    pub fn parse(spec: &str) -> Option<Self> {
        if let Some(rest) = spec.strip_prefix("rgb:") {
            let mut channels = rest.split('/');
            let r = scale_channel(channels.next()?)?;
            let g = scale_channel(channels.next()?)?;
            let b = scale_channel(channels.next()?)?;
            if channels.next().is_some() {
                return None;
            }
            return Some(Self { r, g, b });
        }
        if let Some(hex) = spec.strip_prefix('#') {
            if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                return Some(Self { r, g, b });
            }
        }
        None
    }

    /// Format as the 16-bit-per-channel `rgb:RRRR/GGGG/BBBB` form used in
    /// dynamic-color query replies.
    #[must_use]
    pub fn to_x11_spec(self) -> String {
        // Widen 8-bit channels by repetition (0xAB -> 0xABAB).
        format!(
            "rgb:{0:02x}{0:02x}/{1:02x}{1:02x}/{2:02x}{2:02x}",
            self.r, self.g, self.b
        )
    }
}

fn scale_channel(digits: &str) -> Option<u8> {
    if digits.is_empty() || digits.len() > 4 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let value = u32::from_str_radix(digits, 16).ok()?;
    let max = (1u32 << (4 * digits.len() as u32)) - 1;
    Some(((value * 255 + max / 2) / max) as u8)
}

/// Which end of a cell a color is resolved for. Affects only the
/// [`Color::Default`] and [`Color::Undefined`] fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorTarget {
    Foreground,
    Background,
}

/// The 256-entry indexed palette plus the dynamic default colors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorPalette {
    indexed: [RgbColor; 256],
    pub default_foreground: RgbColor,
    pub default_background: RgbColor,
    pub cursor: RgbColor,
}

impl Default for ColorPalette {
    fn default() -> Self {
        Self {
            indexed: build_xterm_palette(),
            default_foreground: RgbColor::new(0xd0, 0xd0, 0xd0),
            default_background: RgbColor::new(0x00, 0x00, 0x00),
            cursor: RgbColor::new(0xd0, 0xd0, 0xd0),
        }
    }
}

impl ColorPalette {
    /// Color of an indexed palette slot.
    #[must_use]
    pub fn indexed(&self, index: u8) -> RgbColor {
        self.indexed[index as usize]
    }

    /// Redefine an indexed palette slot (OSC 4).
    pub fn set_indexed(&mut self, index: u8, color: RgbColor) {
        self.indexed[index as usize] = color;
    }

    /// Resolve a cell color to RGB.
    #[must_use]
    pub fn resolve(&self, color: Color, target: ColorTarget) -> RgbColor {
        match color {
            Color::Default | Color::Undefined => match target {
                ColorTarget::Foreground => self.default_foreground,
                ColorTarget::Background => self.default_background,
            },
            Color::Indexed(n) => self.indexed(n),
            Color::Bright(n) => self.indexed(8 + (n & 7)),
            Color::Rgb(r, g, b) => RgbColor::new(r, g, b),
        }
    }
}

/// The xterm 256-color layout: 16 named, a 6×6×6 cube, and a gray ramp.
fn build_xterm_palette() -> [RgbColor; 256] {
    let mut pal = [RgbColor::default(); 256];

    const BASE: [(u8, u8, u8); 16] = [
        (0x00, 0x00, 0x00),
        (0xcd, 0x00, 0x00),
        (0x00, 0xcd, 0x00),
        (0xcd, 0xcd, 0x00),
        (0x00, 0x00, 0xee),
        (0xcd, 0x00, 0xcd),
        (0x00, 0xcd, 0xcd),
        (0xe5, 0xe5, 0xe5),
        (0x7f, 0x7f, 0x7f),
        (0xff, 0x00, 0x00),
        (0x00, 0xff, 0x00),
        (0xff, 0xff, 0x00),
        (0x5c, 0x5c, 0xff),
        (0xff, 0x00, 0xff),
        (0x00, 0xff, 0xff),
        (0xff, 0xff, 0xff),
    ];
    for (i, &(r, g, b)) in BASE.iter().enumerate() {
        pal[i] = RgbColor::new(r, g, b);
    }

    let ramp = |v: usize| -> u8 {
        if v == 0 { 0 } else { (40 * v + 55) as u8 }
    };
    for r in 0..6 {
        for g in 0..6 {
            for b in 0..6 {
                pal[16 + 36 * r + 6 * g + b] = RgbColor::new(ramp(r), ramp(g), ramp(b));
            }
        }
    }

    for i in 0..24 {
        let v = (8 + 10 * i) as u8;
        pal[232 + i] = RgbColor::new(v, v, v);
    }

    pal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_corner_colors() {
        let pal = ColorPalette::default();
        assert_eq!(pal.indexed(0), RgbColor::new(0, 0, 0));
        assert_eq!(pal.indexed(15), RgbColor::new(255, 255, 255));
        assert_eq!(pal.indexed(16), RgbColor::new(0, 0, 0));
        assert_eq!(pal.indexed(231), RgbColor::new(255, 255, 255));
        assert_eq!(pal.indexed(232), RgbColor::new(8, 8, 8));
        assert_eq!(pal.indexed(255), RgbColor::new(238, 238, 238));
    }

    #[test]
    fn bright_resolves_into_upper_half() {
        let pal = ColorPalette::default();
        assert_eq!(
            pal.resolve(Color::Bright(1), ColorTarget::Foreground),
            pal.indexed(9)
        );
    }

    #[test]
    fn default_and_undefined_use_target_defaults() {
        let pal = ColorPalette::default();
        assert_eq!(
            pal.resolve(Color::Default, ColorTarget::Background),
            pal.default_background
        );
        assert_eq!(
            pal.resolve(Color::Undefined, ColorTarget::Foreground),
            pal.default_foreground
        );
    }

    #[test]
    fn parse_hash_form() {
        assert_eq!(
            RgbColor::parse("#ff8000"),
            Some(RgbColor::new(0xff, 0x80, 0x00))
        );
        assert_eq!(RgbColor::parse("#ff80"), None);
    }

    #[test]
    fn parse_x11_forms() {
        assert_eq!(
            RgbColor::parse("rgb:ff/80/00"),
            Some(RgbColor::new(0xff, 0x80, 0x00))
        );
        // 4-digit channels scale down.
        assert_eq!(
            RgbColor::parse("rgb:ffff/8080/0000"),
            Some(RgbColor::new(0xff, 0x80, 0x00))
        );
        // 1-digit channels scale up: f -> ff.
        assert_eq!(
            RgbColor::parse("rgb:f/0/0"),
            Some(RgbColor::new(0xff, 0, 0))
        );
        assert_eq!(RgbColor::parse("rgb:ff/80"), None);
    }

    #[test]
    fn x11_spec_roundtrip() {
        let c = RgbColor::new(0x12, 0xab, 0xff);
        assert_eq!(c.to_x11_spec(), "rgb:1212/abab/ffff");
        assert_eq!(RgbColor::parse(&c.to_x11_spec()), Some(c));
    }

    #[test]
    fn set_indexed_overrides_slot() {
        let mut pal = ColorPalette::default();
        pal.set_indexed(1, RgbColor::new(1, 2, 3));
        assert_eq!(
            pal.resolve(Color::Indexed(1), ColorTarget::Foreground),
            RgbColor::new(1, 2, 3)
        );
    }
}
