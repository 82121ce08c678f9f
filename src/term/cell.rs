//! Screen cells, attributes, and colors.
//!
//! A [`Cell`] is the atomic unit of the screen grid: one display
//! character plus the [`Attribute`] it was written with. Palette colors
//! (16- and 256-color SGR codes) are resolved to RGB at ingestion time so
//! the rest of the engine only ever deals with [`Color::Default`] or
//! [`Color::Rgb`].

use serde::{Deserialize, Serialize};

/// A terminal color: either the terminal default or a 24-bit RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Color {
    /// Default foreground/background as configured by the renderer.
    #[default]
    Default,
    /// 24-bit RGB color.
    Rgb(u8, u8, u8),
}

impl Color {
    /// Resolve a 256-color palette index to RGB.
    ///
    /// Indexes 0–15 map to the standard/bright ANSI palette, 16–231 to
    /// the 6×6×6 color cube, 232–255 to the grayscale ramp.
    #[must_use]
    pub fn from_index(idx: u8) -> Self {
        match idx {
            0..=15 => Self::from_ansi(idx),
            16..=231 => {
                let idx = idx - 16;
                let r = idx / 36;
                let g = (idx % 36) / 6;
                let b = idx % 6;
                // xterm cube steps: 0, 95, 135, 175, 215, 255
                let step = |v: u8| if v == 0 { 0 } else { 55 + v * 40 };
                Color::Rgb(step(r), step(g), step(b))
            }
            232..=255 => {
                let gray = 8 + (idx - 232) * 10;
                Color::Rgb(gray, gray, gray)
            }
        }
    }

    /// Resolve one of the 16 ANSI palette entries to RGB.
    ///
    /// Uses the xterm defaults; the renderer may theme these, but the
    /// engine stores concrete values so snapshots are self-contained.
    #[must_use]
    pub fn from_ansi(idx: u8) -> Self {
        const ANSI: [(u8, u8, u8); 16] = [
            (0, 0, 0),
            (205, 0, 0),
            (0, 205, 0),
            (205, 205, 0),
            (0, 0, 238),
            (205, 0, 205),
            (0, 205, 205),
            (229, 229, 229),
            (127, 127, 127),
            (255, 0, 0),
            (0, 255, 0),
            (255, 255, 0),
            (92, 92, 255),
            (255, 0, 255),
            (0, 255, 255),
            (255, 255, 255),
        ];
        let (r, g, b) = ANSI[(idx & 0x0F) as usize];
        Color::Rgb(r, g, b)
    }
}

/// Visual attributes a cell was written with.
///
/// Foreground and background color plus the SGR flag set. `Default`
/// yields the terminal's reset state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Attribute {
    pub fg: Color,
    pub bg: Color,
    pub bold: bool,
    pub dim: bool,
    pub italic: bool,
    pub underline: bool,
    pub blink: bool,
    pub inverse: bool,
    pub hidden: bool,
    pub strikethrough: bool,
}

impl Attribute {
    /// True if every field is at its reset value.
    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// One position in the screen grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    /// The displayed character. Space for blank cells.
    pub ch: char,
    /// Attributes the character was written with.
    pub attr: Attribute,
    /// Display width in columns. Always 1 today; 2 is reserved for a
    /// future wide-character extension.
    pub width: u8,
    /// Set when the cell changed since the renderer last consumed it.
    pub dirty: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            attr: Attribute::default(),
            width: 1,
            dirty: false,
        }
    }
}

impl Cell {
    /// A blank cell carrying the given attribute.
    ///
    /// Erase operations use this so cleared regions keep the current
    /// background color, matching xterm's behavior.
    #[must_use]
    pub fn blank(attr: Attribute) -> Self {
        Self {
            ch: ' ',
            attr,
            width: 1,
            dirty: true,
        }
    }

    /// Reset this cell to a blank with the given attribute.
    pub fn clear(&mut self, attr: Attribute) {
        *self = Self::blank(attr);
    }
}

/// A row of exactly `cols` cells.
pub type Line = Vec<Cell>;

/// Build a blank line of `cols` default cells.
#[must_use]
pub fn blank_line(cols: usize) -> Line {
    vec![Cell::default(); cols]
}

/// Collect the text of a line, trimming trailing blanks.
#[must_use]
pub fn line_text(line: &[Cell]) -> String {
    let mut s: String = line.iter().map(|c| c.ch).collect();
    while s.ends_with(' ') {
        s.pop();
    }
    s
}
