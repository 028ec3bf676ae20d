//! Static registry of the two physical displays.
//!
//! The device has exactly two screens and their geometry never changes at
//! runtime, so specs are `'static` values rather than something built from
//! configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BusyError;

// ── DisplayName ──────────────────────────────────────────────────

/// Logical name of a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayName {
    /// 72×16 RGB LED matrix.
    Front,
    /// 160×80 4-bit grayscale OLED.
    Back,
}

impl DisplayName {
    pub const fn as_str(self) -> &'static str {
        match self {
            DisplayName::Front => "front",
            DisplayName::Back => "back",
        }
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── DisplaySpec ──────────────────────────────────────────────────

/// Geometry and wire-format constants of one display.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct DisplaySpec {
    pub name: DisplayName,
    /// Index used on the wire (`?display=` and the WebSocket selector).
    pub index: u8,
    pub width: usize,
    pub height: usize,
    pub description: &'static str,
}

pub static FRONT_DISPLAY: DisplaySpec = DisplaySpec {
    name: DisplayName::Front,
    index: 0,
    width: 72,
    height: 16,
    description: "72x16 RGB LED matrix, ~16M colors, >800 nits",
};

pub static BACK_DISPLAY: DisplaySpec = DisplaySpec {
    name: DisplayName::Back,
    index: 1,
    width: 160,
    height: 80,
    description: "160x80 monochrome OLED, 16 gray scales",
};

/// All displays, ordered by wire index.
pub static DISPLAYS: [&DisplaySpec; 2] = [&FRONT_DISPLAY, &BACK_DISPLAY];

impl DisplaySpec {
    /// Number of logical pixels.
    pub const fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Size of a canonical RGB24 frame for this display.
    pub const fn canonical_len(&self) -> usize {
        self.pixel_count() * 3
    }

    /// Size of a 4-bit packed (two pixels per byte) frame.
    pub const fn packed_len(&self) -> usize {
        self.pixel_count() / 2
    }

    /// RLE block size used by the WebSocket stream.
    ///
    /// This is a fixed protocol constant, not derived from the pixel format.
    pub const fn rle_block_size(&self) -> usize {
        match self.name {
            DisplayName::Front => 3,
            DisplayName::Back => 2,
        }
    }

    /// Multiplier that maps a single-byte gray value onto 0..=255.
    pub const fn gray_factor(&self) -> u8 {
        match self.name {
            DisplayName::Front => 1,
            DisplayName::Back => 17,
        }
    }

    pub const fn is_back(&self) -> bool {
        matches!(self.name, DisplayName::Back)
    }

    /// The other display; used when the user switches screens.
    pub fn other(&self) -> &'static DisplaySpec {
        match self.name {
            DisplayName::Front => &BACK_DISPLAY,
            DisplayName::Back => &FRONT_DISPLAY,
        }
    }

    pub fn by_name(name: DisplayName) -> &'static DisplaySpec {
        match name {
            DisplayName::Front => &FRONT_DISPLAY,
            DisplayName::Back => &BACK_DISPLAY,
        }
    }

    pub fn from_index(index: u8) -> Result<&'static DisplaySpec, BusyError> {
        DISPLAYS
            .get(index as usize)
            .copied()
            .ok_or_else(|| BusyError::UnsupportedDisplay(format!("index {index}")))
    }

    /// Resolve by name, ignoring surrounding whitespace and case.
    pub fn from_name(name: &str) -> Result<&'static DisplaySpec, BusyError> {
        let wanted = name.trim().to_ascii_lowercase();
        DISPLAYS
            .iter()
            .copied()
            .find(|spec| spec.name.as_str() == wanted)
            .ok_or_else(|| BusyError::UnsupportedDisplay(format!("name {name:?}")))
    }

    /// Resolve an optional user selection; nothing selected means front.
    pub fn resolve(selection: Option<&str>) -> Result<&'static DisplaySpec, BusyError> {
        match selection {
            None => Ok(&FRONT_DISPLAY),
            Some(s) => s.parse::<DisplayRef>().map(|r| r.0),
        }
    }
}

impl fmt::Display for DisplaySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}x{})", self.name, self.width, self.height)
    }
}

// ── DisplayRef ───────────────────────────────────────────────────

/// A parsed display selection: either a name (`"back"`) or an index (`"1"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayRef(pub &'static DisplaySpec);

impl FromStr for DisplayRef {
    type Err = BusyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<u8>() {
            Ok(index) => DisplaySpec::from_index(index).map(DisplayRef),
            Err(_) => DisplaySpec::from_name(s).map(DisplayRef),
        }
    }
}
