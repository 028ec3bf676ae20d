//! Shared frame types for the mirroring pipeline.
//!
//! Raw frames are plain byte buffers straight off the transport. A
//! [`CanonicalFrame`] is what the renderer consumes: row-major RGB24 at the
//! exact size of its display.

use std::ops::Deref;

use crate::display::DisplaySpec;

// ── StreamMessage ────────────────────────────────────────────────

/// One message read from the WebSocket screen stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    /// RLE-compressed frame bytes.
    Binary(Vec<u8>),
    /// Informational server text; never decoded as pixels.
    Text(String),
}

// ── CanonicalFrame ───────────────────────────────────────────────

/// A decoded frame, guaranteed to be `spec.canonical_len()` bytes long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalFrame {
    spec: &'static DisplaySpec,
    data: Vec<u8>,
}

impl CanonicalFrame {
    /// Wrap `data` if it has exactly the canonical length for `spec`.
    pub fn new(spec: &'static DisplaySpec, data: Vec<u8>) -> Option<Self> {
        (data.len() == spec.canonical_len()).then_some(Self { spec, data })
    }

    pub fn spec(&self) -> &'static DisplaySpec {
        self.spec
    }

    pub fn width(&self) -> usize {
        self.spec.width
    }

    pub fn height(&self) -> usize {
        self.spec.height
    }

    /// RGB triplet at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let offset = (y * self.spec.width + x) * 3;
        [self.data[offset], self.data[offset + 1], self.data[offset + 2]]
    }

    /// Iterate rows of RGB triplets.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(self.spec.width * 3)
    }

    /// Whether every pixel is pure black.
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl Deref for CanonicalFrame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}
