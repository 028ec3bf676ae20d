//! Frame decoder / normaliser.
//!
//! Takes raw frames as received from either transport and reconstructs a
//! [`CanonicalFrame`] that the renderer can draw. Frames that cannot be
//! turned into exactly one canonical buffer are dropped.

use crate::display::DisplaySpec;
use crate::mirror::rle::rle_decode;
use crate::mirror::types::CanonicalFrame;

/// Decode any accepted wire representation into a canonical RGB24 frame.
///
/// `from_ws` marks frames from the WebSocket stream, which are RLE
/// compressed. HTTP-polled frames arrive uncompressed and are matched on
/// size alone.
pub fn decode_frame(
    data: &[u8],
    spec: &'static DisplaySpec,
    from_ws: bool,
) -> Option<CanonicalFrame> {
    let decompressed;
    let mut data = data;

    if from_ws {
        match rle_decode(data, spec.rle_block_size()) {
            Some(out) if !out.is_empty() => {
                decompressed = out;
                data = &decompressed;
            }
            _ => tracing::debug!(
                "rle decode failed for {} frame len={}; trying raw sizes",
                spec.name,
                data.len()
            ),
        }
    }

    let len = data.len();
    let rgb = if len == spec.canonical_len() {
        data.to_vec()
    } else if spec.is_back() && len == spec.packed_len() {
        unpack_l4(data)
    } else if len == spec.pixel_count() {
        expand_gray(data, spec.gray_factor())
    } else {
        tracing::debug!(
            "dropping {} frame: len={} (expected {}, {} or {})",
            spec.name,
            len,
            spec.canonical_len(),
            spec.packed_len(),
            spec.pixel_count()
        );
        return None;
    };

    CanonicalFrame::new(spec, rgb)
}

/// Two 4-bit pixels per byte, low nibble first, each scaled by 17.
fn unpack_l4(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 6);
    for &byte in data {
        for v in [byte & 0x0F, byte >> 4] {
            let g = v * 17;
            out.extend_from_slice(&[g, g, g]);
        }
    }
    out
}

fn expand_gray(data: &[u8], factor: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 3);
    for &v in data {
        // Front frames are already 8-bit; back values never exceed 15.
        let g = v.saturating_mul(factor);
        out.extend_from_slice(&[g, g, g]);
    }
    out
}

// ── FrameDecoder ─────────────────────────────────────────────────

/// Per-session decoder that counts decoded and dropped frames.
#[derive(Debug)]
pub struct FrameDecoder {
    spec: &'static DisplaySpec,
    decoded: u64,
    dropped: u64,
}

impl FrameDecoder {
    pub fn new(spec: &'static DisplaySpec) -> Self {
        Self {
            spec,
            decoded: 0,
            dropped: 0,
        }
    }

    pub fn spec(&self) -> &'static DisplaySpec {
        self.spec
    }

    /// Decode one frame, updating counters.
    pub fn decode(&mut self, data: &[u8], from_ws: bool) -> Option<CanonicalFrame> {
        if data.is_empty() {
            tracing::debug!("stream frame empty; skipping");
            self.dropped += 1;
            return None;
        }
        if data.len() != self.spec.canonical_len() {
            tracing::trace!(
                "frame len={} (expected {})",
                data.len(),
                self.spec.canonical_len()
            );
        }
        match decode_frame(data, self.spec, from_ws) {
            Some(frame) => {
                self.decoded += 1;
                Some(frame)
            }
            None => {
                self.dropped += 1;
                None
            }
        }
    }

    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

// ── Tests ────────────────────────────────────────────────────────
