//! Stateful byte stream → key event decoder.
//!
//! Terminals deliver keys as byte sequences that may be split across
//! `read()` calls (`ESC` in one chunk, `[A` in the next). The decoder keeps
//! unfinished sequences buffered and resolves them by longest match.

use std::collections::HashSet;

use crate::input::keymap::{KeyEvent, KeyMap};

/// One decoded item: the raw bytes consumed and their meaning, if any.
pub type DecodedKey = (Vec<u8>, Option<KeyEvent>);

pub struct KeyDecoder {
    keymap: KeyMap,
    /// Known sequences, longest first.
    sequences: Vec<Vec<u8>>,
    /// Every strict prefix of a known sequence.
    prefixes: HashSet<Vec<u8>>,
    buffer: Vec<u8>,
}

impl KeyDecoder {
    pub fn new(keymap: KeyMap) -> Self {
        let mut sequences: Vec<Vec<u8>> = keymap.sequences().cloned().collect();
        sequences.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        sequences.dedup();

        let prefixes = sequences
            .iter()
            .flat_map(|seq| (1..seq.len()).map(move |i| seq[..i].to_vec()))
            .collect();

        Self {
            keymap,
            sequences,
            prefixes,
            buffer: Vec::new(),
        }
    }

    pub fn keymap(&self) -> &KeyMap {
        &self.keymap
    }

    /// Feed a chunk of raw input and return the keys it completes.
    ///
    /// A buffer that is still a strict prefix of a longer known sequence is
    /// kept for the next call, even if a shorter sequence already matches.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DecodedKey> {
        self.buffer.extend_from_slice(chunk);
        self.drain(false)
    }

    /// Resolve everything buffered without waiting for more bytes.
    ///
    /// Called after an input timeout so a lone `ESC` is not held forever.
    pub fn flush(&mut self) -> Vec<DecodedKey> {
        self.drain(true)
    }

    /// Number of bytes waiting for a longer sequence to complete.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn drain(&mut self, force: bool) -> Vec<DecodedKey> {
        let mut events = Vec::new();

        while !self.buffer.is_empty() {
            if !force && self.prefixes.contains(&self.buffer) {
                break;
            }

            let matched = self
                .sequences
                .iter()
                .find(|seq| self.buffer.starts_with(seq))
                .map(Vec::len);

            let len = match matched {
                Some(len) => len,
                None => {
                    tracing::trace!("unmapped input byte {:#04x}", self.buffer[0]);
                    1
                }
            };

            let raw: Vec<u8> = self.buffer.drain(..len).collect();
            let event = matched.and_then(|_| self.keymap.lookup(&raw));
            events.push((raw, event));
        }

        events
    }
}

// ── Tests ────────────────────────────────────────────────────────
