//! Terminal key input: keymaps, the streaming key decoder and the `:`
//! command-line editor.

pub mod command_line;
pub mod decoder;
pub mod keymap;

pub use command_line::{CommandEdit, CommandLine, History};
pub use decoder::{DecodedKey, KeyDecoder};
pub use keymap::{InputKey, KeyEvent, KeyMap, encode_human_key};

/// Bytes that request a switch to the other display (`Tab`, `Ctrl+R`).
pub const SWITCH_DISPLAY_BYTES: [u8; 2] = [b'\t', 0x12];

/// Byte that opens command mode.
pub const COMMAND_PREFIX: u8 = b':';

/// Whether a raw input chunk contains the display-switch chord.
pub fn is_switch_chord(chunk: &[u8]) -> bool {
    chunk.iter().any(|b| SWITCH_DISPLAY_BYTES.contains(b))
}
