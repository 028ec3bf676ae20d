//! # busy-remote: terminal mirror for the Busy Bar
//!
//! Mirrors one of the device's two displays into the terminal with
//! truecolor glyphs and forwards key presses to the device. `Tab` or
//! `Ctrl+R` switches displays, `:` opens the command line, `Ctrl+Q` quits.

pub mod config;
pub mod stdin;
pub mod terminal;
