//! Line editor for `:` command mode.
//!
//! While a command is being typed, raw input goes here instead of the key
//! decoder. Left/Right move the cursor, Up/Down walk the history, `Enter`
//! submits and a lone `ESC` cancels. Bytes after the submit or cancel are
//! handed back so the caller can decode them as ordinary keys.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Result of feeding bytes to the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEdit {
    /// Buffer or cursor changed. `cursor` counts characters, not bytes.
    Update { text: String, cursor: usize },
    /// `Enter` pressed; carries the trimmed line.
    Submit(String),
    /// Lone `ESC`; command mode ends without running anything.
    Cancel,
}

// ── History ──────────────────────────────────────────────────────

/// Submitted lines, optionally persisted one per line to a file.
#[derive(Debug)]
pub struct History {
    entries: Vec<String>,
    max: usize,
    path: Option<PathBuf>,
}

impl History {
    pub const DEFAULT_MAX: usize = 100;

    pub fn in_memory(max: usize) -> Self {
        Self {
            entries: Vec::new(),
            max,
            path: None,
        }
    }

    /// Load the last `max` non-blank lines of `path`. A missing or unreadable
    /// file starts an empty history that is still written back to `path`.
    pub fn load(path: impl Into<PathBuf>, max: usize) -> Self {
        let path = path.into();
        let mut entries: Vec<String> = match fs::read_to_string(&path) {
            Ok(text) => text
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) => {
                tracing::debug!("no command history at {}: {e}", path.display());
                Vec::new()
            }
        };
        if entries.len() > max {
            entries.drain(..entries.len() - max);
        }
        Self {
            entries,
            max,
            path: Some(path),
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    fn push(&mut self, line: &str) {
        self.entries.push(line.to_string());
        let overflow = self.entries.len() > self.max;
        if overflow {
            self.entries.drain(..self.entries.len() - self.max);
        }
        if let Err(e) = self.persist(line, overflow) {
            tracing::debug!("command history not saved: {e}");
        }
    }

    /// Append `line`, or rewrite the whole file after trimming.
    fn persist(&self, line: &str, rewrite: bool) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        if rewrite {
            let mut text = self.entries.join("\n");
            text.push('\n');
            fs::write(path, text)
        } else {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{line}")
        }
    }
}

// ── CommandLine ──────────────────────────────────────────────────

#[derive(Debug)]
pub struct CommandLine {
    buffer: String,
    cursor: usize,
    /// Bytes of an incomplete UTF-8 character or escape sequence.
    pending: Vec<u8>,
    history: History,
    history_index: Option<usize>,
}

impl Default for CommandLine {
    fn default() -> Self {
        Self::with_history(History::in_memory(History::DEFAULT_MAX))
    }
}

impl CommandLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(history: History) -> Self {
        Self {
            buffer: String::new(),
            cursor: 0,
            pending: Vec::new(),
            history,
            history_index: None,
        }
    }

    /// Start a fresh line; history is kept.
    pub fn begin(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
        self.pending.clear();
        self.history_index = None;
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Feed raw bytes.
    ///
    /// Returns the edits and, once the line was submitted or cancelled, the
    /// bytes that followed it (empty while the line is still open).
    pub fn feed(&mut self, data: &[u8]) -> (Vec<CommandEdit>, Vec<u8>) {
        let mut edits = Vec::new();
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(data);

        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\r' | b'\n' => {
                    let line = self.buffer.trim().to_string();
                    if !line.is_empty() {
                        self.history.push(&line);
                    }
                    self.begin();
                    edits.push(CommandEdit::Submit(line));
                    return (edits, bytes[i + 1..].to_vec());
                }
                0x1b => match bytes.get(i + 1) {
                    Some(b'[') | Some(b'O') => {
                        let end = bytes[i + 2..]
                            .iter()
                            .position(|b| (0x40..=0x7e).contains(b));
                        match end {
                            Some(pos) => {
                                // Only bare `ESC [ X` arrows; modified keys are skipped.
                                if pos == 0 {
                                    self.arrow(bytes[i + 2], &mut edits);
                                }
                                i += 3 + pos;
                            }
                            None => {
                                self.pending = bytes[i..].to_vec();
                                return (edits, Vec::new());
                            }
                        }
                    }
                    _ => {
                        self.begin();
                        edits.push(CommandEdit::Cancel);
                        return (edits, bytes[i + 1..].to_vec());
                    }
                },
                0x7f | 0x08 => {
                    if self.cursor > 0 {
                        let at = self.byte_index(self.cursor - 1);
                        self.buffer.remove(at);
                        self.cursor -= 1;
                        self.push_update(&mut edits);
                    }
                    i += 1;
                }
                b if b < 0x20 => i += 1,
                _ => {
                    let rest = &bytes[i..];
                    let valid = match std::str::from_utf8(rest) {
                        Ok(s) => s,
                        Err(e) if e.valid_up_to() > 0 => {
                            std::str::from_utf8(&rest[..e.valid_up_to()]).unwrap_or_default()
                        }
                        Err(e) if e.error_len().is_none() => {
                            self.pending = rest.to_vec();
                            return (edits, Vec::new());
                        }
                        Err(_) => {
                            i += 1;
                            continue;
                        }
                    };
                    let ch_end = valid
                        .char_indices()
                        .find(|(_, c)| c.is_control())
                        .map_or(valid.len(), |(idx, _)| idx);
                    if ch_end == 0 {
                        i += 1;
                        continue;
                    }
                    let typed = &valid[..ch_end];
                    let at = self.byte_index(self.cursor);
                    self.buffer.insert_str(at, typed);
                    self.cursor += typed.chars().count();
                    i += ch_end;
                    self.push_update(&mut edits);
                }
            }
        }

        (edits, Vec::new())
    }

    fn byte_index(&self, cursor: usize) -> usize {
        self.buffer
            .char_indices()
            .nth(cursor)
            .map_or(self.buffer.len(), |(idx, _)| idx)
    }

    fn push_update(&self, edits: &mut Vec<CommandEdit>) {
        edits.push(CommandEdit::Update {
            text: self.buffer.clone(),
            cursor: self.cursor,
        });
    }

    fn arrow(&mut self, code: u8, edits: &mut Vec<CommandEdit>) {
        let entries = self.history.entries();
        match code {
            b'D' if self.cursor > 0 => self.cursor -= 1,
            b'C' if self.cursor < self.buffer.chars().count() => self.cursor += 1,
            b'A' if !entries.is_empty() => {
                let index = self
                    .history_index
                    .map_or(entries.len() - 1, |i| i.saturating_sub(1));
                self.history_index = Some(index);
                self.buffer = entries[index].clone();
                self.cursor = self.buffer.chars().count();
            }
            b'B' => match self.history_index {
                Some(i) if i + 1 < entries.len() => {
                    self.history_index = Some(i + 1);
                    self.buffer = entries[i + 1].clone();
                    self.cursor = self.buffer.chars().count();
                }
                Some(_) => {
                    self.history_index = None;
                    self.buffer.clear();
                    self.cursor = 0;
                }
                None => return,
            },
            _ => return,
        }
        self.push_update(edits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(text: &str, cursor: usize) -> CommandEdit {
        CommandEdit::Update {
            text: text.into(),
            cursor,
        }
    }

    #[test]
    fn typing_and_submit() {
        let mut line = CommandLine::new();
        let (edits, rest) = line.feed(b"key up \r");
        assert_eq!(edits.last(), Some(&CommandEdit::Submit("key up".into())));
        assert!(rest.is_empty());
        assert_eq!(line.text(), "");
    }

    #[test]
    fn bytes_after_submit_are_returned() {
        let mut line = CommandLine::new();
        let (edits, rest) = line.feed(b"display\r\x1b[A");
        assert_eq!(edits.last(), Some(&CommandEdit::Submit("display".into())));
        assert_eq!(rest, b"\x1b[A");
    }

    #[test]
    fn bytes_after_cancel_are_returned() {
        let mut line = CommandLine::new();
        let (edits, rest) = line.feed(b"st\x1bq");
        assert_eq!(edits.last(), Some(&CommandEdit::Cancel));
        assert_eq!(rest, b"q");
    }

    #[test]
    fn backspace_edits() {
        let mut line = CommandLine::new();
        line.feed(b"keyy");
        let (edits, _) = line.feed(&[0x7f]);
        assert_eq!(edits, vec![update("key", 3)]);
    }

    #[test]
    fn cursor_moves_and_inserts() {
        let mut line = CommandLine::new();
        line.feed(b"ky");
        let (edits, _) = line.feed(b"\x1b[D");
        assert_eq!(edits, vec![update("ky", 1)]);
        let (edits, _) = line.feed(b"e");
        assert_eq!(edits, vec![update("key", 2)]);
        line.feed(b"\x1b[C\x1b[C");
        assert_eq!(line.cursor(), 3);
        line.feed(&[0x7f]);
        assert_eq!(line.text(), "ke");
    }

    #[test]
    fn lone_escape_cancels_but_arrows_do_not() {
        let mut line = CommandLine::new();
        line.feed(b"st");
        let (edits, _) = line.feed(b"\x1b[1;5A");
        assert!(edits.is_empty());
        assert_eq!(line.text(), "st");
        let (edits, _) = line.feed(b"\x1b");
        assert_eq!(edits, vec![CommandEdit::Cancel]);
        assert_eq!(line.text(), "");
    }

    #[test]
    fn history_walks_up_and_down() {
        let mut line = CommandLine::new();
        line.feed(b"first\r");
        line.feed(b"second\r");
        line.begin();

        line.feed(b"\x1b[A");
        assert_eq!(line.text(), "second");
        line.feed(b"\x1b[A");
        line.feed(b"\x1b[A");
        assert_eq!(line.text(), "first");
        line.feed(b"\x1b[B");
        assert_eq!(line.text(), "second");
        let (edits, _) = line.feed(b"\x1b[B");
        assert_eq!(edits, vec![update("", 0)]);
    }

    #[test]
    fn history_persists_and_trims() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.log");

        let mut line = CommandLine::with_history(History::load(&path, 2));
        line.feed(b"one\r");
        line.feed(b"two\r");
        line.feed(b"  \r");
        line.feed(b"three\r");
        assert_eq!(line.history().entries(), ["two", "three"]);

        let reloaded = History::load(&path, 2);
        assert_eq!(reloaded.entries(), ["two", "three"]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two\nthree\n");
    }

    #[test]
    fn split_utf8_is_buffered() {
        let mut line = CommandLine::new();
        let snowman = "☃".as_bytes();
        assert!(line.feed(&snowman[..1]).0.is_empty());
        assert_eq!(line.feed(&snowman[1..]).0, vec![update("☃", 1)]);
    }
}
