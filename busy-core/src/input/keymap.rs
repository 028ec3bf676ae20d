//! Terminal key sequences → device input keys.
//!
//! A [`KeyMap`] is built once (defaults or a JSON file) and read-only while
//! decoding. Keys are written in a human form (`"up"`, `"ctrl+q"`, `"f2"`,
//! `"k"`) and encoded into the raw bytes a terminal sends for them.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BusyError;

// ── InputKey ─────────────────────────────────────────────────────

/// Physical buttons accepted by `POST /api/input`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKey {
    Up,
    Down,
    Ok,
    Back,
    Start,
    Busy,
    Status,
    Off,
    Apps,
    Settings,
}

impl InputKey {
    pub const ALL: [InputKey; 10] = [
        InputKey::Up,
        InputKey::Down,
        InputKey::Ok,
        InputKey::Back,
        InputKey::Start,
        InputKey::Busy,
        InputKey::Status,
        InputKey::Off,
        InputKey::Apps,
        InputKey::Settings,
    ];

    /// Name used on the wire (`?key=`).
    pub const fn as_str(self) -> &'static str {
        match self {
            InputKey::Up => "up",
            InputKey::Down => "down",
            InputKey::Ok => "ok",
            InputKey::Back => "back",
            InputKey::Start => "start",
            InputKey::Busy => "busy",
            InputKey::Status => "status",
            InputKey::Off => "off",
            InputKey::Apps => "apps",
            InputKey::Settings => "settings",
        }
    }
}

impl fmt::Display for InputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputKey {
    type Err = BusyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        InputKey::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| BusyError::Keymap(format!("unknown input key: {s}")))
    }
}

// ── KeyEvent ─────────────────────────────────────────────────────

/// A decoded logical key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyEvent {
    /// A device button to forward.
    Key(InputKey),
    /// End the streaming session.
    Exit,
    /// Toggle the help overlay; never forwarded.
    Help,
}

// ── Human key specs ──────────────────────────────────────────────

/// Encode a human-friendly key spec into terminal bytes.
///
/// Accepts special names (`up`, `enter`, `esc`, `f1`..`f5`, ...),
/// `ctrl+<char>`, backslash escapes (`\x1b[A`, `\t`) and plain text.
pub fn encode_human_key(spec: &str) -> Vec<u8> {
    let lower = spec.to_ascii_lowercase();
    let special: Option<&[u8]> = match lower.as_str() {
        "up" => Some(b"\x1b[A"),
        "down" => Some(b"\x1b[B"),
        "right" => Some(b"\x1b[C"),
        "left" => Some(b"\x1b[D"),
        "enter" | "return" => Some(b"\r"),
        "esc" => Some(b"\x1b"),
        "space" => Some(b" "),
        "comma" => Some(b","),
        "tab" => Some(b"\t"),
        "f1" => Some(b"\x1bOP"),
        "f2" => Some(b"\x1bOQ"),
        "f3" => Some(b"\x1bOR"),
        "f4" => Some(b"\x1bOS"),
        "f5" => Some(b"\x1b[15~"),
        _ => None,
    };
    if let Some(seq) = special {
        return seq.to_vec();
    }

    if let Some(rest) = lower.strip_prefix("ctrl+") {
        let mut chars = rest.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c.is_ascii() {
                return vec![(c as u8) & 0x1F];
            }
        }
    }

    unescape(spec)
}

fn unescape(spec: &str) -> Vec<u8> {
    let bytes = spec.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 >= bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        match bytes[i + 1] {
            b'x' => {
                let hex = spec.get(i + 2..i + 4).and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(b) => {
                        out.push(b);
                        i += 4;
                    }
                    None => {
                        out.push(b'\\');
                        i += 1;
                    }
                }
            }
            b'e' => {
                out.push(0x1b);
                i += 2;
            }
            b't' => {
                out.push(b'\t');
                i += 2;
            }
            b'r' => {
                out.push(b'\r');
                i += 2;
            }
            b'n' => {
                out.push(b'\n');
                i += 2;
            }
            b'\\' => {
                out.push(b'\\');
                i += 2;
            }
            _ => {
                out.push(b'\\');
                i += 1;
            }
        }
    }
    out
}

// ── KeyMap ───────────────────────────────────────────────────────

const DEFAULT_MAPPING: [(&str, InputKey); 13] = [
    ("up", InputKey::Up),
    ("down", InputKey::Down),
    ("right", InputKey::Ok),
    ("enter", InputKey::Ok),
    ("return", InputKey::Ok),
    ("left", InputKey::Back),
    ("esc", InputKey::Back),
    ("space", InputKey::Start),
    ("f1", InputKey::Busy),
    ("f2", InputKey::Status),
    ("f3", InputKey::Off),
    ("f4", InputKey::Apps),
    ("f5", InputKey::Settings),
];

const DEFAULT_EXIT_KEYS: [&str; 1] = ["ctrl+q"];
const DEFAULT_HELP_KEYS: [&str; 2] = ["h", "H"];

/// Raw byte sequences and what they mean.
#[derive(Debug, Clone, Default)]
pub struct KeyMap {
    mapping: HashMap<Vec<u8>, InputKey>,
    labels: HashMap<Vec<u8>, String>,
    exit_sequences: HashSet<Vec<u8>>,
    help_sequences: HashSet<Vec<u8>>,
}

impl KeyMap {
    /// Build a keymap from human key specs, adding common terminal variants
    /// (SS3 arrows, `\n` for enter, `ESC [ 1n ~` function keys).
    pub fn build<'a>(
        human_map: impl IntoIterator<Item = (&'a str, InputKey)>,
        exit_keys: impl IntoIterator<Item = &'a str>,
        help_keys: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut map = KeyMap::default();

        for (human, key) in human_map {
            let seq = encode_human_key(human);
            let lower = human.to_ascii_lowercase();

            match lower.as_str() {
                "up" | "down" | "left" | "right" => {
                    if seq.len() == 3 && seq.starts_with(b"\x1b[") {
                        map.add(vec![0x1b, b'O', seq[2]], format!("{lower}-ss3"), key);
                    }
                }
                "enter" | "return" => map.add(b"\n".to_vec(), "newline".into(), key),
                "f1" | "f2" | "f3" | "f4" | "f5" => {
                    let n = &lower[1..];
                    let variant = format!("\x1b[1{n}~").into_bytes();
                    map.add(variant, format!("{lower}-alt"), key);
                }
                _ => {}
            }

            map.add(seq, human.to_string(), key);
        }

        map.exit_sequences = exit_keys.into_iter().map(encode_human_key).collect();
        map.help_sequences = help_keys.into_iter().map(encode_human_key).collect();
        map
    }

    fn add(&mut self, seq: Vec<u8>, label: String, key: InputKey) {
        self.labels.insert(seq.clone(), label);
        self.mapping.insert(seq, key);
    }

    /// Load a JSON keymap (`{"<human key>": "<input key>"}`), or the
    /// default when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, BusyError> {
        let Some(path) = path else {
            return Ok(Self::default_map());
        };
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, BusyError> {
        let raw: HashMap<String, String> = serde_json::from_str(text)
            .map_err(|e| BusyError::Keymap(format!("invalid keymap json: {e}")))?;

        let mut human = Vec::with_capacity(raw.len());
        for (seq, name) in &raw {
            human.push((seq.as_str(), name.parse::<InputKey>()?));
        }
        Ok(Self::build(human, DEFAULT_EXIT_KEYS, DEFAULT_HELP_KEYS))
    }

    pub fn default_map() -> Self {
        Self::build(DEFAULT_MAPPING, DEFAULT_EXIT_KEYS, DEFAULT_HELP_KEYS)
    }

    /// Meaning of a complete sequence. Exit wins over help, help over keys.
    pub fn lookup(&self, seq: &[u8]) -> Option<KeyEvent> {
        if self.exit_sequences.contains(seq) {
            Some(KeyEvent::Exit)
        } else if self.help_sequences.contains(seq) {
            Some(KeyEvent::Help)
        } else {
            self.mapping.get(seq).copied().map(KeyEvent::Key)
        }
    }

    pub fn is_exit(&self, seq: &[u8]) -> bool {
        self.exit_sequences.contains(seq)
    }

    /// Every sequence the decoder should recognise.
    pub fn sequences(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.mapping
            .keys()
            .chain(self.exit_sequences.iter())
            .chain(self.help_sequences.iter())
    }

    /// `(label, key)` pairs for the help overlay, sorted by key then label.
    pub fn help_entries(&self) -> Vec<(String, InputKey)> {
        let mut entries: Vec<(String, InputKey)> = self
            .mapping
            .iter()
            .map(|(seq, key)| {
                let label = self.labels.get(seq).cloned().unwrap_or_else(|| format!("{seq:?}"));
                (label, *key)
            })
            .collect();
        entries.sort_by(|a, b| a.1.as_str().cmp(b.1.as_str()).then_with(|| a.0.cmp(&b.0)));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_human_specs() {
        assert_eq!(encode_human_key("up"), b"\x1b[A");
        assert_eq!(encode_human_key("ENTER"), b"\r");
        assert_eq!(encode_human_key("ctrl+q"), vec![0x11]);
        assert_eq!(encode_human_key("ctrl+R"), vec![0x12]);
        assert_eq!(encode_human_key("k"), b"k");
        assert_eq!(encode_human_key("\\x1b[Z"), b"\x1b[Z");
        assert_eq!(encode_human_key("\\t"), b"\t");
    }

    #[test]
    fn default_map_has_variants() {
        let map = KeyMap::default_map();
        assert_eq!(map.lookup(b"\x1b[A"), Some(KeyEvent::Key(InputKey::Up)));
        assert_eq!(map.lookup(b"\x1bOA"), Some(KeyEvent::Key(InputKey::Up)));
        assert_eq!(map.lookup(b"\n"), Some(KeyEvent::Key(InputKey::Ok)));
        assert_eq!(map.lookup(b"\x1b"), Some(KeyEvent::Key(InputKey::Back)));
        assert_eq!(map.lookup(b"\x1b[12~"), Some(KeyEvent::Key(InputKey::Status)));
        assert_eq!(map.lookup(b"\x11"), Some(KeyEvent::Exit));
        assert_eq!(map.lookup(b"H"), Some(KeyEvent::Help));
        assert_eq!(map.lookup(b"z"), None);
    }

    #[test]
    fn json_keymap_replaces_mapping() {
        let map = KeyMap::from_json(r#"{"k": "up", "j": "down", "ctrl+b": "busy"}"#).unwrap();
        assert_eq!(map.lookup(b"k"), Some(KeyEvent::Key(InputKey::Up)));
        assert_eq!(map.lookup(&[0x02]), Some(KeyEvent::Key(InputKey::Busy)));
        assert_eq!(map.lookup(b"\x1b[A"), None);
        assert_eq!(map.lookup(b"\x11"), Some(KeyEvent::Exit));
    }

    #[test]
    fn json_keymap_rejects_unknown_key() {
        let err = KeyMap::from_json(r#"{"k": "jump"}"#).unwrap_err();
        assert!(matches!(err, BusyError::Keymap(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        std::fs::write(&path, r#"{"w": "up"}"#).unwrap();
        let map = KeyMap::load(Some(path.as_path())).unwrap();
        assert_eq!(map.lookup(b"w"), Some(KeyEvent::Key(InputKey::Up)));
        assert!(KeyMap::load(None).unwrap().lookup(b"\x1b[B").is_some());
    }

    #[test]
    fn input_key_names_roundtrip() {
        for key in InputKey::ALL {
            assert_eq!(key.as_str().parse::<InputKey>().unwrap(), key);
        }
        assert_eq!(serde_json::to_string(&InputKey::Settings).unwrap(), "\"settings\"");
    }
}
