//! Transport selection: WebSocket push vs HTTP pull.
//!
//! Push streaming is never attempted through the cloud proxy; there the
//! client polls single frames at most once per second.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────

/// Minimum poll interval when connected through the cloud proxy.
pub const CLOUD_POLL_FLOOR: Duration = Duration::from_secs(1);

// ── ConnectionKind ───────────────────────────────────────────────

/// How the device is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// Default LAN address, no explicit address given.
    Local,
    /// Explicit address given by the user.
    Network,
    /// Cloud proxy, reached with a bearer token.
    Cloud,
}

impl ConnectionKind {
    pub fn is_cloud(self) -> bool {
        matches!(self, ConnectionKind::Cloud)
    }
}

// ── TransportKind ────────────────────────────────────────────────

/// The frame transport a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Server-pushed RLE frames over `/api/screen/ws`.
    WebSocket,
    /// Uncompressed `GET /api/screen` every `interval`.
    HttpPoll { interval: Duration },
}

impl TransportKind {
    pub fn is_polling(self) -> bool {
        matches!(self, TransportKind::HttpPoll { .. })
    }

    /// URL scheme shown to the user, derived from the device base URL.
    pub fn protocol(self, base_url: &str) -> &'static str {
        let https = base_url.starts_with("https://");
        match (self, https) {
            (TransportKind::WebSocket, true) => "wss",
            (TransportKind::WebSocket, false) => "ws",
            (TransportKind::HttpPoll { .. }, true) => "https",
            (TransportKind::HttpPoll { .. }, false) => "http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::WebSocket => f.write_str("websocket"),
            TransportKind::HttpPoll { interval } => write!(f, "http poll every {interval:?}"),
        }
    }
}

/// Pick the transport for a connection.
///
/// `requested_poll` is the user's `--http-poll-interval`; `None` or zero
/// means "no preference".
pub fn select_transport(
    connection: ConnectionKind,
    requested_poll: Option<Duration>,
) -> TransportKind {
    let requested = requested_poll.filter(|d| !d.is_zero());

    if connection.is_cloud() {
        let interval = requested.map_or(CLOUD_POLL_FLOOR, |d| d.max(CLOUD_POLL_FLOOR));
        return TransportKind::HttpPoll { interval };
    }

    match requested {
        Some(interval) => TransportKind::HttpPoll { interval },
        None => TransportKind::WebSocket,
    }
}
