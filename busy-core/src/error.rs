//! Domain-specific error types for the Busy Bar mirroring pipeline.
//!
//! Fallible operations return `Result<T, BusyError>`. Frame decode failures
//! are *not* errors: they surface as `None` and the frame is dropped.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for `busy-core`.
#[derive(Debug, Error)]
pub enum BusyError {
    // ── Display / input configuration ────────────────────────────
    /// A display index or name did not match front or back.
    #[error("unsupported display: {0}")]
    UnsupportedDisplay(String),

    /// A keymap file could not be parsed or named an unknown key.
    #[error("keymap error: {0}")]
    Keymap(String),

    // ── Transport Errors ─────────────────────────────────────────
    /// The HTTP layer reported an error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The WebSocket layer reported an error. Fatal to a streaming session.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The device answered with a non-success HTTP status.
    #[error("device api error {code}: {message}")]
    Api { code: u16, message: String },

    /// The device address could not be turned into a URL.
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] url::ParseError),

    /// Local I/O failed (stdin, log file, keymap file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // ── Serialization Errors ─────────────────────────────────────
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Runtime Errors ───────────────────────────────────────────
    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// Work was submitted to an [`AsyncRunner`](crate::bridge::AsyncRunner)
    /// that is no longer running.
    #[error("async runner is stopped")]
    RunnerStopped,

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl BusyError {
    /// HTTP status code carried by an API error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            BusyError::Api { code, .. } => Some(*code),
            BusyError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for BusyError {
    fn from(s: String) -> Self {
        BusyError::Other(s)
    }
}

impl From<&str> for BusyError {
    fn from(s: &str) -> Self {
        BusyError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for BusyError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        BusyError::ChannelClosed
    }
}
