//! Streaming sessions: state, renderer seam and the orchestrator.
//!
//! A session streams one display until the user switches, quits, or the
//! transport fails. Each display switch builds a brand-new session with its
//! own device connection and cancellation token.

pub mod commands;
pub mod orchestrator;
pub mod periodic;

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::device::Device;
use crate::display::DisplaySpec;
use crate::mirror::transport::TransportKind;
use crate::mirror::types::CanonicalFrame;

pub use commands::{
    CommandContext, CommandHandler, CommandOutcome, CommandRegistry, QueuedCommand,
};
pub use orchestrator::{Orchestrator, SessionOptions};
pub use periodic::PeriodicJob;

// ── SessionState ─────────────────────────────────────────────────

/// Orchestrator lifecycle.
///
/// ```text
///  Idle ──► Connecting ──► Streaming | Polling ──► Switching ──► Connecting
///    │           │                 │                   │
///    └───────────┴─────────────────┴───────────────────┴──► Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    /// WebSocket push.
    Streaming,
    /// HTTP pull.
    Polling,
    /// Tearing down before reconnecting on the other display.
    Switching,
    /// Terminal.
    Stopped,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Streaming | Self::Polling)
    }

    pub fn is_stopped(self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Polling => "polling",
            Self::Switching => "switching",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

// ── SessionEnd ───────────────────────────────────────────────────

/// Why a session finished without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Switch chord pressed; restart on the other display.
    Switch,
    /// Exit key, `:quit`, closed input, or external shutdown.
    Quit,
    /// The device closed the WebSocket stream.
    StreamClosed,
}

// ── StreamSession ────────────────────────────────────────────────

/// One display, one transport, one device connection.
///
/// The cancellation token is never reset: once cancelled, the session is
/// finished and a new one has to be built.
pub struct StreamSession {
    spec: &'static DisplaySpec,
    transport: TransportKind,
    cancel: CancellationToken,
    device: Arc<dyn Device>,
}

impl StreamSession {
    pub fn new(
        spec: &'static DisplaySpec,
        transport: TransportKind,
        cancel: CancellationToken,
        device: Arc<dyn Device>,
    ) -> Self {
        Self {
            spec,
            transport,
            cancel,
            device,
        }
    }

    pub fn spec(&self) -> &'static DisplaySpec {
        self.spec
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn device(&self) -> &dyn Device {
        self.device.as_ref()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        tracing::debug!("session for {} torn down", self.spec.name);
    }
}

// ── Renderer ─────────────────────────────────────────────────────

/// Output side of the orchestrator.
///
/// Methods take `&self` because every concurrent unit of a session may
/// report through the same renderer.
pub trait Renderer: Send + Sync {
    /// Draw a decoded frame.
    fn render(&self, frame: &CanonicalFrame);

    /// Replace the status line.
    fn update_status(&self, text: &str);

    fn toggle_help(&self) {}

    /// `Some(text)` while a `:` command is being typed, `None` once it ends.
    /// `cursor` is a character index into `text`.
    fn update_command_line(&self, _text: Option<&str>, _cursor: usize) {}

    /// Device summary from the background refresh.
    fn update_info(&self, _text: &str) {}

    /// Cloud link state from the periodic link check.
    fn update_link(&self, _state: &str) {}
}
