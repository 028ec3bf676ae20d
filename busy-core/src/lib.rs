//! # busy-core
//!
//! Core library for mirroring the two displays of a Busy Bar into a
//! terminal and forwarding keys back to the device.
//!
//! This crate contains:
//! - **Display**: the static front/back display registry
//! - **Mirror**: RLE codec, frame decoder, transport selection
//! - **Input**: keymaps, the streaming key decoder, the `:` line editor
//! - **Device**: the `Device`/`Connector` seam and its HTTP/WebSocket client
//! - **Session**: the stream orchestrator, `Renderer` seam and `:` commands
//! - **Bridge**: `AsyncRunner` for driving async work from blocking code
//! - **Error**: `BusyError`, a `thiserror`-based error type

pub mod bridge;
pub mod device;
pub mod display;
pub mod error;
pub mod input;
pub mod mirror;
pub mod session;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use bridge::AsyncRunner;
pub use device::{Connector, Device, DeviceSnapshot, FrameStream, HttpConnector, HttpDevice};
pub use display::{BACK_DISPLAY, DISPLAYS, DisplayName, DisplayRef, DisplaySpec, FRONT_DISPLAY};
pub use error::BusyError;
pub use input::{CommandLine, History, InputKey, KeyDecoder, KeyEvent, KeyMap};
pub use mirror::{
    CanonicalFrame, ConnectionKind, FrameDecoder, StreamMessage, TransportKind, decode_frame,
    select_transport,
};
pub use session::{
    CommandRegistry, Orchestrator, PeriodicJob, Renderer, SessionEnd, SessionOptions,
    SessionState, StreamSession,
};
