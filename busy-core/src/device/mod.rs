//! The device command surface consumed by the stream orchestrator.
//!
//! | Item           | Purpose                                            |
//! |----------------|----------------------------------------------------|
//! | [`Device`]     | One open connection: input keys, frames, status    |
//! | [`Connector`]  | Opens a fresh [`Device`] for every session         |
//! | [`HttpDevice`] | reqwest + tokio-tungstenite implementation         |

pub mod http;

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::display::DisplaySpec;
use crate::error::BusyError;
use crate::input::InputKey;
use crate::mirror::transport::ConnectionKind;
use crate::mirror::types::StreamMessage;

pub use http::{HttpConnector, HttpDevice};

/// Messages from `/api/screen/ws`, in arrival order.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<StreamMessage, BusyError>> + Send>>;

// ── Device ───────────────────────────────────────────────────────

/// An open connection to one device, owned by a single streaming session.
#[async_trait]
pub trait Device: Send + Sync {
    fn connection(&self) -> ConnectionKind;

    fn base_url(&self) -> &str;

    /// `POST /api/input?key=<name>`.
    async fn send_input_key(&self, key: InputKey) -> Result<(), BusyError>;

    /// `GET /api/screen?display=<i>`: the uncompressed native frame bytes.
    async fn get_screen_frame(&self, display: &DisplaySpec) -> Result<Vec<u8>, BusyError>;

    /// Open the WebSocket stream and select `display`.
    async fn stream_screen(&self, display: &DisplaySpec) -> Result<FrameStream, BusyError>;

    /// Best-effort status snapshot for the footer.
    async fn snapshot(&self) -> Result<DeviceSnapshot, BusyError>;

    /// `DELETE /api/display/draw`: remove whatever an app has drawn.
    async fn clear_display(&self) -> Result<(), BusyError>;

    /// `GET /api/account/status`: cloud link state (`connected`,
    /// `disconnected`, `error`), `None` when the device reports none.
    async fn account_state(&self) -> Result<Option<String>, BusyError>;
}

/// Opens device connections. Called once per session so a display switch
/// never shares the previous session's connection.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Device>, BusyError>;
}

// ── DeviceSnapshot ───────────────────────────────────────────────

/// Status collected field by field; failures are kept per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub name: Option<String>,
    pub version: Option<String>,
    pub battery_charge: Option<u8>,
    pub power_state: Option<String>,
    pub field_errors: BTreeMap<String, String>,
}

impl DeviceSnapshot {
    /// One-line summary for the renderer's info line.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(name) = &self.name {
            parts.push(name.clone());
        }
        if let Some(version) = &self.version {
            parts.push(format!("fw {version}"));
        }
        match (self.battery_charge, &self.power_state) {
            (Some(charge), Some(state)) => parts.push(format!("bat {charge}% ({state})")),
            (Some(charge), None) => parts.push(format!("bat {charge}%")),
            (None, Some(state)) => parts.push(state.clone()),
            (None, None) => {}
        }
        if parts.is_empty() && !self.field_errors.is_empty() {
            return format!("status unavailable ({} errors)", self.field_errors.len());
        }
        parts.join(" | ")
    }

    /// Record a field result, keeping the error text on failure.
    pub fn record<T>(&mut self, field: &str, result: Result<T, BusyError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("snapshot field {field} failed: {e}");
                self.field_errors.insert(field.to_string(), e.to_string());
                None
            }
        }
    }
}
