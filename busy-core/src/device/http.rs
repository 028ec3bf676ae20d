//! HTTP + WebSocket device client.
//!
//! `reqwest` carries the REST calls; `/api/screen/ws` is opened with
//! `tokio-tungstenite`. Ping frames from the server are answered by the
//! WebSocket layer; the client sets no ping interval of its own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};
use url::Url;

use crate::device::{Connector, Device, DeviceSnapshot, FrameStream};
use crate::display::DisplaySpec;
use crate::error::BusyError;
use crate::input::InputKey;
use crate::mirror::transport::ConnectionKind;
use crate::mirror::types::StreamMessage;

// ── Constants ────────────────────────────────────────────────────

/// LAN address used when neither an address nor a token is given.
pub const DEFAULT_LOCAL_URL: &str = "http://10.0.4.20";

/// Cloud proxy used when only a token is given.
pub const DEFAULT_CLOUD_URL: &str = "https://proxy.dev.busy.app";

pub const API_VERSION: &str = "0.1.0";
pub const API_VERSION_HEADER: &str = "x-busy-api-version";
const API_TOKEN_HEADER: &str = "x-api-token";

/// Add `http://` when the address carries no scheme.
pub fn normalize_addr(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("http://{addr}")
    }
}

/// `http(s)://host/...` → `ws(s)://host/api/screen/ws`.
pub fn screen_ws_url(base_url: &str, token: Option<&str>) -> Result<Url, BusyError> {
    let base = Url::parse(base_url)?;
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    let rest = &base.as_str()[base.scheme().len()..];
    let mut url = Url::parse(&format!(
        "{scheme}{}/api/screen/ws",
        rest.trim_end_matches('/')
    ))?;
    if let Some(token) = token {
        url.query_pairs_mut().append_pair("x-api-token", token);
    }
    Ok(url)
}

// ── Wire payloads ────────────────────────────────────────────────

/// First message on the screen WebSocket.
#[derive(Debug, Serialize)]
struct DisplaySelector {
    display: u8,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NameResponse {
    name: Option<String>,
    device: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VersionResponse {
    version: Option<String>,
    api_semver: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PowerResponse {
    state: Option<String>,
    battery_charge: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AccountResponse {
    state: Option<String>,
}

// ── HttpDevice ───────────────────────────────────────────────────

pub struct HttpDevice {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    connection: ConnectionKind,
}

impl HttpDevice {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        connection: ConnectionKind,
        timeout: Duration,
    ) -> Result<Self, BusyError> {
        let base_url = base_url.into();
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(API_VERSION_HEADER),
            HeaderValue::from_static(API_VERSION),
        );
        if let Some(token) = &token {
            let (name, value) = if connection.is_cloud() {
                (AUTHORIZATION, format!("Bearer {token}"))
            } else {
                (HeaderName::from_static(API_TOKEN_HEADER), token.clone())
            };
            let value = HeaderValue::from_str(&value)
                .map_err(|e| BusyError::Other(format!("invalid token header: {e}")))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url,
            token,
            connection,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, BusyError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(BusyError::Api {
            code: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, BusyError> {
        let resp = self.client.get(self.url(path)).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}

#[async_trait]
impl Device for HttpDevice {
    fn connection(&self) -> ConnectionKind {
        self.connection
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send_input_key(&self, key: InputKey) -> Result<(), BusyError> {
        debug!("send_input_key key={key}");
        let resp = self
            .client
            .post(self.url("/api/input"))
            .query(&[("key", key.as_str())])
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn get_screen_frame(&self, display: &DisplaySpec) -> Result<Vec<u8>, BusyError> {
        let resp = self
            .client
            .get(self.url("/api/screen"))
            .query(&[("display", display.index)])
            .send()
            .await?;
        Ok(Self::check(resp).await?.bytes().await?.to_vec())
    }

    async fn stream_screen(&self, display: &DisplaySpec) -> Result<FrameStream, BusyError> {
        let url = screen_ws_url(&self.base_url, self.token.as_deref())?;
        info!("streaming via websocket from {}/api/screen/ws", self.base_url);

        let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let selector = serde_json::to_string(&DisplaySelector {
            display: display.index,
        })?;
        ws.send(Message::Text(selector)).await?;

        let stream = ws.filter_map(|msg| async move {
            match msg {
                Ok(Message::Binary(data)) => Some(Ok(StreamMessage::Binary(data))),
                Ok(Message::Text(text)) => Some(Ok(StreamMessage::Text(text))),
                Ok(Message::Close(frame)) => {
                    debug!("screen websocket closed by server: {frame:?}");
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(BusyError::from(e))),
            }
        });
        Ok(Box::pin(stream))
    }

    async fn snapshot(&self) -> Result<DeviceSnapshot, BusyError> {
        let (name, version, power) = tokio::join!(
            self.get_json::<NameResponse>("/api/name"),
            self.get_json::<VersionResponse>("/api/version"),
            self.get_json::<PowerResponse>("/api/status/power"),
        );

        let mut snap = DeviceSnapshot::default();
        if let Some(n) = snap.record("name", name) {
            snap.name = n.name.or(n.device).or(n.value);
        }
        if let Some(v) = snap.record("version", version) {
            snap.version = v.version.or(v.api_semver);
        }
        if let Some(p) = snap.record("power", power) {
            snap.battery_charge = p.battery_charge;
            snap.power_state = p.state;
        }
        Ok(snap)
    }

    async fn clear_display(&self) -> Result<(), BusyError> {
        debug!("clear_display");
        let resp = self.client.delete(self.url("/api/display/draw")).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn account_state(&self) -> Result<Option<String>, BusyError> {
        let account: AccountResponse = self.get_json("/api/account/status").await?;
        Ok(account.state)
    }
}

// ── HttpConnector ────────────────────────────────────────────────

/// Builds [`HttpDevice`]s from user-facing address/token settings.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    base_url: String,
    token: Option<String>,
    connection: ConnectionKind,
    timeout: Duration,
}

impl HttpConnector {
    /// No address and no token → local default; token only → cloud proxy;
    /// explicit address → network.
    pub fn new(addr: Option<&str>, token: Option<String>, timeout: Duration) -> Self {
        let (base_url, connection) = match (addr, &token) {
            (Some(addr), _) => (normalize_addr(addr), ConnectionKind::Network),
            (None, Some(_)) => (DEFAULT_CLOUD_URL.to_string(), ConnectionKind::Cloud),
            (None, None) => (DEFAULT_LOCAL_URL.to_string(), ConnectionKind::Local),
        };
        Self {
            base_url,
            token,
            connection,
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn connection(&self) -> ConnectionKind {
        self.connection
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self) -> Result<Arc<dyn Device>, BusyError> {
        let device = HttpDevice::new(
            self.base_url.clone(),
            self.token.clone(),
            self.connection,
            self.timeout,
        )?;
        Ok(Arc::new(device))
    }
}
