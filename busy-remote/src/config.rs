//! Remote client configuration.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use busy_core::PeriodicJob;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the remote client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Device address and credentials.
    pub device: DeviceConfig,
    /// Frame streaming.
    pub stream: StreamConfig,
    /// Key forwarding.
    pub input: InputConfig,
    /// Terminal output.
    pub render: RenderConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device address; empty means the LAN default, or the cloud proxy when
    /// only a token is set.
    pub addr: String,
    /// API token; empty falls back to `BUSY_LAN_TOKEN` / `BUSY_CLOUD_TOKEN`.
    pub token: String,
    /// HTTP request timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Streaming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Display to start on: `front`, `back`, `0` or `1`.
    pub display: String,
    /// Seconds between HTTP polls; 0 streams over WebSocket.
    pub http_poll_interval: f64,
    /// Device summary refresh period in milliseconds; 0 disables it.
    pub refresh_interval_ms: u64,
    /// Cloud link check period in milliseconds; 0 disables it.
    pub link_check_interval_ms: u64,
    /// Wait for the next stdin chunk before resolving buffered keys.
    pub key_timeout_ms: u64,
}

/// Input forwarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Forward mapped keys to `/api/input`.
    pub send_input: bool,
    /// Optional JSON keymap; empty uses the built-in map.
    pub keymap_file: String,
    /// `:` command history file; empty keeps history in memory.
    pub history_file: String,
}

/// Terminal rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Inserted between pixels.
    pub spacer: String,
    /// Symbol drawn for a lit pixel.
    pub pixel_char: String,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level, overridden by `RUST_LOG`.
    pub level: String,
    /// Log file; the terminal is reserved for the mirrored display.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            addr: String::new(),
            token: String::new(),
            timeout_ms: 5000,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            display: "front".into(),
            http_poll_interval: 0.0,
            refresh_interval_ms: 1000,
            link_check_interval_ms: 10_000,
            key_timeout_ms: 100,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            send_input: true,
            keymap_file: String::new(),
            history_file: "remote_history.log".into(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            spacer: " ".into(),
            pixel_char: "⬤".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: "remote.log".into(),
        }
    }
}

// ── Accessors ────────────────────────────────────────────────────

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

impl DeviceConfig {
    pub fn addr(&self) -> Option<&str> {
        non_empty(&self.addr)
    }

    pub fn token(&self) -> Option<&str> {
        non_empty(&self.token)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl StreamConfig {
    /// `None` unless the interval is a positive duration `Duration` can hold.
    pub fn poll_interval(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.http_poll_interval)
            .ok()
            .filter(|d| !d.is_zero())
    }

    /// Background job table; zero periods are skipped by the orchestrator.
    pub fn periodic(&self) -> Vec<(PeriodicJob, Duration)> {
        vec![
            (
                PeriodicJob::Dashboard,
                Duration::from_millis(self.refresh_interval_ms),
            ),
            (
                PeriodicJob::LinkCheck,
                Duration::from_millis(self.link_check_interval_ms),
            ),
        ]
    }

    pub fn key_timeout(&self) -> Duration {
        Duration::from_millis(self.key_timeout_ms.max(1))
    }
}

impl InputConfig {
    pub fn keymap_file(&self) -> Option<&Path> {
        non_empty(&self.keymap_file).map(Path::new)
    }

    pub fn history_file(&self) -> Option<&Path> {
        non_empty(&self.history_file).map(Path::new)
    }
}

// ── Loading ──────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl RemoteConfig {
    /// Load from a TOML file. A missing file gives the defaults; a file that
    /// cannot be read or parsed is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Default config as pretty TOML.
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&Self::default())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = RemoteConfig::default_toml().unwrap();
        assert!(text.contains("[device]"));
        assert!(text.contains("pixel_char"));
        assert!(text.contains("remote.log"));
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: RemoteConfig = toml::from_str(
            r#"
            [device]
            addr = "192.168.1.40"

            [stream]
            http_poll_interval = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.device.addr(), Some("192.168.1.40"));
        assert_eq!(cfg.device.token(), None);
        assert_eq!(cfg.stream.poll_interval(), Some(Duration::from_millis(500)));
        assert_eq!(cfg.stream.key_timeout(), Duration::from_millis(100));
        assert!(cfg.input.send_input);
        assert_eq!(cfg.render.spacer, " ");
    }

    #[test]
    fn zero_poll_interval_means_websocket() {
        let cfg = RemoteConfig::default();
        assert_eq!(cfg.stream.poll_interval(), None);
        assert!(cfg.input.keymap_file().is_none());
    }

    #[test]
    fn out_of_range_poll_interval_is_ignored() {
        let mut stream = StreamConfig::default();
        for bad in [1e20, f64::INFINITY, f64::NAN, -1.0, 1e-12] {
            stream.http_poll_interval = bad;
            assert_eq!(stream.poll_interval(), None, "{bad}");
        }
    }

    #[test]
    fn periodic_table_follows_config() {
        let mut stream = StreamConfig::default();
        assert_eq!(
            stream.periodic(),
            PeriodicJob::defaults(),
            "defaults match the orchestrator's"
        );
        stream.link_check_interval_ms = 0;
        assert!(stream.periodic()[1].1.is_zero());
    }

    #[test]
    fn missing_file_falls_back() {
        let cfg = RemoteConfig::load(Path::new("/nonexistent/busy-remote.toml")).unwrap();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.device.timeout(), Duration::from_secs(5));
        assert_eq!(cfg.input.history_file(), Some(Path::new("remote_history.log")));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("busy-remote.toml");
        std::fs::write(&path, "[device\naddr = 10.0.4.20").unwrap();

        let err = RemoteConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().starts_with("invalid config"));
    }
}
