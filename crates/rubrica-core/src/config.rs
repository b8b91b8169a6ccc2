//! Application configuration
//!
//! Configuration is layered with the `config` crate: built-in defaults, then
//! `config/default.*`, then `config/{RUN_MODE}.*`, then environment variables
//! prefixed with `RUBRICA` (`RUBRICA__MONITOR__PASSWORD=...`).

use crate::challenge::{ChallengeAuthenticator, DigestScheme};
use crate::models::Credential;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ucm: UcmConfig,
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub dial: DialConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads (defaults to the CPU count)
    #[serde(default)]
    pub workers: Option<usize>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

/// PBX HTTPS API (click-to-dial session)
#[derive(Debug, Deserialize, Clone)]
pub struct UcmConfig {
    /// PBX hostname or IP
    pub host: String,

    /// HTTPS API port
    #[serde(default = "default_pbx_port")]
    pub port: u16,

    /// API user
    pub api_user: String,

    /// API password
    pub api_password: String,

    #[serde(default)]
    pub digest: DigestScheme,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Verify the PBX certificate (the stock UCM certificate is self-signed)
    #[serde(default)]
    pub verify_tls: bool,
}

fn default_pbx_port() -> u16 {
    8089
}

fn default_request_timeout() -> u64 {
    10
}

impl UcmConfig {
    pub fn base_url(&self) -> String {
        format!("https://{}:{}/api", self.host, self.port)
    }

    pub fn credential(&self) -> Credential {
        Credential::new(&self.api_user, &self.api_password)
    }

    pub fn authenticator(&self) -> ChallengeAuthenticator {
        ChallengeAuthenticator::new(self.digest)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// PBX websocket event subscription
#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    /// Defaults to `ucm.host`
    #[serde(default)]
    pub host: Option<String>,

    /// Defaults to `ucm.port`
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default = "default_ws_path")]
    pub path: String,

    /// `wss://` when true, plain `ws://` otherwise
    #[serde(default = "default_true")]
    pub tls: bool,

    /// Verify the PBX certificate on the websocket connection
    #[serde(default)]
    pub verify_tls: bool,

    /// Event subscription user (distinct from the API user)
    pub user: String,

    pub password: String,

    #[serde(default)]
    pub digest: DigestScheme,

    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// Timeout for connect and for each handshake response
    #[serde(default = "default_request_timeout")]
    pub response_timeout_secs: u64,

    /// Upper bound for a single directory lookup during reconciliation
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_ms: u64,
}

fn default_ws_path() -> String {
    "websockify".to_string()
}

fn default_true() -> bool {
    true
}

fn default_heartbeat() -> u64 {
    30
}

fn default_reconnect_delay() -> u64 {
    10
}

fn default_lookup_timeout() -> u64 {
    2000
}

/// Subscriber stream configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EventsConfig {
    /// Per-subscriber queue capacity before the subscriber is dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Keepalive interval for the SSE and websocket streams
    #[serde(default = "default_heartbeat")]
    pub keepalive_secs: u64,
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            keepalive_secs: default_heartbeat(),
        }
    }
}

/// Click-to-dial number handling
#[derive(Debug, Deserialize, Clone)]
pub struct DialConfig {
    /// Country code stripped from dialed numbers (`39` strips `+39`/`0039`)
    #[serde(default = "default_country_code")]
    pub country_code: String,
}

fn default_country_code() -> String {
    "39".to_string()
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            country_code: default_country_code(),
        }
    }
}

/// Directory lookup source
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DirectoryConfig {
    /// JSON file mapping numbers to display names
    #[serde(default)]
    pub file: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment and optional config files
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Self::defaults(Config::builder())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("RUBRICA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Self::defaults(Config::builder())?
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("RUBRICA").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    fn defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("ucm.port", 8089)?
            .set_default("ucm.request_timeout_secs", 10)?
            .set_default("monitor.path", "websockify")?
            .set_default("monitor.heartbeat_secs", 30)?
            .set_default("monitor.reconnect_delay_secs", 10)?
            .set_default("events.queue_capacity", 64)?
            .set_default("events.keepalive_secs", 30)?
            .set_default("dial.country_code", "39")
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Websocket URL of the PBX event endpoint
    pub fn monitor_url(&self) -> String {
        let scheme = if self.monitor.tls { "wss" } else { "ws" };
        let host = self.monitor.host.as_deref().unwrap_or(&self.ucm.host);
        let port = self.monitor.port.unwrap_or(self.ucm.port);
        format!(
            "{}://{}:{}/{}",
            scheme,
            host,
            port,
            self.monitor.path.trim_start_matches('/')
        )
    }
}

impl MonitorConfig {
    pub fn credential(&self) -> Credential {
        Credential::new(&self.user, &self.password)
    }

    pub fn authenticator(&self) -> ChallengeAuthenticator {
        ChallengeAuthenticator::new(self.digest)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}
