//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files, and the
//! persisted rover identifier.

use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{DashboardError, Result};
use crate::protocol::RoverId;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub rover: RoverConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the broker is reached
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BrokerTransport {
    Tcp,
    Tls,
    Ws,
    Wss,
}

/// Broker connection configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerConfig {
    #[serde(default = "default_transport")]
    pub transport: BrokerTransport,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket path, ignored for TCP/TLS
    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_keep_alive_s")]
    pub keep_alive_s: u64,

    /// 0 disables transport-level reconnection
    #[serde(default = "default_reconnect_period_ms")]
    pub reconnect_period_ms: u64,

    #[serde(default = "default_clean_session")]
    pub clean_session: bool,

    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,

    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,
}

/// Rover identity configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RoverConfig {
    #[serde(default = "default_rover_id")]
    pub default_id: String,

    /// Where the operator's last rover id is kept
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

/// Session behaviour configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Grace period between connect and the initial status request
    #[serde(default = "default_status_request_delay_ms")]
    pub status_request_delay_ms: u64,
}

/// Telemetry recording configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub record: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily-rolling log files; console only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

// Default value functions
fn default_transport() -> BrokerTransport { BrokerTransport::Tcp }
fn default_host() -> String { "localhost".to_string() }
fn default_port() -> u16 { 1883 }
fn default_path() -> String { "/mqtt".to_string() }
fn default_keep_alive_s() -> u64 { 60 }
fn default_reconnect_period_ms() -> u64 { 4000 }
fn default_clean_session() -> bool { true }
fn default_client_id_prefix() -> String { "rover-dashboard".to_string() }
fn default_request_capacity() -> usize { 32 }

fn default_rover_id() -> String { "ROVER_001".to_string() }
fn default_state_file() -> String { "./rover-state.toml".to_string() }

fn default_status_request_delay_ms() -> u64 { 500 }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

fn default_log_level() -> String { "info".to_string() }

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            host: default_host(),
            port: default_port(),
            path: default_path(),
            username: None,
            password: None,
            keep_alive_s: default_keep_alive_s(),
            reconnect_period_ms: default_reconnect_period_ms(),
            clean_session: default_clean_session(),
            client_id_prefix: default_client_id_prefix(),
            request_capacity: default_request_capacity(),
        }
    }
}

impl Default for RoverConfig {
    fn default() -> Self {
        Self {
            default_id: default_rover_id(),
            state_file: default_state_file(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            status_request_delay_ms: default_status_request_delay_ms(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            record: false,
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> DashboardError {
    DashboardError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rover_dashboard::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        let broker = &self.broker;

        if broker.host.trim().is_empty() {
            return Err(invalid("broker host cannot be empty"));
        }

        if broker.port == 0 {
            return Err(invalid("broker port must be greater than 0"));
        }

        if matches!(broker.transport, BrokerTransport::Ws | BrokerTransport::Wss)
            && !broker.path.starts_with('/')
        {
            return Err(invalid("broker path must start with '/' for websocket transports"));
        }

        if broker.username.is_some() != broker.password.is_some() {
            return Err(invalid("broker username and password must be set together"));
        }

        if broker.keep_alive_s < 5 || broker.keep_alive_s > 3600 {
            return Err(invalid("keep_alive_s must be between 5 and 3600"));
        }

        if broker.reconnect_period_ms > 60000 {
            return Err(invalid("reconnect_period_ms must be between 0 and 60000"));
        }

        if broker.client_id_prefix.trim().is_empty() {
            return Err(invalid("client_id_prefix cannot be empty"));
        }

        if broker.request_capacity == 0 {
            return Err(invalid("request_capacity must be greater than 0"));
        }

        if let Err(e) = RoverId::new(&self.rover.default_id) {
            return Err(invalid(format!("rover default_id is invalid: {}", e)));
        }

        if self.rover.state_file.trim().is_empty() {
            return Err(invalid("rover state_file cannot be empty"));
        }

        if self.session.status_request_delay_ms == 0 || self.session.status_request_delay_ms > 10000 {
            return Err(invalid("status_request_delay_ms must be between 1 and 10000"));
        }

        if self.telemetry.record && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when recording"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("logging level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    rover_id: Option<String>,
}

/// Keeps the operator's rover id across runs
///
/// Stored as a one-key TOML document: `rover_id = "ROVER_001"`.
#[derive(Debug, Clone)]
pub struct RoverIdStore {
    path: PathBuf,
}

impl RoverIdStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read the saved rover id
    ///
    /// Returns `Ok(None)` if nothing has been saved yet or the saved value
    /// is blank.
    pub fn load(&self) -> Result<Option<RoverId>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)?;
        let state: PersistedState = toml::from_str(&contents)?;

        Ok(state.rover_id.and_then(|raw| match RoverId::new(&raw) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Ignoring saved rover id: {}", e);
                None
            }
        }))
    }

    /// Save the rover id, replacing any previous value
    pub fn save(&self, rover_id: &RoverId) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let state = PersistedState {
            rover_id: Some(rover_id.as_str().to_string()),
        };
        fs::write(&self.path, toml::to_string(&state)?)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
