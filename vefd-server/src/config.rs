//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via VEFD_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Work-queue configuration.
    pub queue: QueueConfig,
    /// Heartbeat reporting configuration.
    pub heartbeat: HeartbeatConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("VEFD_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.queue.apply_env_overrides();
        self.heartbeat.apply_env_overrides();
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Per-connection read buffer size in bytes.
    pub read_buffer_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("127.0.0.1:{}", vefd_protocol::DEFAULT_PORT)
                .parse()
                .unwrap(),
            max_connections: 1000,
            read_buffer_size: 8192,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("VEFD_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Ok(max) = std::env::var("VEFD_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }

        if let Ok(size) = std::env::var("VEFD_READ_BUFFER") {
            if let Ok(n) = size.parse() {
                self.read_buffer_size = n;
            }
        }
    }
}

/// Work-queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Monitor endpoints that report the writable primary.
    pub monitors: Vec<String>,
    /// Service name registered with the monitors.
    pub service: String,
    /// Queue name to pop work items from.
    pub queue: String,
    /// Connect timeout towards monitors and queue nodes, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Maximum pop attempts after the replenish trigger.
    pub pop_retry_max: u32,
    /// Delay between pop attempts, in milliseconds.
    pub pop_backoff_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            monitors: vec!["127.0.0.1:7341".to_string()],
            service: "invoices".to_string(),
            queue: "invoices".to_string(),
            connect_timeout_ms: 500,
            pop_retry_max: 5,
            pop_backoff_ms: 200,
        }
    }
}

impl QueueConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(monitors) = std::env::var("VEFD_QUEUE_MONITORS") {
            let parsed: Vec<String> = monitors
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
            if !parsed.is_empty() {
                self.monitors = parsed;
            }
        }

        if let Ok(service) = std::env::var("VEFD_QUEUE_SERVICE") {
            self.service = service;
        }

        if let Ok(queue) = std::env::var("VEFD_QUEUE_NAME") {
            self.queue = queue;
        }

        if let Ok(timeout) = std::env::var("VEFD_QUEUE_CONNECT_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.connect_timeout_ms = ms;
            }
        }

        if let Ok(max) = std::env::var("VEFD_QUEUE_RETRY_MAX") {
            if let Ok(n) = max.parse() {
                self.pop_retry_max = n;
            }
        }

        if let Ok(backoff) = std::env::var("VEFD_QUEUE_BACKOFF_MS") {
            if let Ok(ms) = backoff.parse() {
                self.pop_backoff_ms = ms;
            }
        }
    }

    /// Parses the configured monitor endpoints.
    pub fn monitor_addrs(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        self.monitors
            .iter()
            .map(|m| {
                m.parse().map_err(|_| {
                    ConfigError::ValidationError(format!("invalid monitor address '{}'", m))
                })
            })
            .collect()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.pop_backoff_ms)
    }
}

/// Heartbeat reporting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Enable the heartbeat monitor.
    pub enabled: bool,
    /// Monitoring endpoint to POST reports to.
    pub endpoint: String,
    /// Reporting interval in seconds.
    pub interval_secs: u64,
    /// Report id announced to the monitoring side.
    pub report_id: String,
    /// Device identifier included in the report.
    pub device_id: String,
    /// Device coordinates included in the report.
    pub longitude: f64,
    pub latitude: f64,
    /// Software version announced in the report.
    pub sw_version: String,
    /// Wrapped key material bundled into outbound requests.
    pub key: String,
    /// Path of the JSON-lines audit log.
    pub audit_path: PathBuf,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://127.0.0.1:8097/iface/index".to_string(),
            interval_secs: 5,
            report_id: "MONITOR-R".to_string(),
            device_id: String::new(),
            longitude: 0.0,
            latitude: 0.0,
            sw_version: "1.0".to_string(),
            key: String::new(),
            audit_path: PathBuf::from("./data/heartbeat_audit.jsonl"),
        }
    }
}

impl HeartbeatConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("VEFD_HEARTBEAT_ENABLED") {
            self.enabled = enabled == "1" || enabled.to_lowercase() == "true";
        }
        if let Ok(endpoint) = std::env::var("VEFD_HEARTBEAT_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Ok(interval) = std::env::var("VEFD_HEARTBEAT_INTERVAL") {
            if let Ok(secs) = interval.parse() {
                self.interval_secs = secs;
            }
        }
        if let Ok(id) = std::env::var("VEFD_DEVICE_ID") {
            self.device_id = id;
        }
        if let Ok(path) = std::env::var("VEFD_HEARTBEAT_AUDIT") {
            self.audit_path = PathBuf::from(path);
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Validates the section when the monitor is enabled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.device_id.is_empty() {
            return Err(ConfigError::ValidationError(
                "heartbeat enabled but device_id not set".to_string(),
            ));
        }
        if self.endpoint.is_empty() {
            return Err(ConfigError::ValidationError(
                "heartbeat enabled but endpoint not set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
