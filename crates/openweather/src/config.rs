use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::extract::{FieldExtractor, DEFAULT_SCRATCH_LEN};
use crate::json::DEFAULT_MAX_TOKENS;

/// Environment variable that overrides `query.api_key`.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

/// Weather server location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host name, resolved every cycle
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Resource path, must start with '/'
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_host() -> String {
    "api.openweathermap.org".to_string()
}

fn default_port() -> u16 {
    80
}

fn default_path() -> String {
    "/data/2.5/weather".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
        }
    }
}

/// Query parameters baked into the request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryConfig {
    pub lat: String,
    pub lon: String,
    #[serde(default)]
    pub api_key: String,
}

/// Socket behaviour for one fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Wait bound for each individual read
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Bytes requested per read
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Upper bound on one accumulated response
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

fn default_recv_timeout_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_chunk_size() -> usize {
    64
}

fn default_max_response_bytes() -> usize {
    16 * 1024
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            recv_timeout_ms: default_recv_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            chunk_size: default_chunk_size(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

impl SocketConfig {
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Delays between cycles, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Steady polling cadence after a completed cycle
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
    #[serde(default = "default_idle_ms")]
    pub link_down_ms: u64,
    #[serde(default = "default_resolve_ms")]
    pub resolve_ms: u64,
    #[serde(default = "default_transport_ms")]
    pub connect_ms: u64,
    #[serde(default = "default_transport_ms")]
    pub send_ms: u64,
}

fn default_idle_ms() -> u64 {
    11_000
}

fn default_resolve_ms() -> u64 {
    1_000
}

fn default_transport_ms() -> u64 {
    4_000
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            idle_ms: default_idle_ms(),
            link_down_ms: default_idle_ms(),
            resolve_ms: default_resolve_ms(),
            connect_ms: default_transport_ms(),
            send_ms: default_transport_ms(),
        }
    }
}

/// Bounds applied while parsing the body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Longest accepted text of one numeric value
    #[serde(default = "default_scratch_len")]
    pub scratch_len: usize,
}

fn default_max_tokens() -> usize {
    DEFAULT_MAX_TOKENS
}

fn default_scratch_len() -> usize {
    DEFAULT_SCRATCH_LEN
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            scratch_len: default_scratch_len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub query: QueryConfig,
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Replace the API key with `$OPENWEATHER_API_KEY` when it is set and non-empty.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                log::info!("Using API key from {}", API_KEY_ENV);
                self.query.api_key = key;
            }
        }
    }

    /// Check values the fetch loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.server.host.trim().is_empty() {
            return invalid("server.host is empty");
        }
        if self.server.port == 0 {
            return invalid("server.port must be non-zero");
        }
        if !self.server.path.starts_with('/') {
            return invalid("server.path must start with '/'");
        }
        if self.query.lat.is_empty() || self.query.lon.is_empty() {
            return invalid("query.lat and query.lon are required");
        }
        if self.socket.chunk_size == 0 {
            return invalid("socket.chunk_size must be non-zero");
        }
        if self.parser.max_tokens == 0 {
            return invalid("parser.max_tokens must be non-zero");
        }
        if self.parser.scratch_len == 0 {
            return invalid("parser.scratch_len must be non-zero");
        }
        if self.query.api_key.is_empty() {
            log::warn!("query.api_key is empty; the server will likely reject requests");
        }
        Ok(())
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::from(&self.backoff)
    }

    pub fn extractor(&self) -> FieldExtractor {
        FieldExtractor::new(self.parser.max_tokens, self.parser.scratch_len)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}
