//! Configuration types for the intake service.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::net::SocketAddr;

use beacon_queue::QueueConfig;

use crate::IntakeError;

// ============================================================================
// Default configuration constants
// ============================================================================

/// Default OTLP HTTP port (OpenTelemetry standard).
pub const DEFAULT_HTTP_PORT: u16 = 4318;

/// Default maximum compressed request body size (16 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Default maximum decompressed payload size (64 MiB).
///
/// Caps how far a small gzip body may expand before the request is refused.
pub const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 64 * 1024 * 1024;

/// Default topic for error batches.
pub const DEFAULT_ERRORS_TOPIC: &str = "public-worker";

/// Default topic for log batches.
pub const DEFAULT_LOGS_TOPIC: &str = "public-worker-batched";

/// Default minimum length of a verbose project id.
pub const DEFAULT_VERBOSE_ID_MIN_LENGTH: usize = 8;

/// Default alphabet of a verbose project id.
pub const DEFAULT_VERBOSE_ID_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz1234567890";

/// Intake service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Server configuration.
    pub server: ServerConfig,
    /// Verbose project id encoding.
    pub verbose_id: VerboseIdConfig,
    /// Downstream queue configuration.
    pub queue: SinkConfig,
}

impl IntakeConfig {
    /// Load configuration from files and environment.
    ///
    /// Configuration is loaded in order (later sources override earlier):
    /// 1. Default values
    /// 2. `beacon.toml` in current directory
    /// 3. Environment variables prefixed with `BEACON_`, nested with `__`
    ///    (e.g. `BEACON_SERVER__HTTP_ADDR`)
    pub fn load() -> Result<Self, IntakeError> {
        Self::load_from("beacon.toml")
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &str) -> Result<Self, IntakeError> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("BEACON_").split("__"))
            .extract()
            .map_err(|e| IntakeError::Config(e.to_string()))
    }
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// OTLP HTTP address (default: 0.0.0.0:4318).
    pub http_addr: SocketAddr,
    /// Maximum compressed request body in bytes.
    pub max_body_size: usize,
    /// Maximum decompressed payload in bytes.
    pub max_decompressed_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_HTTP_PORT)),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
        }
    }
}

/// Parameters of the verbose project id encoding.
///
/// These must match whatever issued the ids, otherwise verbose ids will not
/// decode.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerboseIdConfig {
    pub salt: String,
    pub min_length: usize,
    pub alphabet: String,
}

impl Default for VerboseIdConfig {
    fn default() -> Self {
        Self {
            salt: String::new(),
            min_length: DEFAULT_VERBOSE_ID_MIN_LENGTH,
            alphabet: DEFAULT_VERBOSE_ID_ALPHABET.to_owned(),
        }
    }
}

/// Where classified batches are published.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Topic receiving error batches.
    pub errors_topic: String,
    /// Topic receiving log batches.
    pub logs_topic: String,
    /// Backend shared by both topics.
    pub backend: QueueConfig,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            errors_topic: DEFAULT_ERRORS_TOPIC.to_owned(),
            logs_topic: DEFAULT_LOGS_TOPIC.to_owned(),
            backend: QueueConfig::default(),
        }
    }
}
