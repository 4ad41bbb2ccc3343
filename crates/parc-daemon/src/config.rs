//! Configuration for parc-daemon

use chrono::{DateTime, Utc};
use parc_types::{DEFAULT_COOLDOWN_SECS, DEFAULT_GRACE_WINDOW_SECS};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Sweeper cadence bounds, in seconds
const MIN_SWEEP_INTERVAL_SECS: u64 = 30;
const MAX_SWEEP_INTERVAL_SECS: u64 = 300;

/// Floor for the detached-task deadline, in seconds
const MIN_BACKGROUND_TIMEOUT_SECS: u64 = 30;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Rescue engine and sweeper tuning
    #[serde(default)]
    pub rescue: RescueConfig,

    /// Push delivery backend
    #[serde(default)]
    pub push: PushConfig,

    /// Craving coach (LLM) backend
    #[serde(default)]
    pub llm: LlmConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Fasts and tribes for the in-memory directory
    #[serde(default)]
    pub directory: DirectorySeed,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long in-flight requests may drain after a shutdown signal
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            enable_cors: true,
            request_timeout_secs: default_request_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

/// Rescue engine and escalation sweeper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescueConfig {
    /// Minimum interval between two flares by the same user
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    /// Time a flare waits for hype before the AI fallback fires
    #[serde(default = "default_grace_window")]
    pub grace_window_secs: u64,

    /// Sweeper cadence (clamped to 30..=300)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Deadline for detached work such as fan-out and the LLM reply (minimum 30)
    #[serde(default = "default_background_timeout")]
    pub background_timeout_secs: u64,

    /// Deadline for each collaborator call made inside a request
    #[serde(default = "default_collaborator_timeout")]
    pub collaborator_timeout_secs: u64,

    /// Recipients per fan-out push batch
    #[serde(default = "default_fanout_batch_size")]
    pub fanout_batch_size: usize,

    /// Expire ACTIVE flares older than this many hours; disabled when unset
    #[serde(default)]
    pub expire_after_hours: Option<u64>,
}

impl Default for RescueConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown(),
            grace_window_secs: default_grace_window(),
            sweep_interval_secs: default_sweep_interval(),
            background_timeout_secs: default_background_timeout(),
            collaborator_timeout_secs: default_collaborator_timeout(),
            fanout_batch_size: default_fanout_batch_size(),
            expire_after_hours: None,
        }
    }
}

impl RescueConfig {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs as i64)
    }

    pub fn grace_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.grace_window_secs as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(
            self.sweep_interval_secs
                .clamp(MIN_SWEEP_INTERVAL_SECS, MAX_SWEEP_INTERVAL_SECS),
        )
    }

    pub fn background_timeout(&self) -> Duration {
        Duration::from_secs(self.background_timeout_secs.max(MIN_BACKGROUND_TIMEOUT_SECS))
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_secs.max(1))
    }

    pub fn fanout_batch_size(&self) -> usize {
        self.fanout_batch_size.max(1)
    }

    pub fn expire_after(&self) -> Option<chrono::Duration> {
        self.expire_after_hours
            .map(|hours| chrono::Duration::hours(hours as i64))
    }
}

/// Push delivery backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PushConfig {
    /// Log notifications instead of delivering them
    #[default]
    Log,

    /// POST notifications to a push gateway
    Webhook {
        endpoint: String,
        #[serde(default)]
        api_key: Option<String>,
    },
}

/// Craving coach backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LlmConfig {
    /// No coach; flares are returned without an AI reply
    #[default]
    Disabled,

    /// OpenAI-compatible chat completions endpoint
    OpenAi {
        #[serde(default)]
        endpoint: Option<String>,
        api_key: String,
        #[serde(default = "default_llm_model")]
        model: String,
        #[serde(default)]
        max_tokens: Option<u32>,
        #[serde(default)]
        temperature: Option<f32>,
    },
}

/// Directory contents preloaded when running on in-memory storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub tribes: Vec<TribeSeed>,

    #[serde(default)]
    pub fasts: Vec<FastSeed>,
}

impl DirectorySeed {
    pub fn is_empty(&self) -> bool {
        self.tribes.is_empty() && self.fasts.is_empty()
    }
}

/// A tribe and its members in join order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TribeSeed {
    pub id: String,
    #[serde(default)]
    pub members: Vec<String>,
}

/// A running fast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FastSeed {
    pub user_id: String,
    pub fast_id: String,
    pub started_at: DateTime<Utc>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

fn default_shutdown_grace() -> u64 {
    15
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_cooldown() -> u64 {
    DEFAULT_COOLDOWN_SECS
}

fn default_grace_window() -> u64 {
    DEFAULT_GRACE_WINDOW_SECS
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_background_timeout() -> u64 {
    30
}

fn default_collaborator_timeout() -> u64 {
    10
}

fn default_fanout_batch_size() -> usize {
    100
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from file
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Environment overrides, e.g. PARC_RESCUE__GRACE_WINDOW_SECS=300
        builder = builder.add_source(
            config::Environment::with_prefix("PARC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
