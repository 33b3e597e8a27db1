//! Configuration module for the reminder service
//!
//! This module provides configuration structures and defaults for the
//! document store, push gateway, deferred task queue, scanner and server
//! settings.

use kinesia_shared::MessageContent;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for the reminder service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Document store configuration
    pub store: StoreConfig,

    /// Push gateway configuration
    pub gateway: GatewayConfig,

    /// Deferred task queue configuration
    pub queue: QueueConfig,

    /// Due-notification scanner configuration
    pub scanner: ScannerConfig,

    /// Delivery defaults
    pub delivery: DeliveryConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub timeout_seconds: u64,
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub mongo_url: String,
    pub database: String,
    pub users_collection: String,
    pub notifications_collection: String,
    pub connection_timeout_seconds: u64,
}

/// Which document store backend to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Mongo,
    Memory,
}

/// Push gateway (FCM) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub fcm_endpoint: String,
    pub fcm_server_key: String,
    pub timeout_seconds: u64,
}

/// Deferred task queue configuration
///
/// The queue is optional; when disabled the service degrades to
/// polling-only delivery via the scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub callback_url: String,
    pub timeout_seconds: u64,
}

/// Due-notification scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub lookback_minutes: i64,
    pub lookahead_minutes: i64,
    pub duplicate_guard_minutes: i64,
    pub batch_size: usize,
}

/// Delivery defaults used when a user has no pre-generated message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub default_title: String,
    pub default_body: String,
    pub sound: String,
    pub badge: u32,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub namespace: String,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            gateway: GatewayConfig::default(),
            queue: QueueConfig::default(),
            scanner: ScannerConfig::default(),
            delivery: DeliveryConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
            timeout_seconds: 30,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Mongo,
            mongo_url: std::env::var("MONGO_URL")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            database: std::env::var("MONGO_DATABASE").unwrap_or_else(|_| "kinesia".to_string()),
            users_collection: "users".to_string(),
            notifications_collection: "notifications".to_string(),
            connection_timeout_seconds: 30,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            fcm_endpoint: std::env::var("FCM_ENDPOINT")
                .unwrap_or_else(|_| "https://fcm.googleapis.com/fcm/send".to_string()),
            fcm_server_key: std::env::var("FCM_SERVER_KEY").unwrap_or_default(),
            timeout_seconds: 10,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: false, // Polling-only by default
            endpoint: std::env::var("QUEUE_ENDPOINT").unwrap_or_default(),
            callback_url: std::env::var("QUEUE_CALLBACK_URL").unwrap_or_default(),
            timeout_seconds: 10,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 300,
            lookback_minutes: 30,
            lookahead_minutes: 5,
            duplicate_guard_minutes: 15,
            batch_size: 500,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            default_title: "Time for your exercises".to_string(),
            default_body: "Keep your recovery on track with today's session.".to_string(),
            sound: "default".to_string(),
            badge: 1,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "/metrics".to_string(),
            namespace: "reminder_service".to_string(),
        }
    }
}

impl ScannerConfig {
    /// Tick interval for the background scan loop
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// How far into the past the due-window extends
    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.lookback_minutes)
    }

    /// How far into the future the due-window extends
    pub fn lookahead(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.lookahead_minutes)
    }

    /// Window within which an existing notification suppresses a new send
    pub fn duplicate_guard(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.duplicate_guard_minutes)
    }
}

impl DeliveryConfig {
    /// The templated fallback message used when neither the user profile nor
    /// the notification record carries content
    pub fn default_content(&self) -> MessageContent {
        MessageContent {
            title: self.default_title.clone(),
            body: self.default_body.clone(),
        }
    }
}

impl ReminderConfig {
    /// Load configuration from environment variables and config file
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let mut cfg = config::Config::builder();

        // Start with default configuration
        cfg = cfg.add_source(config::Config::try_from(&ReminderConfig::default())?);

        // Add environment variables with prefix
        cfg = cfg.add_source(
            config::Environment::with_prefix("REMINDER")
                .separator("__")
                .try_parsing(true),
        );

        // Add config file if it exists
        if let Ok(config_file) = std::env::var("REMINDER_CONFIG_FILE") {
            cfg = cfg.add_source(config::File::with_name(&config_file).required(false));
        }

        cfg.build()?.try_deserialize()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }

        if self.store.backend == StoreBackend::Mongo {
            if self.store.mongo_url.is_empty() {
                return Err("Mongo URL is required for the mongo store backend".to_string());
            }
            if self.store.database.is_empty() {
                return Err("Database name is required for the mongo store backend".to_string());
            }
        }

        if self.gateway.fcm_endpoint.is_empty() {
            return Err("FCM endpoint must not be empty".to_string());
        }

        if self.queue.enabled && self.queue.endpoint.is_empty() {
            return Err("Queue endpoint is required when the queue is enabled".to_string());
        }

        if self.scanner.interval_seconds == 0 {
            return Err("Scanner interval must be greater than 0".to_string());
        }

        if self.scanner.lookback_minutes < 0 || self.scanner.lookahead_minutes < 0 {
            return Err("Scanner window minutes must not be negative".to_string());
        }

        Ok(())
    }
}
