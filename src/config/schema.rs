//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the site.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the site server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SiteConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Process logger settings.
    pub log: LogConfig,

    /// Dedicated request log settings.
    pub access_log: AccessLogConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Process logger configuration.
///
/// The console sink is always active; the file sink only when
/// `send_to_file` is set. Both share `level`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level (trace, debug, info, warn, error).
    pub level: String,

    /// Also write JSON records to a rotating file.
    pub send_to_file: bool,

    /// Path of the active log file.
    pub file_path: String,

    /// Size in megabytes after which the file rolls over (0 = unlimited).
    pub max_size_mb: u64,

    /// Days to keep rotated backups (0 = forever).
    pub max_age_days: u64,

    /// Number of rotated backups to keep (0 = all).
    pub max_backups: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            send_to_file: false,
            file_path: "logs/site.log".to_string(),
            max_size_mb: 100,
            max_age_days: 7,
            max_backups: 3,
        }
    }
}

/// Request log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessLogConfig {
    /// Write every request record to a dedicated file as well.
    pub enabled: bool,

    /// Path of the dedicated request log.
    pub file_path: String,

    /// Longest request body prefix written to the record, in bytes
    /// (0 = whole body). Handlers always receive the full body.
    pub max_body_bytes: usize,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file_path: "/tmp/requests.log".to_string(),
            max_body_bytes: 0,
        }
    }
}
