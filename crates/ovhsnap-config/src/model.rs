// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the ovhsnap engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level ovhsnap configuration.
///
/// Loaded from `ovhsnap.toml` in the working directory with `OVHSNAP_*`
/// environment variable overrides, plus the bare aliases `PORT`,
/// `API_SECRET_KEY`, `ENABLE_API_KEY_AUTH`, and `DEBUG`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SnapConfig {
    /// Control-plane listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Filesystem layout.
    #[serde(default)]
    pub data: DataConfig,

    /// Queue scheduler settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Availability monitor settings.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Telegram notification settings.
    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// Control-plane listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared secret compared against the `X-API-Key` header.
    #[serde(default)]
    pub api_secret_key: Option<String>,

    /// Whether requests must carry a valid `X-API-Key`.
    #[serde(default = "default_enable_auth")]
    pub enable_api_key_auth: bool,

    /// Verbose (debug-level) logging.
    #[serde(default)]
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_secret_key: None,
            enable_api_key_auth: default_enable_auth(),
            debug: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    19998
}

fn default_enable_auth() -> bool {
    true
}

/// Filesystem layout, all auto-created at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    /// Directory holding the JSON state files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Scratch cache directory.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Log output directory.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cache_dir: default_cache_dir(),
            log_dir: default_log_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_cache_dir() -> String {
    "./cache".to_string()
}

fn default_log_dir() -> String {
    "./logs".to_string()
}

/// Queue scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Hard cap on concurrent order attempts. The effective pool size is
    /// `min(max_workers, 2 x account_count)`.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
        }
    }
}

fn default_max_workers() -> usize {
    32
}

/// Availability monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Seconds between monitor sweeps. Floor is 30.
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Start the monitor automatically when the engine boots.
    #[serde(default = "default_autostart")]
    pub autostart: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            autostart: default_autostart(),
        }
    }
}

fn default_check_interval() -> u64 {
    60
}

fn default_autostart() -> bool {
    true
}

/// Telegram notification configuration. Both fields must be set for the
/// Telegram notifier to be enabled; otherwise notifications are dropped.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Telegram Bot API token.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Chat id that receives notifications.
    #[serde(default)]
    pub chat_id: Option<i64>,
}

impl TelegramConfig {
    /// True when both the token and the destination chat are configured.
    pub fn is_enabled(&self) -> bool {
        self.bot_token.as_deref().is_some_and(|t| !t.is_empty()) && self.chat_id.is_some()
    }
}
