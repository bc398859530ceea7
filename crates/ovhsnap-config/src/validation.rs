// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic validation of a loaded configuration.

use ovhsnap_core::SnapError;

use crate::model::SnapConfig;

/// Floor for the monitor sweep interval, in seconds.
pub const MIN_CHECK_INTERVAL: u64 = 30;

/// Validate cross-field constraints that serde defaults cannot express.
pub fn validate(config: &SnapConfig) -> Result<(), SnapError> {
    if config.server.enable_api_key_auth
        && config
            .server
            .api_secret_key
            .as_deref()
            .map_or(true, str::is_empty)
    {
        return Err(SnapError::Config(
            "API_SECRET_KEY is required while API key auth is enabled \
             (set server.api_secret_key or disable server.enable_api_key_auth)"
                .into(),
        ));
    }

    if config.server.port == 0 {
        return Err(SnapError::Config("server.port must be non-zero".into()));
    }

    if config.monitor.check_interval < MIN_CHECK_INTERVAL {
        return Err(SnapError::Config(format!(
            "monitor.check_interval must be at least {MIN_CHECK_INTERVAL} seconds, got {}",
            config.monitor.check_interval
        )));
    }

    if config.queue.max_workers == 0 {
        return Err(SnapError::Config("queue.max_workers must be non-zero".into()));
    }

    if config.telegram.bot_token.is_some() != config.telegram.chat_id.is_some() {
        return Err(SnapError::Config(
            "telegram.bot_token and telegram.chat_id must be set together".into(),
        ));
    }

    Ok(())
}
