// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Merge order (later overrides earlier): compiled defaults, `ovhsnap.toml`
//! in the working directory, `OVHSNAP_*` environment variables, and finally
//! the documented bare aliases (`PORT`, `API_SECRET_KEY`,
//! `ENABLE_API_KEY_AUTH`, `DEBUG`).

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Data, Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::SnapConfig;

/// Load configuration from the working directory with env var overrides.
pub fn load_config() -> Result<SnapConfig, figment::Error> {
    base_figment(Toml::file("ovhsnap.toml")).extract()
}

/// Load configuration from a specific TOML file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<SnapConfig, figment::Error> {
    base_figment(Toml::file(path)).extract()
}

/// Load configuration from an inline TOML string only (no env lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<SnapConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SnapConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

fn base_figment(file: Data<Toml>) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(SnapConfig::default()))
        .merge(file)
        .merge(env_provider())
        .merge(alias("PORT", "server.port"))
        .merge(alias("API_SECRET_KEY", "server.api_secret_key"))
        .merge(alias("ENABLE_API_KEY_AUTH", "server.enable_api_key_auth"))
        .merge(alias("DEBUG", "server.debug"))
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `OVHSNAP_SERVER_API_SECRET_KEY` must map
/// to `server.api_secret_key`, not `server.api.secret.key`.
fn env_provider() -> Env {
    Env::prefixed("OVHSNAP_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("server_", "server.", 1)
            .replacen("data_", "data.", 1)
            .replacen("queue_", "queue.", 1)
            .replacen("monitor_", "monitor.", 1)
            .replacen("telegram_", "telegram.", 1);
        mapped.into()
    })
}

/// A single bare environment variable mapped onto a dotted config key.
fn alias(var: &'static str, key: &'static str) -> Env {
    Env::raw().only(&[var]).map(move |_| key.into())
}
