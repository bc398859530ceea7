// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration for the ovhsnap engine: TOML file merged with
//! environment variable overrides, plus semantic validation.

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{DataConfig, MonitorConfig, QueueConfig, ServerConfig, SnapConfig, TelegramConfig};
pub use validation::{validate, MIN_CHECK_INTERVAL};
