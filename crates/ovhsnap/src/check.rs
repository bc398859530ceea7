// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ovhsnap config check` command implementation.

use ovhsnap_config::{validate, SnapConfig};

/// Validate the loaded configuration and print a summary.
///
/// Returns the process exit code: 0 when valid, 1 otherwise.
pub fn run_check(config: &SnapConfig) -> i32 {
    println!("server:");
    println!("  listen            {}:{}", config.server.host, config.server.port);
    println!(
        "  api key auth      {}",
        if config.server.enable_api_key_auth {
            if config.server.api_secret_key.is_some() {
                "enabled"
            } else {
                "enabled (NO KEY SET)"
            }
        } else {
            "disabled"
        }
    );
    println!("  debug logging     {}", config.server.debug);
    println!("data:");
    println!("  data dir          {}", config.data.data_dir);
    println!("  cache dir         {}", config.data.cache_dir);
    println!("  log dir           {}", config.data.log_dir);
    println!("queue:");
    println!("  max workers       {}", config.queue.max_workers);
    println!("monitor:");
    println!("  check interval    {}s", config.monitor.check_interval);
    println!("  autostart         {}", config.monitor.autostart);
    println!(
        "telegram:           {}",
        if config.telegram.is_enabled() {
            "configured"
        } else {
            "not configured"
        }
    );

    match validate(config) {
        Ok(()) => {
            println!("\nconfiguration OK");
            0
        }
        Err(e) => {
            eprintln!("\nerror: {e}");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_fails_check_without_secret() {
        let config = SnapConfig::default();
        assert_eq!(run_check(&config), 1);
    }

    #[test]
    fn config_with_secret_passes() {
        let mut config = SnapConfig::default();
        config.server.api_secret_key = Some("deadbeef".into());
        assert_eq!(run_check(&config), 0);
    }
}
