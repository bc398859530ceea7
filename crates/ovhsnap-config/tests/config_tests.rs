// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the ovhsnap configuration system.

use ovhsnap_config::{load_config_from_str, validate};

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_snap_config() {
    let toml = r#"
[server]
host = "127.0.0.1"
port = 8080
api_secret_key = "deadbeefcafe"
enable_api_key_auth = true
debug = true

[data]
data_dir = "/var/lib/ovhsnap/data"
cache_dir = "/var/lib/ovhsnap/cache"
log_dir = "/var/log/ovhsnap"

[queue]
max_workers = 16

[monitor]
check_interval = 120
autostart = false

[telegram]
bot_token = "123:ABC"
chat_id = 987654321
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.api_secret_key.as_deref(), Some("deadbeefcafe"));
    assert!(config.server.debug);
    assert_eq!(config.data.data_dir, "/var/lib/ovhsnap/data");
    assert_eq!(config.queue.max_workers, 16);
    assert_eq!(config.monitor.check_interval, 120);
    assert!(!config.monitor.autostart);
    assert_eq!(config.telegram.bot_token.as_deref(), Some("123:ABC"));
    assert_eq!(config.telegram.chat_id, Some(987654321));
    assert!(validate(&config).is_ok());
}

/// Empty TOML yields the compiled defaults.
#[test]
fn empty_toml_yields_defaults() {
    let config = load_config_from_str("").expect("empty TOML should deserialize");
    assert_eq!(config.server.port, 19998);
    assert!(config.server.enable_api_key_auth);
    assert_eq!(config.data.data_dir, "./data");
    assert_eq!(config.monitor.check_interval, 60);
}

/// Unknown field in [server] section is rejected at load time.
#[test]
fn unknown_field_in_server_produces_error() {
    let toml = r#"
[server]
prot = 8080
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("prot"),
        "error should mention unknown field or the bad key, got: {err_str}"
    );
}

/// Unknown top-level section is rejected at load time.
#[test]
fn unknown_section_produces_error() {
    let toml = r#"
[notifications]
kind = "telegram"
"#;

    assert!(load_config_from_str(toml).is_err());
}

/// A type mismatch produces a load error rather than a silent default.
#[test]
fn type_mismatch_produces_error() {
    let toml = r#"
[monitor]
check_interval = "sixty"
"#;

    assert!(load_config_from_str(toml).is_err());
}

/// Validation rejects a config with auth enabled but no secret.
#[test]
fn validation_requires_secret_when_auth_enabled() {
    let config = load_config_from_str("").unwrap();
    assert!(validate(&config).is_err());

    let config = load_config_from_str(
        r#"
[server]
enable_api_key_auth = false
"#,
    )
    .unwrap();
    assert!(validate(&config).is_ok());
}
