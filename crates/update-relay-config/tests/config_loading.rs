// crates/update-relay-config/tests/config_loading.rs
// ============================================================================
// Module: Config Loading Tests
// Description: Defaults, validation, and environment fallback behavior.
// ============================================================================
//! ## Overview
//! Loads representative TOML documents and checks fail-closed validation.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::HashMap;
use std::io::Write;

use update_relay_config::AssetUrlMode;
use update_relay_config::CacheConfig;
use update_relay_config::ConfigError;
use update_relay_config::LogSinkKind;
use update_relay_config::RelayConfig;
use update_relay_config::StatusMapping;
use update_relay_config::StorageProvider;
use update_relay_core::LogLevel;

fn parse_and_validate(toml: &str) -> Result<RelayConfig, ConfigError> {
    let mut config = RelayConfig::parse(toml)?;
    config.validate()?;
    Ok(config)
}

fn assert_invalid(toml: &str, needle: &str) {
    match parse_and_validate(toml) {
        Err(ConfigError::Invalid(message)) => {
            assert!(message.contains(needle), "message {message:?} missing {needle:?}");
        }
        other => panic!("expected invalid config, got {other:?}"),
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Tests a minimal S3 config picks up every default.
#[test]
fn test_minimal_config_defaults() {
    let config = parse_and_validate("[storage]\nbucket = \"updates\"\n").unwrap();
    assert_eq!(config.server.bind, "0.0.0.0:3000");
    assert_eq!(config.server.status_mapping, StatusMapping::Compat);
    assert_eq!(config.server.asset_url_mode, AssetUrlMode::PublicHost);
    assert_eq!(
        config.server.asset_request_headers.get("test-header").map(String::as_str),
        Some("test-header-value")
    );
    assert_eq!(config.storage.provider, StorageProvider::S3);
    assert_eq!(config.cache, CacheConfig::default());
    assert_eq!(config.cache.latest_bundle_secs, 180);
    assert_eq!(config.cache.asset_secs, 1800);
    assert_eq!(config.logging.sink, LogSinkKind::Stderr);
    assert_eq!(config.logging.level, LogLevel::Info);
    assert!(config.signing.private_key_path.is_none());
}

/// Tests public_host loses its trailing slash.
#[test]
fn test_public_host_is_normalized() {
    let config = parse_and_validate(
        "[server]\npublic_host = \"https://cdn.example.com/\"\n[storage]\nbucket = \"b\"\n",
    )
    .unwrap();
    assert_eq!(config.server.public_host, "https://cdn.example.com");
}

/// Tests a full file loads from disk and records its source.
#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[server]
bind = "127.0.0.1:4000"
public_host = "https://updates.example.com"
status_mapping = "strict"

[server.asset_request_headers]
"x-auth" = "token"

[storage]
provider = "s3"
bucket = "updates"
endpoint = "http://localhost:9000"
allow_http = true
force_path_style = true
access_key = "ak"
secret_key = "sk"

[cache]
metadata_secs = 60

[logging]
sink = "none"
level = "debug"
"#
    )
    .unwrap();
    let config = RelayConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.server.bind_addr().unwrap().port(), 4000);
    assert_eq!(config.server.status_mapping, StatusMapping::Strict);
    assert_eq!(config.server.asset_request_headers.len(), 1);
    assert_eq!(config.storage.static_credentials(), Some(("ak", "sk")));
    assert_eq!(config.cache.metadata_secs, 60);
    assert_eq!(config.cache.directory_secs, 300);
    assert_eq!(config.logging.level, LogLevel::Debug);
    assert_eq!(config.source_path.as_deref(), Some(file.path()));
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Tests unknown keys are rejected at parse time.
#[test]
fn test_unknown_keys_rejected() {
    let err = RelayConfig::parse("[server]\nbogus = 1\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

/// Tests S3 storage requires a bucket.
#[test]
fn test_s3_requires_bucket() {
    assert_invalid("[storage]\nprovider = \"s3\"\n", "storage.bucket");
}

/// Tests plain http endpoints require the explicit opt-in.
#[test]
fn test_http_endpoint_requires_opt_in() {
    assert_invalid(
        "[storage]\nbucket = \"b\"\nendpoint = \"http://minio:9000\"\n",
        "allow_http",
    );
}

/// Tests zero TTLs fail closed.
#[test]
fn test_zero_ttl_rejected() {
    assert_invalid("[storage]\nbucket = \"b\"\n[cache]\nasset_secs = 0\n", "cache.asset_secs");
}

/// Tests the file sink requires a path.
#[test]
fn test_file_sink_requires_path() {
    assert_invalid("[storage]\nbucket = \"b\"\n[logging]\nsink = \"file\"\n", "logging.path");
}

/// Tests public_host must carry a scheme.
#[test]
fn test_public_host_requires_scheme() {
    assert_invalid(
        "[server]\npublic_host = \"ftp://cdn.example.com\"\n[storage]\nbucket = \"b\"\n",
        "public_host",
    );
}

/// Tests presigned asset URLs require a presign-capable provider.
#[test]
fn test_presigned_mode_rejects_dogecloud() {
    assert_invalid(
        "[server]\nasset_url_mode = \"presigned\"\n[storage]\nprovider = \"dogecloud\"\n\
         access_key = \"ak\"\nsecret_key = \"sk\"\n",
        "presigned",
    );
}

// ============================================================================
// SECTION: Environment Fallback
// ============================================================================

/// Tests DogeCloud credentials may come from the environment lookup.
#[test]
fn test_dogecloud_credentials_from_env_lookup() {
    let mut config = RelayConfig::parse("[storage]\nprovider = \"dogecloud\"\n").unwrap();
    assert!(config.validate().is_err());

    let env = HashMap::from([
        ("UPDATE_RELAY_STORAGE_ACCESS_KEY", "env-ak"),
        ("UPDATE_RELAY_STORAGE_SECRET_KEY", "env-sk"),
    ]);
    config.apply_env_fallback(|name| env.get(name).map(ToString::to_string));
    config.validate().unwrap();
    assert_eq!(config.storage.static_credentials(), Some(("env-ak", "env-sk")));
    assert_eq!(config.storage.dogecloud.credential_cache_key, "dogecloud_data");
    assert_eq!(config.storage.dogecloud.credential_cache_ttl_secs, 7000);
}

/// Tests file credentials win over the environment lookup.
#[test]
fn test_file_credentials_take_precedence() {
    let mut config = RelayConfig::parse(
        "[storage]\nbucket = \"b\"\naccess_key = \"file-ak\"\nsecret_key = \"file-sk\"\n",
    )
    .unwrap();
    config.apply_env_fallback(|_| Some("env".to_string()));
    assert_eq!(config.storage.static_credentials(), Some(("file-ak", "file-sk")));
}
