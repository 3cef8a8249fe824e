//! Comprehensive test plan for the `frontdesk-config` crate.
//!
//! These tests exercise the configuration loader across default handling,
//! file discovery, environment overrides, and validation behaviour.

use std::fs;
use std::path::{Path, PathBuf};

use serial_test::serial;
use tempfile::TempDir;

use frontdesk_config::{load, AppConfig, ReconnectConfig, TypingConfig};

const ENV_VARS_TO_RESET: &[&str] = &[
    "FRONTDESK_CONFIG",
    "FRONTDESK__SERVER__WS_URL",
    "FRONTDESK__SERVER__FILES_BASE_URL",
    "FRONTDESK__SERVER__REQUEST_TIMEOUT_SECONDS",
    "FRONTDESK__RECONNECT__MAX_ATTEMPTS",
    "FRONTDESK__RECONNECT__BASE_DELAY_MS",
    "FRONTDESK__RECONNECT__MAX_DELAY_MS",
    "FRONTDESK__TYPING__DEBOUNCE_MS",
    "FRONTDESK__TYPING__IDLE_STOP_MS",
    "FRONTDESK__TYPING__TTL_MS",
    "FRONTDESK__FILES__POLL_INTERVAL_MS",
    "FRONTDESK__FILES__MAX_UPLOAD_BYTES",
    "FRONTDESK__ENCRYPTION__ENABLED",
];

struct TestContext {
    vars: Vec<(String, Option<String>)>,
    original_dir: Option<PathBuf>,
}

impl TestContext {
    fn new() -> Self {
        Self {
            vars: Vec::new(),
            original_dir: None,
        }
    }

    fn reset_environment(&mut self) {
        for key in ENV_VARS_TO_RESET {
            self.remove_var(key);
        }
    }

    fn set_var(&mut self, key: &str, value: impl AsRef<str>) {
        let previous = std::env::var(key).ok();
        std::env::set_var(key, value.as_ref());
        self.vars.push((key.to_string(), previous));
    }

    fn remove_var(&mut self, key: &str) {
        let previous = std::env::var(key).ok();
        std::env::remove_var(key);
        self.vars.push((key.to_string(), previous));
    }

    fn set_current_dir(&mut self, dir: &Path) {
        if self.original_dir.is_none() {
            self.original_dir =
                Some(std::env::current_dir().expect("failed to capture current directory"));
        }
        std::env::set_current_dir(dir).expect("failed to set current directory");
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        if let Some(original) = self.original_dir.take() {
            let _ = std::env::set_current_dir(original);
        }

        while let Some((key, value)) = self.vars.pop() {
            match value {
                Some(val) => std::env::set_var(&key, val),
                None => std::env::remove_var(&key),
            }
        }
    }
}

fn write_config_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("failed to create config directories");
    }
    fs::write(path, contents).expect("failed to write config file");
}

#[test]
#[serial]
fn load_uses_default_values_when_no_files_found() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    let config = load().expect("configuration load should succeed without files");
    let defaults = AppConfig::default();

    assert_eq!(config.server.ws_url, defaults.server.ws_url);
    assert_eq!(config.server.files_base_url, defaults.server.files_base_url);
    assert_eq!(
        config.server.request_timeout_seconds,
        defaults.server.request_timeout_seconds
    );
    assert_eq!(config.reconnect.max_attempts, defaults.reconnect.max_attempts);
    assert_eq!(config.typing.debounce_ms, defaults.typing.debounce_ms);
    assert_eq!(config.typing.idle_stop_ms, defaults.typing.idle_stop_ms);
    assert_eq!(config.files.poll_interval_ms, defaults.files.poll_interval_ms);
    assert!(!config.encryption.enabled);
}

#[test]
#[serial]
fn load_picks_first_available_file_in_search_order() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_config_file(
        temp_dir.path(),
        "frontdesk.toml",
        r#"
        [reconnect]
        max_attempts = 3
        "#,
    );
    write_config_file(
        temp_dir.path(),
        "config/frontdesk.toml",
        r#"
        [reconnect]
        max_attempts = 7
        "#,
    );

    let config = load().expect("configuration load should pick the first file");
    assert_eq!(config.reconnect.max_attempts, 3);
}

#[test]
#[serial]
fn load_merges_partial_file_with_defaults() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_config_file(
        temp_dir.path(),
        "frontdesk.toml",
        r#"
        [server]
        ws_url = "wss://chat.example.com/rtm"

        [typing]
        ttl_ms = 8000
        "#,
    );

    let config = load().expect("configuration load should succeed");
    let defaults = AppConfig::default();

    assert_eq!(config.server.ws_url, "wss://chat.example.com/rtm");
    assert_eq!(config.server.files_base_url, defaults.server.files_base_url);
    assert_eq!(config.typing.ttl_ms, 8000);
    assert_eq!(config.typing.debounce_ms, defaults.typing.debounce_ms);
}

#[test]
#[serial]
fn load_applies_environment_overrides() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_config_file(
        temp_dir.path(),
        "frontdesk.toml",
        r#"
        [files]
        poll_interval_ms = 500
        "#,
    );

    ctx.set_var("FRONTDESK__FILES__POLL_INTERVAL_MS", "2000");

    let config = load().expect("configuration load should honour env overrides");
    assert_eq!(config.files.poll_interval_ms, 2000);
}

#[test]
#[serial]
fn load_enables_encryption_from_environment() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    ctx.set_var("FRONTDESK__ENCRYPTION__ENABLED", "true");

    let config = load().expect("configuration load should read encryption flag");
    assert!(config.encryption.enabled);
}

#[test]
#[serial]
fn load_raises_max_delay_to_base_delay() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_config_file(
        temp_dir.path(),
        "frontdesk.toml",
        r#"
        [reconnect]
        base_delay_ms = 4000
        max_delay_ms = 100
        "#,
    );

    let config = load().expect("configuration load should succeed with inverted delays");
    assert_eq!(
        config.reconnect.max_delay_ms, 4000,
        "ceiling should be raised to the floor"
    );
}

#[test]
#[serial]
fn load_errors_on_invalid_toml_contents() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_config_file(
        temp_dir.path(),
        "frontdesk.toml",
        r#"
        [typing]
        debounce_ms = "not-a-number
        "#,
    );

    let error = load().expect_err("invalid TOML should cause load to fail");
    let message = error.to_string();
    assert!(
        message.contains("invalid configuration")
            || message.contains("unable to build configuration"),
        "unexpected error message: {message}"
    );
}

#[test]
fn typing_config_defaults_match_protocol_timing() {
    let defaults = TypingConfig::default();
    assert_eq!(defaults.debounce_ms, 300);
    assert_eq!(defaults.idle_stop_ms, 2_000);
    assert!(defaults.ttl_ms > defaults.idle_stop_ms);
}

#[test]
fn reconnect_config_defaults_are_bounded() {
    let defaults = ReconnectConfig::default();
    assert!(defaults.max_attempts > 0, "retry budget must be bounded and visible");
    assert_eq!(defaults.base_delay_ms, 1_000);
    assert_eq!(defaults.max_delay_ms, 32_000);
}
