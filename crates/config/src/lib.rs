use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "frontdesk.toml",
    "config/frontdesk.toml",
    "crates/config/frontdesk.toml",
    "../frontdesk.toml",
    "../config/frontdesk.toml",
    "../crates/config/frontdesk.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub reconnect: ReconnectConfig,
    pub typing: TypingConfig,
    pub files: FilesConfig,
    pub encryption: EncryptionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// WebSocket endpoint carrying the realtime channel.
    pub ws_url: String,
    /// Base URL of the file-transfer REST boundary.
    pub files_base_url: String,
    #[serde(default = "ServerConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl ServerConfig {
    const fn default_request_timeout() -> u64 {
        30
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:7070/rtm".to_string(),
            files_base_url: "http://127.0.0.1:7070".to_string(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

/// Retry budget for the reconnection coordinator.
///
/// ```
/// use frontdesk_config::ReconnectConfig;
///
/// let reconnect = ReconnectConfig::default();
/// assert_eq!(reconnect.max_attempts, 10);
/// assert!(reconnect.base_delay_ms <= reconnect.max_delay_ms);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 1_000,
            max_delay_ms: 32_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingConfig {
    /// Minimum gap between two outbound typing emits for the same room.
    pub debounce_ms: u64,
    /// Idle window after which a stop-typing event is emitted automatically.
    pub idle_stop_ms: u64,
    /// TTL after which inbound typing state auto-clears without a refresh.
    pub ttl_ms: u64,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            idle_stop_ms: 2_000,
            ttl_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Fallback polling cadence for upload session status.
    pub poll_interval_ms: u64,
    pub max_upload_bytes: u64,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EncryptionConfig {
    /// When false the codec runs in `algorithm: "none"` passthrough mode.
    pub enabled: bool,
}

/// Load the engine configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use frontdesk_config::load;
///
/// std::env::remove_var("FRONTDESK_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.server.ws_url.is_empty());
/// assert_eq!(config.files.poll_interval_ms, 1_000);
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder();
    builder = builder
        .set_default("server.ws_url", defaults.server.ws_url.clone())
        .unwrap()
        .set_default(
            "server.files_base_url",
            defaults.server.files_base_url.clone(),
        )
        .unwrap()
        .set_default(
            "server.request_timeout_seconds",
            i64::try_from(defaults.server.request_timeout_seconds).unwrap_or(i64::MAX),
        )
        .unwrap()
        .set_default(
            "reconnect.max_attempts",
            i64::from(defaults.reconnect.max_attempts),
        )
        .unwrap()
        .set_default(
            "reconnect.base_delay_ms",
            i64::try_from(defaults.reconnect.base_delay_ms).unwrap_or(i64::MAX),
        )
        .unwrap()
        .set_default(
            "reconnect.max_delay_ms",
            i64::try_from(defaults.reconnect.max_delay_ms).unwrap_or(i64::MAX),
        )
        .unwrap()
        .set_default(
            "typing.debounce_ms",
            i64::try_from(defaults.typing.debounce_ms).unwrap_or(i64::MAX),
        )
        .unwrap()
        .set_default(
            "typing.idle_stop_ms",
            i64::try_from(defaults.typing.idle_stop_ms).unwrap_or(i64::MAX),
        )
        .unwrap()
        .set_default(
            "typing.ttl_ms",
            i64::try_from(defaults.typing.ttl_ms).unwrap_or(i64::MAX),
        )
        .unwrap()
        .set_default(
            "files.poll_interval_ms",
            i64::try_from(defaults.files.poll_interval_ms).unwrap_or(i64::MAX),
        )
        .unwrap()
        .set_default(
            "files.max_upload_bytes",
            i64::try_from(defaults.files.max_upload_bytes).unwrap_or(i64::MAX),
        )
        .unwrap()
        .set_default("encryption.enabled", defaults.encryption.enabled)
        .unwrap();

    let environment_overrides = config::Environment::with_prefix("FRONTDESK").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("FRONTDESK_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via FRONTDESK_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    // A ceiling below the floor would stall the backoff loop.
    if config.reconnect.max_delay_ms < config.reconnect.base_delay_ms {
        config.reconnect.max_delay_ms = config.reconnect.base_delay_ms;
    }

    debug!(?config, "loaded engine configuration");
    Ok(config)
}
