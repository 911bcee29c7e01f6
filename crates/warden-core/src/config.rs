//! Configuration resolution for the network warden.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`$XDG_CONFIG_HOME/warden/settings.json`)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables (`WARDEN_*`)
//! 5. CLI arguments (highest priority, applied by the binary)
//!
//! Files are merged key by key, so an overlay only needs to name the values
//! it changes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Largest top-level node accepted by the ID allocator (6 bits).
pub const MAX_TOP_NODE: u16 = 63;

/// Complete warden configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WardenConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity of this warden deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Warden ID, embedded in issued API keys.
    pub warden_id: i64,
    pub name: String,
    pub description: String,
    /// Suffix appended to personal data node addresses (`#label::suffix`).
    pub address_suffix: String,
    /// Top-level ID allocator coordinate shared by every entity family.
    pub id_gen_top_node: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            warden_id: 1,
            name: "warden".to_string(),
            description: String::new(),
            address_suffix: "warden".to_string(),
            id_gen_top_node: 0,
        }
    }
}

/// Token and session lifetimes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    /// Server-side session age, refreshed on every token rotation.
    pub session_age_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 7 * 24 * 60 * 60,
            session_age_secs: 7 * 24 * 60 * 60,
        }
    }
}

/// A sliding-window send quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindowConfig {
    pub max_requests: u32,
    pub interval_secs: i64,
}

/// Outbound confirmation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub sender_email: String,
    /// Sender ID recorded for SMS confirmations.
    pub sender_sms: String,
    pub confirmation_email: RateWindowConfig,
    pub confirmation_sms: RateWindowConfig,
    /// Base URL of the mail/SMS gateway. When unset, messages are only logged.
    pub gateway_url: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            sender_email: "no-reply@warden.local".to_string(),
            sender_sms: "warden".to_string(),
            confirmation_email: RateWindowConfig {
                max_requests: 3,
                interval_secs: 5 * 60,
            },
            confirmation_sms: RateWindowConfig {
                max_requests: 3,
                interval_secs: 15 * 60,
            },
            gateway_url: None,
        }
    }
}

/// Storage location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

/// Directory listing limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 500,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub filter: Option<String>,
    pub json: bool,
}

impl WardenConfig {
    /// Reject settings the services cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.app.id_gen_top_node > MAX_TOP_NODE {
            return Err(Error::Config(format!(
                "app.id_gen_top_node must be at most {MAX_TOP_NODE}, got {}",
                self.app.id_gen_top_node
            )));
        }
        if self.app.address_suffix.trim().is_empty() {
            return Err(Error::Config("app.address_suffix must not be empty".into()));
        }
        for (name, value) in [
            ("auth.access_token_ttl_secs", self.auth.access_token_ttl_secs),
            ("auth.refresh_token_ttl_secs", self.auth.refresh_token_ttl_secs),
            ("auth.session_age_secs", self.auth.session_age_secs),
            (
                "notifications.confirmation_email.interval_secs",
                self.notifications.confirmation_email.interval_secs,
            ),
            (
                "notifications.confirmation_sms.interval_secs",
                self.notifications.confirmation_sms.interval_secs,
            ),
        ] {
            if value <= 0 {
                return Err(Error::Config(format!("{name} must be positive, got {value}")));
            }
        }
        if self.directory.default_page_size == 0
            || self.directory.default_page_size > self.directory.max_page_size
        {
            return Err(Error::Config(
                "directory.default_page_size must be between 1 and directory.max_page_size".into(),
            ));
        }
        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
///
/// `explicit` must exist when given; the global file is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<WardenConfig> {
    let mut merged = serde_json::to_value(WardenConfig::default())?;

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            deep_merge(&mut merged, load_config_value(&global_path)?);
        }
    }

    if let Some(path) = explicit {
        deep_merge(&mut merged, load_config_value(path)?);
    }

    let mut config: WardenConfig = serde_json::from_value(merged)
        .map_err(|e| Error::Config(format!("Invalid configuration: {e}")))?;
    apply_env_overrides(&mut config);
    config.validate()?;

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
        .map(|p| p.join("warden").join("settings.json"))
}

fn load_config_value(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Merge `overlay` into `base`; objects merge per key, anything else replaces.
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn apply_env_overrides(config: &mut WardenConfig) {
    if let Ok(val) = std::env::var("WARDEN_ID") {
        if let Ok(n) = val.parse() {
            config.app.warden_id = n;
        }
    }
    if let Ok(val) = std::env::var("WARDEN_ID_GEN_TOP_NODE") {
        if let Ok(n) = val.parse() {
            config.app.id_gen_top_node = n;
        }
    }
    if let Ok(val) = std::env::var("WARDEN_ADDRESS_SUFFIX") {
        config.app.address_suffix = val;
    }
    if let Ok(val) = std::env::var("WARDEN_DB_PATH") {
        config.database.path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("WARDEN_SENDER_EMAIL") {
        config.notifications.sender_email = val;
    }
    if let Ok(val) = std::env::var("WARDEN_GATEWAY_URL") {
        config.notifications.gateway_url = Some(val);
    }
    if let Ok(val) = std::env::var("WARDEN_LOG_FILTER") {
        config.logging.filter = Some(val);
    }
}
