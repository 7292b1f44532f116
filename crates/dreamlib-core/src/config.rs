//! Configuration resolution for Dream Library.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/dreamlib/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// One day in seconds.
const DAY_SECS: i64 = 24 * 60 * 60;

/// Complete Dream Library configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Always mark the session cookie `Secure`.
    pub secure_cookies: bool,
    /// Production mode enables long-lived cover cache headers.
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            secure_cookies: false,
            production: false,
        }
    }
}

/// Where the JSON tables and the book files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `users.json`, `downloads.json` and friends.
    pub data_dir: PathBuf,
    /// Directory holding `*.epub`, `metadata/` and `covers/`.
    pub books_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            books_dir: PathBuf::from("../books"),
        }
    }
}

/// Session and account configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub session_ttl_secs: i64,
    pub remember_me_ttl_secs: i64,
    /// Accounts created or approved with one of these emails become admins.
    pub admin_emails: Vec<String>,
    pub verification_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-secret-change-me".to_string(),
            session_ttl_secs: DAY_SECS,
            remember_me_ttl_secs: 30 * DAY_SECS,
            admin_emails: Vec::new(),
            verification_ttl_secs: 5 * 60,
        }
    }
}

/// Transactional email delivery. Unconfigured means log-only delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub sender_email: Option<String>,
    pub sender_name: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.brevo.com/v3/smtp/email".to_string(),
            api_key: None,
            sender_email: None,
            sender_name: "Dream Library".to_string(),
        }
    }
}

impl MailConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|v| !v.trim().is_empty())
            && self.sender_email.as_deref().is_some_and(|v| !v.trim().is_empty())
    }
}

/// External book metadata lookup (Naver Book Search).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub api_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            api_url: "https://openapi.naver.com/v1/search/book.json".to_string(),
            client_id: None,
            client_secret: None,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut layered = serde_json::to_value(Config::default())?;

    if let Some(global_path) = global_config_path().filter(|p| p.exists()) {
        merge_json(&mut layered, load_config_file(&global_path)?);
    }

    if let Some(path) = explicit {
        merge_json(&mut layered, load_config_file(path)?);
    }

    let mut config: Config = serde_json::from_value(layered)
        .map_err(|e| Error::Config(format!("Invalid configuration: {e}")))?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("dreamlib").join("settings.json"))
}

fn load_config_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Deep-merge `overlay` into `base`; objects merge key by key, everything
/// else replaces.
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Apply environment overrides using `lookup` to read variables.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("DREAMLIB_LISTEN_ADDR") {
        config.server.listen_addr = val;
    }
    if let Some(flag) = lookup("DREAMLIB_SECURE_COOKIES").as_deref().and_then(parse_flag) {
        config.server.secure_cookies = flag;
    }
    if let Some(flag) = lookup("DREAMLIB_PRODUCTION").as_deref().and_then(parse_flag) {
        config.server.production = flag;
    }
    if let Some(val) = lookup("DREAMLIB_DATA_DIR") {
        config.storage.data_dir = PathBuf::from(val);
    }
    if let Some(val) = lookup("BOOKS_DIR") {
        config.storage.books_dir = PathBuf::from(val);
    }
    if let Some(val) = lookup("JWT_SECRET") {
        config.auth.jwt_secret = val;
    }
    if let Some(val) = lookup("DREAMLIB_ADMIN_EMAILS") {
        config.auth.admin_emails = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();
    }
    if let Some(val) = lookup("MAIL_API_KEY") {
        config.mail.api_key = Some(val);
    }
    if let Some(val) = lookup("MAIL_SENDER_EMAIL") {
        config.mail.sender_email = Some(val);
    }
    if let Some(val) = lookup("MAIL_SENDER_NAME") {
        config.mail.sender_name = val;
    }
    if let Some(val) = lookup("NAVER_CLIENT_ID") {
        config.lookup.client_id = Some(val);
    }
    if let Some(val) = lookup("NAVER_CLIENT_SECRET") {
        config.lookup.client_secret = Some(val);
    }
}
