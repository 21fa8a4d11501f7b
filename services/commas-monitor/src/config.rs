//! Monitor Configuration
//!
//! Settings are layered: optional TOML file, then `THREE_COMMAS__*`
//! environment variables. A single entry can also be described with the
//! flat `THREE_COMMAS_API_KEY` family of variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Integration domain, used as a prefix for sensor ids
pub const DOMAIN: &str = "three_commas";

/// Attribution shown next to every sensor
pub const ATTRIBUTION: &str = "Data provided by 3commas.io API";

/// Public API host
pub const BASE_URL: &str = "https://api.3commas.io";

/// Path prefix that is part of every signed request path
pub const API_PREFIX: &str = "/public/api";

const ENV_PREFIX: &str = "THREE_COMMAS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Entry {entry}: {message}")]
    InvalidEntry { entry: String, message: String },

    #[error("Failed to read private key {path}: {source}")]
    PrivateKey {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Request signing method
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    #[default]
    Hmac,
    Rsa,
}

/// Value sent in the `Forced-Mode` header
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserMode {
    Paper,
    Real,
}

impl UserMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserMode::Paper => "paper",
            UserMode::Real => "real",
        }
    }
}

/// Secret material; exactly one form per auth method
#[derive(Clone)]
pub enum Secret {
    /// HMAC shared secret
    Hmac(String),
    /// PEM-encoded RSA private key (no password)
    RsaPem(String),
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Secret::Hmac(_) => f.write_str("Secret::Hmac(***)"),
            Secret::RsaPem(_) => f.write_str("Secret::RsaPem(***)"),
        }
    }
}

/// Immutable API credentials
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub secret: Secret,
    pub mode: Option<UserMode>,
}

impl Credentials {
    pub fn hmac(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: Secret::Hmac(api_secret.into()),
            mode: None,
        }
    }

    pub fn rsa(api_key: impl Into<String>, private_key_pem: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: Secret::RsaPem(private_key_pem.into()),
            mode: None,
        }
    }

    pub fn with_mode(mut self, mode: UserMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn auth_method(&self) -> AuthMethod {
        match self.secret {
            Secret::Hmac(_) => AuthMethod::Hmac,
            Secret::RsaPem(_) => AuthMethod::Rsa,
        }
    }
}

/// One configured integration instance
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EntryConfig {
    /// Instance id; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub api_key: String,
    #[serde(default)]
    pub auth_method: AuthMethod,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    #[serde(default)]
    pub user_mode: Option<UserMode>,
}

impl EntryConfig {
    /// Label used in logs and errors before an id is assigned
    pub fn label(&self) -> String {
        self.id.clone().unwrap_or_else(|| "<unnamed>".to_string())
    }

    /// Build credentials, checking the secret matches the auth method
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidEntry {
            entry: self.label(),
            message: message.to_string(),
        };

        if self.api_key.trim().is_empty() {
            return Err(invalid("api_key is required"));
        }

        let secret = match self.auth_method {
            AuthMethod::Hmac => {
                let secret = self
                    .api_secret
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| invalid("API secret is required for HMAC authentication"))?;
                Secret::Hmac(secret.to_string())
            }
            AuthMethod::Rsa => {
                let pem = match (&self.private_key, &self.private_key_path) {
                    (Some(pem), _) if !pem.trim().is_empty() => pem.clone(),
                    (_, Some(path)) => read_private_key(path)?,
                    _ => {
                        return Err(invalid(
                            "Private key is required for RSA authentication",
                        ))
                    }
                };
                Secret::RsaPem(pem)
            }
        };

        Ok(Credentials {
            api_key: self.api_key.clone(),
            secret,
            mode: self.user_mode,
        })
    }
}

fn read_private_key(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::PrivateKey {
        path: path.to_path_buf(),
        source,
    })
}

/// Top-level monitor settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub entries: Vec<EntryConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            log_level: default_log_level(),
            entries: Vec::new(),
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Load settings from `path` (or the default location) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = path.map(Path::to_path_buf).or_else(default_config_path);

        let mut builder = config::Config::builder();
        if let Some(file) = &file {
            builder = builder.add_source(config::File::from(file.as_path()).required(path.is_some()));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        let mut settings: Settings = builder.build()?.try_deserialize()?;

        if settings.entries.is_empty() {
            if let Some(entry) = entry_from_env() {
                settings.entries.push(entry);
            }
        }

        Ok(settings)
    }
}

/// `<config dir>/three-commas/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("three-commas").join("config.toml"))
}

fn env(name: &str) -> Option<String> {
    std::env::var(format!("{}_{}", ENV_PREFIX, name))
        .ok()
        .filter(|v| !v.is_empty())
}

/// Single entry from the flat `THREE_COMMAS_*` variables
fn entry_from_env() -> Option<EntryConfig> {
    let api_key = env("API_KEY")?;

    let auth_method = match env("AUTH_METHOD").as_deref().map(str::to_lowercase).as_deref() {
        Some("rsa") => AuthMethod::Rsa,
        _ => AuthMethod::Hmac,
    };
    let user_mode = match env("USER_MODE").as_deref().map(str::to_lowercase).as_deref() {
        Some("paper") => Some(UserMode::Paper),
        Some("real") => Some(UserMode::Real),
        _ => None,
    };

    Some(EntryConfig {
        id: env("ENTRY_ID"),
        api_key,
        auth_method,
        api_secret: env("API_SECRET"),
        private_key: env("PRIVATE_KEY"),
        private_key_path: env("PRIVATE_KEY_PATH").map(PathBuf::from),
        user_mode,
    })
}

fn default_poll_interval_secs() -> u64 { 300 }
fn default_base_url() -> String { BASE_URL.to_string() }
fn default_request_timeout_secs() -> u64 { 10 }
fn default_log_level() -> String { "info".to_string() }
