//! Configuration loading and validation.
//!
//! Config location: `~/.usergate/usergate.json` (JSON5).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Session credential configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Password reset configuration.
    #[serde(default)]
    pub reset: ResetConfig,

    /// Image upload configuration.
    #[serde(default)]
    pub uploads: UploadConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns error if config cannot be loaded or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a path.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("usergate.json")
    }

    /// Get the Usergate state directory.
    ///
    /// Uses `USERGATE_STATE_DIR` env var if set, otherwise `~/.usergate`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("USERGATE_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".usergate")
        } else {
            PathBuf::from(".usergate")
        }
    }

    /// Directory holding the sled database.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.server.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("usergate")
        })
    }

    /// Directory where uploaded images are written.
    #[must_use]
    pub fn upload_dir(&self) -> PathBuf {
        self.uploads
            .dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("upload"))
    }

    /// Apply environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var("USERGATE_JWT_SECRET") {
            self.session.jwt_secret = Some(secret);
        }

        if let Ok(port) = std::env::var("USERGATE_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid USERGATE_PORT"),
            }
        }

        if let Ok(bind) = std::env::var("USERGATE_BIND") {
            self.server.bind = bind;
        }

        if let Ok(dir) = std::env::var("USERGATE_DATA_DIR") {
            self.server.data_dir = Some(PathBuf::from(dir));
        }

        if let Ok(v) = std::env::var("USERGATE_COOKIE_SECURE") {
            self.session.cookie_secure = v == "1" || v.eq_ignore_ascii_case("true");
        }

        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.session.ttl_minutes == 0 {
            return Err(ConfigError::Validation(
                "Session TTL must be at least one minute".to_string(),
            ));
        }

        if self.session.store_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Store timeout cannot be 0".to_string(),
            ));
        }

        if let Some(secret) = &self.session.jwt_secret {
            let bytes = hex::decode(secret)
                .map_err(|e| ConfigError::Validation(format!("Invalid hex JWT secret: {e}")))?;
            if bytes.len() < 32 {
                return Err(ConfigError::Validation(
                    "JWT secret must be at least 32 bytes".to_string(),
                ));
            }
        }

        if self.reset.token_ttl_minutes == 0 {
            return Err(ConfigError::Validation(
                "Reset token TTL must be at least one minute".to_string(),
            ));
        }

        if self.uploads.max_bytes == 0 {
            return Err(ConfigError::Validation(
                "Upload size limit cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Enable CORS.
    #[serde(default = "default_true")]
    pub cors: bool,

    /// Data directory override.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            cors: true,
            data_dir: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    /// Request timeout as Duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

const fn default_port() -> u16 {
    3030
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_request_timeout() -> u64 {
    30
}

/// Session credential configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// HMAC secret (hex-encoded). Generated at startup if not set.
    #[serde(default, skip_serializing)]
    pub jwt_secret: Option<String>,

    /// Credential validity window in minutes.
    #[serde(default = "default_session_ttl")]
    pub ttl_minutes: u64,

    /// Add the `Secure` attribute to the session cookie.
    #[serde(default)]
    pub cookie_secure: bool,

    /// Path the session cookie is scoped to.
    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,

    /// Upper bound for a single revocation or reset store call.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,

    /// Login attempts allowed per email per minute.
    #[serde(default = "default_login_attempts")]
    pub login_attempts_per_minute: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            ttl_minutes: default_session_ttl(),
            cookie_secure: false,
            cookie_path: default_cookie_path(),
            store_timeout_ms: default_store_timeout(),
            login_attempts_per_minute: default_login_attempts(),
        }
    }
}

impl SessionConfig {
    /// Create a new session config builder.
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Credential validity window.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes * 60)
    }

    /// Store call timeout.
    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

const fn default_session_ttl() -> u64 {
    60
}

fn default_cookie_path() -> String {
    "/api".to_string()
}

const fn default_store_timeout() -> u64 {
    2000
}

const fn default_login_attempts() -> u32 {
    10
}

/// Builder for `SessionConfig`.
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Set the JWT secret (hex).
    #[must_use]
    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.jwt_secret = Some(secret.into());
        self
    }

    /// Set the credential validity window in minutes.
    #[must_use]
    pub const fn ttl_minutes(mut self, minutes: u64) -> Self {
        self.config.ttl_minutes = minutes;
        self
    }

    /// Set whether the cookie is marked `Secure`.
    #[must_use]
    pub const fn cookie_secure(mut self, secure: bool) -> Self {
        self.config.cookie_secure = secure;
        self
    }

    /// Set the store call timeout in milliseconds.
    #[must_use]
    pub const fn store_timeout_ms(mut self, ms: u64) -> Self {
        self.config.store_timeout_ms = ms;
        self
    }

    /// Set the per-email login attempt quota.
    #[must_use]
    pub const fn login_attempts_per_minute(mut self, attempts: u32) -> Self {
        self.config.login_attempts_per_minute = attempts;
        self
    }

    /// Build the config.
    #[must_use]
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

/// Password reset configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetConfig {
    /// Reset token lifetime in minutes.
    #[serde(default = "default_reset_ttl")]
    pub token_ttl_minutes: u64,

    /// Frontend base URL used to build the reset link.
    #[serde(default = "default_host_url")]
    pub host_url: String,

    /// Sender shown on reset mails.
    #[serde(default = "default_sender")]
    pub sender: String,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            token_ttl_minutes: default_reset_ttl(),
            host_url: default_host_url(),
            sender: default_sender(),
        }
    }
}

impl ResetConfig {
    /// Reset token lifetime.
    #[must_use]
    pub const fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_minutes * 60)
    }
}

const fn default_reset_ttl() -> u64 {
    60
}

fn default_host_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_sender() -> String {
    "\"Usergate\" <no-reply@usergate.local>".to_string()
}

/// Image upload configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadConfig {
    /// Upload directory override.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Maximum accepted image size in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Image name assigned to accounts without an upload.
    #[serde(default = "default_image")]
    pub default_image: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_bytes: default_max_bytes(),
            default_image: default_image(),
        }
    }
}

const fn default_max_bytes() -> usize {
    1_000_000
}

fn default_image() -> String {
    "default-user-icon.jpg".to_string()
}
