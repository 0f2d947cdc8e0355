//! Configuration loading, validation, and management for Folio.
//!
//! Loads configuration from `folio.toml` (or the path given by `--config` /
//! `FOLIO_CONFIG`) with environment variable overrides. The result is an
//! immutable value built once at startup and passed into the pipeline.

use folio_core::persona::PersonaPaths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "folio.toml";

/// The root configuration structure.
///
/// Maps directly to `folio.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upstream API credential (required to serve)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Upstream API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Candidate models, in trial order
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    /// Upper bound for a single candidate dispatch
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per generated reply
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// HTTP server configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Image normalization settings
    #[serde(default)]
    pub media: MediaConfig,

    /// Persona and knowledge-base sources
    #[serde(default)]
    pub persona: PersonaConfig,

    /// Usage log settings
    #[serde(default)]
    pub usage: UsageConfig,
}

fn default_api_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_models() -> Vec<String> {
    vec![
        "gemini-2.5-flash".into(),
        "gemini-2.0-flash".into(),
        "gemini-2.0-flash-lite".into(),
    ]
}
fn default_dispatch_timeout_secs() -> u64 {
    30
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_output_tokens() -> u32 {
    1024
}
fn default_true() -> bool {
    true
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_base_url", &self.api_base_url)
            .field("models", &self.models)
            .field("dispatch_timeout_secs", &self.dispatch_timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("gateway", &self.gateway)
            .field("media", &self.media)
            .field("persona", &self.persona)
            .field("usage", &self.usage)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS. Empty = same-origin only.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Requests per minute per caller. 0 disables rate limiting.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,

    /// Largest accepted image upload, in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Use the first `X-Forwarded-For` hop as the caller identity
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3000
}
fn default_rate_limit() -> u32 {
    20
}
fn default_max_upload_bytes() -> usize {
    5 * 1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: vec![],
            rate_limit_per_minute: default_rate_limit(),
            max_upload_bytes: default_max_upload_bytes(),
            trust_forwarded_for: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Images wider than this are scaled down (aspect ratio kept)
    #[serde(default = "default_max_width")]
    pub max_width: u32,

    /// JPEG quality for the re-encoded image (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Directory for request-scoped temporary files (system temp if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<String>,
}

fn default_max_width() -> u32 {
    1024
}
fn default_jpeg_quality() -> u8 {
    80
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            jpeg_quality: default_jpeg_quality(),
            temp_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Inline system prompt (overrides the file)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_file: Option<String>,

    /// Knowledge-base text appended to the system prompt, re-read per request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory holding `usage-YYYY-MM-DD.log` partitions
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Records queued before new ones are dropped
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_log_dir() -> String {
    "logs".into()
}
fn default_channel_capacity() -> usize {
    1024
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: default_log_dir(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or `FOLIO_CONFIG`, or `./folio.toml`.
    ///
    /// Environment variables override file values:
    /// - `FOLIO_API_KEY` (highest priority), then `GEMINI_API_KEY`
    /// - `FOLIO_MODELS`: comma-separated candidate list
    /// - `FOLIO_HOST`, `PORT`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("FOLIO_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path. A missing file yields
    /// the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_blank("FOLIO_API_KEY").or_else(|| non_blank("GEMINI_API_KEY")) {
            self.api_key = Some(key);
        }

        if let Some(models) = non_blank("FOLIO_MODELS") {
            self.models = parse_model_list(&models);
        }

        if let Some(host) = non_blank("FOLIO_HOST") {
            self.gateway.host = host;
        }

        if let Some(port) = non_blank("PORT") {
            self.gateway.port = port.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("PORT must be a valid port number, got '{port}'"))
            })?;
        }

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.models.is_empty() {
            return Err(ConfigError::ValidationError(
                "models must list at least one candidate".into(),
            ));
        }

        if self.models.iter().any(|m| m.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "model identifiers must not be blank".into(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.dispatch_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "dispatch_timeout_secs must be > 0".into(),
            ));
        }

        if self.gateway.max_upload_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.max_upload_bytes must be > 0".into(),
            ));
        }

        if self.media.max_width == 0 {
            return Err(ConfigError::ValidationError(
                "media.max_width must be > 0".into(),
            ));
        }

        if !(1..=100).contains(&self.media.jpeg_quality) {
            return Err(ConfigError::ValidationError(
                "media.jpeg_quality must be between 1 and 100".into(),
            ));
        }

        Ok(())
    }

    /// The upstream credential, or `MissingApiKey`. Called before serving.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    pub fn persona_paths(&self) -> PersonaPaths {
        PersonaPaths {
            system_prompt_override: self.persona.system_prompt.clone(),
            system_prompt_file: self.persona.system_prompt_file.as_ref().map(PathBuf::from),
        }
    }

    pub fn knowledge_path(&self) -> Option<PathBuf> {
        self.persona.knowledge_file.as_ref().map(PathBuf::from)
    }

    /// Generate a default config TOML string (for `folio init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: default_api_base_url(),
            models: default_models(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            gateway: GatewayConfig::default(),
            media: MediaConfig::default(),
            persona: PersonaConfig::default(),
            usage: UsageConfig::default(),
        }
    }
}

/// Split a comma-separated model list, dropping blanks.
fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("No API key configured; set FOLIO_API_KEY or GEMINI_API_KEY")]
    MissingApiKey,
}
