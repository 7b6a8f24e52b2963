use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CompletionError;

/// Value shipped in sample env files; treated the same as an unset key.
pub const PLACEHOLDER_API_KEY: &str = "your-api-key-here";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Completion provider settings
    pub provider: ProviderConfig,

    /// Conversation session behaviour
    pub session: SessionConfig,

    /// UI preferences
    pub ui: UiConfig,

    /// Log output
    pub log: LogConfig,
}

/// Chat-completion provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the bearer credential
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: 256,
            temperature: 0.7,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// Which part of the conversation is sent along with a new prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextPolicy {
    /// Only the text that was just submitted
    LatestOnly,
    /// Every earlier user and assistant turn, then the new text
    #[default]
    FullHistory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub context: ContextPolicy,
    pub request_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            context: ContextPolicy::default(),
            request_timeout_secs: 60,
        }
    }
}

impl SessionConfig {
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

/// UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub show_timestamps: bool,
    pub placeholder: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            show_timestamps: true,
            placeholder: "Type your message here...".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log file used by the interactive UI; defaults to ~/.chatterm/chatterm.log
    pub file: Option<PathBuf>,
    /// `tracing` filter directive, overridden by RUST_LOG
    pub filter: Option<String>,
}

impl Config {
    /// Directory holding the config file and the default log file
    pub fn home_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".chatterm"))
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join("config.toml"))
    }

    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            Config::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.provider;
        if p.model.trim().is_empty() {
            bail!("provider.model must not be empty");
        }
        if p.base_url.trim().is_empty() {
            bail!("provider.base_url must not be empty");
        }
        if p.max_tokens == 0 {
            bail!("provider.max_tokens must be greater than 0");
        }
        if !(0.0..=2.0).contains(&p.temperature) {
            bail!("provider.temperature must be between 0 and 2, got {}", p.temperature);
        }
        if !(p.top_p > 0.0 && p.top_p <= 1.0) {
            bail!("provider.top_p must be in (0, 1], got {}", p.top_p);
        }
        for (name, value) in [
            ("frequency_penalty", p.frequency_penalty),
            ("presence_penalty", p.presence_penalty),
        ] {
            if !(-2.0..=2.0).contains(&value) {
                bail!("provider.{name} must be between -2 and 2, got {value}");
            }
        }
        if self.session.request_timeout_secs == 0 {
            bail!("session.request_timeout_secs must be greater than 0");
        }
        Ok(())
    }

    /// Log file for the interactive UI
    pub fn log_file(&self) -> Result<PathBuf> {
        match &self.log.file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::home_dir()?.join("chatterm.log")),
        }
    }

    /// Read the provider credential from the configured environment variable
    pub fn credential(&self) -> Credential {
        Credential::from_env(&self.provider.api_key_env)
    }
}

/// Bearer secret for the completion provider. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First few characters followed by an ellipsis, safe for logs
    pub fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(6).collect();
        format!("{prefix}…")
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self.redacted())
    }
}

/// Credential state resolved once at startup and injected into the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Missing { env: String },
    Placeholder { env: String },
    Present(ApiKey),
}

impl Credential {
    pub fn from_env(var: &str) -> Self {
        Self::from_value(var, std::env::var(var).ok())
    }

    pub fn from_value(env: &str, value: Option<String>) -> Self {
        match value.map(|v| v.trim().to_string()) {
            None => Credential::Missing { env: env.to_string() },
            Some(v) if v.is_empty() => Credential::Missing { env: env.to_string() },
            Some(v) if v == PLACEHOLDER_API_KEY => Credential::Placeholder { env: env.to_string() },
            Some(v) => Credential::Present(ApiKey(v)),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Credential::Present(_))
    }

    /// The usable key, or a configuration error naming the variable to set
    pub fn bearer(&self) -> Result<&ApiKey, CompletionError> {
        match self {
            Credential::Present(key) => Ok(key),
            Credential::Missing { env } => Err(CompletionError::Configuration(format!(
                "API key not set; export {env} with your provider key"
            ))),
            Credential::Placeholder { env } => Err(CompletionError::Configuration(format!(
                "{env} still holds the placeholder value; replace it with your provider key"
            ))),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Credential::Present(key) => format!("present ({})", key.redacted()),
            Credential::Missing { env } => format!("missing ({env} not set)"),
            Credential::Placeholder { env } => format!("placeholder ({env})"),
        }
    }
}
