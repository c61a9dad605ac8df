//! Optional TOML configuration file
//!
//! Every section and field is optional; anything present overrides the
//! environment-derived [`Config`].
//!
//! ```toml
//! [server]
//! port = 8050
//!
//! [chat]
//! base_dir = "./chat_data"
//! provider = "anthropic:chat.completions"
//! model = "claude-3-5-haiku-latest"
//!
//! [providers.openai]
//! base_url = "https://api.openai.com/v1"
//! api_key_env = "OPENAI_API_KEY"
//! timeout_secs = 60
//!
//! [tts]
//! voice = "nova"
//! response_format = "wav"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use super::{Config, ProviderSettings, TtsSettings};

/// Root of the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub chat: ChatSection,

    #[serde(default)]
    pub providers: ProvidersSection,

    /// Replaces the default text-to-speech settings when present
    #[serde(default)]
    pub tts: Option<TtsSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatSection {
    /// Root directory for conversation logs
    #[serde(default)]
    pub base_dir: Option<PathBuf>,

    /// Default provider key, e.g. "openai:chat.completions"
    #[serde(default)]
    pub provider: Option<String>,

    /// Default model for that provider
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersSection {
    #[serde(default)]
    pub openai: Option<ProviderSection>,

    #[serde(default)]
    pub gemini: Option<ProviderSection>,

    #[serde(default)]
    pub anthropic: Option<ProviderSection>,
}

/// Per-vendor overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSection {
    #[serde(default)]
    pub base_url: Option<String>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ProviderSection {
    fn apply(&self, mut settings: ProviderSettings) -> ProviderSettings {
        if let Some(ref url) = self.base_url {
            settings.base_url = url.clone();
        }
        if let Some(ref var) = self.api_key_env {
            settings.api_key = env::var(var).ok();
            settings.api_key_env = var.clone();
        }
        if let Some(secs) = self.timeout_secs {
            settings.timeout_secs = secs;
        }
        settings
    }
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay this file on an existing configuration
    pub fn apply(self, mut config: Config) -> Config {
        if let Some(host) = self.server.host {
            config.host = host;
        }
        if let Some(port) = self.server.port {
            config.port = port;
        }

        if let Some(dir) = self.chat.base_dir {
            config.base_dir = dir;
        }
        if let Some(provider) = self.chat.provider {
            config.provider_spec = provider;
        }
        if let Some(model) = self.chat.model {
            config.provider_model = model;
        }
        if self.chat.system_prompt.is_some() {
            config.system_prompt = self.chat.system_prompt;
        }

        if let Some(section) = self.providers.openai {
            config.openai = section.apply(config.openai);
        }
        if let Some(section) = self.providers.gemini {
            config.gemini = section.apply(config.gemini);
        }
        if let Some(section) = self.providers.anthropic {
            config.anthropic = section.apply(config.anthropic);
        }

        if let Some(tts) = self.tts {
            config.tts = tts;
        }
        config
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
