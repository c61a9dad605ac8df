//! Application configuration

pub mod file;

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use file::{ConfigError, ConfigFile};

use crate::providers::ProviderSpec;

pub const DEFAULT_PROVIDER: &str = "openai:chat.completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";

const TTS_FORMATS: &[&str] = &["mp3", "opus", "aac", "flac", "wav", "pcm"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Root directory for conversation logs
    pub base_dir: PathBuf,
    /// Provider key used when a request names none
    pub provider_spec: String,
    /// Model used with `provider_spec` when a request names none
    pub provider_model: String,
    /// Prepended to every chat request, never persisted
    pub system_prompt: Option<String>,
    pub openai: ProviderSettings,
    pub gemini: ProviderSettings,
    pub anthropic: ProviderSettings,
    pub tts: TtsSettings,
}

/// Connection settings for one vendor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub base_url: String,
    /// Environment variable the key is read from (named in errors)
    pub api_key_env: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl ProviderSettings {
    pub fn new(base_url: impl Into<String>, api_key_env: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key_env: api_key_env.into(),
            api_key: None,
            timeout_secs: 120,
        }
    }

    pub fn openai_default() -> Self {
        Self::new(OPENAI_BASE_URL, "OPENAI_API_KEY")
    }

    pub fn gemini_default() -> Self {
        Self::new(GEMINI_BASE_URL, "GEMINI_API_KEY")
    }

    pub fn anthropic_default() -> Self {
        Self::new(ANTHROPIC_BASE_URL, "ANTHROPIC_API_KEY")
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Read the key (and an optional base URL override) from the environment
    fn load_env(mut self, base_url_var: &str) -> Self {
        self.api_key = env::var(&self.api_key_env).ok();
        if let Ok(url) = env::var(base_url_var) {
            self.base_url = url;
        }
        self
    }
}

/// Text-to-speech request settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsSettings {
    pub model: String,
    pub voice: String,
    pub speed: f32,
    pub response_format: String,
    /// Voice instructions, honored by `gpt-4o-mini-tts` only
    pub instructions: Option<String>,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini-tts".to_string(),
            voice: "alloy".to_string(),
            speed: 1.0,
            response_format: "mp3".to_string(),
            instructions: None,
        }
    }
}

impl TtsSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.25..=4.0).contains(&self.speed) {
            return Err(ConfigError::Validation(format!(
                "tts speed {} is outside 0.25..=4.0",
                self.speed
            )));
        }
        if !TTS_FORMATS.contains(&self.response_format.as_str()) {
            return Err(ConfigError::Validation(format!(
                "unsupported tts response_format {:?} (expected one of {})",
                self.response_format,
                TTS_FORMATS.join(", ")
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            base_dir: PathBuf::from("./chat_data"),
            provider_spec: DEFAULT_PROVIDER.into(),
            provider_model: DEFAULT_MODEL.into(),
            system_prompt: None,
            openai: ProviderSettings::openai_default(),
            gemini: ProviderSettings::gemini_default(),
            anthropic: ProviderSettings::anthropic_default(),
            tts: TtsSettings::default(),
        }
    }
}

impl Config {
    /// Build from environment variables, then overlay `AI_CHAT_CONFIG` if set
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            base_dir: env::var("AI_CHAT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.base_dir),
            provider_spec: env::var("AI_CHAT_PROVIDER").unwrap_or(defaults.provider_spec),
            provider_model: env::var("AI_CHAT_MODEL").unwrap_or(defaults.provider_model),
            system_prompt: None,
            openai: defaults.openai.load_env("OPENAI_BASE_URL"),
            gemini: defaults.gemini.load_env("GEMINI_BASE_URL"),
            anthropic: defaults.anthropic.load_env("ANTHROPIC_BASE_URL"),
            tts: defaults.tts,
        };

        let config = match env::var("AI_CHAT_CONFIG") {
            Ok(path) => config.with_file(Path::new(&path))?,
            Err(_) => config,
        };

        config.validate()?;
        Ok(config)
    }

    /// Overlay a TOML configuration file
    pub fn with_file(self, path: &Path) -> Result<Self, ConfigError> {
        let file = ConfigFile::from_file(path)?;
        Ok(file.apply(self))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ProviderSpec::parse(&self.provider_spec)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        self.tts.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.openai.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.gemini.api_key_env, "GEMINI_API_KEY");
        assert_eq!(config.anthropic.api_key_env, "ANTHROPIC_API_KEY");
        assert!(config.openai.api_key.is_none());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.provider_spec = "openai".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = Config::default();
        config.tts.speed = 5.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tts.response_format = "ogg".into();
        assert!(config.validate().is_err());
    }

    fn write_temp_toml(content: &str) -> PathBuf {
        let path = env::temp_dir().join(format!("ai_chat_config_{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_with_file_overlays_toml() {
        let path = write_temp_toml(
            r#"
[server]
port = 8099

[chat]
provider = "gemini:chat.completions"
model = "gemini-2.0-flash"

[tts]
voice = "shimmer"
"#,
        );

        let config = Config::default().with_file(&path).unwrap();
        assert_eq!(config.port, 8099);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.provider_spec, "gemini:chat.completions");
        assert_eq!(config.provider_model, "gemini-2.0-flash");
        assert_eq!(config.tts.voice, "shimmer");
        assert!(config.validate().is_ok());

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_with_file_errors() {
        let missing = env::temp_dir().join(format!("ai_chat_missing_{}.toml", uuid::Uuid::new_v4()));
        let err = Config::default().with_file(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));

        let path = write_temp_toml("[server]\nport = \"not a number\"\n");
        let err = Config::default().with_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_from_env_reads_config_file() {
        let path = write_temp_toml(
            r#"
[chat]
base_dir = "/srv/ai-chat"
provider = "anthropic:chat.completions"

[tts]
speed = 9.0
"#,
        );

        // An out-of-range tts speed in the file fails validation
        env::set_var("AI_CHAT_CONFIG", &path);
        let result = Config::from_env();
        env::remove_var("AI_CHAT_CONFIG");
        assert!(matches!(result, Err(ConfigError::Validation(_))));

        std::fs::write(
            &path,
            "[chat]\nbase_dir = \"/srv/ai-chat\"\nprovider = \"anthropic:chat.completions\"\n",
        )
        .unwrap();
        env::set_var("AI_CHAT_CONFIG", &path);
        let result = Config::from_env();
        env::remove_var("AI_CHAT_CONFIG");

        let config = result.unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/srv/ai-chat"));
        assert_eq!(config.provider_spec, "anthropic:chat.completions");

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_api_key_not_serialized() {
        let settings = ProviderSettings::openai_default().with_api_key("sk-secret");
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
