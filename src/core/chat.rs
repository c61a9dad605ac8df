//! Chat engine
//!
//! The ChatEngine ties the provider registry to the conversation store:
//! 1. Stores the user's message
//! 2. Reloads the conversation history
//! 3. Runs the selected adapter (client, format, call, extract)
//! 4. Stores the raw response and the assistant's reply
//!
//! Provider failures never surface as errors to the caller. They are written
//! into the conversation as an assistant message instead.

use std::path::PathBuf;

use chrono::Utc;
use serde_json::json;

use crate::config::{Config, TtsSettings};
use crate::conversation::{ConversationStore, ConversationSummary, Message, StoreError};
use crate::providers::{
    ExtraParams, ProviderError, ProviderRegistry, ProviderResponse, SharedRegistry,
};

/// Registry key of the text-to-speech adapter
pub const TTS_PROVIDER: &str = "openai:tts";

/// Only this model accepts voice instructions
const INSTRUCTIONS_MODEL: &str = "gpt-4o-mini-tts";

/// Errors from the chat engine
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Message is empty")]
    EmptyMessage,
}

/// Defaults applied when a request leaves fields unset
#[derive(Debug, Clone)]
pub struct ChatDefaults {
    pub provider_spec: String,
    pub provider_model: String,
    pub system_prompt: Option<String>,
}

impl From<&Config> for ChatDefaults {
    fn from(config: &Config) -> Self {
        Self {
            provider_spec: config.provider_spec.clone(),
            provider_model: config.provider_model.clone(),
            system_prompt: config.system_prompt.clone(),
        }
    }
}

/// The core chat engine
pub struct ChatEngine {
    defaults: ChatDefaults,
    store: ConversationStore,
    registry: SharedRegistry,
}

impl ChatEngine {
    /// Create an engine with the built-in provider registry
    pub fn new(config: &Config) -> Self {
        Self::with_registry(
            ChatDefaults::from(config),
            ConversationStore::new(config.base_dir.clone()),
            ProviderRegistry::with_defaults(config).into_shared(),
        )
    }

    pub fn with_registry(
        defaults: ChatDefaults,
        store: ConversationStore,
        registry: SharedRegistry,
    ) -> Self {
        Self {
            defaults,
            store,
            registry,
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn defaults(&self) -> &ChatDefaults {
        &self.defaults
    }

    /// Add a user message to a conversation and store the provider's reply
    ///
    /// Returns the conversation id, which is allocated when `convo_id` is
    /// `None`.
    pub async fn update_convo(
        &self,
        user_id: &str,
        user_message: &str,
        convo_id: Option<&str>,
        provider_spec: Option<&str>,
        provider_model: Option<&str>,
    ) -> Result<String, ChatError> {
        if user_message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let spec = provider_spec.unwrap_or(self.defaults.provider_spec.as_str());
        let adapter = self.registry.read().await.require(spec)?;

        let model = match provider_model {
            Some(model) => model.to_string(),
            None if spec == self.defaults.provider_spec => self.defaults.provider_model.clone(),
            None => adapter.default_model().to_string(),
        };

        let convo_id = self.resolve_convo_id(user_id, convo_id).await?;

        self.store
            .add_message(user_id, &convo_id, &Message::user(user_message))
            .await?;

        let history = self.history_for_call(user_id, &convo_id).await?;

        tracing::debug!(user_id, convo_id = %convo_id, provider = spec, model = %model, "calling provider");

        let reply = match adapter.complete(&history, &model, &ExtraParams::new()).await {
            Ok(completion) => {
                self.store
                    .append_raw_response(user_id, &convo_id, &completion.response.log_value())
                    .await?;
                Message::assistant(completion.text)
            }
            Err(e) => {
                tracing::warn!(provider = spec, error = %e, "provider call failed");
                Message::assistant(format!("❌ {} request failed: {}", spec, e))
            }
        };

        self.store.add_message(user_id, &convo_id, &reply).await?;
        Ok(convo_id)
    }

    /// Synthesize `text` and write it under the conversation's audio directory
    pub async fn generate_speech(
        &self,
        user_id: &str,
        convo_id: &str,
        text: &str,
        settings: &TtsSettings,
    ) -> Result<PathBuf, ChatError> {
        let adapter = self.registry.read().await.require(TTS_PROVIDER)?;

        let client = adapter.client_factory()?;
        let payload = adapter.format_messages(&[Message::user(text)]);
        let response = adapter
            .call(&client, payload, &settings.model, &speech_params(settings))
            .await?;

        self.store
            .append_raw_response(user_id, convo_id, &response.log_value())
            .await?;

        let bytes = match response {
            ProviderResponse::Audio { bytes, .. } => bytes,
            ProviderResponse::Json(_) => {
                return Err(ProviderError::InvalidResponse(
                    "text-to-speech returned JSON instead of audio".to_string(),
                )
                .into())
            }
        };

        let audio_dir = self.store.ensure_convo_dir(user_id, convo_id).await?.join("audio");
        tokio::fs::create_dir_all(&audio_dir)
            .await
            .map_err(StoreError::from)?;

        let path = audio_dir.join(format!(
            "speech_{}.{}",
            Utc::now().timestamp_millis(),
            settings.response_format
        ));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(StoreError::from)?;

        tracing::info!(path = %path.display(), bytes = bytes.len(), "speech generated");
        Ok(path)
    }

    /// Store the user's text and reply with a spoken rendering of it
    pub async fn update_convo_with_speech(
        &self,
        user_id: &str,
        text: &str,
        convo_id: Option<&str>,
        settings: &TtsSettings,
    ) -> Result<String, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let convo_id = self.resolve_convo_id(user_id, convo_id).await?;

        self.store
            .add_message(user_id, &convo_id, &Message::user(text))
            .await?;

        let reply = match self.generate_speech(user_id, &convo_id, text, settings).await {
            Ok(path) => Message::assistant("").with_audio(path),
            Err(ChatError::Store(e)) => return Err(ChatError::Store(e)),
            Err(e) => {
                tracing::warn!(error = %e, "speech generation failed");
                Message::assistant(format!("❌ Failed to generate speech: {}", e))
            }
        };

        self.store.add_message(user_id, &convo_id, &reply).await?;
        Ok(convo_id)
    }

    pub async fn conversations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationSummary>, ChatError> {
        Ok(self.store.list_conversations(user_id).await?)
    }

    pub async fn messages(&self, user_id: &str, convo_id: &str) -> Result<Vec<Message>, ChatError> {
        Ok(self.store.load_messages(user_id, convo_id).await?)
    }

    async fn resolve_convo_id(
        &self,
        user_id: &str,
        convo_id: Option<&str>,
    ) -> Result<String, ChatError> {
        match convo_id {
            Some(id) => Ok(id.to_string()),
            None => {
                let id = self.store.get_next_convo_id(user_id).await?;
                tracing::info!(user_id, convo_id = %id, "starting conversation");
                Ok(id)
            }
        }
    }

    /// Stored history plus the configured system prompt; audio-only replies are skipped
    async fn history_for_call(
        &self,
        user_id: &str,
        convo_id: &str,
    ) -> Result<Vec<Message>, ChatError> {
        let mut history = Vec::new();
        if let Some(ref prompt) = self.defaults.system_prompt {
            history.push(Message::system(prompt.clone()));
        }
        history.extend(
            self.store
                .load_messages(user_id, convo_id)
                .await?
                .into_iter()
                .filter(|m| !m.content.is_empty()),
        );
        Ok(history)
    }
}

/// Request fields for a speech call
fn speech_params(settings: &TtsSettings) -> ExtraParams {
    let mut params = ExtraParams::new();
    params.insert("voice".into(), json!(settings.voice));
    params.insert("speed".into(), json!(settings.speed));
    params.insert("response_format".into(), json!(settings.response_format));

    if settings.model == INSTRUCTIONS_MODEL {
        if let Some(instructions) = settings
            .instructions
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            params.insert("instructions".into(), json!(instructions));
        }
    }
    params
}
