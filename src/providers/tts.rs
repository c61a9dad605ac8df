//! OpenAI text-to-speech adapter
//!
//! Follows the same contract as the chat adapters; the "response" is audio.

use async_trait::async_trait;
use serde_json::{json, Map};

use crate::config::ProviderSettings;
use crate::conversation::{Message, Role};

use super::{
    api_error, unsupported, with_extra, ExtraParams, Payload, ProviderAdapter, ProviderClient,
    ProviderError, ProviderResponse,
};

const DEFAULT_VOICE: &str = "alloy";

/// `openai:tts`
#[derive(Debug, Clone)]
pub struct OpenAITextToSpeech {
    settings: ProviderSettings,
}

impl OpenAITextToSpeech {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAITextToSpeech {
    fn name(&self) -> &str {
        "OpenAITextToSpeech"
    }

    fn default_model(&self) -> &str {
        "gpt-4o-mini-tts"
    }

    fn client_factory(&self) -> Result<ProviderClient, ProviderError> {
        ProviderClient::from_settings(&self.settings)
    }

    async fn call(
        &self,
        client: &ProviderClient,
        payload: Payload,
        model: &str,
        extra: &ExtraParams,
    ) -> Result<ProviderResponse, ProviderError> {
        let text = match payload {
            Payload::Prompt(text) => text,
            other => return Err(unsupported(self.name(), &other)),
        };

        let mut body = Map::new();
        body.insert("model".into(), json!(model));
        body.insert("input".into(), json!(text));
        body.insert("voice".into(), json!(DEFAULT_VOICE));

        let response = client
            .post("audio/speech")
            .bearer_auth(client.api_key())
            .json(&with_extra(body, extra))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(api_error(status, &body));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response.bytes().await?.to_vec();

        Ok(ProviderResponse::Audio {
            content_type,
            bytes,
        })
    }

    fn extract(&self, response: &ProviderResponse) -> Result<String, ProviderError> {
        match response {
            ProviderResponse::Audio {
                content_type,
                bytes,
            } => Ok(format!("[audio: {}, {} bytes]", content_type, bytes.len())),
            ProviderResponse::Json(_) => Err(ProviderError::InvalidResponse(
                "text-to-speech expected an audio response".to_string(),
            )),
        }
    }

    /// The text to speak is the latest user message
    fn format_messages(&self, history: &[Message]) -> Payload {
        let text = history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Payload::Prompt(text)
    }
}
