//! Anthropic Messages API adapter

use async_trait::async_trait;
use serde_json::{json, Map};

use crate::config::ProviderSettings;
use crate::conversation::Message;

use super::{
    expect_json, missing, send_json, unsupported, with_extra, ExtraParams, Payload,
    ProviderAdapter, ProviderClient, ProviderError, ProviderResponse, WireMessage,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1000;

/// `anthropic:chat.completions`
#[derive(Debug, Clone)]
pub struct AnthropicChatCompletions {
    settings: ProviderSettings,
}

impl AnthropicChatCompletions {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicChatCompletions {
    fn name(&self) -> &str {
        "AnthropicChatCompletions"
    }

    fn default_model(&self) -> &str {
        "claude-3-5-haiku-latest"
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
        let messages = match payload {
            Payload::Messages(messages) => messages,
            other => return Err(unsupported(self.name(), &other)),
        };

        // The Messages API takes the system prompt as a top-level field
        let (system, turns): (Vec<WireMessage>, Vec<WireMessage>) =
            messages.into_iter().partition(|m| m.role == "system");

        let mut body = Map::new();
        body.insert("model".into(), json!(model));
        body.insert("max_tokens".into(), json!(DEFAULT_MAX_TOKENS));
        body.insert("messages".into(), json!(turns));
        if !system.is_empty() {
            let system = system
                .into_iter()
                .map(|m| m.content)
                .collect::<Vec<_>>()
                .join("\n");
            body.insert("system".into(), json!(system));
        }

        let value = send_json(
            client
                .post("messages")
                .header("x-api-key", client.api_key())
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&with_extra(body, extra)),
        )
        .await?;
        Ok(ProviderResponse::Json(value))
    }

    fn extract(&self, response: &ProviderResponse) -> Result<String, ProviderError> {
        let value = expect_json(self.name(), response)?;
        let blocks = value["content"]
            .as_array()
            .ok_or_else(|| missing("content"))?;

        let texts: Vec<&str> = blocks
            .iter()
            .filter(|block| block["type"] == "text")
            .filter_map(|block| block["text"].as_str())
            .collect();

        if texts.is_empty() {
            return Err(missing("text content block"));
        }
        Ok(texts.concat())
    }

    fn format_messages(&self, history: &[Message]) -> Payload {
        Payload::Messages(history.iter().map(WireMessage::from).collect())
    }
}
