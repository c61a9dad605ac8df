//! OpenAI adapters: chat completions, legacy completions and the Responses API

use async_trait::async_trait;
use serde_json::{json, Map};

use crate::config::ProviderSettings;
use crate::conversation::Message;

use super::{
    expect_json, missing, send_json, unsupported, with_extra, ExtraParams, Payload,
    ProviderAdapter, ProviderClient, ProviderError, ProviderResponse, WireMessage,
};

/// `openai:chat.completions`
#[derive(Debug, Clone)]
pub struct OpenAIChatCompletions {
    settings: ProviderSettings,
}

impl OpenAIChatCompletions {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAIChatCompletions {
    fn name(&self) -> &str {
        "OpenAIChatCompletions"
    }

    fn default_model(&self) -> &str {
        "gpt-4o-mini"
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

        let mut body = Map::new();
        body.insert("model".into(), json!(model));
        body.insert("messages".into(), json!(messages));

        let value = send_json(
            client
                .post("chat/completions")
                .bearer_auth(client.api_key())
                .json(&with_extra(body, extra)),
        )
        .await?;
        Ok(ProviderResponse::Json(value))
    }

    fn extract(&self, response: &ProviderResponse) -> Result<String, ProviderError> {
        let value = expect_json(self.name(), response)?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| missing("choices[0].message.content"))
    }

    fn format_messages(&self, history: &[Message]) -> Payload {
        Payload::Messages(history.iter().map(WireMessage::from).collect())
    }
}

/// `openai:completions`, the legacy prompt-in/text-out endpoint
#[derive(Debug, Clone)]
pub struct OpenAICompletions {
    settings: ProviderSettings,
}

impl OpenAICompletions {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAICompletions {
    fn name(&self) -> &str {
        "OpenAICompletions"
    }

    fn default_model(&self) -> &str {
        "gpt-3.5-turbo-instruct"
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
        let prompt = match payload {
            Payload::Prompt(prompt) => prompt,
            other => return Err(unsupported(self.name(), &other)),
        };

        let mut body = Map::new();
        body.insert("model".into(), json!(model));
        body.insert("prompt".into(), json!(prompt));

        let value = send_json(
            client
                .post("completions")
                .bearer_auth(client.api_key())
                .json(&with_extra(body, extra)),
        )
        .await?;
        Ok(ProviderResponse::Json(value))
    }

    fn extract(&self, response: &ProviderResponse) -> Result<String, ProviderError> {
        let value = expect_json(self.name(), response)?;
        value["choices"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| missing("choices[0].text"))
    }

    fn format_messages(&self, history: &[Message]) -> Payload {
        Payload::Prompt(
            history
                .iter()
                .map(|m| format!("{}: {}", m.role, m.content))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

/// `openai:responses`
#[derive(Debug, Clone)]
pub struct OpenAIResponses {
    settings: ProviderSettings,
}

impl OpenAIResponses {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAIResponses {
    fn name(&self) -> &str {
        "OpenAIResponses"
    }

    fn default_model(&self) -> &str {
        "gpt-4o-mini"
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
        let input = match payload {
            Payload::Messages(messages) => json!(messages),
            Payload::Prompt(text) => json!(text),
            other => return Err(unsupported(self.name(), &other)),
        };

        let mut body = Map::new();
        body.insert("model".into(), json!(model));
        body.insert("input".into(), input);

        let value = send_json(
            client
                .post("responses")
                .bearer_auth(client.api_key())
                .json(&with_extra(body, extra)),
        )
        .await?;
        Ok(ProviderResponse::Json(value))
    }

    fn extract(&self, response: &ProviderResponse) -> Result<String, ProviderError> {
        let value = expect_json(self.name(), response)?;

        if let Some(text) = value["output_text"].as_str() {
            return Ok(text.to_string());
        }

        let parts: Vec<&str> = value["output"]
            .as_array()
            .into_iter()
            .flatten()
            .flat_map(|item| item["content"].as_array().into_iter().flatten())
            .filter(|part| part["type"] == "output_text")
            .filter_map(|part| part["text"].as_str())
            .collect();

        if parts.is_empty() {
            return Err(missing("output_text"));
        }
        Ok(parts.concat())
    }

    fn format_messages(&self, history: &[Message]) -> Payload {
        Payload::Messages(history.iter().map(WireMessage::from).collect())
    }
}
