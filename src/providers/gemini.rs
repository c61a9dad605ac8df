//! Google Gemini adapter (`generateContent` REST endpoint)

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::config::ProviderSettings;
use crate::conversation::{Message, Role};

use super::{
    expect_json, missing, send_json, unsupported, with_extra, ExtraParams, Payload,
    ProviderAdapter, ProviderClient, ProviderError, ProviderResponse,
};

/// `gemini:chat.completions`
///
/// The whole history is sent as `contents`; assistant turns use Gemini's
/// `model` role and system messages become `system_instruction`.
#[derive(Debug, Clone)]
pub struct GeminiChatCompletions {
    settings: ProviderSettings,
}

impl GeminiChatCompletions {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }
}

fn text_parts(text: &str) -> Value {
    json!([{ "text": text }])
}

#[async_trait]
impl ProviderAdapter for GeminiChatCompletions {
    fn name(&self) -> &str {
        "GeminiChatCompletions"
    }

    fn default_model(&self) -> &str {
        "gemini-2.0-flash"
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
        let body = match payload {
            Payload::Json(Value::Object(body)) => body,
            Payload::Prompt(text) => {
                let mut body = Map::new();
                body.insert(
                    "contents".into(),
                    json!([{ "role": "user", "parts": text_parts(&text) }]),
                );
                body
            }
            other => return Err(unsupported(self.name(), &other)),
        };

        let value = send_json(
            client
                .post(&format!("models/{}:generateContent", model))
                .header("x-goog-api-key", client.api_key())
                .json(&with_extra(body, extra)),
        )
        .await?;
        Ok(ProviderResponse::Json(value))
    }

    fn extract(&self, response: &ProviderResponse) -> Result<String, ProviderError> {
        let value = expect_json(self.name(), response)?;
        let parts = value["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| missing("candidates[0].content.parts"))?;

        Ok(parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect::<Vec<_>>()
            .concat())
    }

    fn format_messages(&self, history: &[Message]) -> Payload {
        let system: Vec<&str> = history
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let contents: Vec<Value> = history
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = match m.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                json!({ "role": role, "parts": text_parts(&m.content) })
            })
            .collect();

        let mut body = Map::new();
        body.insert("contents".into(), Value::Array(contents));
        if !system.is_empty() {
            body.insert(
                "system_instruction".into(),
                json!({ "parts": text_parts(&system.join("\n")) }),
            );
        }
        Payload::Json(Value::Object(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> GeminiChatCompletions {
        GeminiChatCompletions::new(ProviderSettings::gemini_default().with_api_key("g-test"))
    }

    #[test]
    fn test_format_maps_roles() {
        let history = vec![
            Message::system("Answer in French"),
            Message::user("Hello"),
            Message::assistant("Bonjour"),
            Message::user("How are you?"),
        ];

        let Payload::Json(body) = adapter().format_messages(&history) else {
            panic!("expected a JSON payload");
        };

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["text"], "Bonjour");
        assert_eq!(
            body["system_instruction"]["parts"][0]["text"],
            "Answer in French"
        );
    }

    #[test]
    fn test_format_without_system() {
        let Payload::Json(body) = adapter().format_messages(&[Message::user("Hi")]) else {
            panic!("expected a JSON payload");
        };
        assert!(body.get("system_instruction").is_none());
    }

    #[test]
    fn test_extract_joins_parts() {
        let response = ProviderResponse::Json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Hel" }, { "text": "lo" }] }
            }]
        }));
        assert_eq!(adapter().extract(&response).unwrap(), "Hello");

        let blocked = ProviderResponse::Json(json!({ "promptFeedback": { "blockReason": "SAFETY" } }));
        assert!(adapter().extract(&blocked).is_err());
    }

    #[tokio::test]
    async fn test_rejects_message_list() {
        let adapter = adapter();
        let client = adapter.client_factory().unwrap();
        let err = adapter
            .call(&client, Payload::Messages(vec![]), "gemini-2.0-flash", &ExtraParams::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::UnsupportedPayload { payload: "messages", .. }
        ));

        // A JSON payload must be an object
        let err = adapter
            .call(&client, Payload::Json(json!([1, 2])), "gemini-2.0-flash", &ExtraParams::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::UnsupportedPayload { payload: "json", .. }
        ));
    }
}
