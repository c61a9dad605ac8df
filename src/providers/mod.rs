//! AI provider adapters
//!
//! Every backend implements the same contract:
//!
//! 1. `client_factory` builds an authenticated HTTP client handle
//! 2. `format_messages` shapes the conversation for the remote API
//! 3. `call` submits one request and returns the provider-native response
//! 4. `extract` turns that response into displayable text
//!
//! Adapters are looked up by key in a [`ProviderRegistry`]. To customize one,
//! wrap it (or write a new adapter) and insert it under the same key.

mod anthropic;
mod gemini;
mod openai;
mod registry;
mod tts;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

use crate::config::ProviderSettings;
use crate::conversation::Message;

pub use anthropic::AnthropicChatCompletions;
pub use gemini::GeminiChatCompletions;
pub use openai::{OpenAIChatCompletions, OpenAICompletions, OpenAIResponses};
pub use registry::{ProviderRegistry, ProviderSpec, SharedRegistry};
pub use tts::OpenAITextToSpeech;

/// Extra request fields merged verbatim into the request body
pub type ExtraParams = Map<String, Value>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid provider key {0:?}: expected \"<vendor>:<api>\"")]
    InvalidKey(String),

    #[error("Provider not configured: {0} is not set")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("{provider} cannot send a {payload} payload")]
    UnsupportedPayload {
        provider: String,
        payload: &'static str,
    },
}

/// Role/content record understood by most chat APIs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

impl From<&Message> for WireMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        }
    }
}

/// Conversation history shaped for one remote API
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// List of role/content records
    Messages(Vec<WireMessage>),
    /// Flattened prompt or plain input text
    Prompt(String),
    /// Provider-specific request fragment
    Json(Value),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Messages(_) => "messages",
            Payload::Prompt(_) => "prompt",
            Payload::Json(_) => "json",
        }
    }
}

/// Provider-native response
#[derive(Debug, Clone)]
pub enum ProviderResponse {
    Json(Value),
    Audio { content_type: String, bytes: Vec<u8> },
}

impl ProviderResponse {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ProviderResponse::Json(value) => Some(value),
            ProviderResponse::Audio { .. } => None,
        }
    }

    /// JSON form written to the raw response log
    pub fn log_value(&self) -> Value {
        match self {
            ProviderResponse::Json(value) => value.clone(),
            ProviderResponse::Audio {
                content_type,
                bytes,
            } => serde_json::json!({
                "audio": { "content_type": content_type, "bytes": bytes.len() }
            }),
        }
    }
}

/// Raw response together with its extracted text
#[derive(Debug, Clone)]
pub struct Completion {
    pub response: ProviderResponse,
    pub text: String,
}

/// Authenticated HTTP handle produced by `client_factory`
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl ProviderClient {
    /// Build a client, failing when no API key is configured
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::NotConfigured(settings.api_key_env.clone()))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// POST to `{base_url}/{path}`
    pub fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(format!("{}/{}", self.base_url, path.trim_start_matches('/')))
    }
}

/// The four-method contract every AI backend implements
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Adapter name shown when inspecting the registry
    fn name(&self) -> &str;

    /// Model used when the caller does not name one
    fn default_model(&self) -> &str;

    /// Create the client handle for this provider
    fn client_factory(&self) -> Result<ProviderClient, ProviderError>;

    /// Submit one request
    async fn call(
        &self,
        client: &ProviderClient,
        payload: Payload,
        model: &str,
        extra: &ExtraParams,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Turn a provider response into displayable text
    fn extract(&self, response: &ProviderResponse) -> Result<String, ProviderError>;

    /// Shape the conversation history for `call`
    fn format_messages(&self, history: &[Message]) -> Payload;

    /// Run the whole contract against a conversation history
    async fn complete(
        &self,
        history: &[Message],
        model: &str,
        extra: &ExtraParams,
    ) -> Result<Completion, ProviderError> {
        let client = self.client_factory()?;
        let payload = self.format_messages(history);
        let response = self.call(&client, payload, model, extra).await?;
        let text = self.extract(&response)?;
        Ok(Completion { response, text })
    }
}

/// Merge caller-supplied fields into a request body
pub(crate) fn with_extra(mut body: Map<String, Value>, extra: &ExtraParams) -> Value {
    for (key, value) in extra {
        body.insert(key.clone(), value.clone());
    }
    Value::Object(body)
}

/// Send a request and decode a JSON response body
pub(crate) async fn send_json(request: RequestBuilder) -> Result<Value, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(api_error(status, &body));
    }

    serde_json::from_str(&body).map_err(|e| {
        ProviderError::InvalidResponse(format!("Failed to parse response: {} - Body: {}", e, body))
    })
}

pub(crate) fn api_error(status: StatusCode, body: &str) -> ProviderError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string());

    ProviderError::Api {
        status: status.as_u16(),
        message,
    }
}

pub(crate) fn expect_json<'a>(
    provider: &str,
    response: &'a ProviderResponse,
) -> Result<&'a Value, ProviderError> {
    response.as_json().ok_or_else(|| {
        ProviderError::InvalidResponse(format!("{} expected a JSON response", provider))
    })
}

pub(crate) fn unsupported(provider: &str, payload: &Payload) -> ProviderError {
    ProviderError::UnsupportedPayload {
        provider: provider.to_string(),
        payload: payload.kind(),
    }
}

pub(crate) fn missing(field: &str) -> ProviderError {
    ProviderError::InvalidResponse(format!("Response has no {}", field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_conversion() {
        let msg = Message::user("Hello");
        let wire = WireMessage::from(&msg);
        assert_eq!(wire.role, "user");
        assert_eq!(wire.content, "Hello");
    }

    #[test]
    fn test_with_extra_overrides() {
        let mut body = Map::new();
        body.insert("model".into(), json!("a"));
        body.insert("max_tokens".into(), json!(1000));

        let mut extra = ExtraParams::new();
        extra.insert("max_tokens".into(), json!(50));
        extra.insert("temperature".into(), json!(0.2));

        let merged = with_extra(body, &extra);
        assert_eq!(merged["model"], "a");
        assert_eq!(merged["max_tokens"], 50);
        assert_eq!(merged["temperature"], 0.2);
    }

    #[test]
    fn test_api_error_message() {
        let err = api_error(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"bad key","type":"auth"}}"#,
        );
        assert_eq!(err.to_string(), "API error (401): bad key");

        let err = api_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(err.to_string(), "API error (502): upstream down");
    }

    #[test]
    fn test_client_requires_key() {
        let settings = ProviderSettings::new("https://example.invalid/v1", "SOME_API_KEY");
        let err = ProviderClient::from_settings(&settings).unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(ref v) if v == "SOME_API_KEY"));

        let client =
            ProviderClient::from_settings(&settings.with_api_key("sk-test")).unwrap();
        assert_eq!(client.base_url(), "https://example.invalid/v1");
        assert_eq!(client.api_key(), "sk-test");
    }

    #[test]
    fn test_audio_log_value() {
        let response = ProviderResponse::Audio {
            content_type: "audio/mpeg".into(),
            bytes: vec![0; 12],
        };
        assert_eq!(response.log_value()["audio"]["bytes"], 12);
        assert!(response.as_json().is_none());
    }
}
