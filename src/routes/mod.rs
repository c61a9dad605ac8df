//! API routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::TtsSettings;
use crate::conversation::{ConversationSummary, Message, StoreError};
use crate::core::ChatError;
use crate::providers::ProviderError;
use crate::AppState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub key: String,
    pub adapter: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Provider key, e.g. "gemini:chat.completions"
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub speed: Option<f32>,
    #[serde(default)]
    pub response_format: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

impl SpeechRequest {
    fn settings(&self, defaults: &TtsSettings) -> TtsSettings {
        TtsSettings {
            model: self.model.clone().unwrap_or_else(|| defaults.model.clone()),
            voice: self.voice.clone().unwrap_or_else(|| defaults.voice.clone()),
            speed: self.speed.unwrap_or(defaults.speed),
            response_format: self
                .response_format
                .clone()
                .unwrap_or_else(|| defaults.response_format.clone()),
            instructions: self
                .instructions
                .clone()
                .or_else(|| defaults.instructions.clone()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub conversation_id: String,
    /// The reply stored for this request
    pub message: Option<Message>,
}

/// Error body returned by every route
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let status = match &err {
            ChatError::EmptyMessage
            | ChatError::Provider(ProviderError::UnknownProvider(_))
            | ChatError::Provider(ProviderError::InvalidKey(_))
            | ChatError::Store(StoreError::InvalidId(_)) => StatusCode::BAD_REQUEST,
            ChatError::Provider(_) => StatusCode::BAD_GATEWAY,
            ChatError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn providers(State(state): State<AppState>) -> Json<Vec<ProviderInfo>> {
    let registry = state.chat_engine.registry().read().await;
    Json(
        registry
            .describe()
            .into_iter()
            .map(|(key, adapter)| ProviderInfo { key, adapter })
            .collect(),
    )
}

async fn list_conversations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    Ok(Json(state.chat_engine.conversations(&user_id).await?))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path((user_id, convo_id)): Path<(String, String)>,
) -> Result<Json<Vec<Message>>, ApiError> {
    Ok(Json(state.chat_engine.messages(&user_id, &convo_id).await?))
}

async fn chat(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let engine = &state.chat_engine;
    let conversation_id = engine
        .update_convo(
            &user_id,
            &request.message,
            request.conversation_id.as_deref(),
            request.provider.as_deref(),
            request.model.as_deref(),
        )
        .await?;

    let message = engine.messages(&user_id, &conversation_id).await?.pop();
    Ok(Json(ChatResponse {
        conversation_id,
        message,
    }))
}

async fn speech(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<SpeechRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let settings = request.settings(&state.config.tts);
    settings
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let engine = &state.chat_engine;
    let conversation_id = engine
        .update_convo_with_speech(
            &user_id,
            &request.text,
            request.conversation_id.as_deref(),
            &settings,
        )
        .await?;

    let message = engine.messages(&user_id, &conversation_id).await?.pop();
    Ok(Json(ChatResponse {
        conversation_id,
        message,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/v1/providers", get(providers))
        .route("/v1/users/:user_id/conversations", get(list_conversations))
        .route(
            "/v1/users/:user_id/conversations/:convo_id",
            get(get_conversation),
        )
        .route("/v1/users/:user_id/chat", post(chat))
        .route("/v1/users/:user_id/speech", post(speech))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> (Router, std::path::PathBuf) {
        let mut config = Config::default();
        config.base_dir =
            std::env::temp_dir().join(format!("ai_chat_routes_{}", uuid::Uuid::new_v4()));
        let dir = config.base_dir.clone();
        (router().with_state(AppState::new(config)), dir)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let (status, body) = send(
            app,
            Request::builder().uri("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_providers_listing() {
        let (app, _) = app();
        let (status, body) = send(
            app,
            Request::builder()
                .uri("/v1/providers")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let keys: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["key"].as_str().unwrap())
            .collect();
        assert!(keys.contains(&"anthropic:chat.completions"));
        assert!(keys.contains(&"openai:tts"));
    }

    #[tokio::test]
    async fn test_chat_rejects_bad_input() {
        let (app, _) = app();
        let (status, body) = send(
            app.clone(),
            post_json("/v1/users/u1/chat", json!({ "message": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Message is empty");

        let (status, _) = send(
            app,
            post_json(
                "/v1/users/u1/chat",
                json!({ "message": "hi", "provider": "acme:chat" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_without_key_stores_error_reply() {
        // Config::default() carries no API keys
        let (app, dir) = app();
        let (status, body) = send(
            app.clone(),
            post_json(
                "/v1/users/u2/chat",
                json!({ "message": "hello", "provider": "anthropic:chat.completions" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["conversation_id"], "001");
        assert_eq!(body["message"]["role"], "assistant");
        assert!(body["message"]["content"]
            .as_str()
            .unwrap()
            .contains("ANTHROPIC_API_KEY"));

        let (status, list) = send(
            app,
            Request::builder()
                .uri("/v1/users/u2/conversations")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list[0]["title"], "hello");
        assert_eq!(list[0]["message_count"], 2);

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_huge_conversation_id_does_not_block_new_chats() {
        let (app, dir) = app();
        let huge = u64::MAX.to_string();
        let (status, body) = send(
            app.clone(),
            post_json(
                "/v1/users/u4/chat",
                json!({ "message": "pinned", "conversation_id": huge }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["conversation_id"], huge);

        for expected in ["001", "002"] {
            let (status, body) = send(
                app.clone(),
                post_json("/v1/users/u4/chat", json!({ "message": "fresh" })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["conversation_id"], expected);
        }

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_speech_validates_settings() {
        let (app, _) = app();
        let (status, _) = send(
            app,
            post_json(
                "/v1/users/u3/speech",
                json!({ "text": "hi", "response_format": "ogg" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
