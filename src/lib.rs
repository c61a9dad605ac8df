//! ai-chat: a chat backend with pluggable AI provider adapters
//!
//! Conversations are stored as append-only logs per user and conversation.
//! Each request is dispatched through a [`ProviderRegistry`] to an adapter
//! implementing the four-method [`ProviderAdapter`] contract.

pub mod config;
pub mod conversation;
pub mod core;
pub mod providers;
pub mod routes;

use std::sync::Arc;

pub use config::Config;
pub use conversation::{ConversationStore, Message, Role};
pub use crate::core::{ChatEngine, ChatError};
pub use providers::{ProviderAdapter, ProviderError, ProviderRegistry};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub chat_engine: Arc<ChatEngine>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let chat_engine = Arc::new(ChatEngine::new(&config));
        Self {
            config,
            chat_engine,
        }
    }
}
