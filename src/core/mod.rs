//! Core chat orchestration
//!
//! Connects the provider registry with the conversation store.

mod chat;

pub use chat::{ChatDefaults, ChatEngine, ChatError, TTS_PROVIDER};
