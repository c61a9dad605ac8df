//! Provider registry keyed by `"<vendor>:<api>"`

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::Config;

use super::{
    AnthropicChatCompletions, GeminiChatCompletions, OpenAIChatCompletions, OpenAICompletions,
    OpenAIResponses, OpenAITextToSpeech, ProviderAdapter, ProviderError,
};

/// Registry shared between the chat engine and request handlers
pub type SharedRegistry = Arc<RwLock<ProviderRegistry>>;

/// Parsed provider key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderSpec {
    pub vendor: String,
    pub api: String,
}

impl ProviderSpec {
    pub fn parse(key: &str) -> Result<Self, ProviderError> {
        match key.split_once(':') {
            Some((vendor, api))
                if !vendor.is_empty() && !api.is_empty() && !api.contains(':') =>
            {
                Ok(Self {
                    vendor: vendor.to_string(),
                    api: api.to_string(),
                })
            }
            _ => Err(ProviderError::InvalidKey(key.to_string())),
        }
    }
}

impl FromStr for ProviderSpec {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.vendor, self.api)
    }
}

/// Runtime mapping from provider key to adapter
///
/// Entries can be inserted or replaced at any time; replacing an entry
/// changes dispatch for every later lookup.
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Registry with every built-in adapter
    pub fn with_defaults(config: &Config) -> Self {
        let mut registry = Self::new();
        registry.insert(
            "openai:chat.completions",
            OpenAIChatCompletions::new(config.openai.clone()),
        );
        registry.insert(
            "openai:completions",
            OpenAICompletions::new(config.openai.clone()),
        );
        registry.insert(
            "openai:responses",
            OpenAIResponses::new(config.openai.clone()),
        );
        registry.insert(
            "gemini:chat.completions",
            GeminiChatCompletions::new(config.gemini.clone()),
        );
        registry.insert(
            "anthropic:chat.completions",
            AnthropicChatCompletions::new(config.anthropic.clone()),
        );
        registry.insert("openai:tts", OpenAITextToSpeech::new(config.openai.clone()));
        registry
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Insert or replace an adapter, returning the one it displaced
    pub fn insert<A: ProviderAdapter + 'static>(
        &mut self,
        key: impl Into<String>,
        adapter: A,
    ) -> Option<Arc<dyn ProviderAdapter>> {
        self.insert_arc(key, Arc::new(adapter))
    }

    pub fn insert_arc(
        &mut self,
        key: impl Into<String>,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> Option<Arc<dyn ProviderAdapter>> {
        let key = key.into();
        tracing::debug!(key = %key, adapter = adapter.name(), "registering provider");
        self.adapters.insert(key, adapter)
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(key).cloned()
    }

    /// Like `get`, with an error naming the missing key
    pub fn require(&self, key: &str) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
        self.get(key)
            .ok_or_else(|| ProviderError::UnknownProvider(key.to_string()))
    }

    pub fn remove(&mut self, key: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.adapters.contains_key(key)
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.adapters.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// `(key, adapter name)` pairs, sorted by key
    pub fn describe(&self) -> Vec<(String, String)> {
        self.keys()
            .into_iter()
            .map(|key| {
                let name = self.adapters[&key].name().to_string();
                (key, name)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
