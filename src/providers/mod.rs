//! Providers module - LLM backends
//!
//! Defines the `LLMProvider` trait the agent loop, the memory retriever and
//! the memory creator call through, plus the OpenAI-compatible backend and a
//! retrying decorator.
//!
//! # Example
//!
//! ```rust,ignore
//! use vos_agent::providers::{ChatOptions, LLMProvider, OpenAIProvider};
//! use vos_agent::session::Message;
//!
//! async fn example() {
//!     let provider = OpenAIProvider::new("your-api-key");
//!     let messages = vec![Message::user("Hello!")];
//!     let options = ChatOptions::new().with_max_tokens(1000);
//!
//!     let response = provider.chat(messages, vec![], None, options).await.unwrap();
//!     println!("Response: {}", response.content);
//! }
//! ```

pub mod openai;
pub mod retry;
mod types;

use std::sync::Arc;

use crate::config::Config;
use crate::error::{Result, VosError};

pub use openai::OpenAIProvider;
pub use retry::RetryProvider;
pub use types::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition};

/// Build the configured chat provider, wrapped in [`RetryProvider`].
///
/// Fails with a configuration error when no API key is set.
pub fn provider_from_config(config: &Config) -> Result<Arc<dyn LLMProvider>> {
    let openai = config
        .providers
        .openai
        .as_ref()
        .filter(|p| p.api_key.as_deref().is_some_and(|k| !k.trim().is_empty()))
        .ok_or_else(|| {
            VosError::Config(
                "no provider API key configured (set providers.openai.api_key or VOS_PROVIDERS_OPENAI_API_KEY)"
                    .to_string(),
            )
        })?;
    let api_key = openai.api_key.as_deref().unwrap_or_default();
    let inner = match openai.api_base.as_deref() {
        Some(base) => OpenAIProvider::with_base_url(api_key, base),
        None => OpenAIProvider::new(api_key),
    };
    Ok(Arc::new(
        RetryProvider::new(Box::new(inner)).with_max_retries(config.agent.max_retries),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    #[test]
    fn test_provider_requires_api_key() {
        let config = Config::default();
        let err = provider_from_config(&config).err().unwrap();
        assert!(matches!(err, VosError::Config(_)));
    }

    #[test]
    fn test_provider_from_config() {
        let mut config = Config::default();
        config.providers.openai = Some(ProviderConfig {
            api_key: Some("sk-test".to_string()),
            api_base: Some("http://localhost:9999/v1".to_string()),
            ..Default::default()
        });
        let provider = provider_from_config(&config).unwrap();
        assert_eq!(provider.name(), "openai");
    }
}
