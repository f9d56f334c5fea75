//! LLM Provider Abstraction
//!
//! Defines the LlmProvider trait for structured LLM output generation.
//! Step executors only see `SharedProvider`; the concrete backend is chosen
//! from configuration by [`create_provider`].

mod ollama;
mod openai;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

pub use crate::types::{ErrorCategory, ErrorClassifier, LlmError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::types::{Result, RfpError};

// =============================================================================
// LLM Response
// =============================================================================

/// LLM response including content, usage and timing
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Generated content (structured JSON)
    pub content: Value,
    pub usage: TokenUsage,
    /// Wall clock time of the request in milliseconds
    pub elapsed_ms: u64,
    pub metadata: ResponseMetadata,
}

impl LlmResponse {
    /// Create response with content only (usage unknown)
    pub fn content_only(content: Value) -> Self {
        Self {
            content,
            usage: TokenUsage::default(),
            elapsed_ms: 0,
            metadata: ResponseMetadata::default(),
        }
    }

    pub fn with_metrics(
        content: Value,
        usage: TokenUsage,
        elapsed: Duration,
        metadata: ResponseMetadata,
    ) -> Self {
        Self {
            content,
            usage,
            elapsed_ms: elapsed.as_millis() as u64,
            metadata,
        }
    }
}

/// Token usage reported by the provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Response metadata
#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    pub model: String,
    pub provider: String,
}

/// Shared LLM provider handle, cloned into every executor.
pub type SharedProvider = Arc<dyn LlmProvider + Send + Sync>;

// =============================================================================
// Provider Configuration
// =============================================================================

/// Configuration for LLM providers
///
/// API keys are never serialized and are redacted in debug output. Each provider
/// wraps the key in a `SecretString` at construction.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type: "openai" or "ollama"
    pub provider: String,
    /// Model name (provider-specific)
    pub model: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    pub temperature: f32,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL (for custom endpoints)
    #[serde(default)]
    pub api_base: Option<String>,
    pub max_tokens: usize,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            timeout_secs: 300,
            temperature: 0.2,
            api_key: None,
            api_base: None,
            max_tokens: 4096,
        }
    }
}

// =============================================================================
// LLM Provider Trait
// =============================================================================

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate structured output guided by a JSON Schema.
    ///
    /// Failures are returned as `RfpError::Llm` with a classified category so
    /// callers can tell an unreachable provider from a bad answer.
    async fn generate(&self, prompt: &str, schema: &Value) -> Result<LlmResponse>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model name currently in use
    fn model(&self) -> &str;

    /// Check if the provider is available
    async fn health_check(&self) -> Result<bool>;
}

/// Create a shared provider from configuration
pub fn create_provider(config: &ProviderConfig) -> Result<SharedProvider> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config.clone())?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config.clone())?)),
        _ => Err(RfpError::Config(format!(
            "Unknown provider: {}. Supported: openai, ollama",
            config.provider
        ))),
    }
}

/// Map a reqwest transport failure to a classified LLM error
pub(crate) fn transport_error(err: &reqwest::Error, provider: &str) -> RfpError {
    let category = if err.is_timeout() || err.is_connect() {
        ErrorCategory::Network
    } else {
        ErrorCategory::Unknown
    };
    LlmError::with_provider(category, format!("request failed: {}", err), provider).into()
}
