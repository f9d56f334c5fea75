//! AI Integration Layer
//!
//! Language-model collaborator used by the step executors.

pub mod prompt;
pub mod provider;
pub mod timeout;
pub mod validation;

pub use prompt::{PromptBuilder, PromptSection};
pub use provider::{
    ErrorCategory, ErrorClassifier, LlmError, LlmProvider, LlmResponse, OllamaProvider,
    OpenAiProvider, ProviderConfig, ResponseMetadata, SharedProvider, TokenUsage,
    create_provider,
};
pub use timeout::{with_timeout, with_timeout_map};
pub use validation::{parse_structured, schema_instructions};
