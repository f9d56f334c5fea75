//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/rfpflow/) and project (.rfpflow/) level configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::ai::provider::ProviderConfig;
use crate::constants::{network, retrieval, workflow};
use crate::types::{Result, RfpError};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// LLM provider settings
    pub llm: LlmConfig,

    /// Workflow engine settings
    pub workflow: WorkflowConfig,

    /// Retrieval index settings
    pub retrieval: RetrievalConfig,

    /// Database settings
    pub storage: StorageConfig,

    /// HTTP server settings
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            workflow: WorkflowConfig::default(),
            retrieval: RetrievalConfig::default(),
            storage: StorageConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `RfpError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(RfpError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(RfpError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.workflow.step_timeout_secs == 0 {
            return Err(RfpError::Config(
                "Workflow step_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.workflow.retrieval_top_k == 0 {
            return Err(RfpError::Config(
                "Workflow retrieval_top_k must be greater than 0".to_string(),
            ));
        }

        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            return Err(RfpError::Config(format!(
                "Retrieval chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.retrieval.chunk_overlap, self.retrieval.chunk_size
            )));
        }

        if self.storage.pool_size == 0 {
            return Err(RfpError::Config(
                "Storage pool_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "openai" or "ollama"
    pub provider: String,

    /// Model name
    pub model: Option<String>,

    /// Custom API base URL
    pub api_base: Option<String>,

    /// API key; never written back out
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Temperature for LLM generation (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: usize,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            api_base: None,
            api_key: None,
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            temperature: 0.2,
            max_tokens: 4096,
        }
    }
}

impl LlmConfig {
    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            provider: self.provider.clone(),
            model: self.model.clone(),
            timeout_secs: self.timeout_secs,
            temperature: self.temperature,
            api_key: self.api_key.clone(),
            api_base: self.api_base.clone(),
            max_tokens: self.max_tokens,
        }
    }
}

// =============================================================================
// Workflow Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Upper bound for a single step executor (seconds)
    pub step_timeout_secs: u64,

    /// Poll cadence for clients waiting on a run (milliseconds)
    pub poll_interval_ms: u64,

    /// Passages retrieved per step
    pub retrieval_top_k: usize,

    /// Mark runs left active by a previous process as errored on startup
    pub recover_on_startup: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: workflow::STEP_TIMEOUT_SECS,
            poll_interval_ms: workflow::POLL_INTERVAL_MS,
            retrieval_top_k: workflow::RETRIEVAL_TOP_K,
            recover_on_startup: true,
        }
    }
}

impl WorkflowConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// Retrieval Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Words per chunk
    pub chunk_size: usize,

    /// Words shared between neighbouring chunks
    pub chunk_overlap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: retrieval::CHUNK_SIZE_WORDS,
            chunk_overlap: retrieval::CHUNK_OVERLAP_WORDS,
        }
    }
}

// =============================================================================
// Storage Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path
    pub database: PathBuf,

    /// Maximum pooled connections
    pub pool_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(".rfpflow/rfpflow.db"),
            pool_size: 8,
        }
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: network::DEFAULT_HOST.to_string(),
            port: network::DEFAULT_PORT,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
