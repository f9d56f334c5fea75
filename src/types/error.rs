//! Unified Error Type System
//!
//! Centralized error types for the workflow engine.
//!
//! ## Layers
//!
//! - [`RfpError`]: application error returned by storage, configuration, providers
//!   and the coordinator entry points
//! - [`StepError`]: typed failure of a single step executor; recorded on the run,
//!   never propagated past the coordinator
//! - [`LlmError`] + [`ErrorCategory`]: classified language-model failures, used to
//!   decide whether a step failed because a collaborator was unreachable
//!
//! Only persistence faults escape the coordinator loop. Everything a step can do
//! wrong ends up as a [`StepError`] in the run's error list.

use std::time::Duration;
use thiserror::Error;

use crate::workflow::StepId;

// =============================================================================
// Error Categories
// =============================================================================

/// Error categories for language-model failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited by the provider
    RateLimit,
    /// Context/token limit exceeded
    TokenLimit,
    /// Authentication failed
    Auth,
    /// Network/connectivity issues
    Network,
    /// Provider unavailable
    Unavailable,
    /// Invalid request
    BadRequest,
    /// Parsing the model response failed
    ParseError,
    /// Temporary server issues
    Transient,
    /// Unknown error
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::TokenLimit => write!(f, "TOKEN_LIMIT"),
            Self::Auth => write!(f, "AUTH"),
            Self::Network => write!(f, "NETWORK"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::ParseError => write!(f, "PARSE_ERROR"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// True when the failure means the collaborator could not serve the request
    /// at all, as opposed to serving it badly.
    pub fn is_collaborator_fault(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Auth | Self::Network | Self::Unavailable | Self::Transient
        )
    }
}

// =============================================================================
// LLM Error
// =============================================================================

/// Language-model error with category and provider context
#[derive(Debug, Clone)]
pub struct LlmError {
    pub category: ErrorCategory,
    pub message: String,
    pub provider: Option<String>,
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            provider: None,
        }
    }

    pub fn with_provider(
        category: ErrorCategory,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            provider: Some(provider.into()),
        }
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps raw provider failures onto [`ErrorCategory`]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an error message from any provider
    pub fn classify(message: &str, provider: &str) -> LlmError {
        let lower = message.to_lowercase();

        if lower.contains("rate limit")
            || lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("quota exceeded")
        {
            return LlmError::with_provider(ErrorCategory::RateLimit, message, provider);
        }

        if lower.contains("token")
            && (lower.contains("limit") || lower.contains("exceed") || lower.contains("maximum"))
            || lower.contains("context length")
            || lower.contains("too large")
        {
            return LlmError::with_provider(ErrorCategory::TokenLimit, message, provider);
        }

        if lower.contains("401")
            || lower.contains("403")
            || lower.contains("api key")
            || lower.contains("unauthorized")
        {
            return LlmError::with_provider(ErrorCategory::Auth, message, provider);
        }

        if lower.contains("network")
            || lower.contains("connection")
            || lower.contains("failed to connect")
            || lower.contains("dns")
            || lower.contains("timed out")
            || lower.contains("unreachable")
        {
            return LlmError::with_provider(ErrorCategory::Network, message, provider);
        }

        if lower.contains("503")
            || lower.contains("502")
            || lower.contains("service unavailable")
            || lower.contains("not found")
        {
            return LlmError::with_provider(ErrorCategory::Unavailable, message, provider);
        }

        if lower.contains("400") || lower.contains("bad request") || lower.contains("malformed") {
            return LlmError::with_provider(ErrorCategory::BadRequest, message, provider);
        }

        if lower.contains("parse") || lower.contains("json") || lower.contains("unexpected token")
        {
            return LlmError::with_provider(ErrorCategory::ParseError, message, provider);
        }

        if lower.contains("temporary") || lower.contains("overloaded") || lower.contains("500") {
            return LlmError::with_provider(ErrorCategory::Transient, message, provider);
        }

        LlmError::with_provider(ErrorCategory::Unknown, message, provider)
    }

    /// Classify HTTP status code directly (more accurate than string matching)
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> LlmError {
        match status {
            429 => LlmError::with_provider(ErrorCategory::RateLimit, message, provider),
            401 | 403 => LlmError::with_provider(ErrorCategory::Auth, message, provider),
            400 | 422 => LlmError::with_provider(ErrorCategory::BadRequest, message, provider),
            500 | 502 | 503 | 504 => {
                LlmError::with_provider(ErrorCategory::Transient, message, provider)
            }
            404 => LlmError::with_provider(ErrorCategory::Unavailable, message, provider),
            _ => LlmError::with_provider(ErrorCategory::Unknown, message, provider),
        }
    }
}

// =============================================================================
// Step Error
// =============================================================================

/// Failure of one step executor.
///
/// `UpstreamDependencyFailed` never reaches the run's error list: the coordinator
/// turns it into a `Skipped` transition because the causal error is already
/// recorded against the dependency.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("upstream dependency {0} did not complete")]
    UpstreamDependencyFailed(StepId),

    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    #[error("invalid model output: {0}")]
    InvalidOutput(String),

    #[error("{0}")]
    Execution(String),

    #[error("executor panicked: {0}")]
    Panicked(String),
}

impl StepError {
    /// Short machine-readable kind, stored alongside the message
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::UpstreamDependencyFailed(_) => "upstream_dependency_failed",
            Self::CollaboratorUnavailable(_) => "collaborator_unavailable",
            Self::InvalidOutput(_) => "invalid_output",
            Self::Execution(_) => "execution",
            Self::Panicked(_) => "panicked",
        }
    }
}

impl From<RfpError> for StepError {
    fn from(err: RfpError) -> Self {
        match err {
            RfpError::Timeout { duration, .. } => StepError::Timeout(duration),
            RfpError::Llm(llm) if llm.category.is_collaborator_fault() => {
                StepError::CollaboratorUnavailable(llm.to_string())
            }
            RfpError::Llm(llm) if llm.category == ErrorCategory::ParseError => {
                StepError::InvalidOutput(llm.to_string())
            }
            RfpError::Llm(llm) => StepError::Execution(llm.to_string()),
            RfpError::LlmApi(msg) => {
                let classified = ErrorClassifier::classify(&msg, "llm");
                if classified.category.is_collaborator_fault() {
                    StepError::CollaboratorUnavailable(msg)
                } else if classified.category == ErrorCategory::ParseError {
                    StepError::InvalidOutput(msg)
                } else {
                    StepError::Execution(msg)
                }
            }
            RfpError::Retrieval(msg) => StepError::CollaboratorUnavailable(msg),
            RfpError::Json(e) => StepError::InvalidOutput(e.to_string()),
            other => StepError::Execution(other.to_string()),
        }
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum RfpError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Collaborator Errors
    // -------------------------------------------------------------------------
    #[error("LLM error: {0}")]
    Llm(LlmError),

    #[error("LLM API error: {0}")]
    LlmApi(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    // -------------------------------------------------------------------------
    // Workflow Errors
    // -------------------------------------------------------------------------
    #[error("A workflow run is already active for project {project_id}")]
    RunAlreadyActive { project_id: String },

    #[error("Invalid step selection: {0}")]
    InvalidSelection(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl From<LlmError> for RfpError {
    fn from(err: LlmError) -> Self {
        RfpError::Llm(err)
    }
}

pub type Result<T> = std::result::Result<T, RfpError>;

impl RfpError {
    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// True for faults of the run registry or insights store. These are the only
    /// errors that abort a workflow run.
    pub fn is_persistence_fault(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Storage(_) | Self::PersistenceUnavailable(_) | Self::Io(_)
        )
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Add context using a closure (lazy evaluation)
    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| RfpError::Storage(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| RfpError::Storage(format!("{}: {}", f().into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================
