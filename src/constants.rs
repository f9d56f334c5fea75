//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Workflow engine constants
pub mod workflow {
    /// Per-step execution bound (seconds)
    pub const STEP_TIMEOUT_SECS: u64 = 300;

    /// Polling cadence used by the CLI when waiting for a run (milliseconds)
    pub const POLL_INTERVAL_MS: u64 = 2_000;

    /// Number of passages retrieved per step for grounding
    pub const RETRIEVAL_TOP_K: usize = 6;

    /// Error message recorded for runs abandoned by a previous process
    pub const INTERRUPTED_MESSAGE: &str = "run interrupted by process restart";

    /// Upper bound on delivering one run notification (seconds)
    pub const NOTIFY_TIMEOUT_SECS: u64 = 10;
}

/// Retrieval index constants
pub mod retrieval {
    /// Words per indexed chunk
    pub const CHUNK_SIZE_WORDS: usize = 200;

    /// Words shared between consecutive chunks
    pub const CHUNK_OVERLAP_WORDS: usize = 40;

    /// Maximum characters of a passage placed into a prompt
    pub const MAX_PASSAGE_CHARS: usize = 1_500;
}

/// Prompt construction constants
pub mod prompt {
    /// Maximum characters of upstream step output embedded in a prompt
    pub const MAX_DEPENDENCY_CHARS: usize = 6_000;

    /// Maximum number of catalog entries offered to the case study matcher
    pub const MAX_CASE_STUDIES: usize = 50;
}

/// HTTP/Network constants
pub mod network {
    /// Default LLM request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Default server bind host
    pub const DEFAULT_HOST: &str = "127.0.0.1";

    /// Default server port
    pub const DEFAULT_PORT: u16 = 8080;
}
