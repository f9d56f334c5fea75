pub mod error;
pub mod utils;

pub use error::{ErrorCategory, ErrorClassifier, LlmError, Result, ResultExt, RfpError, StepError};
pub use utils::{
    ParseWithDefault, capitalize_first, log_filter_error, log_filter_warn, truncate_chars,
};

// =============================================================================
// Domain Newtypes
// =============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Owning project of runs, insights and indexed documents
    ProjectId
);

string_id!(
    /// Handle of an ingested RFP document
    DocumentId
);

string_id!(
    /// Identifier of one workflow run attempt
    RunId
);

string_id!(
    /// Identifier of the user who requested a run (notification target)
    UserId
);

impl RunId {
    /// Fresh random run identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
