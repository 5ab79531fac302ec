use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur across hunkwise.
///
/// Library crates use this type directly; the binary converts to a
/// `miette` diagnostic at the boundary.
///
/// # Examples
///
/// ```
/// use hunkwise_core::HunkwiseError;
///
/// let err = HunkwiseError::Config("missing API key".into());
/// assert!(err.to_string().contains("missing API key"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum HunkwiseError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Git operation failure.
    #[error("git error: {0}")]
    Git(String),

    /// Malformed input that could not be interpreted.
    #[error("parse error: {0}")]
    Parse(String),

    /// LLM transport, status, or response error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// The scoring backend failed its availability check.
    #[error("preflight failed: {0}")]
    Preflight(String),

    /// An external call exceeded its time budget.
    #[error("{what} timed out after {}s", .after.as_secs_f64())]
    Timeout {
        /// What was being waited on.
        what: String,
        /// The budget that was exceeded.
        after: Duration,
    },

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}
