//! Core types, configuration, and error handling for hunkwise.
//!
//! This crate provides the shared foundation used by the other hunkwise crates:
//! - [`HunkwiseError`]: unified error type using `thiserror`
//! - [`HunkwiseConfig`]: configuration loaded from `.hunkwise.toml`
//! - The change model: [`ChangeSet`], [`FileChange`], [`Hunk`], and the
//!   enrichment result [`AiAssessment`]

mod config;
mod error;
mod types;

pub use config::{
    AnalysisConfig, DiffConfig, HunkwiseConfig, LlmConfig, Provider, ScorePolicy,
};
pub use error::HunkwiseError;
pub use types::{
    AiAssessment, ChangeSet, Confidence, FileChange, FileStatus, Hunk, OutputFormat,
    SemanticGroup, MAX_RISK_SCORE,
};

/// A convenience `Result` type for hunkwise operations.
pub type Result<T> = std::result::Result<T, HunkwiseError>;
