//! AI enrichment layered over heuristic diff analysis.
//!
//! An [`llm::LlmClient`] talks to one of several text-generation backends.
//! The [`pipeline`] re-scores files through a [`scorer::RiskScorer`] with
//! bounded concurrency, a preflight check, per-call timeouts and fail-fast
//! cancellation. Results are published through a [`holder::SnapshotHolder`],
//! usually from a task started by [`background::spawn_background_analysis`].

pub mod background;
pub mod holder;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod scorer;
pub mod summary;
