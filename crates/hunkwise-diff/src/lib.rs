//! Diff parsing, heuristic risk scoring, and semantic classification.
//!
//! Turns unified diff text into a [`hunkwise_core::ChangeSet`], scores every
//! file against a fixed table of path/content patterns, assigns a semantic
//! group, and derives aggregate statistics. Uses git2 to produce the diff
//! text for a repository and ref pair.

pub mod git;
pub mod language;
pub mod parser;
pub mod report;
pub mod risk;
pub mod stats;
