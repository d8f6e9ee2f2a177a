//! Prompt module for LLM-based operations.
//!
//! This module provides the fixed prompt text for seed summarization and
//! candidate relevancy checks.

pub mod relevance;
pub mod summary;

pub use relevance::*;
pub use summary::*;
