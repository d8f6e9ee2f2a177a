//! # relcheck
//!
//! Judge whether candidate articles are thematically relevant to a set of
//! seed articles, using a hosted LLM completion API.
//!
//! ## Modules
//!
//! - [`storage`] - Object store access for the format prompt template
//! - [`completion`] - Single-turn chat completion client
//! - [`summarizer`] - Seed summarization with adaptive fold splitting
//! - [`checker`] - Per-candidate relevancy checks
//! - [`prompts`] - Fixed prompt text
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use relcheck::{Article, CheckerConfig, CompletionConfig, LocalObjectStore, OpenAiClient, RelevanceChecker};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Arc::new(OpenAiClient::new(CompletionConfig::with_api_key("sk-..."))?);
//!     let store = LocalObjectStore::new("./templates");
//!     let seeds = vec![Article::new("https://example.com/a", "Central bank raises rates")];
//!
//!     let checker = RelevanceChecker::new(client, &store, seeds, CheckerConfig::default()).await?;
//!     let results = checker
//!         .check_relevancy(&[Article::new("https://example.com/b", "Mortgage costs climb")])
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&results)?);
//!     Ok(())
//! }
//! ```

pub mod article;
pub mod checker;
pub mod completion;
pub mod error;
pub mod prompts;
pub mod storage;
pub mod summarizer;

pub use article::{Article, RelevanceResult};
pub use checker::{CheckerConfig, RelevanceChecker};
pub use completion::{Completion, CompletionConfig, OpenAiClient, TokenUsage};
pub use error::{RelcheckError, Result};
pub use storage::{load_template, HttpObjectStore, LocalObjectStore, ObjectStore, StorageLocation};
