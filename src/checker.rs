//! LLM-based relevance checking of candidate articles against seed articles.
//!
//! A [`RelevanceChecker`] is built once per seed set: construction loads the
//! format prompt and summarizes the seeds. Each call to
//! [`RelevanceChecker::check_relevancy`] then issues one completion request
//! per candidate and returns the parsed judgments in input order.

use crate::article::{Article, RelevanceResult};
use crate::completion::Completion;
use crate::error::{RelcheckError, Result};
use crate::prompts::build_relevance_prompt;
use crate::storage::{load_template, ObjectStore, StorageLocation};
use crate::summarizer::summarize_seeds;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Default upper bound on seed articles sent to the model
pub const DEFAULT_SEED_CAPACITY: usize = 10;

/// Checker configuration
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Where the format prompt lives
    pub format_prompt_location: StorageLocation,
    /// Only the first `seed_capacity` seeds are used
    pub seed_capacity: usize,
    /// Candidate requests allowed in flight at once (1 = sequential)
    pub max_concurrent_requests: usize,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            format_prompt_location: StorageLocation::default(),
            seed_capacity: DEFAULT_SEED_CAPACITY,
            max_concurrent_requests: 1,
        }
    }
}

/// Judges candidate articles against a fixed seed set.
pub struct RelevanceChecker {
    completion: Arc<dyn Completion>,
    seeds: Vec<Article>,
    summary: String,
    format_prompt: String,
    max_concurrent_requests: usize,
}

impl std::fmt::Debug for RelevanceChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelevanceChecker")
            .field("seeds", &self.seeds.len())
            .field("summary_chars", &self.summary.len())
            .field("format_prompt_chars", &self.format_prompt.len())
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .finish()
    }
}

impl RelevanceChecker {
    /// Build a checker: truncate seeds, load the format prompt, summarize seeds.
    ///
    /// # Arguments
    ///
    /// * `completion` - Completion client used for every model call
    /// * `store` - Object store holding the format prompt
    /// * `seed_articles` - Seed articles; only the first `seed_capacity` are kept
    /// * `config` - Template location, seed capacity and concurrency
    pub async fn new(
        completion: Arc<dyn Completion>,
        store: &dyn ObjectStore,
        mut seed_articles: Vec<Article>,
        config: CheckerConfig,
    ) -> Result<Self> {
        seed_articles.truncate(config.seed_capacity);
        if seed_articles.is_empty() {
            return Err(RelcheckError::Validation(
                "at least one seed article is required".to_string(),
            ));
        }

        let format_prompt = load_template(store, &config.format_prompt_location).await?;
        let summary = summarize_seeds(completion.as_ref(), &seed_articles).await?;

        info!(
            seeds = seed_articles.len(),
            template = %config.format_prompt_location,
            "Relevance checker ready"
        );

        Ok(Self {
            completion,
            seeds: seed_articles,
            summary,
            format_prompt,
            max_concurrent_requests: config.max_concurrent_requests.max(1),
        })
    }

    /// Seeds in use after truncation
    pub fn seeds(&self) -> &[Article] {
        &self.seeds
    }

    /// Cached summary of the seed set
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Cached format prompt
    pub fn format_prompt(&self) -> &str {
        &self.format_prompt
    }

    /// Ask the model whether each candidate matches the seed theme.
    ///
    /// Results keep input order. The first failure aborts the whole batch and
    /// no partial results are returned.
    pub async fn check_relevancy(&self, candidates: &[Article]) -> Result<Vec<RelevanceResult>> {
        info!(
            count = candidates.len(),
            concurrency = self.max_concurrent_requests,
            "Starting relevancy check"
        );

        let checks: Vec<_> = candidates
            .iter()
            .enumerate()
            .map(|(idx, candidate)| self.check_candidate(idx, candidate))
            .collect();

        let results: Vec<RelevanceResult> = stream::iter(checks)
            .buffered(self.max_concurrent_requests)
            .try_collect()
            .await?;

        info!(checked = results.len(), "Relevancy check complete");
        Ok(results)
    }

    async fn check_candidate(&self, idx: usize, candidate: &Article) -> Result<RelevanceResult> {
        let prompt = build_relevance_prompt(&self.summary, &self.format_prompt, &candidate.analyzed_text);

        debug!(idx = idx, url = %candidate.url, "Checking candidate");
        let reply = self.completion.complete(&prompt).await?;

        parse_relevance_reply(&reply, &candidate.url)
    }
}

/// Slice from the first `{` through the last `}` of `reply`, inclusive.
///
/// A plain index scan: braces are not matched, so text between two separate
/// objects ends up in the slice. Returns `None` when there is no such span.
pub fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&reply[start..=end])
}

/// Parse a model reply into a result tagged with `url`.
pub fn parse_relevance_reply(reply: &str, url: &str) -> Result<RelevanceResult> {
    let malformed = |reason: String| {
        let preview: String = reply.chars().take(200).collect();
        debug!(url = url, content_preview = %preview, "Unparseable relevancy reply");
        RelcheckError::MalformedResponse {
            url: url.to_string(),
            reason,
        }
    };

    let json_str = extract_json_object(reply)
        .ok_or_else(|| malformed("no JSON object delimited by braces".to_string()))?;

    let mut result = match serde_json::from_str::<Value>(json_str) {
        Ok(Value::Object(map)) => map,
        Ok(other) => return Err(malformed(format!("expected a JSON object, got {}", other))),
        Err(e) => return Err(malformed(e.to_string())),
    };

    result.insert("url".to_string(), Value::String(url.to_string()));
    Ok(result)
}
