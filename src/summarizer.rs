//! Seed summarization with adaptive fold splitting.
//!
//! All seeds are first summarized in a single request. Whenever the model
//! rejects a request as too large, the seeds are re-split into one more fold
//! and the whole summary is rebuilt from scratch.

use crate::article::Article;
use crate::completion::Completion;
use crate::error::{RelcheckError, Result};
use crate::prompts::build_summary_prompt;
use std::ops::Range;
use tracing::{debug, info, warn};

/// Boundaries of `fold` contiguous groups over `n` items.
///
/// Returns `fold + 1` indices; group `k` is `edges[k]..edges[k + 1]`.
/// The last edge is always `n`.
pub fn fold_edges(n: usize, fold: usize) -> Vec<usize> {
    let fold = fold.max(1);
    (0..=fold).map(|k| k * n / fold).collect()
}

/// Index ranges of each fold, in order
pub fn fold_ranges(n: usize, fold: usize) -> Vec<Range<usize>> {
    fold_edges(n, fold)
        .windows(2)
        .map(|w| w[0]..w[1])
        .collect()
}

/// Summarize the common theme of `seeds`.
///
/// Fails with [`RelcheckError::SummaryTooLarge`] if a request is still too
/// large when every fold holds at most one article.
pub async fn summarize_seeds(completion: &dyn Completion, seeds: &[Article]) -> Result<String> {
    if seeds.is_empty() {
        return Err(RelcheckError::Validation(
            "at least one seed article is required".to_string(),
        ));
    }

    let mut fold = 1;
    loop {
        match summarize_in_folds(completion, seeds, fold).await {
            Ok(summary) => {
                info!(seeds = seeds.len(), folds = fold, chars = summary.len(), "Seed summary ready");
                return Ok(summary);
            }
            Err(e) if e.is_context_length_exceeded() => {
                if fold >= seeds.len() {
                    return Err(RelcheckError::SummaryTooLarge { seeds: seeds.len() });
                }
                warn!(folds = fold, error = %e, "Summary prompt too large, splitting further");
                fold += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn summarize_in_folds(completion: &dyn Completion, seeds: &[Article], fold: usize) -> Result<String> {
    let mut summary = String::new();
    for (k, range) in fold_ranges(seeds.len(), fold).into_iter().enumerate() {
        debug!(fold = k, articles = range.len(), "Summarizing fold");
        let offset = range.start;
        let prompt = build_summary_prompt(&seeds[range], offset);
        summary.push_str(&completion.complete(&prompt).await?);
    }
    Ok(summary)
}
