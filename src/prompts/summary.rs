//! Seed summarization prompt.

use crate::article::Article;

/// Instruction that leads every summarization request
pub const SUMMARY_INSTRUCTION: &str = "Please summarize the common theme among following articles.";

/// Build the summarization prompt for one fold.
///
/// `offset` is the position of `articles[0]` in the whole seed set, so labels
/// stay stable no matter how the seeds are folded.
pub fn build_summary_prompt(articles: &[Article], offset: usize) -> String {
    let mut prompt = String::from(SUMMARY_INSTRUCTION);
    for (i, article) in articles.iter().enumerate() {
        prompt.push_str(&format!(" Article {}: ", offset + i));
        prompt.push_str(&article.analyzed_text);
    }
    prompt
}
