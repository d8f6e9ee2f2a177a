//! Candidate relevancy prompt.
//!
//! The response shape is dictated by the externally supplied format prompt;
//! this module only concatenates the pieces.

/// Lead-in placed before the cached seed summary
pub const SUMMARY_LEAD_IN: &str = "The following is the common theme from a list of articles.";

/// Lead-in placed before the candidate text
pub const CANDIDATE_LEAD_IN: &str = " Candidate article: ";

/// Build the relevancy prompt for a single candidate
pub fn build_relevance_prompt(summary: &str, format_prompt: &str, candidate_text: &str) -> String {
    let mut prompt = String::with_capacity(
        SUMMARY_LEAD_IN.len()
            + summary.len()
            + format_prompt.len()
            + CANDIDATE_LEAD_IN.len()
            + candidate_text.len(),
    );
    prompt.push_str(SUMMARY_LEAD_IN);
    prompt.push_str(summary);
    prompt.push_str(format_prompt);
    prompt.push_str(CANDIDATE_LEAD_IN);
    prompt.push_str(candidate_text);
    prompt
}
