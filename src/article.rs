//! Article and relevance result types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A text article, used both as seed and as candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Article body sent to the model
    pub analyzed_text: String,
    /// Identifier copied into each relevance result
    pub url: String,
    /// Any other fields the caller supplied, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Article {
    pub fn new(url: impl Into<String>, analyzed_text: impl Into<String>) -> Self {
        Self {
            analyzed_text: analyzed_text.into(),
            url: url.into(),
            extra: Map::new(),
        }
    }
}

/// Parsed model judgment for one candidate, tagged with its `url`.
///
/// Fields other than `url` are whatever the format prompt asked the model for.
pub type RelevanceResult = Map<String, Value>;

/// Load a JSON array of articles.
pub fn articles_from_json(json: &str) -> crate::Result<Vec<Article>> {
    Ok(serde_json::from_str(json)?)
}
