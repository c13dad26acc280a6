//! Similarity search over a pre-built passage index.
//!
//! Building or populating the index (document ingestion, chunking,
//! embeddings) happens elsewhere; the engine only queries it through
//! [`SimilaritySearch`].

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A retrieved passage and its relevance score (higher is closer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("index unavailable: {0}")]
    Unavailable(String),

    #[error("search failed: {0}")]
    Query(String),
}

/// Nearest-neighbour lookup.
///
/// Implementations return at most `k` passages in descending score order;
/// fewer is fine.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>, SearchError>;
}

/// Term-overlap search over passages held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPassages {
    passages: Vec<String>,
}

impl InMemoryPassages {
    pub fn new(passages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            passages: passages.into_iter().map(Into::into).collect(),
        }
    }

    /// One passage per non-empty line.
    pub fn from_lines(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty()),
        )
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl SimilaritySearch for InMemoryPassages {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>, SearchError> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<Passage> = self
            .passages
            .iter()
            .filter_map(|text| {
                let overlap = terms(text).intersection(&query_terms).count();
                (overlap > 0).then(|| Passage {
                    text: text.clone(),
                    score: overlap as f32 / query_terms.len() as f32,
                })
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn index() -> InMemoryPassages {
        InMemoryPassages::from_lines(
            "Early termination of the contract incurs a fee of 200 dollars.\n\
             \n\
             Data roaming charges apply outside the home network.\n\
             The contract term is 24 months and renews monthly after the term.\n",
        )
    }

    #[tokio::test]
    async fn test_results_are_ranked_and_capped() {
        let hits = index().search("contract termination fee", 2).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert!(hits[0].text.starts_with("Early termination"));
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_no_overlap_returns_fewer_than_k() {
        let hits = index().search("roaming", 3).await.unwrap();
        assert_eq!(hits.len(), 1);

        let none = index().search("xylophone", 3).await.unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_from_lines_skips_blank() {
        assert_eq!(index().len(), 3);
    }
}
