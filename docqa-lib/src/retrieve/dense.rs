use crate::chunk::TextUnit;
use crate::embed::{cosine_similarity, Embedding};

/// Cosine similarity between a query embedding and unit embeddings.
#[derive(Debug, Clone)]
pub struct DenseScorer {
    query: Embedding,
}

impl DenseScorer {
    #[must_use]
    pub fn new(query: Embedding) -> Self {
        Self { query }
    }

    /// Units without an embedding score 0. Retrieval checks for them first.
    pub fn score(&self, unit: &TextUnit) -> f32 {
        unit.embedding
            .as_deref()
            .map_or(0.0, |embedding| cosine_similarity(&self.query, embedding))
    }
}

/// Map a cosine similarity into [0, 1].
pub(crate) fn scale(score: f32) -> f32 {
    (score + 1.0) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::UnitMetadata;

    fn embedded(content: &str, embedding: Option<Embedding>) -> TextUnit {
        TextUnit {
            embedding,
            ..TextUnit::new(content, UnitMetadata::default())
        }
    }

    #[test]
    fn test_scores_by_cosine() {
        let scorer = DenseScorer::new(vec![1.0, 0.0]);

        let close = embedded("close", Some(vec![0.9, 0.1]));
        let far = embedded("far", Some(vec![0.0, 1.0]));
        assert!(scorer.score(&close) > scorer.score(&far));
    }

    #[test]
    fn test_missing_embedding_scores_zero() {
        let scorer = DenseScorer::new(vec![1.0, 0.0]);
        assert_eq!(scorer.score(&embedded("bare", None)), 0.0);
    }

    #[test]
    fn test_scale() {
        assert_eq!(scale(-1.0), 0.0);
        assert_eq!(scale(1.0), 1.0);
    }
}
