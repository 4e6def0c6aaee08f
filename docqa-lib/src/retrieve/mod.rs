//! Relevance ranking
//!
//! The retriever ranks every unit of a [`Snapshot`] against a query and keeps
//! the best `top_k`. Two strategies share one [`Scorer`]:
//!
//! - **Lexical**: Okapi BM25 over lowercase word tokens, no model needed
//! - **Dense**: cosine similarity between embeddings, requires
//!   [`Retriever::update_embeddings`] to have run over the store
//!
//! Equal scores keep store insertion order, so rankings are reproducible.
//!
//! # Usage
//!
//! ```ignore
//! use docqa_lib::retrieve::Retriever;
//!
//! let retriever = Retriever::dense(BgeEmbedder::new()?);
//! retriever.update_embeddings(&mut store, 32)?;
//!
//! let snapshot = store.snapshot();
//! let candidates = retriever.retrieve(&snapshot, "How do I change the port?", 5)?;
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunk::TextUnit;
use crate::config::Bm25Params;
use crate::embed::{Embedder, NoEmbedder};
use crate::store::{DocumentStore, Snapshot};
use crate::{Error, Result};

/// How units are scored against a query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalStrategy {
    /// BM25 over word tokens
    #[default]
    Lexical,
    /// Embedding cosine similarity
    Dense,
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lexical => f.write_str("lexical"),
            Self::Dense => f.write_str("dense"),
        }
    }
}

impl FromStr for RetrievalStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lexical" | "bm25" => Ok(Self::Lexical),
            "dense" | "embedding" => Ok(Self::Dense),
            other => Err(Error::InvalidInput(format!(
                "unknown retrieval strategy '{other}' (expected lexical or dense)"
            ))),
        }
    }
}

/// A unit with its relevance score for one query
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// The matched unit, borrowed from the query's snapshot
    pub unit: &'a TextUnit,
    /// Relevance score (higher is more relevant)
    pub score: f32,
}

/// Relevance function for one query
#[derive(Debug, Clone)]
pub enum Scorer {
    Lexical(Bm25Scorer),
    Dense(DenseScorer),
}

impl Scorer {
    /// Relevance of a unit to the query this scorer was built for.
    pub fn score(&self, unit: &TextUnit) -> f32 {
        match self {
            Self::Lexical(scorer) => scorer.score(unit),
            Self::Dense(scorer) => scorer.score(unit),
        }
    }

    fn scale(&self, score: f32) -> f32 {
        match self {
            Self::Lexical(_) => bm25::scale(score),
            Self::Dense(_) => dense::scale(score),
        }
    }
}

/// Ranks snapshot units against queries.
pub struct Retriever<E: Embedder = NoEmbedder> {
    strategy: RetrievalStrategy,
    bm25: Bm25Params,
    scale_score: bool,
    embedder: Option<Mutex<E>>,
}

// Constructor for lexical-only retrievers
impl Retriever<NoEmbedder> {
    /// Create a BM25 retriever without an embedding model.
    #[must_use]
    pub fn lexical() -> Self {
        Self {
            strategy: RetrievalStrategy::Lexical,
            bm25: Bm25Params::default(),
            scale_score: true,
            embedder: None,
        }
    }
}

impl<E: Embedder> Retriever<E> {
    /// Create a retriever with an embedding model, using the dense strategy.
    #[must_use]
    pub fn dense(embedder: E) -> Self {
        Self {
            strategy: RetrievalStrategy::Dense,
            bm25: Bm25Params::default(),
            scale_score: true,
            embedder: Some(Mutex::new(embedder)),
        }
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: RetrievalStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_bm25(mut self, params: Bm25Params) -> Self {
        self.bm25 = params;
        self
    }

    /// Map scores into [0, 1] (sigmoid for BM25, shifted cosine for dense).
    #[must_use]
    pub fn with_scale_score(mut self, scale_score: bool) -> Self {
        self.scale_score = scale_score;
        self
    }

    #[must_use]
    pub fn strategy(&self) -> RetrievalStrategy {
        self.strategy
    }

    /// Build the scorer for one query over one snapshot.
    ///
    /// Dense scoring fails with [`Error::EmbeddingsNotBuilt`] while any unit
    /// in the snapshot lacks an embedding.
    pub fn scorer(&self, snapshot: &Snapshot, query: &str) -> Result<Scorer> {
        match self.strategy {
            RetrievalStrategy::Lexical => Ok(Scorer::Lexical(Bm25Scorer::new(snapshot, query, self.bm25))),
            RetrievalStrategy::Dense => {
                let missing = snapshot.missing_embeddings();
                if missing > 0 {
                    return Err(Error::EmbeddingsNotBuilt { missing });
                }
                let query_embedding = self.embedder()?.embed_query(query)?;
                Ok(Scorer::Dense(DenseScorer::new(query_embedding)))
            }
        }
    }

    /// Rank the snapshot against the query.
    ///
    /// # Returns
    /// At most `top_k` candidates sorted by score (highest first); equal
    /// scores keep insertion order
    pub fn retrieve<'a>(
        &self,
        snapshot: &'a Snapshot,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Candidate<'a>>> {
        if snapshot.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let scorer = self.scorer(snapshot, query)?;

        let mut candidates: Vec<Candidate<'a>> = snapshot
            .iter()
            .map(|unit| Candidate {
                unit,
                score: scorer.score(unit),
            })
            .collect();

        // stable sort: ties stay in insertion order
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(top_k);

        if self.scale_score {
            for candidate in &mut candidates {
                candidate.score = scorer.scale(candidate.score);
            }
        }

        debug!(
            strategy = %self.strategy,
            units = snapshot.len(),
            returned = candidates.len(),
            "retrieved"
        );
        Ok(candidates)
    }

    /// Embed every unit that has no embedding yet.
    ///
    /// # Returns
    /// The number of units that received an embedding
    pub fn update_embeddings<S>(&self, store: &mut S, batch_size: usize) -> Result<usize>
    where
        S: DocumentStore + ?Sized,
    {
        let snapshot = store.snapshot();
        let pending: Vec<&TextUnit> = snapshot.iter().filter(|u| u.embedding.is_none()).collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let mut embedder = self.embedder()?;
        for batch in pending.chunks(batch_size.max(1)) {
            let texts: Vec<&str> = batch.iter().map(|u| u.content.as_str()).collect();
            let embeddings = embedder.embed_documents(&texts)?;
            if embeddings.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "model returned {} embeddings for {} texts",
                    embeddings.len(),
                    batch.len()
                )));
            }
            for (unit, embedding) in batch.iter().zip(embeddings) {
                store.set_embedding(&unit.id, embedding)?;
            }
        }

        debug!(model = embedder.model_name(), units = pending.len(), "embeddings updated");
        Ok(pending.len())
    }

    fn embedder(&self) -> Result<MutexGuard<'_, E>> {
        self.embedder
            .as_ref()
            .ok_or_else(|| Error::Embedding("dense retrieval requires an embedding model".to_string()))?
            .lock()
            .map_err(|_| Error::Embedding("embedding model lock poisoned".to_string()))
    }
}

mod bm25;
mod dense;

pub use bm25::{tokenize, Bm25Scorer};
pub use dense::DenseScorer;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::UnitMetadata;
    use crate::embed::Embedding;
    use crate::store::MemoryStore;

    /// Bag-of-words over a fixed vocabulary.
    struct VocabEmbedder {
        vocab: Vec<&'static str>,
        calls: usize,
    }

    impl VocabEmbedder {
        fn new() -> Self {
            Self {
                vocab: vec!["port", "config", "banana", "potassium"],
                calls: 0,
            }
        }

        fn embed(&self, text: &str) -> Embedding {
            let tokens = tokenize(text);
            self.vocab
                .iter()
                .map(|v| tokens.iter().filter(|t| t.as_str() == *v).count() as f32)
                .collect()
        }
    }

    impl Embedder for VocabEmbedder {
        fn embed_documents(&mut self, texts: &[&str]) -> Result<Vec<Embedding>> {
            self.calls += 1;
            Ok(texts.iter().map(|t| self.embed(t)).collect())
        }

        fn embed_query(&mut self, text: &str) -> Result<Embedding> {
            Ok(self.embed(text))
        }

        fn dimension(&self) -> usize {
            self.vocab.len()
        }

        fn model_name(&self) -> &str {
            "vocab"
        }
    }

    fn store_of(texts: &[&str]) -> MemoryStore {
        let mut store = MemoryStore::new();
        for text in texts {
            store.insert(TextUnit::new(*text, UnitMetadata::default())).unwrap();
        }
        store
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("lexical".parse::<RetrievalStrategy>().unwrap(), RetrievalStrategy::Lexical);
        assert_eq!("Dense".parse::<RetrievalStrategy>().unwrap(), RetrievalStrategy::Dense);
        assert!("fuzzy".parse::<RetrievalStrategy>().is_err());
        assert_eq!(RetrievalStrategy::Dense.to_string(), "dense");
    }

    #[test]
    fn test_lexical_respects_top_k_and_order() {
        let store = store_of(&[
            "bananas and potassium",
            "the port is set in config",
            "port port port",
            "nothing to see",
        ]);
        let snapshot = store.snapshot();
        let retriever = Retriever::lexical();

        let results = retriever.retrieve(&snapshot, "which port", 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].unit.content, "port port port");
        for window in results.windows(2) {
            assert!(window[0].score >= window[1].score);
        }
        assert!(results.iter().all(|c| (0.0..=1.0).contains(&c.score)));
    }

    #[test]
    fn test_top_k_larger_than_store() {
        let store = store_of(&["only one"]);
        let snapshot = store.snapshot();
        let results = Retriever::lexical().retrieve(&snapshot, "one", 100).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let store = store_of(&["beta port", "alpha port", "gamma port"]);
        let snapshot = store.snapshot();

        let results = Retriever::lexical().retrieve(&snapshot, "port", 3).unwrap();
        let order: Vec<&str> = results.iter().map(|c| c.unit.content.as_str()).collect();
        assert_eq!(order, vec!["beta port", "alpha port", "gamma port"]);
    }

    #[test]
    fn test_unscaled_scores() {
        let store = store_of(&["port", "other"]);
        let snapshot = store.snapshot();

        let results = Retriever::lexical()
            .with_scale_score(false)
            .retrieve(&snapshot, "port", 2)
            .unwrap();
        assert!(results[0].score > 0.0);
        assert_eq!(results[1].score, 0.0);
    }

    #[test]
    fn test_empty_store_returns_nothing() {
        let store = MemoryStore::new();
        let snapshot = store.snapshot();

        assert!(Retriever::lexical().retrieve(&snapshot, "port", 5).unwrap().is_empty());
        let dense = Retriever::dense(VocabEmbedder::new());
        assert!(dense.retrieve(&snapshot, "port", 5).unwrap().is_empty());
    }

    #[test]
    fn test_dense_before_embeddings_fails_without_mutation() {
        let store = store_of(&["the port is in config", "banana potassium"]);
        let before = store.get_all();
        let snapshot = store.snapshot();

        let retriever = Retriever::dense(VocabEmbedder::new());
        let err = retriever.retrieve(&snapshot, "port", 5).unwrap_err();

        assert!(matches!(err, Error::EmbeddingsNotBuilt { missing: 2 }));
        assert_eq!(store.get_all(), before);
    }

    #[test]
    fn test_dense_after_update_embeddings() {
        let mut store = store_of(&["banana potassium", "the port is in config"]);
        let retriever = Retriever::dense(VocabEmbedder::new());

        assert_eq!(retriever.update_embeddings(&mut store, 1).unwrap(), 2);
        assert_eq!(retriever.embedder().unwrap().calls, 2);
        // second build has nothing left to do
        assert_eq!(retriever.update_embeddings(&mut store, 1).unwrap(), 0);

        let snapshot = store.snapshot();
        let results = retriever.retrieve(&snapshot, "config port", 2).unwrap();
        assert_eq!(results[0].unit.content, "the port is in config");
        assert!(results[0].score > results[1].score);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dense_without_embedder_fails() {
        let mut store = store_of(&["text"]);
        let retriever = Retriever::lexical().with_strategy(RetrievalStrategy::Dense);

        assert!(matches!(
            retriever.update_embeddings(&mut store, 8),
            Err(Error::Embedding(_))
        ));
    }

    #[test]
    fn test_dense_retriever_can_switch_to_lexical() {
        let store = store_of(&["the port is in config"]);
        let snapshot = store.snapshot();
        let retriever = Retriever::dense(VocabEmbedder::new()).with_strategy(RetrievalStrategy::Lexical);
        assert_eq!(retriever.strategy(), RetrievalStrategy::Lexical);

        assert_eq!(retriever.retrieve(&snapshot, "port", 1).unwrap().len(), 1);
    }
}
