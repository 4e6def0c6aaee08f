//! Text embedding using local models
//!
//! Embeddings back the dense retrieval strategy. Units are embedded once,
//! by the embeddings-build step, and queries are embedded per request.
//!
//! # Usage
//!
//! ```ignore
//! use docqa_lib::embed::{BgeEmbedder, Embedder};
//!
//! let mut embedder = BgeEmbedder::new()?;
//!
//! // Embed documents (for indexing)
//! let doc_embeddings = embedder.embed_documents(&["The port can be changed..."])?;
//!
//! // Embed query (for searching)
//! let query_embedding = embedder.embed_query("How do I change the port?")?;
//! ```

use crate::{Error, Result};

/// A vector embedding
pub type Embedding = Vec<f32>;

/// Trait for text embedding models
pub trait Embedder: Send {
    /// Embed multiple documents for indexing
    ///
    /// Documents may be batched for efficiency.
    fn embed_documents(&mut self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Embed a single query for searching
    ///
    /// Some models (like BGE) use different prompts for queries vs documents.
    fn embed_query(&mut self, text: &str) -> Result<Embedding>;

    /// Returns the embedding dimension
    fn dimension(&self) -> usize;

    /// Returns the model name/identifier
    fn model_name(&self) -> &str;
}

/// Placeholder for pipelines that only retrieve lexically.
///
/// Every call fails, so a dense request against it surfaces as an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEmbedder;

impl Embedder for NoEmbedder {
    fn embed_documents(&mut self, _texts: &[&str]) -> Result<Vec<Embedding>> {
        Err(Error::Embedding("no embedding model configured".to_string()))
    }

    fn embed_query(&mut self, _text: &str) -> Result<Embedding> {
        Err(Error::Embedding("no embedding model configured".to_string()))
    }

    fn dimension(&self) -> usize {
        0
    }

    fn model_name(&self) -> &str {
        "none"
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 means identical direction. Vectors of
/// different length or with zero norm score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

mod bge;
pub use bge::*;
