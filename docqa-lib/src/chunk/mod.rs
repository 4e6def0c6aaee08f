//! Text units and chunking
//!
//! Source documents are split into [`TextUnit`]s before they enter the store.
//! Long documents are cut into fixed-size word windows so that the reading
//! model sees passages of a bounded length.
//!
//! # Implementing a Chunker
//!
//! ```ignore
//! use docqa_lib::chunk::{Chunker, TextUnit, UnitMetadata};
//!
//! struct MyChunker { /* ... */ }
//!
//! impl Chunker for MyChunker {
//!     fn chunk(&self, content: &str, metadata: UnitMetadata) -> Vec<TextUnit> {
//!         // Your chunking logic here
//!         todo!()
//!     }
//!
//!     fn name(&self) -> &str {
//!         "mine"
//!     }
//! }
//! ```

use std::hash::{DefaultHasher, Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::embed::Embedding;

/// An ingested, normalized chunk of source text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextUnit {
    /// Unique identifier, derived from the content
    pub id: String,
    /// The text content of this unit
    pub content: String,
    /// Metadata about the source and position
    pub metadata: UnitMetadata,
    /// Dense vector, present once embeddings have been built
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
}

impl TextUnit {
    /// Create a unit whose identifier is derived from its content.
    pub fn new(content: impl Into<String>, metadata: UnitMetadata) -> Self {
        let content = content.into();
        Self {
            id: generate_id(&content),
            content,
            metadata,
            embedding: None,
        }
    }

    /// Source file reference, if the unit came from a file.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.metadata.source.as_deref()
    }
}

/// Metadata associated with a text unit
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct UnitMetadata {
    /// Source file reference
    pub source: Option<String>,
    /// Byte offset of this unit within the normalized source text
    pub position: usize,
    /// Total number of units from this source
    pub total_chunks: Option<usize>,
}

/// Trait for document chunking strategies
pub trait Chunker: Send + Sync {
    /// Split content into text units
    ///
    /// # Arguments
    /// * `content` - The normalized text content to chunk
    /// * `metadata` - Base metadata to attach to each unit
    ///
    /// # Returns
    /// Units in document order, each with a content-derived id and position metadata
    fn chunk(&self, content: &str, metadata: UnitMetadata) -> Vec<TextUnit>;

    /// Returns the name of this chunking strategy
    fn name(&self) -> &str;
}

/// Content hash used as the unit identifier.
///
/// Identical content always maps to the same id, which makes re-indexing
/// a file a no-op.
pub(crate) fn generate_id(content: &str) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

mod fixed;

pub use fixed::*;
