//! Pipeline configuration
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```json
//! { "retriever_top_k": 10, "reader_top_k": 3, "retrieval_strategy": "dense" }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunk::FixedSizeChunker;
use crate::retrieve::RetrievalStrategy;
use crate::{Error, Result};

/// Configuration for a [`Pipeline`](crate::pipeline::Pipeline)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of candidates the retriever hands to the reader
    pub retriever_top_k: usize,
    /// Number of answers returned
    pub reader_top_k: usize,
    pub retrieval_strategy: RetrievalStrategy,
    /// Post-process answers with the generation capability, if one is attached
    pub generation_enabled: bool,
    /// Map retrieval scores into [0, 1]
    pub scale_score: bool,
    pub chunking: ChunkingConfig,
    pub bm25: Bm25Params,
    pub reader: ReaderConfig,
    pub generation: GenerationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retriever_top_k: 5,
            reader_top_k: 5,
            retrieval_strategy: RetrievalStrategy::Lexical,
            generation_enabled: false,
            scale_score: true,
            chunking: ChunkingConfig::default(),
            bm25: Bm25Params::default(),
            reader: ReaderConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Check the values a pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.retriever_top_k == 0 {
            return Err(Error::InvalidInput("retriever_top_k must be positive".to_string()));
        }
        if self.reader_top_k == 0 {
            return Err(Error::InvalidInput("reader_top_k must be positive".to_string()));
        }
        if self.reader.batch_size == 0 {
            return Err(Error::InvalidInput("reader.batch_size must be positive".to_string()));
        }
        if self.bm25.k1 < 0.0 || !(0.0..=1.0).contains(&self.bm25.b) {
            return Err(Error::InvalidInput(format!(
                "bm25 parameters out of range: k1={} b={}",
                self.bm25.k1, self.bm25.b
            )));
        }
        if self.generation.timeout_secs == 0 {
            return Err(Error::InvalidInput("generation.timeout_secs must be positive".to_string()));
        }
        self.chunking.chunker().map(|_| ())
    }
}

/// Fixed-size word windows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in words; content up to this size stays in one unit
    pub chunk_size: usize,
    /// Words shared by adjacent windows
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            overlap: 0,
        }
    }
}

impl ChunkingConfig {
    pub fn chunker(&self) -> Result<FixedSizeChunker> {
        FixedSizeChunker::new(self.chunk_size, self.overlap)
    }
}

/// Okapi BM25 parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Params {
    /// Term frequency saturation
    pub k1: f32,
    /// Length normalization
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Passages per model invocation
    pub batch_size: usize,
    /// Bytes of surrounding text kept on each side of an answer
    pub context_window: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            context_window: 150,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl GenerationConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.retriever_top_k, 5);
        assert_eq!(config.reader_top_k, 5);
        assert_eq!(config.retrieval_strategy, RetrievalStrategy::Lexical);
        assert!(!config.generation_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{ "reader_top_k": 3, "retrieval_strategy": "dense", "chunking": { "overlap": 20 } }"#,
        )
        .unwrap();

        assert_eq!(config.reader_top_k, 3);
        assert_eq!(config.retriever_top_k, 5);
        assert_eq!(config.retrieval_strategy, RetrievalStrategy::Dense);
        assert_eq!(config.chunking.chunk_size, 200);
        assert_eq!(config.chunking.overlap, 20);
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let config = PipelineConfig {
            reader_top_k: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_validate_rejects_zero_generation_timeout() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "generation": { "timeout_secs": 0 } }"#).unwrap();
        assert!(matches!(config.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_validate_rejects_bad_overlap() {
        let config = PipelineConfig {
            chunking: ChunkingConfig {
                chunk_size: 10,
                overlap: 10,
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidInput(_))));
    }
}
