//! Question answering pipeline
//!
//! Sequences retrieval and reading over one store, then optionally hands the
//! extracted answers to a [`Generator`].
//!
//! # Usage
//!
//! ```ignore
//! use docqa_lib::pipeline::Pipeline;
//! use docqa_lib::read::TermOverlapModel;
//!
//! let pipeline = Pipeline::new(PipelineConfig::default(), TermOverlapModel::default())?;
//! pipeline.index_files(&collect_text_files("data/docs", "txt")?)?;
//!
//! let result = pipeline.ask("How do I change the port?").await?;
//! for answer in &result.answers {
//!     println!("{:.3} {}", answer.score, answer.text);
//! }
//! ```

use std::path::Path;
use std::sync::{RwLock, RwLockWriteGuard};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};

use crate::chunk::TextUnit;
use crate::config::PipelineConfig;
use crate::embed::{Embedder, NoEmbedder};
use crate::generate::{answer_prompt, Generator};
use crate::index::{IndexReport, Indexer};
use crate::read::{Answer, ExtractiveModel, Reader};
use crate::retrieve::{RetrievalStrategy, Retriever};
use crate::store::{DocumentStore, MemoryStore, Snapshot};
use crate::{Error, Result};

/// Texts per embedding model call
const EMBED_BATCH_SIZE: usize = 32;

/// Outcome of one query
#[derive(Debug, Clone, Default, Serialize)]
pub struct QaResult {
    /// Extracted answers, best first
    pub answers: Vec<Answer>,
    /// Generated reply, if generation ran and succeeded
    pub generated_answer: Option<String>,
    /// Non-fatal problems met while answering
    pub warnings: Vec<String>,
}

/// Retriever, reader and optional generator over one document store.
pub struct Pipeline<M: ExtractiveModel, E: Embedder = NoEmbedder, S: DocumentStore = MemoryStore> {
    store: RwLock<S>,
    indexer: Indexer,
    retriever: Retriever<E>,
    reader: Reader<M>,
    generator: Option<Box<dyn Generator>>,
    config: PipelineConfig,
}

// Constructor for lexical pipelines
impl<M: ExtractiveModel> Pipeline<M> {
    /// Create a pipeline over an empty in-memory store.
    ///
    /// Fails with [`Error::InvalidInput`] for an invalid config, including
    /// one asking for dense retrieval, which needs
    /// [`with_embedder`](Pipeline::with_embedder).
    pub fn new(config: PipelineConfig, model: M) -> Result<Self> {
        if config.retrieval_strategy == RetrievalStrategy::Dense {
            return Err(Error::InvalidInput(
                "dense retrieval requires an embedding model".to_string(),
            ));
        }
        Self::with_store(config, MemoryStore::new(), Retriever::lexical(), model)
    }
}

// Constructor for pipelines with an embedding model
impl<M: ExtractiveModel, E: Embedder> Pipeline<M, E> {
    /// Create a pipeline over an empty in-memory store with an embedding
    /// model for the dense strategy.
    pub fn with_embedder(config: PipelineConfig, model: M, embedder: E) -> Result<Self> {
        Self::with_store(config, MemoryStore::new(), Retriever::dense(embedder), model)
    }
}

impl<M: ExtractiveModel, E: Embedder, S: DocumentStore> Pipeline<M, E, S> {
    /// Create a pipeline from its parts.
    ///
    /// Retrieval settings from the config override the retriever's.
    pub fn with_store(config: PipelineConfig, store: S, retriever: Retriever<E>, model: M) -> Result<Self> {
        config.validate()?;

        let indexer = Indexer::new(config.chunking.chunker()?);
        let retriever = retriever
            .with_strategy(config.retrieval_strategy)
            .with_bm25(config.bm25)
            .with_scale_score(config.scale_score);
        let reader = Reader::new(model)
            .with_batch_size(config.reader.batch_size)
            .with_context_window(config.reader.context_window);

        Ok(Self {
            store: RwLock::new(store),
            indexer,
            retriever,
            reader,
            generator: None,
            config,
        })
    }

    /// Attach a generation backend, used when `generation_enabled` is set.
    #[must_use]
    pub fn with_generator(mut self, generator: impl Generator + 'static) -> Self {
        self.generator = Some(Box::new(generator));
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Index files into the store.
    pub fn index_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<IndexReport> {
        let mut store = self.write()?;
        Ok(self.indexer.index(&mut *store, paths))
    }

    /// Index in-memory content under an optional source name.
    pub fn index_text(&self, source: Option<&str>, content: &str) -> Result<IndexReport> {
        let mut store = self.write()?;
        Ok(self.indexer.index_text(&mut *store, source, content))
    }

    /// Embed all units that have no embedding yet.
    ///
    /// # Returns
    /// The number of units embedded
    pub fn update_embeddings(&self) -> Result<usize> {
        let mut store = self.write()?;
        self.retriever.update_embeddings(&mut *store, EMBED_BATCH_SIZE)
    }

    /// Remove every unit from the store.
    pub fn clear(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }

    /// Immutable view of the store's current contents.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let store = self
            .store
            .read()
            .map_err(|_| Error::Store("store lock poisoned".to_string()))?;
        Ok(store.snapshot())
    }

    /// Answer a query with the configured top-k values.
    pub async fn ask(&self, query: &str) -> Result<QaResult> {
        self.run(query, self.config.retriever_top_k, self.config.reader_top_k)
            .await
    }

    /// Answer a query.
    ///
    /// Retrieval and reading failures abort the query. Generation failures
    /// only leave `generated_answer` empty and add a warning.
    pub async fn run(&self, query: &str, retriever_top_k: usize, reader_top_k: usize) -> Result<QaResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("query must not be empty".to_string()));
        }
        if retriever_top_k == 0 || reader_top_k == 0 {
            return Err(Error::InvalidInput("top_k must be positive".to_string()));
        }

        let started = Instant::now();
        let snapshot = self.snapshot()?;

        let answers = {
            let candidates = self.retriever.retrieve(&snapshot, query, retriever_top_k)?;
            if candidates.is_empty() {
                debug!(units = snapshot.len(), "no candidates");
                return Ok(QaResult::default());
            }

            let units: Vec<&TextUnit> = candidates.iter().map(|c| c.unit).collect();
            self.reader.read(query, &units, reader_top_k)?
        };
        debug!(
            strategy = %self.retriever.strategy(),
            answers = answers.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "extraction finished"
        );

        let mut result = QaResult {
            answers,
            ..Default::default()
        };

        let generator = self
            .generator
            .as_deref()
            .filter(|_| self.config.generation_enabled && !result.answers.is_empty());
        if let Some(generator) = generator {
            let generated = self.generate(generator, query, &result.answers).await;
            match generated {
                Ok(text) => result.generated_answer = Some(text),
                Err(e) => {
                    warn!(model = generator.model_name(), error = %e, "generation failed");
                    result.warnings.push(e.to_string());
                }
            }
        }

        Ok(result)
    }

    async fn generate(&self, generator: &dyn Generator, query: &str, answers: &[Answer]) -> Result<String> {
        let context = answers
            .iter()
            .map(|a| a.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let prompt = answer_prompt(&context, query);

        let timeout = self.config.generation.timeout();
        tokio::time::timeout(timeout, generator.generate(&prompt))
            .await
            .map_err(|_| Error::GenerationTimeout(timeout))?
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, S>> {
        self.store
            .write()
            .map_err(|_| Error::Store("store lock poisoned".to_string()))
    }
}
