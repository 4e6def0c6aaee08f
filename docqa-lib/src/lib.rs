//! docqa - extractive question answering over local text files
//!
//! # Architecture
//!
//! ```text
//! Files -> Indexer -> Chunker -> Store
//!                                  |
//!                              Snapshot
//!                                  |
//! Query -> Retriever (BM25 | dense) -> Reader -> Answers
//!                                                  |
//!                                     Generator (optional)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docqa_lib::{config::PipelineConfig, pipeline::Pipeline, read::TermOverlapModel};
//!
//! let pipeline = Pipeline::new(PipelineConfig::default(), TermOverlapModel::default())?;
//!
//! // Index a document
//! pipeline.index_text(
//!     Some("server.txt"),
//!     "The port can be changed in config.yaml under the server section.",
//! )?;
//!
//! // Ask
//! let result = pipeline.ask("How do I change the port?").await?;
//! println!("{}", result.answers[0].text);
//! ```

pub mod chunk;
pub mod config;
pub mod embed;
pub mod error;
pub mod generate;
pub mod index;
pub mod pipeline;
pub mod read;
pub mod retrieve;
pub mod store;

pub use error::{Error, Result};
