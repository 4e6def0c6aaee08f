//! Answer generation
//!
//! After extraction, the answers can be handed to a text-generation service
//! that phrases a natural-language reply. Generation is best-effort: the
//! pipeline keeps its extracted answers whatever happens here.

use async_trait::async_trait;

use crate::Result;

/// Trait for text generation backends
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate text for a prompt
    ///
    /// Fails with [`Error::GenerationTimeout`](crate::Error::GenerationTimeout)
    /// or [`Error::GenerationUnavailable`](crate::Error::GenerationUnavailable).
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Returns the model name/identifier
    fn model_name(&self) -> &str;
}

/// Prompt asking the generator to answer from extracted context.
pub fn answer_prompt(context: &str, query: &str) -> String {
    format!("Based on the context: {context}, answer the question: {query}")
}

mod openai;

pub use openai::*;
