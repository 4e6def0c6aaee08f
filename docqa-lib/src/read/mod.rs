//! Extractive reading
//!
//! The reader hands (query, passage) pairs to an [`ExtractiveModel`] and turns
//! the spans it finds into [`Answer`]s ranked across all passages.
//!
//! Models:
//! - [`TermOverlapModel`]: picks sentences that share terms with the query,
//!   needs no model files
//! - [`OnnxQaModel`]: a SQuAD-style transformer exported to ONNX
//!
//! # Usage
//!
//! ```ignore
//! use docqa_lib::read::{Reader, TermOverlapModel};
//!
//! let reader = Reader::new(TermOverlapModel::default());
//! let units: Vec<&TextUnit> = candidates.iter().map(|c| c.unit).collect();
//! let answers = reader.read("How do I change the port?", &units, 3)?;
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chunk::TextUnit;
use crate::{Error, Result};

/// An answer span reported by a model, with byte offsets into the passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    /// Confidence, expected in [0, 1]
    pub score: f32,
    pub start: usize,
    pub end: usize,
}

/// Trait for extractive question answering models
pub trait ExtractiveModel: Send + Sync {
    /// Find answer spans for the query in one passage
    fn extract(&self, query: &str, passage: &str) -> Result<Vec<Span>>;

    /// Find answer spans in several passages
    ///
    /// Returns one span list per passage, in passage order. Models that can
    /// batch inference should override this.
    fn extract_batch(&self, query: &str, passages: &[&str]) -> Result<Vec<Vec<Span>>> {
        passages.iter().map(|p| self.extract(query, p)).collect()
    }

    /// Returns the model name/identifier
    fn name(&self) -> &str;
}

/// An extracted answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Literal text from the source unit
    pub text: String,
    /// Confidence in [0, 1]
    pub score: f32,
    /// Id of the unit the answer was taken from
    pub source_id: String,
    /// Source file of that unit
    pub source: Option<String>,
    /// Byte offsets of the answer within the unit
    pub start: usize,
    pub end: usize,
    /// The answer with some surrounding unit text
    pub context: String,
}

/// Runs an extractive model over candidate units
pub struct Reader<M: ExtractiveModel> {
    model: M,
    batch_size: usize,
    context_window: usize,
}

impl<M: ExtractiveModel> Reader<M> {
    #[must_use]
    pub fn new(model: M) -> Self {
        Self {
            model,
            batch_size: 16,
            context_window: 150,
        }
    }

    /// Passages per model invocation
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Bytes of unit text kept on each side of an answer
    #[must_use]
    pub fn with_context_window(mut self, context_window: usize) -> Self {
        self.context_window = context_window;
        self
    }

    /// Returns a reference to the model.
    #[must_use]
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Extract and rank answers from the given units.
    ///
    /// # Returns
    /// At most `top_k` answers sorted by score (highest first). No span in
    /// any unit gives an empty list.
    pub fn read(&self, query: &str, units: &[&TextUnit], top_k: usize) -> Result<Vec<Answer>> {
        let mut answers = Vec::new();

        for batch in units.chunks(self.batch_size) {
            let passages: Vec<&str> = batch.iter().map(|u| u.content.as_str()).collect();
            let spans = self.model.extract_batch(query, &passages)?;
            if spans.len() != batch.len() {
                return Err(Error::Reader(format!(
                    "model returned span lists for {} of {} passages",
                    spans.len(),
                    batch.len()
                )));
            }

            for (unit, spans) in batch.iter().zip(spans) {
                answers.extend(spans.into_iter().filter_map(|span| self.to_answer(unit, span)));
            }
        }

        // stable sort: ties keep candidate order
        answers.sort_by(|a, b| b.score.total_cmp(&a.score));
        answers.truncate(top_k);

        debug!(model = self.model.name(), units = units.len(), answers = answers.len(), "read");
        Ok(answers)
    }

    fn to_answer(&self, unit: &TextUnit, span: Span) -> Option<Answer> {
        let content = unit.content.as_str();
        let valid = span.start < span.end
            && span.end <= content.len()
            && content.is_char_boundary(span.start)
            && content.is_char_boundary(span.end);
        if !valid {
            warn!(
                unit = %unit.id,
                start = span.start,
                end = span.end,
                "dropping span outside passage"
            );
            return None;
        }
        if span.score.is_nan() {
            warn!(unit = %unit.id, start = span.start, end = span.end, "dropping span without a score");
            return None;
        }

        let context_start = floor_char_boundary(content, span.start.saturating_sub(self.context_window));
        let context_end = ceil_char_boundary(content, span.end.saturating_add(self.context_window));

        Some(Answer {
            text: content[span.start..span.end].to_string(),
            score: span.score.clamp(0.0, 1.0),
            source_id: unit.id.clone(),
            source: unit.metadata.source.clone(),
            start: span.start,
            end: span.end,
            context: content[context_start..context_end].to_string(),
        })
    }
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    (0..=index).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}

fn ceil_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    (index..s.len()).find(|&i| s.is_char_boundary(i)).unwrap_or(s.len())
}

mod onnx;
mod overlap;

pub use onnx::*;
pub use overlap::*;
