use crate::chunk::{Chunker, TextUnit, UnitMetadata};
use crate::{Error, Result};

/// Fixed-size chunker - splits by word count
///
/// Content that fits in one window becomes a single unit. Longer content is
/// cut into windows of `chunk_size` words, each starting `chunk_size - overlap`
/// words after the previous one. Unit content is sliced from the source, so
/// whitespace inside a window is preserved.
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl FixedSizeChunker {
    /// Create a chunker, rejecting windows that could not make progress.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidInput("chunk_size must be positive".to_string()));
        }
        if overlap >= chunk_size {
            return Err(Error::InvalidInput(format!(
                "overlap ({overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, overlap })
    }
}

impl Default for FixedSizeChunker {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            overlap: 0,
        }
    }
}

impl Chunker for FixedSizeChunker {
    fn name(&self) -> &str {
        "fixed"
    }

    fn chunk(&self, content: &str, mut metadata: UnitMetadata) -> Vec<TextUnit> {
        let words = word_spans(content);
        if words.is_empty() {
            return Vec::new();
        }

        let size = self.chunk_size.max(1);
        let stride = size.saturating_sub(self.overlap).max(1);

        // window boundaries as (first word, one past last word)
        let mut windows = Vec::new();
        let mut first = 0;
        loop {
            let last = (first + size).min(words.len());
            windows.push((first, last));
            if last == words.len() {
                break;
            }
            first += stride;
        }

        metadata.total_chunks = Some(windows.len());

        windows
            .into_iter()
            .map(|(first, last)| {
                let start = words[first].0;
                let end = words[last - 1].1;

                let mut m = metadata.clone();
                m.position = start;

                TextUnit::new(&content[start..end], m)
            })
            .collect()
    }
}

/// Byte ranges of whitespace-separated words.
fn word_spans(content: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;

    for (i, c) in content.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, content.len()));
    }

    spans
}
