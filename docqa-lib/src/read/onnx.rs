use std::path::Path;

use tokenizers::{Encoding, Tokenizer, TruncationParams, TruncationStrategy};
use tracing::debug;
use tract_onnx::prelude::*;

use crate::read::{ExtractiveModel, Span};
use crate::{Error, Result};

/// Type alias for the tract typed model
type QaPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Settings for [`OnnxQaModel`]
#[derive(Debug, Clone)]
pub struct OnnxQaConfig {
    /// Tokens per (question, passage) window
    pub max_length: usize,
    /// Passage tokens shared by consecutive windows of a long passage
    pub doc_stride: usize,
    /// Longest answer, in tokens
    pub max_answer_tokens: usize,
    /// Spans returned per passage
    pub spans_per_passage: usize,
    /// Feed `token_type_ids` as a third input (BERT-style models)
    pub token_type_ids: bool,
}

impl Default for OnnxQaConfig {
    fn default() -> Self {
        // roberta-base-squad2 settings
        Self {
            max_length: 384,
            doc_stride: 128,
            max_answer_tokens: 30,
            spans_per_passage: 3,
            token_type_ids: false,
        }
    }
}

/// Extractive QA transformer run with tract.
///
/// Expects a directory holding `model.onnx` (inputs `input_ids`,
/// `attention_mask` and optionally `token_type_ids`; outputs start and end
/// logits) and the matching `tokenizer.json`, e.g. an ONNX export of
/// `deepset/roberta-base-squad2`.
pub struct OnnxQaModel {
    plan: QaPlan,
    tokenizer: Tokenizer,
    config: OnnxQaConfig,
    name: String,
}

impl OnnxQaModel {
    /// Load model and tokenizer from a directory.
    pub fn load(dir: impl AsRef<Path>, config: OnnxQaConfig) -> Result<Self> {
        let dir = dir.as_ref();

        let plan = tract_onnx::onnx()
            .model_for_path(dir.join("model.onnx"))
            .map_err(|e| Error::Reader(format!("failed to load model: {e}")))?
            .into_optimized()
            .map_err(|e| Error::Reader(format!("failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| Error::Reader(format!("failed to plan model: {e}")))?;

        let mut tokenizer = Tokenizer::from_file(dir.join("tokenizer.json"))
            .map_err(|e| Error::Reader(format!("failed to load tokenizer: {e}")))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_length,
                stride: config.doc_stride,
                strategy: TruncationStrategy::OnlySecond,
                ..Default::default()
            }))
            .map_err(|e| Error::Reader(e.to_string()))?;

        let name = dir
            .file_name()
            .map_or_else(|| dir.display().to_string(), |n| n.to_string_lossy().into_owned());

        Ok(Self {
            plan,
            tokenizer,
            config,
            name,
        })
    }

    fn logits(&self, ids: &[i64], mask: &[i64], types: &[i64]) -> Result<(Vec<f32>, Vec<f32>)> {
        let shape = [1, ids.len()];
        let tensor = |data: &[i64]| {
            Tensor::from_shape(&shape, data).map_err(|e| Error::Reader(e.to_string()))
        };

        let mut inputs: TVec<TValue> = tvec![tensor(ids)?.into(), tensor(mask)?.into()];
        if self.config.token_type_ids {
            inputs.push(tensor(types)?.into());
        }

        let outputs = self
            .plan
            .run(inputs)
            .map_err(|e| Error::Reader(format!("inference failed: {e}")))?;
        if outputs.len() < 2 {
            return Err(Error::Reader(format!(
                "expected start and end logits, model returned {} output(s)",
                outputs.len()
            )));
        }

        let flatten = |value: &TValue| -> Result<Vec<f32>> {
            Ok(value
                .to_array_view::<f32>()
                .map_err(|e| Error::Reader(e.to_string()))?
                .iter()
                .copied()
                .collect())
        };
        Ok((flatten(&outputs[0])?, flatten(&outputs[1])?))
    }
}

impl ExtractiveModel for OnnxQaModel {
    fn extract(&self, query: &str, passage: &str) -> Result<Vec<Span>> {
        let windows = encode_windows(&self.tokenizer, query, passage)?;
        if windows.len() > 1 {
            debug!(windows = windows.len(), bytes = passage.len(), "passage split into windows");
        }

        let mut spans = Vec::new();
        for encoding in &windows {
            let widen = |values: &[u32]| values.iter().map(|&v| i64::from(v)).collect::<Vec<_>>();
            let ids = widen(encoding.get_ids());
            let mask = widen(encoding.get_attention_mask());
            let types = widen(encoding.get_type_ids());

            let (start_logits, end_logits) = self.logits(&ids, &mask, &types)?;
            spans.extend(decode_spans(
                &start_logits,
                &end_logits,
                &context_tokens(encoding),
                &self.config,
            ));
        }

        Ok(best_disjoint(spans, self.config.spans_per_passage)
            .into_iter()
            .map(|(start, end, score)| Span {
                text: passage.get(start..end).unwrap_or_default().to_string(),
                score,
                start,
                end,
            })
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Encode a (question, passage) pair, one encoding per passage window.
///
/// Passages longer than the truncation limit continue in the overflowing
/// encodings, each repeating the question.
fn encode_windows(tokenizer: &Tokenizer, query: &str, passage: &str) -> Result<Vec<Encoding>> {
    let mut encoding = tokenizer
        .encode((query, passage), true)
        .map_err(|e| Error::Reader(format!("tokenization failed: {e}")))?;

    let overflowing = encoding.take_overflowing();
    let mut windows = Vec::with_capacity(1 + overflowing.len());
    windows.push(encoding);
    windows.extend(overflowing);
    Ok(windows)
}

/// Passage tokens of one window with their byte offsets.
fn context_tokens(encoding: &Encoding) -> Vec<(usize, (usize, usize))> {
    encoding
        .get_sequence_ids()
        .into_iter()
        .zip(encoding.get_offsets())
        .enumerate()
        .filter(|(_, (seq, (start, end)))| *seq == Some(1) && end > start)
        .map(|(i, (_, offsets))| (i, *offsets))
        .collect()
}

/// Pick the best answer spans from start/end logits.
///
/// Start and end probabilities are softmaxed over passage tokens only; a
/// span scores `p_start * p_end`. Overlapping spans lose to better ones.
///
/// # Returns
/// `(byte start, byte end, score)` triples, best first
fn decode_spans(
    start_logits: &[f32],
    end_logits: &[f32],
    context: &[(usize, (usize, usize))],
    config: &OnnxQaConfig,
) -> Vec<(usize, usize, f32)> {
    let in_range = |i: usize| i < start_logits.len() && i < end_logits.len();
    let context: Vec<_> = context.iter().copied().filter(|(i, _)| in_range(*i)).collect();
    if context.is_empty() {
        return Vec::new();
    }

    let p_start = softmax(context.iter().map(|(i, _)| start_logits[*i]));
    let p_end = softmax(context.iter().map(|(i, _)| end_logits[*i]));

    let mut pairs = Vec::new();
    for s in 0..context.len() {
        let last = (s + config.max_answer_tokens).min(context.len());
        for e in s..last {
            pairs.push((s, e, p_start[s] * p_end[e]));
        }
    }
    let chosen = best_disjoint(pairs, config.spans_per_passage);

    chosen
        .into_iter()
        .map(|(s, e, score)| (context[s].1 .0, context[e].1 .1, score))
        .collect()
}

/// Highest-scoring ranges that do not overlap a better one, best first.
///
/// Ranges are `(start, end, score)` triples; ranges that touch count as
/// overlapping. NaN scores are skipped.
fn best_disjoint(mut ranges: Vec<(usize, usize, f32)>, limit: usize) -> Vec<(usize, usize, f32)> {
    ranges.retain(|r| !r.2.is_nan());
    ranges.sort_by(|a, b| b.2.total_cmp(&a.2));

    let mut chosen: Vec<(usize, usize, f32)> = Vec::new();
    for (s, e, score) in ranges {
        if chosen.len() == limit {
            break;
        }
        let overlaps = chosen.iter().any(|&(cs, ce, _)| s <= ce && cs <= e);
        if !overlaps {
            chosen.push((s, e, score));
        }
    }
    chosen
}

fn softmax(logits: impl Iterator<Item = f32>) -> Vec<f32> {
    let logits: Vec<f32> = logits.collect();
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(spans: usize) -> OnnxQaConfig {
        OnnxQaConfig {
            spans_per_passage: spans,
            max_answer_tokens: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax([1.0, 2.0, 3.0].into_iter());
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(p[2] > p[1] && p[1] > p[0]);
    }

    #[test]
    fn test_decode_best_span() {
        // tokens 0..=1 are question/special, 2..=5 are passage "aa bb cc dd"
        let start = [9.0, 9.0, 0.0, 5.0, 0.0, 0.0];
        let end = [9.0, 9.0, 0.0, 0.0, 5.0, 0.0];
        let context = [(2, (0, 2)), (3, (3, 5)), (4, (6, 8)), (5, (9, 11))];

        let spans = decode_spans(&start, &end, &context, &config(1));
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].0, spans[0].1), (3, 8));
        assert!(spans[0].2 > 0.5 && spans[0].2 <= 1.0);
    }

    #[test]
    fn test_decode_skips_overlapping_spans() {
        let start = [0.0, 5.0, 0.0, 4.0];
        let end = [0.0, 5.0, 0.0, 4.0];
        let context = [(0, (0, 1)), (1, (2, 3)), (2, (4, 5)), (3, (6, 7))];

        let spans = decode_spans(&start, &end, &context, &config(2));
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].0, spans[0].1), (2, 3));
        assert_eq!((spans[1].0, spans[1].1), (6, 7));
    }

    #[test]
    fn test_decode_respects_max_answer_tokens() {
        // start strongly at 0, end strongly at 4: too long for 3 tokens
        let start = [9.0, 0.0, 0.0, 0.0, 0.0];
        let end = [0.0, 0.0, 0.0, 0.0, 9.0];
        let context: Vec<_> = (0..5).map(|i| (i, (i * 2, i * 2 + 1))).collect();

        let spans = decode_spans(&start, &end, &context, &config(1));
        let (s, e, _) = spans[0];
        assert!(e - s <= 5);
    }

    #[test]
    fn test_decode_empty_context() {
        assert!(decode_spans(&[1.0], &[1.0], &[], &config(3)).is_empty());
    }

    #[test]
    fn test_best_disjoint_merges_windows() {
        // the same span found by two overlapping windows is kept once
        let ranges = vec![(10, 14, 0.6), (0, 3, f32::NAN), (10, 14, 0.8), (20, 25, 0.5)];
        assert_eq!(best_disjoint(ranges, 3), vec![(10, 14, 0.8), (20, 25, 0.5)]);
    }

    fn word_tokenizer(words: &[&str], max_length: usize, doc_stride: usize) -> Tokenizer {
        let mut vocab = serde_json::Map::new();
        vocab.insert("[UNK]".to_string(), 0.into());
        for (i, word) in words.iter().enumerate() {
            vocab.insert(word.to_string(), (i + 1).into());
        }
        let json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": { "type": "WordLevel", "vocab": vocab, "unk_token": "[UNK]" }
        });

        let mut tokenizer = Tokenizer::from_bytes(json.to_string()).unwrap();
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                stride: doc_stride,
                strategy: TruncationStrategy::OnlySecond,
                ..Default::default()
            }))
            .unwrap();
        tokenizer
    }

    #[test]
    fn test_long_passage_is_read_in_windows() {
        let passage = "a b c d e f g h port 8080";
        let words: Vec<&str> = "where port a b c d e f g h 8080".split(' ').collect();
        let tokenizer = word_tokenizer(&words, 6, 1);

        let windows = encode_windows(&tokenizer, "where port", passage).unwrap();
        assert!(windows.len() > 1);

        let window_end = |encoding: &Encoding| {
            context_tokens(encoding).iter().map(|(_, (_, end))| *end).max().unwrap_or(0)
        };
        assert!(window_end(&windows[0]) < passage.len());
        assert_eq!(windows.iter().map(window_end).max(), Some(passage.len()));

        // every window repeats the question
        for encoding in &windows {
            let question = encoding.get_sequence_ids().into_iter().filter(|s| *s == Some(0)).count();
            assert_eq!(question, 2);
        }
    }

    #[test]
    fn test_short_passage_is_one_window() {
        let tokenizer = word_tokenizer(&["where", "port", "8080"], 16, 4);
        let windows = encode_windows(&tokenizer, "where port", "port 8080").unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(context_tokens(&windows[0]).len(), 2);
    }

    #[test]
    #[ignore] // Requires an exported model, set DOCQA_QA_MODEL_DIR
    fn test_answers_from_passage() {
        let dir = std::env::var("DOCQA_QA_MODEL_DIR").unwrap();
        let model = OnnxQaModel::load(dir, OnnxQaConfig::default()).unwrap();

        let passage = "The port can be changed in config.yaml under the server section.";
        let spans = model.extract("Where can the port be changed?", passage).unwrap();

        assert!(!spans.is_empty());
        assert!(passage.contains(&spans[0].text));
        assert!(spans[0].text.contains("config.yaml"));
    }
}
