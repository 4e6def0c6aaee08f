use std::collections::HashSet;

use crate::read::{ExtractiveModel, Span};
use crate::retrieve::tokenize;
use crate::Result;

/// Function words ignored when matching query terms.
const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "by", "can", "could", "did", "do", "does",
    "for", "from", "has", "have", "how", "if", "in", "is", "it", "its", "me", "my", "of", "on",
    "or", "should", "so", "that", "the", "their", "there", "this", "to", "was", "we", "were",
    "what", "when", "where", "which", "who", "why", "will", "with", "would", "you", "your",
];

/// Sentence-level extractive model without learned weights.
///
/// Each sentence of the passage is scored by the share of query terms it
/// contains, weighted by term length so that specific terms count more than
/// short generic ones. Terms of four or more characters also match as word
/// prefixes ("change" matches "changed").
#[derive(Debug, Clone)]
pub struct TermOverlapModel {
    /// Spans returned per passage
    pub max_spans: usize,
}

impl Default for TermOverlapModel {
    fn default() -> Self {
        Self { max_spans: 3 }
    }
}

impl TermOverlapModel {
    fn query_terms(query: &str) -> Vec<String> {
        let tokens = tokenize(query);
        let content: Vec<&String> = tokens
            .iter()
            .filter(|t| !STOPWORDS.contains(&t.as_str()))
            .collect();
        // a query made only of stopwords still matches on its words
        let chosen = if content.is_empty() {
            tokens.iter().collect()
        } else {
            content
        };

        let mut seen: HashSet<&String> = HashSet::new();
        chosen
            .into_iter()
            .filter(|t| seen.insert(*t))
            .cloned()
            .collect()
    }
}

impl ExtractiveModel for TermOverlapModel {
    fn extract(&self, query: &str, passage: &str) -> Result<Vec<Span>> {
        let terms = Self::query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let total_weight: usize = terms.iter().map(|t| t.chars().count()).sum();

        let mut spans: Vec<Span> = sentences(passage)
            .into_iter()
            .filter_map(|(start, end)| {
                let words = tokenize(&passage[start..end]);
                let matched: usize = terms
                    .iter()
                    .filter(|term| words.iter().any(|w| term_matches(term, w)))
                    .map(|term| term.chars().count())
                    .sum();
                (matched > 0).then(|| Span {
                    text: passage[start..end].to_string(),
                    score: matched as f32 / total_weight as f32,
                    start,
                    end,
                })
            })
            .collect();

        spans.sort_by(|a, b| b.score.total_cmp(&a.score));
        spans.truncate(self.max_spans);
        Ok(spans)
    }

    fn name(&self) -> &str {
        "term-overlap"
    }
}

fn term_matches(term: &str, word: &str) -> bool {
    word == term || (term.chars().count() >= 4 && word.starts_with(term))
}

/// Byte ranges of sentences, trimmed of surrounding whitespace.
///
/// A sentence ends at a newline, or at `.`, `?` or `!` followed by whitespace
/// or the end of the text, so dotted names like `config.yaml` stay whole.
fn sentences(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '\n' => Some(i),
            '.' | '?' | '!' => match chars.peek() {
                None => Some(i + c.len_utf8()),
                Some(&(_, next)) if next.is_whitespace() => Some(i + c.len_utf8()),
                Some(_) => None,
            },
            _ => None,
        };
        if let Some(end) = boundary {
            push_trimmed(text, start, end, &mut ranges);
            start = end;
        }
    }
    push_trimmed(text, start, text.len(), &mut ranges);

    ranges
}

fn push_trimmed(text: &str, start: usize, end: usize, ranges: &mut Vec<(usize, usize)>) {
    let slice = &text[start..end];
    let trimmed_start = slice.len() - slice.trim_start().len();
    let trimmed_end = slice.trim_end().len();
    if trimmed_start < trimmed_end {
        ranges.push((start + trimmed_start, start + trimmed_end));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "The port can be changed in config.yaml under the server section.";

    #[test]
    fn test_sentences() {
        let text = "First one. Second, with config.yaml!\nThird line\n\n  Last?";
        let found: Vec<&str> = sentences(text).into_iter().map(|(s, e)| &text[s..e]).collect();
        assert_eq!(
            found,
            vec!["First one.", "Second, with config.yaml!", "Third line", "Last?"]
        );
    }

    #[test]
    fn test_query_terms_drop_stopwords() {
        assert_eq!(
            TermOverlapModel::query_terms("How do I change the port? The PORT!"),
            vec!["change", "port"]
        );
        assert_eq!(TermOverlapModel::query_terms("what is it"), vec!["what", "is", "it"]);
    }

    #[test]
    fn test_finds_answer_sentence() {
        let model = TermOverlapModel::default();
        let spans = model.extract("How do I change the port?", DOC).unwrap();

        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, DOC);
        assert_eq!(&DOC[spans[0].start..spans[0].end], spans[0].text);
        assert!((spans[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ranks_sentences_by_weighted_overlap() {
        let passage = "Restart the server after editing. The port lives in config.yaml. Nothing here.";
        let model = TermOverlapModel::default();
        let spans = model.extract("Which port does the server use?", passage).unwrap();

        assert_eq!(spans.len(), 2);
        // "server" (6) outweighs "port" (4)
        assert_eq!(spans[0].text, "Restart the server after editing.");
        assert_eq!(spans[1].text, "The port lives in config.yaml.");
        assert!(spans.iter().all(|s| s.score > 0.0 && s.score <= 1.0));
    }

    #[test]
    fn test_no_overlap_no_spans() {
        let model = TermOverlapModel::default();
        assert!(model.extract("bananas?", DOC).unwrap().is_empty());
        assert!(model.extract("?!", DOC).unwrap().is_empty());
    }

    #[test]
    fn test_max_spans() {
        let model = TermOverlapModel { max_spans: 1 };
        let spans = model.extract("port", "port one. port two. port three.").unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "port one.");
    }
}
