use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::chunk::TextUnit;
use crate::config::Bm25Params;
use crate::store::Snapshot;

/// Words of two or more word characters.
static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?u)\b\w\w+\b").expect("token pattern is valid"));

/// Split text into lowercase terms.
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Okapi BM25 scorer bound to one query and one snapshot.
///
/// Document frequencies and the average unit length are computed once at
/// construction; scoring a unit only tokenizes that unit.
#[derive(Debug, Clone)]
pub struct Bm25Scorer {
    /// Query terms with their idf, duplicates kept
    terms: Vec<(String, f32)>,
    avg_len: f32,
    params: Bm25Params,
}

impl Bm25Scorer {
    pub fn new(snapshot: &Snapshot, query: &str, params: Bm25Params) -> Self {
        let query_terms = tokenize(query);

        let mut doc_freq: HashMap<&str, usize> =
            query_terms.iter().map(|t| (t.as_str(), 0)).collect();
        let mut total_len = 0usize;

        for unit in snapshot.iter() {
            let tokens = tokenize(&unit.content);
            total_len += tokens.len();
            for (term, df) in doc_freq.iter_mut() {
                if tokens.iter().any(|t| t == term) {
                    *df += 1;
                }
            }
        }

        let n = snapshot.len();
        let avg_len = if n == 0 {
            0.0
        } else {
            total_len as f32 / n as f32
        };

        let terms = query_terms
            .iter()
            .map(|t| {
                let df = doc_freq.get(t.as_str()).copied().unwrap_or(0);
                (t.clone(), idf(n as f32, df))
            })
            .collect();

        Self {
            terms,
            avg_len,
            params,
        }
    }

    pub fn score(&self, unit: &TextUnit) -> f32 {
        if self.terms.is_empty() {
            return 0.0;
        }

        let tokens = tokenize(&unit.content);
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for token in &tokens {
            *tf.entry(token.as_str()).or_default() += 1;
        }

        let Bm25Params { k1, b } = self.params;
        let len_ratio = if self.avg_len > 0.0 {
            tokens.len() as f32 / self.avg_len
        } else {
            1.0
        };
        let norm = k1 * (1.0 - b + b * len_ratio);

        self.terms
            .iter()
            .map(|(term, idf)| {
                let f = tf.get(term.as_str()).copied().unwrap_or(0) as f32;
                idf * f * (k1 + 1.0) / (f + norm)
            })
            .sum()
    }
}

/// ln(1 + (N - df + 0.5) / (df + 0.5)), zero for terms absent from the corpus.
fn idf(total_units: f32, doc_freq: usize) -> f32 {
    if doc_freq == 0 {
        return 0.0;
    }
    let df = doc_freq as f32;
    let ratio = (total_units - df + 0.5) / (df + 0.5);
    (1.0 + ratio.max(0.0)).ln()
}

/// Map a BM25 score into (0, 1).
pub(crate) fn scale(score: f32) -> f32 {
    1.0 / (1.0 + (-score / 8.0).exp())
}
