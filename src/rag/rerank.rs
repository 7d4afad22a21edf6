//! Second-stage reranking of retrieved candidates
//!
//! Stage one retrieves extra candidates by embedding similarity; the
//! reranker scores each candidate against the query text and the best
//! `n` survive.

use std::collections::{HashMap, HashSet};

/// Scores candidate passages against a query. Higher is more relevant.
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    /// One score per document, in document order
    fn score(&self, query: &str, documents: &[&str]) -> Vec<f32>;
}

/// Lowercased alphanumeric tokens
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// BM25 over the candidate set
#[derive(Debug, Clone)]
pub struct LexicalReranker {
    k1: f32,
    b: f32,
}

impl Default for LexicalReranker {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl Reranker for LexicalReranker {
    fn name(&self) -> &str {
        "bm25"
    }

    fn score(&self, query: &str, documents: &[&str]) -> Vec<f32> {
        if documents.is_empty() {
            return Vec::new();
        }

        let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
        let docs: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();
        let n = docs.len() as f32;
        let avg_len = (docs.iter().map(|d| d.len()).sum::<usize>() as f32 / n).max(1.0);

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for doc in &docs {
            let unique: HashSet<&str> = doc.iter().map(|t| t.as_str()).collect();
            for term in unique {
                if query_terms.contains(term) {
                    *doc_freq.entry(term).or_default() += 1;
                }
            }
        }

        docs.iter()
            .map(|doc| {
                let mut tf: HashMap<&str, usize> = HashMap::new();
                for term in doc {
                    if query_terms.contains(term.as_str()) {
                        *tf.entry(term.as_str()).or_default() += 1;
                    }
                }
                let len_norm = 1.0 - self.b + self.b * doc.len() as f32 / avg_len;
                tf.iter()
                    .map(|(term, &freq)| {
                        let df = doc_freq.get(term).copied().unwrap_or(0) as f32;
                        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                        let freq = freq as f32;
                        idf * freq * (self.k1 + 1.0) / (freq + self.k1 * len_norm)
                    })
                    .sum()
            })
            .collect()
    }
}

/// Indices of the `top_n` best documents with their scores, best first
///
/// Equal scores keep the incoming (embedding) order.
pub fn rerank(
    reranker: &dyn Reranker,
    query: &str,
    documents: &[&str],
    top_n: usize,
) -> Vec<(usize, f32)> {
    let scores = reranker.score(query, documents);
    let mut ranked: Vec<(usize, f32)> = scores.into_iter().enumerate().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(top_n);
    ranked
}
