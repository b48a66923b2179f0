//! In-memory Okapi BM25 index over memory text, with incremental add/remove.
//!
//! SQLite FTS5's built-in `bm25()` ranking remains in the schema for fast
//! `LIKE`/prefix lookups (`Store::fts_search`), but the independently tunable
//! `k1`/`b` ranking the retriever fuses against requires an explicit
//! postings index, not the one FTS5 computes internally.

use std::collections::HashMap;
use std::sync::Mutex;

/// BM25 tunables, with the defaults used when none are configured.
#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

#[derive(Debug, Default)]
struct Posting {
    /// term frequency per document id
    term_freq: HashMap<i64, u32>,
}

/// Incremental BM25 postings index over the concatenation of
/// `content`/`rationale`/`context`/`tags`/`file_path`.
pub struct LexicalIndex {
    inner: Mutex<Inner>,
}

struct Inner {
    params: Bm25Params,
    postings: HashMap<String, Posting>,
    doc_lengths: HashMap<i64, usize>,
    total_doc_length: u64,
    doc_count: usize,
}

impl LexicalIndex {
    pub fn new(params: Bm25Params) -> Self {
        Self {
            inner: Mutex::new(Inner {
                params,
                postings: HashMap::new(),
                doc_lengths: HashMap::new(),
                total_doc_length: 0,
                doc_count: 0,
            }),
        }
    }

    /// Tokenize and index `doc` for `id`, replacing any prior content for it.
    pub fn add(&self, id: i64, doc: &str) {
        let tokens = tokenize(doc);
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.doc_lengths.contains_key(&id) {
            remove_doc(&mut inner, id);
        }
        let len = tokens.len();
        let mut freqs: HashMap<String, u32> = HashMap::new();
        for t in tokens {
            *freqs.entry(t).or_default() += 1;
        }
        for (term, freq) in freqs {
            inner
                .postings
                .entry(term)
                .or_default()
                .term_freq
                .insert(id, freq);
        }
        inner.doc_lengths.insert(id, len);
        inner.total_doc_length += len as u64;
        inner.doc_count += 1;
    }

    /// Lazily evict `id`'s postings. A no-op if `id` was never added.
    pub fn remove(&self, id: i64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.doc_lengths.contains_key(&id) {
            remove_doc(&mut inner, id);
        }
    }

    /// Ranked `(id, score)` pairs for `query`, highest first, truncated to `top_k`.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(i64, f64)> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.doc_count == 0 {
            return Vec::new();
        }
        let avg_len = inner.total_doc_length as f64 / inner.doc_count as f64;
        let query_terms = tokenize(query);

        let mut scores: HashMap<i64, f64> = HashMap::new();
        for term in &query_terms {
            let Some(posting) = inner.postings.get(term) else {
                continue;
            };
            let n_q = posting.term_freq.len() as f64;
            // BM25 IDF, Robertson/Sparck-Jones form with +1 smoothing to stay
            // non-negative even when a term appears in every document.
            let idf = ((inner.doc_count as f64 - n_q + 0.5) / (n_q + 0.5) + 1.0).ln();

            for (&doc_id, &tf) in &posting.term_freq {
                let doc_len = *inner.doc_lengths.get(&doc_id).unwrap_or(&0) as f64;
                let tf = tf as f64;
                let denom = tf + inner.params.k1 * (1.0 - inner.params.b + inner.params.b * doc_len / avg_len);
                let score = idf * (tf * (inner.params.k1 + 1.0)) / denom.max(f64::EPSILON);
                *scores.entry(doc_id).or_default() += score;
            }
        }

        let mut ranked: Vec<(i64, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_k);
        ranked
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).doc_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn remove_doc(inner: &mut Inner, id: i64) {
    if let Some(len) = inner.doc_lengths.remove(&id) {
        inner.total_doc_length = inner.total_doc_length.saturating_sub(len as u64);
        inner.doc_count = inner.doc_count.saturating_sub(1);
    }
    inner.postings.retain(|_, posting| {
        posting.term_freq.remove(&id);
        !posting.term_freq.is_empty()
    });
}

/// Lowercase, split on non-alphanumeric boundaries. Deliberately simple —
/// stemming/stopwording is left to FTS5's porter tokenizer for the
/// secondary lookups; this index only needs consistent term identity.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_exact_term_match_first() {
        let idx = LexicalIndex::new(Bm25Params::default());
        idx.add(1, "use JWT for authentication endpoints");
        idx.add(2, "PostgreSQL stores session data");
        idx.add(3, "rate limit auth endpoints to stop brute force");

        let results = idx.search("auth endpoints", 10);
        assert!(!results.is_empty());
        let ids: Vec<i64> = results.iter().map(|(id, _)| *id).collect();
        assert!(ids.contains(&1));
        assert!(ids.contains(&3));
        assert!(!ids.contains(&2));
    }

    #[test]
    fn remove_evicts_postings() {
        let idx = LexicalIndex::new(Bm25Params::default());
        idx.add(1, "cache session tokens");
        assert_eq!(idx.len(), 1);
        idx.remove(1);
        assert_eq!(idx.len(), 0);
        assert!(idx.search("cache", 10).is_empty());
    }

    #[test]
    fn re_adding_replaces_prior_content() {
        let idx = LexicalIndex::new(Bm25Params::default());
        idx.add(1, "alpha beta");
        idx.add(1, "gamma delta");
        assert!(idx.search("alpha", 10).is_empty());
        assert!(!idx.search("gamma", 10).is_empty());
    }

    #[test]
    fn top_k_truncates() {
        let idx = LexicalIndex::new(Bm25Params::default());
        for i in 0..10 {
            idx.add(i, "shared term across every document");
        }
        let results = idx.search("shared", 3);
        assert_eq!(results.len(), 3);
    }
}
