//! FeedbackEngine — the outcome/importance loop.
//!
//! A periodic-maintenance-over-storage component in the same shape as the
//! rest of this engine's maintenance passes: EWMA importance update and
//! fact-promotion counters driven entirely off recorded outcomes. Like
//! `graph::GraphEngine::detect_communities`, these operations take the data
//! they need as parameters rather than owning `Store`/`VectorIndex`
//! themselves — the `memories` table has no vector column, so vector-based
//! steps (`surprise`, the cosine half of `cleanup`) always receive vectors
//! from the caller, which is the only component holding both `Store` and
//! `VectorIndex` at once.

use std::collections::HashMap;

use crate::embeddings::cosine_similarity;
use crate::error::Result;
use crate::memory::{Category, Fact, Memory, MemoryFilter};
use crate::search::content_key;
use crate::storage::Store;

/// Outcomes of a `reflect.outcome` call: whether a fact got promoted.
#[derive(Debug, Clone)]
pub struct OutcomeResult {
    pub new_importance: f64,
    pub promoted_fact: Option<Fact>,
}

pub struct FeedbackEngine {
    fact_promotion_threshold: u32,
}

impl FeedbackEngine {
    pub fn new(fact_promotion_threshold: u32) -> Self {
        Self {
            fact_promotion_threshold,
        }
    }

    /// Records an outcome and folds it into importance via EWMA:
    /// `imp <- 0.7*imp + 0.3*(worked ? 1.0 : 0.2)`. A learning that has now
    /// succeeded `fact_promotion_threshold` times is promoted to a
    /// standalone fact.
    pub fn record_outcome(
        &self,
        store: &Store,
        id: i64,
        worked: bool,
        text: Option<String>,
    ) -> Result<OutcomeResult> {
        store.record_outcome(id, worked, text)?;

        let memory = store
            .get_memory(id)?
            .ok_or_else(|| crate::error::EngineError::NotFound(format!("memory {id}")))?;

        let new_importance = 0.7 * memory.importance_score + 0.3 * if worked { 1.0 } else { 0.2 };
        store.set_importance(id, new_importance)?;

        let mut promoted_fact = None;
        if worked && memory.category == Category::Learning {
            let key = content_key(&memory);
            let count = store.increment_success(&key)?;
            if count >= self.fact_promotion_threshold && store.find_fact(&key)?.is_none() {
                let fact_id = store.promote_fact(id, &key, &memory.content)?;
                promoted_fact = store.find_fact(&key)?.filter(|f| f.id == fact_id);
            }
        }

        Ok(OutcomeResult {
            new_importance,
            promoted_fact,
        })
    }

    /// Selects prune candidates without deleting them: archived, or
    /// non-pinned decisions/learnings past `older_than_days` with low
    /// importance and little recall history. Pinned memories are never
    /// candidates.
    pub fn prune_candidates(&self, store: &Store, older_than_days: i64) -> Result<Vec<Memory>> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(older_than_days);
        let all = store.iter_memories(&MemoryFilter {
            include_archived: true,
            ..Default::default()
        })?;

        Ok(all
            .into_iter()
            .filter(|m| {
                if m.archived {
                    return true;
                }
                if m.pinned {
                    return false;
                }
                let stale_category = matches!(m.category, Category::Decision | Category::Learning);
                stale_category
                    && m.transaction_time < cutoff
                    && m.importance_score < 0.3
                    && m.recall_count < 2
            })
            .collect())
    }

    /// Runs `prune_candidates` and, unless `dry_run`, deletes each one.
    /// Always returns the candidate list so callers can report what would
    /// or did happen.
    pub fn prune(&self, store: &Store, older_than_days: i64, dry_run: bool) -> Result<Vec<Memory>> {
        let candidates = self.prune_candidates(store, older_than_days)?;
        if !dry_run {
            for candidate in &candidates {
                store.delete_memory(candidate.id)?;
            }
        }
        Ok(candidates)
    }

    /// Finds near-duplicate pairs: tag Jaccard >= 0.6, cosine >= 0.9, same
    /// `file_path`. Keeps the higher-`importance_score` memory, merging the
    /// loser's `recall_count` into it. Returns `(survivor, removed)` pairs.
    /// `dry_run` still returns the pairs that would be merged.
    pub fn cleanup(
        &self,
        store: &Store,
        vectors: &HashMap<i64, Vec<f32>>,
        dry_run: bool,
    ) -> Result<Vec<(i64, i64)>> {
        let memories = store.iter_memories(&MemoryFilter::default())?;
        let mut merged = Vec::new();
        let mut removed: std::collections::HashSet<i64> = std::collections::HashSet::new();

        for i in 0..memories.len() {
            if removed.contains(&memories[i].id) {
                continue;
            }
            for j in (i + 1)..memories.len() {
                let (a, b) = (&memories[i], &memories[j]);
                if removed.contains(&b.id) || a.file_path.is_none() || a.file_path != b.file_path {
                    continue;
                }
                if jaccard(&a.tags, &b.tags) < 0.6 {
                    continue;
                }
                let (Some(va), Some(vb)) = (vectors.get(&a.id), vectors.get(&b.id)) else {
                    continue;
                };
                if cosine_similarity(va, vb) < 0.9 {
                    continue;
                }

                let (survivor, loser) = if a.importance_score >= b.importance_score {
                    (a, b)
                } else {
                    (b, a)
                };
                merged.push((survivor.id, loser.id));
                removed.insert(loser.id);
                if !dry_run {
                    store.merge_duplicate(survivor.id, loser.id)?;
                }
            }
        }

        Ok(merged)
    }
}

/// Surprise score at insertion time: `1 - max(cosine(new, existing))` over
/// the `k` nearest already-indexed vectors. Uses `max`, not mean: one very
/// similar prior memory should suppress surprise even if most others are
/// unrelated.
pub fn surprise(vector_index: &crate::search::VectorIndex, new_vector: &[f32], k: usize) -> f64 {
    match vector_index.search(new_vector, k) {
        Ok(neighbors) => {
            let max_similarity = neighbors
                .iter()
                .map(|(_, score)| *score)
                .fold(f32::MIN, f32::max);
            if max_similarity == f32::MIN {
                1.0
            } else {
                (1.0 - max_similarity as f64).clamp(0.0, 1.0)
            }
        }
        Err(_) => 1.0,
    }
}

fn jaccard(a: &std::collections::BTreeSet<String>, b: &std::collections::BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDraft;
    use std::collections::BTreeSet;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    fn draft(content: &str, category: &str) -> MemoryDraft {
        MemoryDraft {
            category: category.into(),
            content: content.into(),
            rationale: None,
            context: None,
            tags: vec![],
            file_path: None,
            entities: vec![],
            happened_at: None,
            pinned: false,
        }
    }

    #[test]
    fn ewma_importance_rewards_success_and_punishes_failure() {
        let (_dir, store) = temp_store();
        let id = store.put_memory(draft("retry with backoff", "learning")).unwrap();
        let engine = FeedbackEngine::new(3);

        let result = engine.record_outcome(&store, id, true, None).unwrap();
        assert!((result.new_importance - (0.7 * 0.5 + 0.3)).abs() < 1e-9);

        let result = engine.record_outcome(&store, id, false, None).unwrap();
        let expected = 0.7 * (0.7 * 0.5 + 0.3) + 0.3 * 0.2;
        assert!((result.new_importance - expected).abs() < 1e-9);
    }

    #[test]
    fn fact_promotion_fires_at_threshold() {
        let (_dir, store) = temp_store();
        let id = store.put_memory(draft("always validate input", "learning")).unwrap();
        let engine = FeedbackEngine::new(2);

        let first = engine.record_outcome(&store, id, true, None).unwrap();
        assert!(first.promoted_fact.is_none());
        let second = engine.record_outcome(&store, id, true, None).unwrap();
        assert!(second.promoted_fact.is_some());
    }

    #[test]
    fn prune_respects_pinned_memories() {
        let (_dir, store) = temp_store();
        let mut pinned_draft = draft("keep me forever", "decision");
        pinned_draft.pinned = true;
        let pinned_id = store.put_memory(pinned_draft).unwrap();
        store.set_importance(pinned_id, 0.0).unwrap();

        let engine = FeedbackEngine::new(3);
        let candidates = engine.prune_candidates(&store, 0).unwrap();
        assert!(!candidates.iter().any(|m| m.id == pinned_id));
    }

    #[test]
    fn prune_dry_run_does_not_delete() {
        let (_dir, store) = temp_store();
        let id = store.put_memory(draft("stale decision", "decision")).unwrap();
        store.set_importance(id, 0.1).unwrap();

        let engine = FeedbackEngine::new(3);
        let candidates = engine.prune(&store, -1, true).unwrap();
        assert!(candidates.iter().any(|m| m.id == id));
        assert!(store.get_memory(id).unwrap().is_some());
    }

    #[test]
    fn cleanup_requires_matching_file_tags_and_cosine() {
        let (_dir, store) = temp_store();
        let mut a = draft("use JWT for auth", "pattern");
        a.file_path = Some("src/auth.rs".into());
        a.tags = vec!["auth".into(), "jwt".into()];
        let id_a = store.put_memory(a).unwrap();
        store.set_importance(id_a, 0.8).unwrap();

        let mut b = draft("use JWT tokens for auth", "pattern");
        b.file_path = Some("src/auth.rs".into());
        b.tags = vec!["auth".into(), "jwt".into()];
        let id_b = store.put_memory(b).unwrap();
        store.set_importance(id_b, 0.4).unwrap();

        let mut vectors = HashMap::new();
        vectors.insert(id_a, vec![1.0, 0.0, 0.0]);
        vectors.insert(id_b, vec![0.99, 0.01, 0.0]);

        let engine = FeedbackEngine::new(3);
        let merged = engine.cleanup(&store, &vectors, true).unwrap();
        assert_eq!(merged, vec![(id_a, id_b)]);
    }

    #[test]
    fn jaccard_handles_empty_sets() {
        let empty: BTreeSet<String> = BTreeSet::new();
        assert_eq!(jaccard(&empty, &empty), 1.0);
    }
}
