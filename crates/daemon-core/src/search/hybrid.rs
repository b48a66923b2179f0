//! HybridRetriever — the ranking heart of the engine.
//!
//! Fuses lexical (BM25), vector (ANN), and graph/community candidate sets
//! with Reciprocal Rank Fusion, applies boost multipliers, then a
//! per-file diversity filter.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::memory::{Category, Memory, MemoryFilter, ScoredMemory};

/// Query complexity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    /// Default result cap when the caller gave no explicit `limit`.
    pub fn default_cap(self) -> usize {
        match self {
            Complexity::Simple => 5,
            Complexity::Medium => 10,
            Complexity::Complex => 20,
        }
    }
}

/// Phrases that suggest a query needs graph traversal rather than pure
/// similarity — relationship and history questions, not lookups.
const GRAPH_CUES: &[&str] = &["related to", "history of", "why", "evolution of", "chain of"];

/// Classifies `query`, graph-requiring
/// cues, and distinct capitalized-entity count.
pub fn classify_complexity(query: &str) -> Complexity {
    let lower = query.to_lowercase();
    let token_count = query.split_whitespace().count();
    let has_graph_cue = GRAPH_CUES.iter().any(|cue| lower.contains(cue));
    let capitalized_entities: HashSet<&str> = query
        .split_whitespace()
        .filter(|w| w.chars().next().is_some_and(|c| c.is_uppercase()))
        .collect();

    if has_graph_cue || capitalized_entities.len() >= 3 {
        Complexity::Complex
    } else if token_count > 4 || capitalized_entities.len() >= 1 {
        Complexity::Medium
    } else {
        Complexity::Simple
    }
}

/// Request accepted by [`retrieve`].
#[derive(Debug, Clone, Default)]
pub struct RetrieveParams {
    pub topic: String,
    pub filters: MemoryFilter,
    /// Overrides automatic classification; `None` uses [`classify_complexity`].
    pub complexity_override: Option<Complexity>,
    pub limit: Option<usize>,
    /// When `false`, every query is treated as `Medium`.
    pub auto_zoom: bool,
    /// When `true`, classification runs and is recorded but `Medium` is used
    /// regardless of the result.
    pub shadow_mode: bool,
}

/// One retrieval source's contribution, for the per-item explanation.
#[derive(Debug, Clone, Default)]
pub struct ScoreBreakdown {
    pub lexical_rank: Option<usize>,
    pub vector_rank: Option<usize>,
    pub fused_score: f64,
    pub boosts: Vec<String>,
}

/// Data a retrieval source contributes before fusion: ranked ids plus the
/// memories needed for boosting/diversity (callers already have these from
/// `Store`/`LexicalIndex`/`VectorIndex`/`GraphEngine`, so `retrieve` stays a
/// pure function over already-fetched candidate lists rather than owning
/// any component directly).
#[derive(Debug, Clone, Default)]
pub struct CandidateSources {
    /// Ranked ids from `LexicalIndex::search`, best first.
    pub lexical: Vec<i64>,
    /// Ranked ids from `VectorIndex::search`, best first.
    pub vector: Vec<i64>,
    /// Ranked ids surfaced by 2-hop graph expansion from top vector/lexical
    /// seeds (complex queries only).
    pub graph: Vec<i64>,
    /// Ranked ids surfaced by community-summary vector match (complex only).
    pub community: Vec<i64>,
}

/// Fuses ranked candidate id lists with Reciprocal Rank Fusion:
/// `score(d) = sum 1/(K + rank_source(d))`. Idempotent: identical
/// input lists given twice produce identical output (testable property 3).
pub fn reciprocal_rank_fusion(sources: &[&[i64]], k: f64) -> Vec<(i64, f64)> {
    let mut scores: HashMap<i64, f64> = HashMap::new();
    for source in sources {
        for (rank, &id) in source.iter().enumerate() {
            *scores.entry(id).or_default() += 1.0 / (k + rank as f64);
        }
    }
    let mut ranked: Vec<(i64, f64)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked
}

const DECAY_HALF_LIFE_DAYS: f64 = 30.0;

/// Multiplicative boosts applied in a fixed order.
fn apply_boosts(memory: &Memory, base_score: f64, now: DateTime<Utc>, fact_promoted: bool) -> (f64, Vec<String>) {
    let mut score = base_score;
    let mut applied = Vec::new();

    if memory.pinned {
        score *= 1.3;
        applied.push("pinned(x1.3)".to_string());
    }
    if let Some(outcome) = &memory.outcome {
        if !outcome.worked {
            score *= 1.5;
            applied.push("worked=false(x1.5)".to_string());
        }
    }
    if memory.surprise_score >= 0.7 {
        score *= 1.2;
        applied.push("surprise>=0.7(x1.2)".to_string());
    }
    if fact_promoted {
        score *= 1.4;
        applied.push("fact-promoted(x1.4)".to_string());
    }
    if let Some(half_life) = memory.half_life_days() {
        let age_days = (now - memory.valid_time).num_seconds() as f64 / 86_400.0;
        let decay = 0.5_f64.powf(age_days.max(0.0) / half_life.max(DECAY_HALF_LIFE_DAYS.min(half_life)));
        score *= decay;
        applied.push(format!("recency-decay(x{decay:.3})"));
    }

    (score, applied)
}

/// `retrieve`, apply boosts, enforce
/// the per-file diversity cap, then truncate to `params.limit` or the
/// complexity's default cap. `fact_promoted` names the content keys already
/// present in the fact table (used for the fact-promoted boost).
pub fn retrieve(
    params: &RetrieveParams,
    sources: &CandidateSources,
    memories: &HashMap<i64, Memory>,
    fact_promoted_content_keys: &HashSet<String>,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<(Vec<ScoredMemory>, Complexity)> {
    if sources.lexical.is_empty() && sources.vector.is_empty() && sources.graph.is_empty() && sources.community.is_empty() {
        return Err(EngineError::RetrievalFailure);
    }

    let classified = classify_complexity(&params.topic);
    let effective = if !params.auto_zoom {
        Complexity::Medium
    } else if params.shadow_mode {
        Complexity::Medium
    } else {
        params.complexity_override.unwrap_or(classified)
    };

    let mut fused_sources: Vec<&[i64]> = vec![sources.vector.as_slice()];
    if effective != Complexity::Simple {
        fused_sources.push(sources.lexical.as_slice());
    }
    if effective == Complexity::Complex {
        fused_sources.push(sources.graph.as_slice());
        fused_sources.push(sources.community.as_slice());
    }

    let fused = reciprocal_rank_fusion(&fused_sources, config.rrf_k);

    let lexical_rank: HashMap<i64, usize> = sources.lexical.iter().enumerate().map(|(i, &id)| (id, i)).collect();
    let vector_rank: HashMap<i64, usize> = sources.vector.iter().enumerate().map(|(i, &id)| (id, i)).collect();

    let mut scored: Vec<ScoredMemory> = Vec::new();
    for (id, fused_score) in fused {
        let Some(memory) = memories.get(&id) else { continue };
        if memory.pending_reindex {
            continue;
        }
        if !matches_filter(memory, &params.filters) {
            continue;
        }
        let content_key = content_key(memory);
        let fact_promoted = fact_promoted_content_keys.contains(&content_key);
        let (boosted_score, boosts) = apply_boosts(memory, fused_score, now, fact_promoted);

        scored.push(ScoredMemory {
            memory: memory.clone(),
            lexical_rank: lexical_rank.get(&id).copied(),
            vector_rank: vector_rank.get(&id).copied(),
            fused_score: boosted_score,
            boosts_applied: boosts,
        });
    }

    scored.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });

    let diversified = apply_diversity_filter(scored, config.diversity_cap);

    let limit = params.limit.unwrap_or_else(|| effective.default_cap());
    let mut truncated = diversified;
    truncated.truncate(limit);

    Ok((truncated, effective))
}

/// At most `max_per_file` results may share a `file_path`. Memories with
/// no `file_path` are never capped
/// against each other.
fn apply_diversity_filter(ranked: Vec<ScoredMemory>, max_per_file: usize) -> Vec<ScoredMemory> {
    let mut per_file_count: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(ranked.len());
    for item in ranked {
        if let Some(path) = &item.memory.file_path {
            let count = per_file_count.entry(path.clone()).or_default();
            if *count >= max_per_file {
                continue;
            }
            *count += 1;
        }
        out.push(item);
    }
    out
}

fn matches_filter(memory: &Memory, filter: &MemoryFilter) -> bool {
    if !filter.include_archived && memory.archived {
        return false;
    }
    // A memory with a live `supersedes` edge pointing at it is stale the same
    // way an archived one is; `include_archived` is the one knob that brings
    // either kind back into view.
    if !filter.include_archived && memory.superseded_by.is_some() {
        return false;
    }
    if !filter.categories.is_empty() {
        let matches = filter
            .categories
            .iter()
            .any(|c| Category::parse_name(c) == Some(memory.category));
        if !matches {
            return false;
        }
    }
    if !filter.tags.is_empty() && !filter.tags.iter().any(|t| memory.tags.contains(t)) {
        return false;
    }
    if let Some(prefix) = &filter.file_prefix {
        match &memory.file_path {
            Some(p) if p.starts_with(prefix) => {}
            _ => return false,
        }
    }
    if let Some(since) = filter.since {
        if memory.transaction_time < since {
            return false;
        }
    }
    if let Some(until) = filter.until {
        if memory.transaction_time > until {
            return false;
        }
    }
    true
}

/// Stable key for fact-promotion/duplicate lookups: normalized content text.
pub fn content_key(memory: &Memory) -> String {
    memory.content.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn memory(id: i64, file_path: Option<&str>) -> Memory {
        Memory {
            id,
            category: Category::Decision,
            content: format!("memory {id}"),
            rationale: None,
            context: None,
            tags: BTreeSet::new(),
            file_path: file_path.map(|s| s.to_string()),
            entities: BTreeSet::new(),
            valid_time: Utc::now(),
            transaction_time: Utc::now(),
            superseded_by: None,
            archived: false,
            pinned: false,
            importance_score: 0.5,
            surprise_score: 0.0,
            outcome: None,
            recall_count: 0,
            last_recalled_at: None,
            pending_reindex: false,
        }
    }

    #[test]
    fn rrf_is_idempotent() {
        let lexical = vec![3, 1, 2];
        let vector = vec![1, 2, 3];
        let first = reciprocal_rank_fusion(&[&lexical, &vector], 60.0);
        let second = reciprocal_rank_fusion(&[&lexical, &vector], 60.0);
        assert_eq!(first, second);
    }

    #[test]
    fn rrf_rewards_items_in_multiple_lists() {
        let lexical = vec![3, 1, 2];
        let vector = vec![1, 2, 3];
        let fused = reciprocal_rank_fusion(&[&lexical, &vector], 60.0);
        // id 1 (rank 1 in lexical, rank 0 in vector) should outrank id 3.
        let pos = |id: i64| fused.iter().position(|(x, _)| *x == id).unwrap();
        assert!(pos(1) < pos(3));
    }

    #[test]
    fn diversity_filter_caps_per_file() {
        let mut memories = HashMap::new();
        for i in 1..=5 {
            memories.insert(i, memory(i, Some("src/auth.rs")));
        }
        let ranked: Vec<ScoredMemory> = (1..=5)
            .map(|id| ScoredMemory {
                memory: memories.get(&id).unwrap().clone(),
                lexical_rank: None,
                vector_rank: None,
                fused_score: 1.0 / id as f64,
                boosts_applied: vec![],
            })
            .collect();
        let filtered = apply_diversity_filter(ranked, 3);
        assert_eq!(filtered.len(), 3);
    }

    #[test]
    fn classify_complexity_picks_up_graph_cues() {
        assert_eq!(classify_complexity("why did we choose JWT"), Complexity::Complex);
        assert_eq!(classify_complexity("auth"), Complexity::Simple);
        assert_eq!(classify_complexity("what database do we use for sessions"), Complexity::Medium);
    }

    #[test]
    fn worked_false_boost_is_at_least_1_4x() {
        let mut m = memory(1, None);
        m.category = Category::Fact; // no recency decay, isolate the boost
        let baseline = 1.0;
        let (without, _) = apply_boosts(&m, baseline, Utc::now(), false);
        m.outcome = Some(crate::memory::Outcome {
            worked: false,
            text: None,
            recorded_at: Utc::now(),
        });
        let (with, _) = apply_boosts(&m, baseline, Utc::now(), false);
        assert!(with >= without * 1.4);
    }

    #[test]
    fn empty_sources_is_retrieval_failure() {
        let params = RetrieveParams {
            topic: "x".into(),
            auto_zoom: true,
            ..Default::default()
        };
        let result = retrieve(
            &params,
            &CandidateSources::default(),
            &HashMap::new(),
            &HashSet::new(),
            &Config::default(),
            Utc::now(),
        );
        assert!(matches!(result, Err(EngineError::RetrievalFailure)));
    }
}
