//! Enumerated startup configuration.
//!
//! A fixed set of typed fields populated once from the environment at
//! startup, no dynamic attribute lookups at request time.

use std::time::Duration;

/// All runtime tunables, with their documented defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Embedding output dimension after Matryoshka truncation.
    pub embedding_dimensions: usize,
    /// BM25 k1.
    pub bm25_k1: f64,
    /// BM25 b.
    pub bm25_b: f64,
    /// Reciprocal Rank Fusion constant K.
    pub rrf_k: f64,
    /// Max results sharing a `file_path` in one retrieval response.
    pub diversity_cap: usize,
    /// Minimum Leiden community size before merging into "misc".
    pub community_min_size: usize,
    /// Successful outcomes required before a learning is promoted to a fact.
    pub fact_promotion_threshold: u32,
    /// Preflight token lifetime.
    pub preflight_ttl: Duration,
    /// Idle period before a community rebuild is scheduled.
    pub community_rebuild_idle: Duration,
    /// Link mutations between scheduled community rebuilds.
    pub community_rebuild_every_links: u32,
    /// Idle period before a dream pass is considered.
    pub dream_idle_timeout: Duration,
    /// Max `worked=false` decisions re-evaluated per dream pass.
    pub dream_max_decisions_per_session: usize,
    /// Minimum age of a decision before the dream pass will reconsider it.
    pub dream_min_decision_age_hours: i64,
    /// Implicit per-request deadline.
    pub request_deadline: Duration,
    /// Embedder worker-queue capacity before `Overloaded` is returned.
    pub embedder_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding_dimensions: 256,
            bm25_k1: 1.5,
            bm25_b: 0.75,
            rrf_k: 60.0,
            diversity_cap: 3,
            community_min_size: 3,
            fact_promotion_threshold: 3,
            preflight_ttl: Duration::from_secs(5 * 60),
            community_rebuild_idle: Duration::from_secs(15 * 60),
            community_rebuild_every_links: 50,
            dream_idle_timeout: Duration::from_secs(60),
            dream_max_decisions_per_session: 10,
            dream_min_decision_age_hours: 24,
            request_deadline: Duration::from_secs(30),
            embedder_queue_capacity: 256,
        }
    }
}

impl Config {
    /// Populate from environment variables, falling back to defaults.
    /// Unrecognized `DAEM0N_*` variables are ignored with a `tracing::warn!`
    /// (caller's responsibility — see `daemon-mcp::main` which enumerates
    /// the recognized set before calling this).
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_usize("DAEM0N_EMBEDDING_DIMENSIONS") {
            cfg.embedding_dimensions = v;
        }
        if let Some(v) = env_f64("DAEM0N_BM25_K1") {
            cfg.bm25_k1 = v;
        }
        if let Some(v) = env_f64("DAEM0N_BM25_B") {
            cfg.bm25_b = v;
        }
        if let Some(v) = env_f64("DAEM0N_RRF_K") {
            cfg.rrf_k = v;
        }
        if let Some(v) = env_usize("DAEM0N_DIVERSITY_CAP") {
            cfg.diversity_cap = v;
        }
        if let Some(v) = env_usize("DAEM0N_COMMUNITY_MIN_SIZE") {
            cfg.community_min_size = v;
        }
        if let Some(v) = env_u32("DAEM0N_FACT_PROMOTION_THRESHOLD") {
            cfg.fact_promotion_threshold = v;
        }
        if let Some(v) = env_u64("DAEM0N_PREFLIGHT_TTL_SECS") {
            cfg.preflight_ttl = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("DAEM0N_DREAM_IDLE_TIMEOUT_SECS") {
            cfg.dream_idle_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_usize("DAEM0N_DREAM_MAX_DECISIONS") {
            cfg.dream_max_decisions_per_session = v;
        }
        if let Some(v) = env_u64("DAEM0N_DREAM_MIN_DECISION_AGE_HOURS") {
            cfg.dream_min_decision_age_hours = v as i64;
        }
        if let Some(v) = env_u64("DAEM0N_REQUEST_DEADLINE_SECS") {
            cfg.request_deadline = Duration::from_secs(v);
        }
        if let Some(v) = env_usize("DAEM0N_EMBEDDER_QUEUE_CAPACITY") {
            cfg.embedder_queue_capacity = v;
        }

        cfg
    }

    /// Every `DAEM0N_*` variable name this struct recognizes, for the
    /// "unknown variables are ignored with a warning" startup check.
    pub const RECOGNIZED_VARS: &'static [&'static str] = &[
        "DAEM0N_EMBEDDING_DIMENSIONS",
        "DAEM0N_BM25_K1",
        "DAEM0N_BM25_B",
        "DAEM0N_RRF_K",
        "DAEM0N_DIVERSITY_CAP",
        "DAEM0N_COMMUNITY_MIN_SIZE",
        "DAEM0N_FACT_PROMOTION_THRESHOLD",
        "DAEM0N_PREFLIGHT_TTL_SECS",
        "DAEM0N_DREAM_IDLE_TIMEOUT_SECS",
        "DAEM0N_DREAM_MAX_DECISIONS",
        "DAEM0N_DREAM_MIN_DECISION_AGE_HOURS",
        "DAEM0N_REQUEST_DEADLINE_SECS",
        "DAEM0N_EMBEDDER_QUEUE_CAPACITY",
    ];
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok()?.parse().ok()
}
fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok()?.parse().ok()
}
fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.parse().ok()
}
fn env_f64(name: &str) -> Option<f64> {
    std::env::var(name).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.embedding_dimensions, 256);
        assert_eq!(cfg.bm25_k1, 1.5);
        assert_eq!(cfg.bm25_b, 0.75);
        assert_eq!(cfg.rrf_k, 60.0);
        assert_eq!(cfg.diversity_cap, 3);
        assert_eq!(cfg.fact_promotion_threshold, 3);
        assert_eq!(cfg.preflight_ttl, Duration::from_secs(300));
    }
}
