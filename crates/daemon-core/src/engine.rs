//! `Engine` — wires `Store`, `LexicalIndex`, `VectorIndex`, `GraphEngine`,
//! `FeedbackEngine`, `EmbeddingService` and `Covenant` into the single
//! handle `daemon-mcp`'s dispatcher drives. Every method here is a
//! synchronous, already-gated-by-the-caller operation: covenant checks,
//! JSON-RPC envelopes, and action-string parsing stay in `daemon-mcp`, which
//! only needs to call the right method and translate the `Result`.
//!
//! Storage and retrieval live behind one owner because the retrieval math
//! (`search::retrieve`) is a pure function over already-fetched candidates
//! rather than a second stateful service.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::covenant::Covenant;
use crate::embeddings::EmbeddingService;
use crate::error::{EngineError, Result};
use crate::feedback::{self, FeedbackEngine, OutcomeResult};
use crate::graph::{self, GraphEngine, Subgraph};
use crate::memory::{
    ActiveContextEntry, Community, Fact, Link, Memory, MemoryDraft, MemoryFilter, Relationship,
    Rule, RuleDraft, ScoredMemory, Trigger, MAX_ACTIVE_CONTEXT,
};
use crate::search::{
    content_key, CandidateSources, Complexity, LexicalIndex, RetrieveParams, VectorIndex,
    VectorIndexConfig,
};
use crate::storage::{MemoryVersion, Store};

/// Response body for `commune.briefing`.
#[derive(Debug, Clone)]
pub struct Briefing {
    pub recent_memories: Vec<Memory>,
    pub active_context: Vec<ActiveContextEntry>,
    pub rules: Vec<Rule>,
    pub warnings: Vec<Memory>,
    pub pending_reindex_count: usize,
}

/// Response body for `commune.health`.
#[derive(Debug, Clone)]
pub struct Health {
    pub memory_count: usize,
    pub archived_count: usize,
    pub lexical_doc_count: usize,
    pub vector_count: usize,
    pub vector_dimensions: usize,
    pub link_count: usize,
    pub community_count: usize,
    pub embedder_ready: bool,
    pub link_mutations_since_rebuild: u32,
}

/// The memory engine: one instance per project directory, shared behind an
/// `Arc` by every session the transport layer serves.
pub struct Engine {
    config: Config,
    store: Store,
    lexical: LexicalIndex,
    vector: Mutex<VectorIndex>,
    /// Document vectors keyed by memory id. `VectorIndex` is a pure ANN
    /// structure (ids + approximate search); `Store` has no vector column.
    /// Surprise and duplicate-cleanup need the raw vectors back out, so the
    /// engine keeps its own side table.
    vectors: Mutex<HashMap<i64, Vec<f32>>>,
    graph: GraphEngine,
    feedback: FeedbackEngine,
    embedder: EmbeddingService,
    covenant: Covenant,
    link_mutations: std::sync::atomic::AtomicU32,
}

impl Engine {
    /// Opens (or creates) the engine rooted at `project_root`, rebuilding
    /// the lexical/vector/graph indexes from `Store` content.
    pub fn open(project_root: &std::path::Path, config: Config) -> Result<Self> {
        let store = Store::open(project_root)?;

        let lexical = LexicalIndex::new(crate::search::Bm25Params {
            k1: config.bm25_k1,
            b: config.bm25_b,
        });
        let mut vector = VectorIndex::with_config(VectorIndexConfig {
            dimensions: config.embedding_dimensions,
            ..Default::default()
        })
        .map_err(|e| EngineError::StorageFailure(e.to_string()))?;

        let embedder = EmbeddingService::new();
        let mut vectors = HashMap::new();

        for memory in store.iter_memories(&MemoryFilter {
            include_archived: true,
            ..Default::default()
        })? {
            lexical.add(memory.id, &lexical_doc(&memory));
            if let Ok(embedding) = embedder.encode_document(&memory.content) {
                let _ = vector.upsert(memory.id, &embedding.vector);
                vectors.insert(memory.id, embedding.vector);
            }
        }

        let graph = GraphEngine::new();
        graph.rebuild(&store.all_links()?);

        Ok(Self {
            covenant: Covenant::new(config.preflight_ttl),
            feedback: FeedbackEngine::new(config.fact_promotion_threshold),
            config,
            store,
            lexical,
            vector: Mutex::new(vector),
            vectors: Mutex::new(vectors),
            graph,
            embedder,
            link_mutations: std::sync::atomic::AtomicU32::new(0),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn covenant(&self) -> &Covenant {
        &self.covenant
    }

    // ------------------------------------------------------------------
    // commune
    // ------------------------------------------------------------------

    pub fn briefing(&self, project: &str) -> Result<Briefing> {
        self.covenant.mark_briefed(project);
        let recent = self.store.iter_memories(&MemoryFilter {
            include_archived: false,
            ..Default::default()
        })?;
        let warnings = recent
            .iter()
            .filter(|m| m.category == crate::memory::Category::Warning)
            .cloned()
            .collect();
        let pending_reindex_count = recent.iter().filter(|m| m.pending_reindex).count();
        Ok(Briefing {
            recent_memories: recent.into_iter().take(20).collect(),
            active_context: self.store.list_active_context()?,
            rules: self.store.list_rules()?,
            warnings,
            pending_reindex_count,
        })
    }

    pub fn health(&self) -> Result<Health> {
        let all = self.store.iter_memories(&MemoryFilter {
            include_archived: true,
            ..Default::default()
        })?;
        let archived_count = all.iter().filter(|m| m.archived).count();
        let vector = self.vector.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Health {
            memory_count: all.len(),
            archived_count,
            lexical_doc_count: self.lexical.len(),
            vector_count: vector.len(),
            vector_dimensions: vector.dimensions(),
            link_count: self.store.all_links()?.len(),
            community_count: self.store.communities_at_level(0)?.len(),
            embedder_ready: self.embedder.is_ready(),
            link_mutations_since_rebuild: self.link_mutations.load(std::sync::atomic::Ordering::Relaxed),
        })
    }

    // ------------------------------------------------------------------
    // consult
    // ------------------------------------------------------------------

    /// Callable from `COLD` — a session may consult context before ever
    /// briefing, though nothing else it does will be more than a read until
    /// `commune.briefing` runs. Gating lives in the dispatcher, not here.
    pub fn preflight(&self, project: &str, description: &str) -> Result<String> {
        if description.trim().is_empty() {
            return Err(EngineError::InvalidArgument("description must not be empty".into()));
        }
        Ok(self.covenant.issue_preflight(project, description))
    }

    /// `consult.recall` / the `HybridRetriever::retrieve` entry point.
    /// Builds each candidate source, fuses, boosts, diversity-filters, then
    /// bumps `recall_count` on every returned id.
    pub fn recall(&self, params: RetrieveParams) -> Result<(Vec<ScoredMemory>, Complexity)> {
        if params.topic.trim().is_empty() {
            return Err(EngineError::InvalidArgument("topic must not be empty".into()));
        }

        let classified = crate::search::classify_complexity(&params.topic);
        let effective = if !params.auto_zoom || params.shadow_mode {
            Complexity::Medium
        } else {
            params.complexity_override.unwrap_or(classified)
        };

        let query_vec = self
            .embedder
            .encode_query(&params.topic)
            .map(|e| e.vector)
            .ok();

        let vector_ids: Vec<i64> = query_vec
            .as_ref()
            .map(|v| {
                let vector = self.vector.lock().unwrap_or_else(|e| e.into_inner());
                vector
                    .search(v, 20)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(id, _)| id)
                    .collect()
            })
            .unwrap_or_default();

        let lexical_ids: Vec<i64> = if effective != Complexity::Simple {
            self.lexical.search(&params.topic, 20).into_iter().map(|(id, _)| id).collect()
        } else {
            Vec::new()
        };

        let (graph_ids, community_ids) = if effective == Complexity::Complex {
            let seeds: Vec<i64> = vector_ids.iter().chain(lexical_ids.iter()).take(5).copied().collect();
            let graph_ids = self.graph.expand_from_seeds(&seeds);

            let communities = self.store.communities_at_level(0)?;
            let community_ids = match &query_vec {
                Some(qv) => {
                    let mut scored: Vec<(i64, f32)> = communities
                        .iter()
                        .filter_map(|c| {
                            let sv = c.summary_vector.as_ref()?;
                            Some((c.id, crate::embeddings::cosine_similarity(qv, sv)))
                        })
                        .collect();
                    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
                    scored
                        .into_iter()
                        .flat_map(|(id, _)| {
                            communities.iter().find(|c| c.id == id).map(|c| c.members.clone()).unwrap_or_default()
                        })
                        .collect()
                }
                None => Vec::new(),
            };
            (graph_ids, community_ids)
        } else {
            (Vec::new(), Vec::new())
        };

        let sources = CandidateSources {
            lexical: lexical_ids,
            vector: vector_ids,
            graph: graph_ids,
            community: community_ids,
        };

        let mut needed: HashSet<i64> = HashSet::new();
        needed.extend(sources.lexical.iter());
        needed.extend(sources.vector.iter());
        needed.extend(sources.graph.iter());
        needed.extend(sources.community.iter());

        let mut memories = HashMap::new();
        for id in needed {
            if let Some(m) = self.store.get_memory(id)? {
                memories.insert(id, m);
            }
        }

        let fact_keys: HashSet<String> = memories
            .values()
            .filter_map(|m| {
                let key = content_key(m);
                self.store.find_fact(&key).ok().flatten().map(|_| key)
            })
            .collect();

        let mut effective_params = params;
        effective_params.complexity_override = Some(effective);
        let (results, used) = crate::search::retrieve(
            &effective_params,
            &sources,
            &memories,
            &fact_keys,
            &self.config,
            Utc::now(),
        )?;

        let ids: Vec<i64> = results.iter().map(|r| r.memory.id).collect();
        self.store.bump_recall(&ids)?;

        Ok((results, used))
    }

    // ------------------------------------------------------------------
    // inscribe
    // ------------------------------------------------------------------

    pub fn remember(&self, draft: MemoryDraft) -> Result<i64> {
        let id = self.store.put_memory(draft)?;
        self.index_memory(id)?;
        Ok(id)
    }

    pub fn remember_batch(&self, drafts: Vec<MemoryDraft>) -> Result<Vec<i64>> {
        drafts.into_iter().map(|d| self.remember(d)).collect()
    }

    /// Indexes a freshly-inscribed memory: lexical add, document embedding,
    /// surprise score, vector insert. Failures in index update after the
    /// `Store` write mark the memory `pending_reindex` instead of rolling
    /// back — it stays excluded from retrieval until indexed.
    fn index_memory(&self, id: i64) -> Result<()> {
        let Some(memory) = self.store.get_memory(id)? else {
            return Err(EngineError::NotFound(format!("memory {id}")));
        };
        self.lexical.add(id, &lexical_doc(&memory));

        match self.embedder.encode_document(&memory.content) {
            Ok(embedding) => {
                let surprise = {
                    let vector = self.vector.lock().unwrap_or_else(|e| e.into_inner());
                    feedback::surprise(&vector, &embedding.vector, 5)
                };
                self.store.set_surprise(id, surprise)?;

                let mut vector = self.vector.lock().unwrap_or_else(|e| e.into_inner());
                if let Err(e) = vector.upsert(id, &embedding.vector) {
                    tracing::warn!(memory_id = id, error = %e, "vector index insert failed, marking pending_reindex");
                    self.store.set_pending_reindex(id, true)?;
                } else {
                    self.vectors.lock().unwrap_or_else(|e| e.into_inner()).insert(id, embedding.vector);
                }
            }
            Err(e) => {
                tracing::warn!(memory_id = id, error = %e, "embedding failed, marking pending_reindex");
                self.store.set_pending_reindex(id, true)?;
            }
        }
        Ok(())
    }

    pub fn link(&self, source: i64, target: i64, relationship: Relationship) -> Result<()> {
        self.store.get_memory(source)?.ok_or_else(|| EngineError::NotFound(format!("memory {source}")))?;
        self.store.get_memory(target)?.ok_or_else(|| EngineError::NotFound(format!("memory {target}")))?;
        self.store.put_link(source, target, relationship)?;
        let link = Link {
            source,
            target,
            relationship,
            created_at: Utc::now(),
        };
        self.graph.add_link(&link);
        self.note_link_mutation();
        Ok(())
    }

    pub fn unlink(&self, source: i64, target: i64, relationship: Relationship) -> Result<()> {
        self.store.del_link(source, target, relationship)?;
        self.graph.remove_link(source, target, relationship);
        self.note_link_mutation();
        Ok(())
    }

    fn note_link_mutation(&self) {
        self.link_mutations.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn pin(&self, memory_id: i64, priority: i32, reason: String, expires_at: Option<DateTime<Utc>>) -> Result<()> {
        if self.store.list_active_context()?.len() >= MAX_ACTIVE_CONTEXT {
            return Err(EngineError::InvalidArgument(format!(
                "active context is capped at {MAX_ACTIVE_CONTEXT} entries"
            )));
        }
        self.store.set_pinned(memory_id, true)?;
        self.store.put_active_context(ActiveContextEntry {
            memory_id,
            priority,
            reason,
            expires_at,
            pinned_at: Utc::now(),
        })
    }

    pub fn unpin(&self, memory_id: i64) -> Result<()> {
        self.store.set_pinned(memory_id, false)?;
        self.store.remove_active_context(memory_id)
    }

    pub fn active_context(&self) -> Result<Vec<ActiveContextEntry>> {
        self.store.list_active_context()
    }

    // ------------------------------------------------------------------
    // reflect
    // ------------------------------------------------------------------

    pub fn record_outcome(&self, id: i64, worked: bool, text: Option<String>) -> Result<OutcomeResult> {
        self.feedback.record_outcome(&self.store, id, worked, text)
    }

    // ------------------------------------------------------------------
    // understand
    // ------------------------------------------------------------------

    pub fn get_memory(&self, id: i64) -> Result<Memory> {
        self.store.get_memory(id)?.ok_or_else(|| EngineError::NotFound(format!("memory {id}")))
    }

    pub fn list_rules(&self) -> Result<Vec<Rule>> {
        self.store.list_rules()
    }

    pub fn list_triggers(&self) -> Result<Vec<Trigger>> {
        self.store.list_triggers()
    }

    /// Backs the `daem0n://warnings/{project}` resource.
    pub fn warnings(&self) -> Result<Vec<Memory>> {
        self.store.iter_memories(&MemoryFilter {
            categories: vec!["warning".to_string()],
            include_archived: false,
            ..Default::default()
        })
    }

    /// Backs the `daem0n://failed/{project}` resource.
    pub fn failed_decisions(&self) -> Result<Vec<Memory>> {
        Ok(self
            .store
            .iter_memories(&MemoryFilter {
                include_archived: false,
                ..Default::default()
            })?
            .into_iter()
            .filter(|m| m.outcome.as_ref().is_some_and(|o| !o.worked))
            .collect())
    }

    // ------------------------------------------------------------------
    // govern
    // ------------------------------------------------------------------

    pub fn add_rule(&self, draft: RuleDraft) -> Result<i64> {
        if draft.trigger_phrase.trim().is_empty() {
            return Err(EngineError::InvalidArgument("trigger_phrase must not be empty".into()));
        }
        self.store.add_rule(draft)
    }

    pub fn update_rule(&self, id: i64, draft: RuleDraft) -> Result<()> {
        self.store.update_rule(id, draft)
    }

    pub fn add_trigger(&self, pattern: String, recall_topic: String, category_filter: Vec<String>) -> Result<i64> {
        self.store.add_trigger(pattern, recall_topic, category_filter)
    }

    // ------------------------------------------------------------------
    // explore
    // ------------------------------------------------------------------

    pub fn versions(&self, id: i64) -> Result<Vec<MemoryVersion>> {
        self.store.versions(id)
    }

    pub fn at_time(&self, id: i64, at: DateTime<Utc>) -> Result<Option<Memory>> {
        self.store.at_time(id, at)
    }

    pub fn neighbors(&self, id: i64, relationship: Option<Relationship>, depth: usize) -> Vec<i64> {
        self.graph.neighbors(id, relationship, depth)
    }

    pub fn chain(&self, from: i64, to: i64, max_depth: usize) -> Option<Vec<i64>> {
        self.graph.chain(from, to, max_depth)
    }

    pub fn subgraph(&self, seed_ids: &[i64], depth: usize) -> Subgraph {
        self.graph.subgraph(seed_ids, depth)
    }

    pub fn evolution(&self, entity_name: &str) -> Result<Vec<Memory>> {
        graph::evolution(&self.store, entity_name)
    }

    pub fn rebuild_communities(&self, min_size: usize, resolution: f64) -> Result<Vec<Community>> {
        let embedder = &self.embedder;
        let communities = self.graph.detect_communities(&self.store, min_size, resolution, |summary| {
            embedder.encode_document(summary).ok().map(|e| e.vector)
        })?;
        self.store.replace_communities(&communities)?;
        self.link_mutations.store(0, std::sync::atomic::Ordering::Relaxed);
        Ok(communities)
    }

    pub fn communities(&self, level: u32) -> Result<Vec<Community>> {
        self.store.communities_at_level(level)
    }

    pub fn fact(&self, content_key: &str) -> Result<Option<Fact>> {
        self.store.find_fact(content_key)
    }

    // ------------------------------------------------------------------
    // maintain
    // ------------------------------------------------------------------

    pub fn archive(&self, id: i64) -> Result<()> {
        self.store.archive_memory(id)?;
        self.lexical.remove(id);
        let mut vector = self.vector.lock().unwrap_or_else(|e| e.into_inner());
        let _ = vector.remove(id);
        self.vectors.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
        Ok(())
    }

    pub fn prune(&self, older_than_days: i64, dry_run: bool) -> Result<Vec<Memory>> {
        let candidates = self.feedback.prune(&self.store, older_than_days, dry_run)?;
        if !dry_run {
            for m in &candidates {
                self.lexical.remove(m.id);
                let mut vector = self.vector.lock().unwrap_or_else(|e| e.into_inner());
                let _ = vector.remove(m.id);
                self.vectors.lock().unwrap_or_else(|e| e.into_inner()).remove(&m.id);
            }
        }
        Ok(candidates)
    }

    pub fn cleanup(&self, dry_run: bool) -> Result<Vec<(i64, i64)>> {
        let vectors = self.vectors.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let merged = self.feedback.cleanup(&self.store, &vectors, dry_run)?;
        if !dry_run {
            for (_, loser) in &merged {
                self.lexical.remove(*loser);
                let mut vector = self.vector.lock().unwrap_or_else(|e| e.into_inner());
                let _ = vector.remove(*loser);
                self.vectors.lock().unwrap_or_else(|e| e.into_inner()).remove(loser);
            }
        }
        Ok(merged)
    }

    /// `maintain.compact`: WAL checkpoint, no-op for the lexical/vector
    /// indexes (already in-memory, rebuilt at startup). Returns the new
    /// `pending_reindex` count so callers can confirm the repair pass ran.
    pub fn compact(&self) -> Result<usize> {
        self.store.checkpoint()?;
        let pending = self.store.iter_memories(&MemoryFilter {
            include_archived: true,
            ..Default::default()
        })?;
        let mut repaired = 0;
        for m in pending.into_iter().filter(|m| m.pending_reindex) {
            if self.index_memory(m.id).is_ok() {
                self.store.set_pending_reindex(m.id, false)?;
                repaired += 1;
            }
        }
        Ok(repaired)
    }

    /// Whether a community rebuild is due: every 50 link mutations or 15
    /// minutes idle, whichever comes first. The idle half is scheduled by
    /// the caller's background task; this just reports the mutation-count
    /// half.
    pub fn community_rebuild_due(&self) -> bool {
        self.link_mutations.load(std::sync::atomic::Ordering::Relaxed) >= self.config.community_rebuild_every_links
    }

    pub fn dream_idle_timeout(&self) -> Duration {
        self.config.dream_idle_timeout
    }

    /// Idle-time re-evaluation of previously failed decisions against the
    /// current retriever. Re-recalls each candidate's own content, and if
    /// today's context surfaces something new, persists a `learning`
    /// memory tagged `dream` capturing the revision rather than mutating
    /// the original decision.
    pub fn dream_pass(&self) -> Result<Vec<i64>> {
        let cutoff = Utc::now() - chrono::Duration::hours(self.config.dream_min_decision_age_hours);
        let candidates: Vec<Memory> = self
            .store
            .iter_memories(&MemoryFilter {
                categories: vec!["decision".to_string()],
                include_archived: false,
                ..Default::default()
            })?
            .into_iter()
            .filter(|m| m.outcome.as_ref().is_some_and(|o| !o.worked) && m.transaction_time < cutoff)
            .take(self.config.dream_max_decisions_per_session)
            .collect();

        let mut revisions = Vec::new();
        for decision in candidates {
            let (results, _) = self.recall(RetrieveParams {
                topic: decision.content.clone(),
                auto_zoom: true,
                limit: Some(4),
                ..Default::default()
            })?;
            let related: Vec<String> = results
                .iter()
                .filter(|r| r.memory.id != decision.id)
                .map(|r| format!("#{}: {}", r.memory.id, r.memory.content))
                .collect();
            if related.is_empty() {
                continue;
            }
            let draft = MemoryDraft {
                category: "learning".to_string(),
                content: format!(
                    "Re-evaluated failed decision #{}: \"{}\". Current related context: {}",
                    decision.id,
                    decision.content,
                    related.join("; ")
                ),
                rationale: Some(format!("dream pass revision of decision {}", decision.id)),
                context: None,
                tags: vec!["dream".to_string()],
                file_path: decision.file_path.clone(),
                entities: decision.entities.iter().cloned().collect(),
                happened_at: None,
                pinned: false,
            };
            revisions.push(self.remember(draft)?);
        }
        Ok(revisions)
    }
}

fn lexical_doc(memory: &Memory) -> String {
    format!(
        "{} {} {} {} {}",
        memory.content,
        memory.rationale.as_deref().unwrap_or(""),
        memory.context.as_deref().unwrap_or(""),
        memory.tags.iter().cloned().collect::<Vec<_>>().join(" "),
        memory.file_path.as_deref().unwrap_or(""),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> (tempfile::TempDir, Engine) {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(dir.path(), Config::default()).unwrap();
        (dir, engine)
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
    fn remember_then_recall_round_trips() {
        let (_dir, engine) = engine();
        engine.remember(draft("use JWT for session auth", "decision")).unwrap();
        let (results, _) = engine
            .recall(RetrieveParams {
                topic: "auth security".into(),
                auto_zoom: true,
                ..Default::default()
            })
            .unwrap();
        assert!(!results.is_empty());
    }

    #[test]
    fn pin_respects_active_context_cap() {
        let (_dir, engine) = engine();
        for i in 0..MAX_ACTIVE_CONTEXT {
            let id = engine.remember(draft(&format!("memory {i}"), "fact")).unwrap();
            engine.pin(id, 0, "test".into(), None).unwrap();
        }
        let overflow_id = engine.remember(draft("overflow", "fact")).unwrap();
        assert!(engine.pin(overflow_id, 0, "test".into(), None).is_err());
    }

    #[test]
    fn archive_removes_from_indexes() {
        let (_dir, engine) = engine();
        let id = engine.remember(draft("temporary note", "fact")).unwrap();
        engine.archive(id).unwrap();
        assert!(!engine.vectors.lock().unwrap().contains_key(&id));
    }

    #[test]
    fn dream_pass_revises_old_failed_decisions() {
        let (_dir, mut engine) = engine();
        engine.config.dream_min_decision_age_hours = 0;
        let decision_id = engine.remember(draft("cache session tokens in redis", "decision")).unwrap();
        engine.record_outcome(decision_id, false, Some("redis outage lost sessions".into())).unwrap();
        engine.remember(draft("use a durable session store, not an in-memory cache", "pattern")).unwrap();

        let revisions = engine.dream_pass().unwrap();
        assert!(!revisions.is_empty());
        let revised = engine.get_memory(revisions[0]).unwrap();
        assert!(revised.tags.contains("dream"));
        assert_eq!(revised.category, crate::memory::Category::Learning);
    }

    #[test]
    fn link_rejects_supersedes_cycle() {
        let (_dir, engine) = engine();
        let a = engine.remember(draft("a", "decision")).unwrap();
        let b = engine.remember(draft("b", "decision")).unwrap();
        engine.link(a, b, Relationship::Supersedes).unwrap();
        assert!(engine.link(b, a, Relationship::Supersedes).is_err());
    }
}
