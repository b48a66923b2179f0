//! daemon-core
//!
//! Per-project persistent memory engine for AI coding assistants: hybrid
//! lexical/dense/graph retrieval over a bi-temporal SQLite store, Leiden
//! community detection, a covenant session-state machine gating mutations
//! behind briefing and preflight, and an outcome/importance feedback loop.
//!
//! This crate owns no transport or tool-dispatch logic — `daemon-mcp` wires
//! these components together behind the JSON-RPC surface. See each module
//! for its piece of the contract.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod covenant;
pub mod error;
pub mod graph;
pub mod memory;
pub mod storage;

#[cfg(feature = "embeddings")]
pub mod embeddings;

#[cfg(feature = "vector-search")]
pub mod search;

#[cfg(all(feature = "embeddings", feature = "vector-search"))]
pub mod feedback;

#[cfg(all(feature = "embeddings", feature = "vector-search"))]
pub mod engine;

pub use config::Config;
pub use covenant::{Covenant, CovenantState, Gate};
pub use error::{EngineError, Result};

pub use memory::{
    ActiveContextEntry, Category, Community, Fact, Link, Memory, MemoryDraft, MemoryFilter,
    Outcome, Relationship, Rule, RuleDraft, ScoredMemory, Trigger, MAX_ACTIVE_CONTEXT,
};

pub use storage::{MemoryVersion, Store, MIGRATIONS};

pub use graph::{evolution, GraphEngine, Subgraph};

#[cfg(feature = "embeddings")]
pub use embeddings::{cosine_similarity, matryoshka_truncate, Embedding, EmbeddingError, EmbeddingService};

#[cfg(feature = "vector-search")]
pub use search::{
    classify_complexity, content_key, reciprocal_rank_fusion, retrieve, Bm25Params,
    CandidateSources, Complexity, LexicalIndex, RetrieveParams, ScoreBreakdown, VectorIndex,
    VectorIndexConfig, VectorIndexStats, VectorSearchError,
};

#[cfg(all(feature = "embeddings", feature = "vector-search"))]
pub use feedback::{surprise, FeedbackEngine, OutcomeResult};

#[cfg(all(feature = "embeddings", feature = "vector-search"))]
pub use engine::{Briefing, Engine, Health};

/// Crate version, surfaced in the `initialize` handshake response.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
