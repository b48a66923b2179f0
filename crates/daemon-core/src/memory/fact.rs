//! Immutable facts promoted from repeatedly-successful learnings.

use serde::{Deserialize, Serialize};

/// A learning promoted to fact status after `fact_promotion_threshold`
/// successful outcomes referencing it. Immutable once created; keyed by
/// `content_key` for O(1) lookup from `FeedbackEngine::record_outcome`.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    pub id: i64,
    pub source_memory_id: i64,
    pub content_key: String,
    pub content: String,
    pub promoted_at: chrono::DateTime<chrono::Utc>,
}
