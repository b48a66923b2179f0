//! Output of graph clustering (`GraphEngine::detect_communities`).

use serde::{Deserialize, Serialize};

/// A non-overlapping cluster of memories at a given hierarchy level.
///
/// Level 0 is the direct Leiden output; higher levels aggregate level-0
/// communities via `parent`. Re-embedded `summary` text backs the
/// community-summary retrieval path in the `complex` candidate set.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    pub id: i64,
    pub level: u32,
    pub parent: Option<i64>,
    pub members: Vec<i64>,
    pub summary: String,
    pub summary_vector: Option<Vec<f32>>,
    pub freshness: chrono::DateTime<chrono::Utc>,
}
