//! Memory - the fundamental unit of persistent project knowledge
//!
//! Each memory is a timestamped record of a decision, pattern, warning,
//! learning, or fact about a codebase, carrying bi-temporal validity,
//! usage statistics, and the feedback signals the ranking pipeline reads.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// CATEGORY
// ============================================================================

/// Kind of knowledge a memory records.
///
/// Patterns and warnings never fade at ranking time; decisions and learnings
/// decay with a 30-day half-life applied to `now - valid_time`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Decision,
    Pattern,
    Warning,
    #[default]
    Learning,
    Fact,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Decision => "decision",
            Category::Pattern => "pattern",
            Category::Warning => "warning",
            Category::Learning => "learning",
            Category::Fact => "fact",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "decision" => Some(Category::Decision),
            "pattern" => Some(Category::Pattern),
            "warning" => Some(Category::Warning),
            "learning" => Some(Category::Learning),
            "fact" => Some(Category::Fact),
            _ => None,
        }
    }

    /// Patterns and warnings are exempt from the recency half-life boost.
    pub fn decays(&self) -> bool {
        matches!(self, Category::Decision | Category::Learning)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

/// Result of a `reflect.outcome` call against a memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub worked: bool,
    pub text: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

// ============================================================================
// MEMORY
// ============================================================================

/// A single inscribed memory.
///
/// `transaction_time` is write-once and never mutated after insertion;
/// `valid_time` records when the stated fact was true and may be backfilled
/// via `happened_at` at insertion time only.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    /// Monotonically increasing id, unique per project.
    pub id: i64,
    pub category: Category,
    pub content: String,
    pub rationale: Option<String>,
    pub context: Option<String>,
    pub tags: BTreeSet<String>,
    /// Normalized project-relative path, if any.
    pub file_path: Option<String>,
    /// Extracted class/function/module identifiers.
    pub entities: BTreeSet<String>,

    pub valid_time: DateTime<Utc>,
    pub transaction_time: DateTime<Utc>,

    pub superseded_by: Option<i64>,
    pub archived: bool,
    pub pinned: bool,

    pub importance_score: f64,
    pub surprise_score: f64,

    pub outcome: Option<Outcome>,

    pub recall_count: i64,
    pub last_recalled_at: Option<DateTime<Utc>>,

    /// Set once an index-write fails after commit; excluded from retrieval
    /// until a background repair clears it.
    #[serde(default)]
    pub pending_reindex: bool,
}

impl Memory {
    /// True at `time` iff the memory was valid then.
    pub fn is_valid_at(&self, time: DateTime<Utc>) -> bool {
        self.valid_time <= time
    }

    pub fn half_life_days(&self) -> Option<f64> {
        if self.category.decays() {
            Some(30.0)
        } else {
            None
        }
    }
}

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Draft submitted to `Store::put_memory` / `inscribe.remember`.
///
/// Uses `deny_unknown_fields` to prevent field injection from a malformed
/// tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MemoryDraft {
    pub category: String,
    pub content: String,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub entities: Vec<String>,
    /// Backfilled valid_time; must be `<= now`. Defaults to transaction_time.
    #[serde(default)]
    pub happened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pinned: bool,
}

/// Filter accepted by `Store::iter_memories`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MemoryFilter {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub include_archived: bool,
}

/// A memory plus the score breakdown produced by the hybrid retriever.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredMemory {
    pub memory: Memory,
    pub lexical_rank: Option<usize>,
    pub vector_rank: Option<usize>,
    pub fused_score: f64,
    pub boosts_applied: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_roundtrip() {
        for c in [
            Category::Decision,
            Category::Pattern,
            Category::Warning,
            Category::Learning,
            Category::Fact,
        ] {
            assert_eq!(Category::parse_name(c.as_str()), Some(c));
        }
        assert_eq!(Category::parse_name("bogus"), None);
    }

    #[test]
    fn decay_applies_only_to_decisions_and_learnings() {
        assert!(Category::Decision.decays());
        assert!(Category::Learning.decays());
        assert!(!Category::Pattern.decays());
        assert!(!Category::Warning.decays());
        assert!(!Category::Fact.decays());
    }

    #[test]
    fn memory_draft_deny_unknown_fields() {
        let json = r#"{"category": "decision", "content": "use JWT", "tags": []}"#;
        let result: Result<MemoryDraft, _> = serde_json::from_str(json);
        assert!(result.is_ok());

        let json_bad = r#"{"category": "decision", "content": "use JWT", "evil": 1}"#;
        let result: Result<MemoryDraft, _> = serde_json::from_str(json_bad);
        assert!(result.is_err());
    }

    #[test]
    fn is_valid_at_checks_valid_time_only() {
        let now = Utc::now();
        let mem = Memory {
            id: 1,
            category: Category::Fact,
            content: "x".into(),
            rationale: None,
            context: None,
            tags: BTreeSet::new(),
            file_path: None,
            entities: BTreeSet::new(),
            valid_time: now - chrono::Duration::days(1),
            transaction_time: now,
            superseded_by: None,
            archived: false,
            pinned: false,
            importance_score: 0.5,
            surprise_score: 0.0,
            outcome: None,
            recall_count: 0,
            last_recalled_at: None,
            pending_reindex: false,
        };
        assert!(mem.is_valid_at(now));
        assert!(!mem.is_valid_at(now - chrono::Duration::days(2)));
    }
}
