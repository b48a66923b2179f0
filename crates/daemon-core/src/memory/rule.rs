//! Governance records: rules enforced by `govern.*` and auto-recall triggers.

use serde::{Deserialize, Serialize};

/// Governance record surfaced by `govern.add_rule` / `govern.update_rule`.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: i64,
    pub trigger_phrase: String,
    pub must_do: Vec<String>,
    pub must_not: Vec<String>,
    pub ask_first: Vec<String>,
    pub warnings: Vec<String>,
    pub priority: i32,
    pub enabled: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Draft accepted by `govern.add_rule` / `govern.update_rule`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuleDraft {
    pub trigger_phrase: String,
    #[serde(default)]
    pub must_do: Vec<String>,
    #[serde(default)]
    pub must_not: Vec<String>,
    #[serde(default)]
    pub ask_first: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Auto-recall condition matched against a file path, tag set, or entity set.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub id: i64,
    pub pattern: String,
    pub recall_topic: String,
    pub category_filter: Vec<String>,
}
