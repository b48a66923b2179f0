//! Pinning memories into a session's small working-context window.

use serde::{Deserialize, Serialize};

/// Cap enforced by `inscribe.pin` / `Store::put_active_context`.
pub const MAX_ACTIVE_CONTEXT: usize = 10;

/// A memory pinned into working context with a priority and optional expiry.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveContextEntry {
    pub memory_id: i64,
    pub priority: i32,
    pub reason: String,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub pinned_at: chrono::DateTime<chrono::Utc>,
}

impl ActiveContextEntry {
    /// Entries past expiry are elided from reads and removed lazily (invariant 6).
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.expires_at.is_some_and(|e| e <= now)
    }
}
