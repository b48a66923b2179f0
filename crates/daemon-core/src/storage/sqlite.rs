//! SQLite-backed `Store`.
//!
//! Layout under `<project>/.daem0nmcp/`: `storage/daem0n.db` holds every
//! table below; `lock` is the writer-exclusion presence file. Connection
//! setup: WAL mode, `synchronous=NORMAL`, `foreign_keys=ON`, a busy
//! timeout, and 0o600/0o700 permissions on Unix.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;

use crate::error::{EngineError, Result};
use crate::memory::{
    ActiveContextEntry, Category, Community, Fact, Link, Memory, MemoryDraft, MemoryFilter,
    Outcome, Relationship, Rule, RuleDraft, Trigger, MAX_ACTIVE_CONTEXT,
};

/// A historical row from `memory_versions`, returned by `explore.versions`.
#[derive(Debug, Clone)]
pub struct MemoryVersion {
    pub memory_id: i64,
    pub transaction_time: DateTime<Utc>,
    pub content: String,
    pub rationale: Option<String>,
    pub context: Option<String>,
    pub tags: Vec<String>,
}

pub struct Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    /// Held open for the process lifetime; its mere existence on disk is the
    /// writer-exclusion signal other engine processes check at startup.
    _lock_file: std::fs::File,
    root: PathBuf,
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA temp_store = MEMORY;",
    )?;
    Ok(())
}

fn apply_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_meta (version INTEGER NOT NULL)")?;
    let current: i64 = conn
        .query_row("SELECT coalesce(max(version), 0) FROM schema_meta", [], |r| r.get(0))
        .unwrap_or(0);

    for migration in super::MIGRATIONS {
        if (migration.version as i64) > current {
            conn.execute_batch(migration.up)?;
            conn.execute("INSERT INTO schema_meta(version) VALUES (?1)", params![migration.version])?;
            tracing::info!(version = migration.version, desc = migration.description, "applied migration");
        }
    }
    Ok(())
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EngineError::StorageFailure(format!("bad timestamp {s}: {e}")))
}

impl Store {
    /// Open (creating if absent) the store rooted at `<project>/.daem0nmcp/`.
    /// Fails with `LockHeld` if another engine process already owns the
    /// directory.
    pub fn open(project_root: &Path) -> Result<Self> {
        let root = project_root.join(".daem0nmcp");
        let storage_dir = root.join("storage");
        std::fs::create_dir_all(&storage_dir)?;
        std::fs::create_dir_all(root.join("vectors"))?;
        std::fs::create_dir_all(root.join("cache"))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&root, std::fs::Permissions::from_mode(0o700));
        }

        let lock_path = root.join("lock");
        let lock_file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    EngineError::LockHeld
                } else {
                    EngineError::StorageFailure(e.to_string())
                }
            })?;

        let db_path = storage_dir.join("daem0n.db");
        let writer_conn = Connection::open(&db_path)?;

        #[cfg(unix)]
        if db_path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&db_path, std::fs::Permissions::from_mode(0o600));
        }

        configure_connection(&writer_conn)?;
        apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&db_path)?;
        configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            _lock_file: lock_file,
            root,
        })
    }

    /// Ephemeral store for tests: a fresh temp directory, lock released on drop.
    #[cfg(any(test, feature = "test-util"))]
    pub fn open_temp(dir: &Path) -> Result<Self> {
        Self::open(dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn writer(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reader(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.reader.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `maintain.compact`: forces a WAL checkpoint so the database file
    /// reflects all committed writes without waiting for SQLite's automatic
    /// checkpoint threshold.
    pub fn checkpoint(&self) -> Result<()> {
        self.writer()
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            .map_err(Into::into)
    }

    // ------------------------------------------------------------------
    // Memories
    // ------------------------------------------------------------------

    pub fn put_memory(&self, draft: MemoryDraft) -> Result<i64> {
        let category = Category::parse_name(&draft.category)
            .ok_or_else(|| EngineError::InvalidArgument(format!("unknown category {}", draft.category)))?;
        if draft.content.trim().is_empty() {
            return Err(EngineError::InvalidArgument("content must not be empty".into()));
        }
        if draft.content.len() > 64 * 1024 {
            return Err(EngineError::InvalidArgument("content exceeds 64 KiB".into()));
        }

        let now = Utc::now();
        let valid_time = match draft.happened_at {
            Some(t) if t <= now => t,
            Some(_) => return Err(EngineError::InvalidArgument("happened_at must be <= now".into())),
            None => now,
        };

        let tags = json!(draft.tags).to_string();
        let entities = json!(draft.entities).to_string();

        let conn = self.writer();
        conn.execute(
            "INSERT INTO memories
                (category, content, rationale, context, tags, file_path, entities,
                 valid_time, transaction_time, archived, pinned, importance_score,
                 surprise_score, recall_count, pending_reindex)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, 0.5, 0.0, 0, 0)",
            params![
                category.as_str(),
                draft.content,
                draft.rationale,
                draft.context,
                tags,
                normalize_file_path(draft.file_path.as_deref()),
                entities,
                valid_time.to_rfc3339(),
                now.to_rfc3339(),
                draft.pinned,
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(id)
    }

    pub fn get_memory(&self, id: i64) -> Result<Option<Memory>> {
        let conn = self.reader();
        conn.query_row("SELECT * FROM memories WHERE id = ?1", params![id], row_to_memory)
            .optional()
            .map_err(Into::into)
    }

    pub fn iter_memories(&self, filter: &MemoryFilter) -> Result<Vec<Memory>> {
        let conn = self.reader();
        let mut sql = String::from("SELECT * FROM memories WHERE 1=1");
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if !filter.include_archived {
            sql.push_str(" AND archived = 0");
        }
        if !filter.categories.is_empty() {
            let placeholders = filter
                .categories
                .iter()
                .map(|_| "?")
                .collect::<Vec<_>>()
                .join(",");
            sql.push_str(&format!(" AND category IN ({placeholders})"));
            for c in &filter.categories {
                bound.push(Box::new(c.clone()));
            }
        }
        if let Some(prefix) = &filter.file_prefix {
            sql.push_str(" AND file_path LIKE ? ESCAPE '\\'");
            bound.push(Box::new(format!("{}%", prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_"))));
        }
        if let Some(since) = filter.since {
            sql.push_str(" AND transaction_time >= ?");
            bound.push(Box::new(since.to_rfc3339()));
        }
        if let Some(until) = filter.until {
            sql.push_str(" AND transaction_time <= ?");
            bound.push(Box::new(until.to_rfc3339()));
        }
        sql.push_str(" ORDER BY id DESC");

        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params.as_slice(), row_to_memory)?;
        let mut out = Vec::new();
        for r in rows {
            let m = r?;
            if !filter.tags.is_empty() && !filter.tags.iter().any(|t| m.tags.contains(t)) {
                continue;
            }
            out.push(m);
        }
        Ok(out)
    }

    pub fn archive_memory(&self, id: i64) -> Result<()> {
        self.snapshot_version(id)?;
        let n = self
            .writer()
            .execute("UPDATE memories SET archived = 1 WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(EngineError::NotFound(format!("memory {id}")));
        }
        Ok(())
    }

    pub fn set_pinned(&self, id: i64, pinned: bool) -> Result<()> {
        let n = self
            .writer()
            .execute("UPDATE memories SET pinned = ?2 WHERE id = ?1", params![id, pinned])?;
        if n == 0 {
            return Err(EngineError::NotFound(format!("memory {id}")));
        }
        Ok(())
    }

    pub fn set_importance(&self, id: i64, score: f64) -> Result<()> {
        self.writer()
            .execute("UPDATE memories SET importance_score = ?2 WHERE id = ?1", params![id, score])?;
        Ok(())
    }

    /// Sets the insertion-time surprise score.
    pub fn set_surprise(&self, id: i64, score: f64) -> Result<()> {
        self.writer()
            .execute("UPDATE memories SET surprise_score = ?2 WHERE id = ?1", params![id, score])?;
        Ok(())
    }

    /// Merges `loser`'s `recall_count` into `survivor` and archives `loser`
    /// (keeps the higher importance_score; merges
    /// recall_count into survivor").
    pub fn merge_duplicate(&self, survivor: i64, loser: i64) -> Result<()> {
        let loser_count: i64 = self
            .reader()
            .query_row("SELECT recall_count FROM memories WHERE id = ?1", params![loser], |r| r.get(0))?;
        self.writer().execute(
            "UPDATE memories SET recall_count = recall_count + ?2 WHERE id = ?1",
            params![survivor, loser_count],
        )?;
        self.archive_memory(loser)
    }

    pub fn set_pending_reindex(&self, id: i64, pending: bool) -> Result<()> {
        self.writer().execute(
            "UPDATE memories SET pending_reindex = ?2 WHERE id = ?1",
            params![id, pending],
        )?;
        Ok(())
    }

    pub fn bump_recall(&self, ids: &[i64]) -> Result<()> {
        let conn = self.writer();
        let now = now_rfc3339();
        for id in ids {
            conn.execute(
                "UPDATE memories SET recall_count = recall_count + 1, last_recalled_at = ?2 WHERE id = ?1",
                params![id, now],
            )?;
        }
        Ok(())
    }

    pub fn delete_memory(&self, id: i64) -> Result<()> {
        let conn = self.writer();
        conn.execute("DELETE FROM active_context WHERE memory_id = ?1", params![id])?;
        conn.execute("DELETE FROM links WHERE source = ?1 OR target = ?1", params![id])?;
        conn.execute("DELETE FROM memory_versions WHERE memory_id = ?1", params![id])?;
        conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Replace content/rationale/context/tags, snapshotting the prior row
    /// to `memory_versions` first (invariant: one version per mutation).
    pub fn update_content(
        &self,
        id: i64,
        content: Option<String>,
        rationale: Option<String>,
        context: Option<String>,
        tags: Option<Vec<String>>,
    ) -> Result<()> {
        self.snapshot_version(id)?;
        let existing = self.get_memory(id)?.ok_or_else(|| EngineError::NotFound(format!("memory {id}")))?;
        let new_content = content.unwrap_or(existing.content);
        let new_rationale = rationale.or(existing.rationale);
        let new_context = context.or(existing.context);
        let new_tags = tags.unwrap_or_else(|| existing.tags.into_iter().collect());

        self.writer().execute(
            "UPDATE memories SET content = ?2, rationale = ?3, context = ?4, tags = ?5 WHERE id = ?1",
            params![id, new_content, new_rationale, new_context, json!(new_tags).to_string()],
        )?;
        Ok(())
    }

    fn snapshot_version(&self, id: i64) -> Result<()> {
        let conn = self.writer();
        let row = conn
            .query_row(
                "SELECT content, rationale, context, tags, transaction_time FROM memories WHERE id = ?1",
                params![id],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, Option<String>>(1)?,
                        r.get::<_, Option<String>>(2)?,
                        r.get::<_, String>(3)?,
                        r.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((content, rationale, context, tags, _txn)) = row else {
            return Err(EngineError::NotFound(format!("memory {id}")));
        };
        conn.execute(
            "INSERT OR REPLACE INTO memory_versions (memory_id, transaction_time, content, rationale, context, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, now_rfc3339(), content, rationale, context, tags],
        )?;
        Ok(())
    }

    pub fn versions(&self, id: i64) -> Result<Vec<MemoryVersion>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(
            "SELECT memory_id, transaction_time, content, rationale, context, tags
             FROM memory_versions WHERE memory_id = ?1 ORDER BY transaction_time ASC",
        )?;
        let rows = stmt.query_map(params![id], |r| {
            let tags_json: String = r.get(5)?;
            Ok(MemoryVersion {
                memory_id: r.get(0)?,
                transaction_time: DateTime::parse_from_rfc3339(&r.get::<_, String>(1)?)
                    .unwrap()
                    .with_timezone(&Utc),
                content: r.get(2)?,
                rationale: r.get(3)?,
                context: r.get(4)?,
                tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            })
        })?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// Reconstruct the state of `id` as of `at`, from the version table plus
    /// the current row (the newest "version" is whatever is live now).
    ///
    /// Replay keys on `transaction_time`, not `valid_time`: `valid_time` only
    /// gates whether the memory is visible at all as of `at` (property 1);
    /// which content snapshot applies is a separate question of `at`'s
    /// position among the `transaction_time`s at which each edit landed.
    pub fn at_time(&self, id: i64, at: DateTime<Utc>) -> Result<Option<Memory>> {
        let Some(current) = self.get_memory(id)? else {
            return Ok(None);
        };
        if current.valid_time > at {
            return Ok(None);
        }
        let versions = self.versions(id)?;
        let Some(newest) = versions.last() else {
            return Ok(Some(current));
        };
        if at >= newest.transaction_time {
            return Ok(Some(current));
        }
        for v in versions {
            if v.transaction_time >= at {
                let mut m = current;
                m.content = v.content;
                m.rationale = v.rationale;
                m.context = v.context;
                m.tags = v.tags.into_iter().collect();
                return Ok(Some(m));
            }
        }
        Ok(Some(current))
    }

    // ------------------------------------------------------------------
    // Outcomes
    // ------------------------------------------------------------------

    pub fn record_outcome(&self, id: i64, worked: bool, text: Option<String>) -> Result<()> {
        let now = now_rfc3339();
        let n = self.writer().execute(
            "UPDATE memories SET outcome_worked = ?2, outcome_text = ?3, outcome_recorded_at = ?4 WHERE id = ?1",
            params![id, worked, text, now],
        )?;
        if n == 0 {
            return Err(EngineError::NotFound(format!("memory {id}")));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------

    pub fn put_link(&self, source: i64, target: i64, relationship: Relationship) -> Result<()> {
        if relationship == Relationship::Supersedes && self.would_cycle(source, target)? {
            return Err(EngineError::InvalidArgument(
                "link would introduce a cycle in the supersedes graph".into(),
            ));
        }

        let conn = self.writer();
        conn.execute(
            "INSERT OR IGNORE INTO links (source, target, relationship, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![source, target, relationship.as_str(), now_rfc3339()],
        )?;

        if relationship == Relationship::Supersedes {
            conn.execute(
                "UPDATE memories SET superseded_by = ?1 WHERE id = ?2",
                params![source, target],
            )?;
        }
        Ok(())
    }

    /// BFS over existing `supersedes` edges: would `source -> target` let us
    /// walk back from `target` to `source`?
    fn would_cycle(&self, source: i64, target: i64) -> Result<bool> {
        if source == target {
            return Ok(true);
        }
        let conn = self.reader();
        let mut stmt = conn.prepare(
            "SELECT target FROM links WHERE source = ?1 AND relationship = 'supersedes'",
        )?;

        let mut frontier = vec![target];
        let mut seen = std::collections::HashSet::new();
        while let Some(node) = frontier.pop() {
            if node == source {
                return Ok(true);
            }
            if !seen.insert(node) {
                continue;
            }
            let next: Vec<i64> = stmt.query_map(params![node], |r| r.get(0))?.collect::<std::result::Result<_, _>>()?;
            frontier.extend(next);
        }
        Ok(false)
    }

    pub fn del_link(&self, source: i64, target: i64, relationship: Relationship) -> Result<()> {
        self.writer().execute(
            "DELETE FROM links WHERE source = ?1 AND target = ?2 AND relationship = ?3",
            params![source, target, relationship.as_str()],
        )?;
        Ok(())
    }

    pub fn out_edges(&self, id: i64) -> Result<Vec<Link>> {
        self.edges_where("source", id)
    }

    pub fn in_edges(&self, id: i64) -> Result<Vec<Link>> {
        self.edges_where("target", id)
    }

    fn edges_where(&self, column: &str, id: i64) -> Result<Vec<Link>> {
        let conn = self.reader();
        let sql = format!("SELECT source, target, relationship, created_at FROM links WHERE {column} = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![id], |r| {
            let rel: String = r.get(2)?;
            Ok(Link {
                source: r.get(0)?,
                target: r.get(1)?,
                relationship: Relationship::parse_name(&rel).unwrap_or(Relationship::RelatedTo),
                created_at: parse_ts_infallible(r.get::<_, String>(3)?),
            })
        })?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    pub fn all_links(&self) -> Result<Vec<Link>> {
        let conn = self.reader();
        let mut stmt = conn.prepare("SELECT source, target, relationship, created_at FROM links")?;
        let rows = stmt.query_map([], |r| {
            let rel: String = r.get(2)?;
            Ok(Link {
                source: r.get(0)?,
                target: r.get(1)?,
                relationship: Relationship::parse_name(&rel).unwrap_or(Relationship::RelatedTo),
                created_at: parse_ts_infallible(r.get::<_, String>(3)?),
            })
        })?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    // ------------------------------------------------------------------
    // Rules / Triggers
    // ------------------------------------------------------------------

    pub fn add_rule(&self, draft: RuleDraft) -> Result<i64> {
        let conn = self.writer();
        conn.execute(
            "INSERT INTO rules (trigger_phrase, must_do, must_not, ask_first, warnings, priority, enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                draft.trigger_phrase,
                json!(draft.must_do).to_string(),
                json!(draft.must_not).to_string(),
                json!(draft.ask_first).to_string(),
                json!(draft.warnings).to_string(),
                draft.priority,
                draft.enabled,
                now_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_rule(&self, id: i64, draft: RuleDraft) -> Result<()> {
        let n = self.writer().execute(
            "UPDATE rules SET trigger_phrase = ?2, must_do = ?3, must_not = ?4, ask_first = ?5,
                 warnings = ?6, priority = ?7, enabled = ?8 WHERE id = ?1",
            params![
                id,
                draft.trigger_phrase,
                json!(draft.must_do).to_string(),
                json!(draft.must_not).to_string(),
                json!(draft.ask_first).to_string(),
                json!(draft.warnings).to_string(),
                draft.priority,
                draft.enabled,
            ],
        )?;
        if n == 0 {
            return Err(EngineError::NotFound(format!("rule {id}")));
        }
        Ok(())
    }

    pub fn list_rules(&self) -> Result<Vec<Rule>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(
            "SELECT id, trigger_phrase, must_do, must_not, ask_first, warnings, priority, enabled, created_at
             FROM rules ORDER BY priority DESC",
        )?;
        let rows = stmt.query_map([], row_to_rule)?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    pub fn add_trigger(&self, pattern: String, recall_topic: String, category_filter: Vec<String>) -> Result<i64> {
        let conn = self.writer();
        conn.execute(
            "INSERT INTO triggers (pattern, recall_topic, category_filter) VALUES (?1, ?2, ?3)",
            params![pattern, recall_topic, json!(category_filter).to_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_triggers(&self) -> Result<Vec<Trigger>> {
        let conn = self.reader();
        let mut stmt = conn.prepare("SELECT id, pattern, recall_topic, category_filter FROM triggers")?;
        let rows = stmt.query_map([], |r| {
            let cf: String = r.get(3)?;
            Ok(Trigger {
                id: r.get(0)?,
                pattern: r.get(1)?,
                recall_topic: r.get(2)?,
                category_filter: serde_json::from_str(&cf).unwrap_or_default(),
            })
        })?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    // ------------------------------------------------------------------
    // Active context
    // ------------------------------------------------------------------

    pub fn put_active_context(&self, entry: ActiveContextEntry) -> Result<()> {
        let conn = self.writer();
        let count: i64 = conn.query_row("SELECT count(*) FROM active_context", [], |r| r.get(0))?;
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM active_context WHERE memory_id = ?1",
                params![entry.memory_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);

        if exists {
            return Err(EngineError::InvalidArgument(format!(
                "memory {} is already pinned into active context",
                entry.memory_id
            )));
        }
        if count as usize >= MAX_ACTIVE_CONTEXT {
            return Err(EngineError::InvalidArgument(format!(
                "active context is capped at {MAX_ACTIVE_CONTEXT} entries"
            )));
        }

        conn.execute(
            "INSERT INTO active_context (memory_id, priority, reason, expires_at, pinned_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.memory_id,
                entry.priority,
                entry.reason,
                entry.expires_at.map(|t| t.to_rfc3339()),
                entry.pinned_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn list_active_context(&self) -> Result<Vec<ActiveContextEntry>> {
        let now = Utc::now();
        let expired: Vec<i64>;
        let entries = {
            let conn = self.reader();
            let mut stmt = conn.prepare(
                "SELECT memory_id, priority, reason, expires_at, pinned_at FROM active_context ORDER BY priority DESC",
            )?;
            let rows = stmt.query_map([], row_to_active_context)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        expired = entries.iter().filter(|e| e.is_expired(now)).map(|e| e.memory_id).collect();
        if !expired.is_empty() {
            let conn = self.writer();
            for id in &expired {
                conn.execute("DELETE FROM active_context WHERE memory_id = ?1", params![id])?;
            }
        }
        Ok(entries.into_iter().filter(|e| !e.is_expired(now)).collect())
    }

    pub fn remove_active_context(&self, memory_id: i64) -> Result<()> {
        self.writer()
            .execute("DELETE FROM active_context WHERE memory_id = ?1", params![memory_id])?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Communities
    // ------------------------------------------------------------------

    pub fn replace_communities(&self, communities: &[Community]) -> Result<()> {
        let conn = self.writer();
        conn.execute("DELETE FROM communities", [])?;
        // Parents must exist before their children reference them via the
        // `communities.parent` foreign key, so insert highest level first.
        let mut ordered: Vec<&Community> = communities.iter().collect();
        ordered.sort_by(|a, b| b.level.cmp(&a.level));
        for c in ordered {
            conn.execute(
                "INSERT INTO communities (id, level, parent, members, summary, summary_vector, freshness)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    c.id,
                    c.level,
                    c.parent,
                    json!(c.members).to_string(),
                    c.summary,
                    c.summary_vector.as_ref().map(|v| json!(v).to_string()),
                    c.freshness.to_rfc3339(),
                ],
            )?;
        }
        Ok(())
    }

    pub fn communities_at_level(&self, level: u32) -> Result<Vec<Community>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(
            "SELECT id, level, parent, members, summary, summary_vector, freshness FROM communities WHERE level = ?1",
        )?;
        let rows = stmt.query_map(params![level], row_to_community)?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    // ------------------------------------------------------------------
    // Facts
    // ------------------------------------------------------------------

    pub fn find_fact(&self, content_key: &str) -> Result<Option<Fact>> {
        self.reader()
            .query_row(
                "SELECT id, source_memory_id, content_key, content, promoted_at FROM facts WHERE content_key = ?1",
                params![content_key],
                row_to_fact,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn promote_fact(&self, source_memory_id: i64, content_key: &str, content: &str) -> Result<i64> {
        let conn = self.writer();
        conn.execute(
            "INSERT OR IGNORE INTO facts (source_memory_id, content_key, content, promoted_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![source_memory_id, content_key, content, now_rfc3339()],
        )?;
        conn.query_row("SELECT id FROM facts WHERE content_key = ?1", params![content_key], |r| r.get(0))
            .map_err(Into::into)
    }

    /// Increments the per-content success counter used for fact promotion,
    /// returning the new count.
    pub fn increment_success(&self, content_key: &str) -> Result<u32> {
        let conn = self.writer();
        conn.execute(
            "INSERT INTO success_counters (content_key, successes) VALUES (?1, 1)
             ON CONFLICT(content_key) DO UPDATE SET successes = successes + 1",
            params![content_key],
        )?;
        conn.query_row(
            "SELECT successes FROM success_counters WHERE content_key = ?1",
            params![content_key],
            |r| r.get::<_, i64>(0),
        )
        .map(|v| v as u32)
        .map_err(Into::into)
    }

    // ------------------------------------------------------------------
    // Lexical fallback (LIKE/prefix lookups; BM25 ranking lives in LexicalIndex)
    // ------------------------------------------------------------------

    pub fn fts_search(&self, query: &str, limit: usize) -> Result<Vec<i64>> {
        let sanitized = sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.reader();
        let mut stmt = conn.prepare(
            "SELECT rowid FROM memories_fts WHERE memories_fts MATCH ?1 ORDER BY rank LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![sanitized, limit as i64], |r| r.get(0))?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }
}

/// Escapes FTS5 query-syntax characters so user text can't inject operators.
pub fn sanitize_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|tok| format!("\"{}\"", tok.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_file_path(path: Option<&str>) -> Option<String> {
    path.map(|p| p.trim_start_matches("./").replace('\\', "/"))
}

fn parse_ts_infallible(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn row_to_memory(r: &rusqlite::Row) -> rusqlite::Result<Memory> {
    let category: String = r.get("category")?;
    let tags_json: String = r.get("tags")?;
    let entities_json: String = r.get("entities")?;
    let worked: Option<bool> = r.get("outcome_worked")?;
    let outcome = worked.map(|worked| Outcome {
        worked,
        text: r.get("outcome_text").unwrap_or(None),
        recorded_at: r
            .get::<_, Option<String>>("outcome_recorded_at")
            .unwrap_or(None)
            .map(parse_ts_infallible)
            .unwrap_or_else(Utc::now),
    });

    Ok(Memory {
        id: r.get("id")?,
        category: Category::parse_name(&category).unwrap_or_default(),
        content: r.get("content")?,
        rationale: r.get("rationale")?,
        context: r.get("context")?,
        tags: serde_json::from_str::<Vec<String>>(&tags_json).unwrap_or_default().into_iter().collect(),
        file_path: r.get("file_path")?,
        entities: serde_json::from_str::<Vec<String>>(&entities_json).unwrap_or_default().into_iter().collect(),
        valid_time: parse_ts_infallible(r.get::<_, String>("valid_time")?),
        transaction_time: parse_ts_infallible(r.get::<_, String>("transaction_time")?),
        superseded_by: r.get("superseded_by")?,
        archived: r.get("archived")?,
        pinned: r.get("pinned")?,
        importance_score: r.get("importance_score")?,
        surprise_score: r.get("surprise_score")?,
        outcome,
        recall_count: r.get("recall_count")?,
        last_recalled_at: r
            .get::<_, Option<String>>("last_recalled_at")?
            .map(parse_ts_infallible),
        pending_reindex: r.get("pending_reindex")?,
    })
}

fn row_to_rule(r: &rusqlite::Row) -> rusqlite::Result<Rule> {
    let must_do: String = r.get(2)?;
    let must_not: String = r.get(3)?;
    let ask_first: String = r.get(4)?;
    let warnings: String = r.get(5)?;
    Ok(Rule {
        id: r.get(0)?,
        trigger_phrase: r.get(1)?,
        must_do: serde_json::from_str(&must_do).unwrap_or_default(),
        must_not: serde_json::from_str(&must_not).unwrap_or_default(),
        ask_first: serde_json::from_str(&ask_first).unwrap_or_default(),
        warnings: serde_json::from_str(&warnings).unwrap_or_default(),
        priority: r.get(6)?,
        enabled: r.get(7)?,
        created_at: parse_ts_infallible(r.get::<_, String>(8)?),
    })
}

fn row_to_active_context(r: &rusqlite::Row) -> rusqlite::Result<ActiveContextEntry> {
    Ok(ActiveContextEntry {
        memory_id: r.get(0)?,
        priority: r.get(1)?,
        reason: r.get(2)?,
        expires_at: r.get::<_, Option<String>>(3)?.map(parse_ts_infallible),
        pinned_at: parse_ts_infallible(r.get::<_, String>(4)?),
    })
}

fn row_to_community(r: &rusqlite::Row) -> rusqlite::Result<Community> {
    let members: String = r.get(3)?;
    let vector: Option<String> = r.get(5)?;
    Ok(Community {
        id: r.get(0)?,
        level: r.get(1)?,
        parent: r.get(2)?,
        members: serde_json::from_str(&members).unwrap_or_default(),
        summary: r.get(4)?,
        summary_vector: vector.and_then(|v| serde_json::from_str(&v).ok()),
        freshness: parse_ts_infallible(r.get::<_, String>(6)?),
    })
}

fn row_to_fact(r: &rusqlite::Row) -> rusqlite::Result<Fact> {
    Ok(Fact {
        id: r.get(0)?,
        source_memory_id: r.get(1)?,
        content_key: r.get(2)?,
        content: r.get(3)?,
        promoted_at: parse_ts_infallible(r.get::<_, String>(4)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn put_and_get_memory_roundtrip() {
        let (_dir, store) = temp_store();
        let id = store
            .put_memory(MemoryDraft {
                category: "decision".into(),
                content: "use JWT for auth".into(),
                rationale: None,
                context: None,
                tags: vec!["auth".into()],
                file_path: Some("./src/auth.rs".into()),
                entities: vec![],
                happened_at: None,
                pinned: false,
            })
            .unwrap();
        let m = store.get_memory(id).unwrap().unwrap();
        assert_eq!(m.content, "use JWT for auth");
        assert_eq!(m.file_path.as_deref(), Some("src/auth.rs"));
    }

    #[test]
    fn second_writer_sees_lock_held() {
        let dir = tempfile::tempdir().unwrap();
        let _first = Store::open(dir.path()).unwrap();
        let second = Store::open(dir.path());
        assert!(matches!(second, Err(EngineError::LockHeld)));
    }

    #[test]
    fn supersedes_rejects_cycles() {
        let (_dir, store) = temp_store();
        let a = store.put_memory(draft("decision", "a")).unwrap();
        let b = store.put_memory(draft("decision", "b")).unwrap();
        store.put_link(a, b, Relationship::Supersedes).unwrap();
        let result = store.put_link(b, a, Relationship::Supersedes);
        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
    }

    #[test]
    fn version_snapshot_then_content_update() {
        let (_dir, store) = temp_store();
        let id = store.put_memory(draft("learning", "v1")).unwrap();
        store
            .update_content(id, Some("v2".into()), None, None, None)
            .unwrap();
        let versions = store.versions(id).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].content, "v1");
        assert_eq!(store.get_memory(id).unwrap().unwrap().content, "v2");
    }

    #[test]
    fn active_context_cap_and_dedup() {
        let (_dir, store) = temp_store();
        let mut ids = Vec::new();
        for i in 0..10 {
            let id = store.put_memory(draft("fact", &format!("m{i}"))).unwrap();
            ids.push(id);
            store
                .put_active_context(ActiveContextEntry {
                    memory_id: id,
                    priority: 0,
                    reason: "test".into(),
                    expires_at: None,
                    pinned_at: Utc::now(),
                })
                .unwrap();
        }
        let eleventh = store.put_memory(draft("fact", "overflow")).unwrap();
        let result = store.put_active_context(ActiveContextEntry {
            memory_id: eleventh,
            priority: 0,
            reason: "test".into(),
            expires_at: None,
            pinned_at: Utc::now(),
        });
        assert!(result.is_err());

        let dup = store.put_active_context(ActiveContextEntry {
            memory_id: ids[0],
            priority: 0,
            reason: "dup".into(),
            expires_at: None,
            pinned_at: Utc::now(),
        });
        assert!(dup.is_err());
    }

    fn draft(category: &str, content: &str) -> MemoryDraft {
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
}
