//! Versioned schema migrations.
//!
//! Applied in order at `Store::open`, tracked in `schema_meta`. Kept as a
//! `&[Migration]` array even though the data model currently needs only
//! one migration, so later schema changes land the same way.

/// A single forward-only schema migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial daem0n schema: memories, links, rules, triggers, active context, communities, facts",
    up: MIGRATION_V1_UP,
}];

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    category            TEXT NOT NULL,
    content             TEXT NOT NULL,
    rationale           TEXT,
    context             TEXT,
    tags                TEXT NOT NULL DEFAULT '[]',
    file_path           TEXT,
    entities            TEXT NOT NULL DEFAULT '[]',
    valid_time          TEXT NOT NULL,
    transaction_time    TEXT NOT NULL,
    superseded_by       INTEGER REFERENCES memories(id),
    archived            INTEGER NOT NULL DEFAULT 0,
    pinned              INTEGER NOT NULL DEFAULT 0,
    importance_score    REAL NOT NULL DEFAULT 0.5,
    surprise_score      REAL NOT NULL DEFAULT 0.0,
    outcome_worked      INTEGER,
    outcome_text        TEXT,
    outcome_recorded_at TEXT,
    recall_count        INTEGER NOT NULL DEFAULT 0,
    last_recalled_at    TEXT,
    pending_reindex     INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_memories_category ON memories(category);
CREATE INDEX IF NOT EXISTS idx_memories_file_path ON memories(file_path);
CREATE INDEX IF NOT EXISTS idx_memories_archived ON memories(archived);
CREATE INDEX IF NOT EXISTS idx_memories_transaction_time ON memories(transaction_time);

CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    content, rationale, context, tags, file_path,
    content='memories', content_rowid='id', tokenize='porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS memories_fts_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, content, rationale, context, tags, file_path)
    VALUES (new.id, new.content, coalesce(new.rationale, ''), coalesce(new.context, ''), new.tags, coalesce(new.file_path, ''));
END;

CREATE TRIGGER IF NOT EXISTS memories_fts_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, content, rationale, context, tags, file_path)
    VALUES ('delete', old.id, old.content, coalesce(old.rationale, ''), coalesce(old.context, ''), old.tags, coalesce(old.file_path, ''));
END;

CREATE TRIGGER IF NOT EXISTS memories_fts_au AFTER UPDATE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, content, rationale, context, tags, file_path)
    VALUES ('delete', old.id, old.content, coalesce(old.rationale, ''), coalesce(old.context, ''), old.tags, coalesce(old.file_path, ''));
    INSERT INTO memories_fts(rowid, content, rationale, context, tags, file_path)
    VALUES (new.id, new.content, coalesce(new.rationale, ''), coalesce(new.context, ''), new.tags, coalesce(new.file_path, ''));
END;

CREATE TABLE IF NOT EXISTS memory_versions (
    memory_id        INTEGER NOT NULL REFERENCES memories(id),
    transaction_time TEXT NOT NULL,
    content          TEXT NOT NULL,
    rationale        TEXT,
    context          TEXT,
    tags             TEXT NOT NULL DEFAULT '[]',
    PRIMARY KEY (memory_id, transaction_time)
);

CREATE TABLE IF NOT EXISTS links (
    source       INTEGER NOT NULL REFERENCES memories(id),
    target       INTEGER NOT NULL REFERENCES memories(id),
    relationship TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    PRIMARY KEY (source, target, relationship)
);

CREATE INDEX IF NOT EXISTS idx_links_target ON links(target);

CREATE TABLE IF NOT EXISTS rules (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    trigger_phrase TEXT NOT NULL,
    must_do        TEXT NOT NULL DEFAULT '[]',
    must_not       TEXT NOT NULL DEFAULT '[]',
    ask_first      TEXT NOT NULL DEFAULT '[]',
    warnings       TEXT NOT NULL DEFAULT '[]',
    priority       INTEGER NOT NULL DEFAULT 0,
    enabled        INTEGER NOT NULL DEFAULT 1,
    created_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS triggers (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern         TEXT NOT NULL,
    recall_topic    TEXT NOT NULL,
    category_filter TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS active_context (
    memory_id  INTEGER PRIMARY KEY REFERENCES memories(id),
    priority   INTEGER NOT NULL DEFAULT 0,
    reason     TEXT NOT NULL,
    expires_at TEXT,
    pinned_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS communities (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    level          INTEGER NOT NULL,
    parent         INTEGER REFERENCES communities(id),
    members        TEXT NOT NULL DEFAULT '[]',
    summary        TEXT NOT NULL DEFAULT '',
    summary_vector TEXT,
    freshness      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_communities_level ON communities(level);

CREATE TABLE IF NOT EXISTS facts (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    source_memory_id INTEGER NOT NULL REFERENCES memories(id),
    content_key      TEXT NOT NULL UNIQUE,
    content          TEXT NOT NULL,
    promoted_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS success_counters (
    content_key TEXT PRIMARY KEY,
    successes   INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS schema_meta (
    version INTEGER NOT NULL
);
"#;
