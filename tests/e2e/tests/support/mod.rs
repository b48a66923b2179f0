//! Shared harness for end-to-end scenario tests: a fresh `Engine` rooted in
//! its own temp directory per test, plus the couple of request-builder
//! helpers every scenario needs.

use daemon_core::{Config, Engine, MemoryDraft};
use tempfile::TempDir;

pub fn open_engine() -> (Engine, TempDir) {
    let dir = TempDir::new().expect("tempdir");
    let engine = Engine::open(dir.path(), Config::default()).expect("open engine");
    (engine, dir)
}

pub fn draft(category: &str, content: &str) -> MemoryDraft {
    MemoryDraft {
        category: category.to_string(),
        content: content.to_string(),
        rationale: None,
        context: None,
        tags: Vec::new(),
        file_path: None,
        entities: Vec::new(),
        happened_at: None,
        pinned: false,
    }
}
