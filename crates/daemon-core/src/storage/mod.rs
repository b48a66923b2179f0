//! Persistent typed storage for memories, links, rules, communities, facts
//! and active-context pins.
//!
//! Single-writer discipline: `Store` holds one writer connection behind a
//! `Mutex` and one lock-free reader connection opened in WAL mode.

mod migrations;
mod sqlite;

pub use migrations::MIGRATIONS;
pub use sqlite::{MemoryVersion, Store};
