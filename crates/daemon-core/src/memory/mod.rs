//! Core data model: memories, links, governance rules, active context,
//! communities and promoted facts.
//!
//! `node` holds the primary `Memory` entity; the remaining submodules hold
//! the satellite entities that reference it by id.

mod community;
mod context;
mod fact;
mod link;
mod node;
mod rule;

pub use community::Community;
pub use context::{ActiveContextEntry, MAX_ACTIVE_CONTEXT};
pub use fact::Fact;
pub use link::{Link, Relationship};
pub use node::{Category, Memory, MemoryDraft, MemoryFilter, Outcome, ScoredMemory};
pub use rule::{Rule, RuleDraft, Trigger};
