//! One module per MCP tool. Each exposes `schema()` for `tools/list` and
//! `execute()` for `tools/call`; `dispatcher` owns action parsing and
//! covenant gating, so `execute()` only ever sees an already-permitted call.

pub mod commune;
pub mod consult;
pub mod debate_internal;
pub mod evolve_rule;
pub mod explore;
pub mod govern;
pub mod inscribe;
pub mod maintain;
pub mod reflect;
pub mod simulate_decision;
pub mod understand;
pub(crate) mod util;

use serde_json::{json, Value};

use crate::protocol::messages::ToolDescription;

/// `tools/list` payload: name, one-line description, and the JSON schema
/// `tools/call` arguments are expected to satisfy.
pub fn list() -> Vec<ToolDescription> {
    vec![
        describe("commune", "Open or check the health of a project's briefing session.", commune::schema()),
        describe("consult", "Obtain a preflight token, or recall ranked memories for a topic.", consult::schema()),
        describe("inscribe", "Record, link, or pin memories into a project's persistent context.", inscribe::schema()),
        describe("reflect", "Record whether a past decision worked out.", reflect::schema()),
        describe("understand", "Read a single memory, or list governance rules and triggers.", understand::schema()),
        describe("govern", "Add or update governance rules and auto-recall triggers.", govern::schema()),
        describe("explore", "Inspect memory history, graph relationships, and communities.", explore::schema()),
        describe("maintain", "Archive, prune, deduplicate, or compact a project's memory store.", maintain::schema()),
        describe(
            "simulate_decision",
            "Surface related context and conflicts for a proposed decision before it's made.",
            simulate_decision::schema(),
        ),
        describe("evolve_rule", "Propose a revision to an existing rule given a new observation.", evolve_rule::schema()),
        describe(
            "debate_internal",
            "Split a project's memory on a topic into supporting and opposing context.",
            debate_internal::schema(),
        ),
    ]
}

fn describe(name: &str, description: &str, input_schema: Value) -> ToolDescription {
    ToolDescription {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema,
    }
}

/// `projectPath` schema fragment every tool's input schema starts from.
pub(crate) fn base_properties() -> Value {
    json!({
        "projectPath": {"type": "string", "description": "Absolute or relative path to the project root."}
    })
}
