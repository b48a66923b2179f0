//! `commune` — opens a project's briefing session and reports its health.

use serde_json::{json, Value};

use daemon_core::Engine;

use crate::dispatcher::CommuneAction;
use crate::error::DaemonResult;
use crate::tools::base_properties;

pub fn schema() -> Value {
    let mut properties = base_properties();
    properties["action"] = json!({
        "type": "string",
        "enum": ["briefing", "health"],
        "description": "'briefing' marks the session briefed and returns recent context; 'health' reports index sizes without affecting covenant state."
    });
    json!({
        "type": "object",
        "properties": properties,
        "required": ["projectPath", "action"]
    })
}

pub fn execute(engine: &Engine, project: &str, act: CommuneAction, _args: &Value) -> DaemonResult<Value> {
    match act {
        CommuneAction::Briefing => {
            let briefing = engine.briefing(project)?;
            Ok(json!({
                "recentMemories": briefing.recent_memories,
                "activeContext": briefing.active_context,
                "rules": briefing.rules,
                "warnings": briefing.warnings,
                "pendingReindexCount": briefing.pending_reindex_count,
            }))
        }
        CommuneAction::Health => {
            let health = engine.health()?;
            Ok(json!({
                "memoryCount": health.memory_count,
                "archivedCount": health.archived_count,
                "lexicalDocCount": health.lexical_doc_count,
                "vectorCount": health.vector_count,
                "vectorDimensions": health.vector_dimensions,
                "linkCount": health.link_count,
                "communityCount": health.community_count,
                "embedderReady": health.embedder_ready,
                "linkMutationsSinceRebuild": health.link_mutations_since_rebuild,
            }))
        }
    }
}
