//! `inscribe` — writes memories, links, pins, and active context.

use serde_json::{json, Value};

use daemon_core::{Engine, MemoryDraft, Relationship};

use crate::dispatcher::InscribeAction;
use crate::error::{DaemonError, DaemonResult};
use crate::tools::base_properties;
use crate::tools::util::{deserialize_field, i64_field, opt_str_field, str_field};

pub fn schema() -> Value {
    let mut properties = base_properties();
    properties["action"] = json!({
        "type": "string",
        "enum": ["remember", "remember_batch", "link", "unlink", "pin", "unpin", "active_context"],
    });
    properties["memory"] = json!({"type": "object", "description": "Required for 'remember': a memory draft (category, content, rationale, context, tags, filePath, entities, happenedAt, pinned)."});
    properties["memories"] = json!({"type": "array", "description": "Required for 'remember_batch': a list of memory drafts."});
    properties["source"] = json!({"type": "integer", "description": "Required for 'link'/'unlink'."});
    properties["target"] = json!({"type": "integer", "description": "Required for 'link'/'unlink'."});
    properties["relationship"] = json!({
        "type": "string",
        "enum": ["led_to", "supersedes", "depends_on", "conflicts_with", "related_to"],
        "description": "Required for 'link'/'unlink'."
    });
    properties["memoryId"] = json!({"type": "integer", "description": "Required for 'pin'/'unpin'."});
    properties["priority"] = json!({"type": "integer", "description": "Optional for 'pin'; defaults to 0."});
    properties["reason"] = json!({"type": "string", "description": "Required for 'pin': why this memory is pinned."});
    properties["expiresAt"] = json!({"type": "string", "description": "Optional RFC3339 expiry for 'pin'."});
    json!({
        "type": "object",
        "properties": properties,
        "required": ["projectPath", "action"]
    })
}

pub fn execute(engine: &Engine, _project: &str, act: InscribeAction, args: &Value) -> DaemonResult<Value> {
    match act {
        InscribeAction::Remember => {
            let draft: MemoryDraft = deserialize_field(args, "memory")?;
            let id = engine.remember(draft)?;
            Ok(json!({"id": id}))
        }
        InscribeAction::RememberBatch => {
            let drafts: Vec<MemoryDraft> = deserialize_field(args, "memories")?;
            let ids = engine.remember_batch(drafts)?;
            Ok(json!({"ids": ids}))
        }
        InscribeAction::Link => {
            let (source, target, relationship) = link_args(args)?;
            engine.link(source, target, relationship)?;
            Ok(json!({}))
        }
        InscribeAction::Unlink => {
            let (source, target, relationship) = link_args(args)?;
            engine.unlink(source, target, relationship)?;
            Ok(json!({}))
        }
        InscribeAction::Pin => {
            let memory_id = i64_field(args, "memoryId")?;
            let priority = args.get("priority").and_then(Value::as_i64).unwrap_or(0) as i32;
            let reason = str_field(args, "reason")?;
            let expires_at = opt_str_field(args, "expiresAt")
                .map(|s| {
                    chrono::DateTime::parse_from_rfc3339(&s)
                        .map(|d| d.with_timezone(&chrono::Utc))
                        .map_err(|e| DaemonError::InvalidArgument(format!("expiresAt malformed: {e}")))
                })
                .transpose()?;
            engine.pin(memory_id, priority, reason, expires_at)?;
            Ok(json!({}))
        }
        InscribeAction::Unpin => {
            let memory_id = i64_field(args, "memoryId")?;
            engine.unpin(memory_id)?;
            Ok(json!({}))
        }
        InscribeAction::ActiveContext => {
            let entries = engine.active_context()?;
            Ok(json!({"activeContext": entries}))
        }
    }
}

fn link_args(args: &Value) -> DaemonResult<(i64, i64, Relationship)> {
    let source = i64_field(args, "source")?;
    let target = i64_field(args, "target")?;
    let relationship: Relationship = deserialize_field(args, "relationship")?;
    Ok((source, target, relationship))
}
