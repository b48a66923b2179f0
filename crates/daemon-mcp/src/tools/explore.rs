//! `explore` — bi-temporal history, graph relationships, and communities.

use serde_json::{json, Value};

use daemon_core::Engine;

use crate::dispatcher::ExploreAction;
use crate::error::{DaemonError, DaemonResult};
use crate::tools::base_properties;
use crate::tools::util::{i64_field, opt_usize_field, str_field};

pub fn schema() -> Value {
    let mut properties = base_properties();
    properties["action"] = json!({
        "type": "string",
        "enum": ["versions", "at_time", "neighbors", "chain", "subgraph", "evolution", "communities", "rebuild_communities", "fact"]
    });
    properties["memoryId"] = json!({"type": "integer", "description": "Required for 'versions', 'at_time', 'neighbors'."});
    properties["at"] = json!({"type": "string", "description": "Required for 'at_time': RFC3339 timestamp."});
    properties["relationship"] = json!({"type": "string", "description": "Optional for 'neighbors': restricts to one relationship kind."});
    properties["depth"] = json!({"type": "integer", "description": "Optional for 'neighbors'/'subgraph'; defaults to 1."});
    properties["from"] = json!({"type": "integer", "description": "Required for 'chain'."});
    properties["to"] = json!({"type": "integer", "description": "Required for 'chain'."});
    properties["maxDepth"] = json!({"type": "integer", "description": "Optional for 'chain'; defaults to 6."});
    properties["seedIds"] = json!({"type": "array", "description": "Required for 'subgraph'."});
    properties["entityName"] = json!({"type": "string", "description": "Required for 'evolution'."});
    properties["level"] = json!({"type": "integer", "description": "Optional for 'communities'; defaults to 0."});
    properties["minSize"] = json!({"type": "integer", "description": "Optional for 'rebuild_communities'; defaults to the configured minimum."});
    properties["resolution"] = json!({"type": "number", "description": "Optional for 'rebuild_communities'; defaults to 1.0."});
    properties["contentKey"] = json!({"type": "string", "description": "Required for 'fact'."});
    json!({
        "type": "object",
        "properties": properties,
        "required": ["projectPath", "action"]
    })
}

pub fn execute(engine: &Engine, _project: &str, act: ExploreAction, args: &Value) -> DaemonResult<Value> {
    match act {
        ExploreAction::Versions => {
            let id = i64_field(args, "memoryId")?;
            Ok(json!({"versions": engine.versions(id)?}))
        }
        ExploreAction::AtTime => {
            let id = i64_field(args, "memoryId")?;
            let at = parse_timestamp(&str_field(args, "at")?)?;
            Ok(json!({"memory": engine.at_time(id, at)?}))
        }
        ExploreAction::Neighbors => {
            let id = i64_field(args, "memoryId")?;
            let relationship = args
                .get("relationship")
                .and_then(Value::as_str)
                .map(|s| {
                    daemon_core::Relationship::parse_name(s)
                        .ok_or_else(|| DaemonError::InvalidArgument(format!("unknown relationship '{s}'")))
                })
                .transpose()?;
            let depth = opt_usize_field(args, "depth").unwrap_or(1);
            Ok(json!({"neighbors": engine.neighbors(id, relationship, depth)}))
        }
        ExploreAction::Chain => {
            let from = i64_field(args, "from")?;
            let to = i64_field(args, "to")?;
            let max_depth = opt_usize_field(args, "maxDepth").unwrap_or(6);
            Ok(json!({"chain": engine.chain(from, to, max_depth)}))
        }
        ExploreAction::Subgraph => {
            let seed_ids: Vec<i64> = args
                .get("seedIds")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .ok_or_else(|| DaemonError::InvalidArgument("missing required field 'seedIds'".into()))?;
            let depth = opt_usize_field(args, "depth").unwrap_or(1);
            let subgraph = engine.subgraph(&seed_ids, depth);
            Ok(json!({"nodes": subgraph.nodes, "links": subgraph.links}))
        }
        ExploreAction::Evolution => {
            let entity_name = str_field(args, "entityName")?;
            Ok(json!({"memories": engine.evolution(&entity_name)?}))
        }
        ExploreAction::Communities => {
            let level = opt_usize_field(args, "level").unwrap_or(0) as u32;
            Ok(json!({"communities": engine.communities(level)?}))
        }
        ExploreAction::RebuildCommunities => {
            let min_size = opt_usize_field(args, "minSize").unwrap_or(engine.config().community_min_size);
            let resolution = args.get("resolution").and_then(Value::as_f64).unwrap_or(1.0);
            Ok(json!({"communities": engine.rebuild_communities(min_size, resolution)?}))
        }
        ExploreAction::Fact => {
            let content_key = str_field(args, "contentKey")?;
            Ok(json!({"fact": engine.fact(&content_key)?}))
        }
    }
}

fn parse_timestamp(s: &str) -> DaemonResult<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&chrono::Utc))
        .map_err(|e| DaemonError::InvalidArgument(format!("'at' malformed: {e}")))
}
