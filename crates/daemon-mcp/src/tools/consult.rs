//! `consult` — preflight tokens and the hybrid recall pipeline.

use serde_json::{json, Value};

use daemon_core::search::{Complexity, RetrieveParams};
use daemon_core::{Engine, MemoryFilter};

use crate::dispatcher::ConsultAction;
use crate::error::{DaemonError, DaemonResult};
use crate::tools::base_properties;
use crate::tools::util::{bool_field, opt_str_field, opt_usize_field, str_field};

pub fn schema() -> Value {
    let mut properties = base_properties();
    properties["action"] = json!({
        "type": "string",
        "enum": ["preflight", "recall"],
        "description": "'preflight' issues a short-lived token unblocking mutations; 'recall' runs the hybrid retriever against a topic."
    });
    properties["description"] = json!({
        "type": "string",
        "description": "Required for 'preflight': what the caller intends to do with the token."
    });
    properties["topic"] = json!({
        "type": "string",
        "description": "Required for 'recall': natural-language query."
    });
    properties["filters"] = json!({
        "type": "object",
        "description": "Optional MemoryFilter: categories, tags, filePrefix, since, until, includeArchived."
    });
    properties["complexity"] = json!({
        "type": "string",
        "enum": ["simple", "medium", "complex"],
        "description": "Overrides automatic query-complexity classification."
    });
    properties["limit"] = json!({"type": "integer", "description": "Caps result count below the complexity class's default."});
    properties["autoZoom"] = json!({"type": "boolean", "description": "Defaults true; false forces medium-complexity retrieval."});
    properties["shadowMode"] = json!({"type": "boolean", "description": "Classifies but still retrieves at medium complexity, for comparing classifier output against production ranking."});
    json!({
        "type": "object",
        "properties": properties,
        "required": ["projectPath", "action"]
    })
}

pub fn execute(engine: &Engine, project: &str, act: ConsultAction, args: &Value) -> DaemonResult<Value> {
    match act {
        ConsultAction::Preflight => {
            let description = str_field(args, "description")?;
            let token = engine.preflight(project, &description)?;
            Ok(json!({"token": token}))
        }
        ConsultAction::Recall => {
            let topic = str_field(args, "topic")?;
            let filters: MemoryFilter = match args.get("filters") {
                Some(v) if !v.is_null() => serde_json::from_value(v.clone())
                    .map_err(|e| DaemonError::InvalidArgument(format!("filters malformed: {e}")))?,
                _ => MemoryFilter::default(),
            };
            let complexity_override = opt_str_field(args, "complexity")
                .map(|s| parse_complexity(&s))
                .transpose()?;
            let params = RetrieveParams {
                topic,
                filters,
                complexity_override,
                limit: opt_usize_field(args, "limit"),
                auto_zoom: bool_field(args, "autoZoom", true),
                shadow_mode: bool_field(args, "shadowMode", false),
            };
            let (results, complexity) = engine.recall(params)?;
            Ok(json!({
                "complexityUsed": complexity_name(complexity),
                "results": results,
            }))
        }
    }
}

fn parse_complexity(s: &str) -> DaemonResult<Complexity> {
    match s {
        "simple" => Ok(Complexity::Simple),
        "medium" => Ok(Complexity::Medium),
        "complex" => Ok(Complexity::Complex),
        other => Err(DaemonError::InvalidArgument(format!("unknown complexity '{other}'"))),
    }
}

fn complexity_name(c: Complexity) -> &'static str {
    match c {
        Complexity::Simple => "simple",
        Complexity::Medium => "medium",
        Complexity::Complex => "complex",
    }
}
