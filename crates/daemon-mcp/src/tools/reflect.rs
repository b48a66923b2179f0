//! `reflect` — records whether a memory's prescribed action worked out.

use serde_json::{json, Value};

use daemon_core::Engine;

use crate::dispatcher::ReflectAction;
use crate::error::DaemonResult;
use crate::tools::base_properties;
use crate::tools::util::{bool_field, i64_field, opt_str_field};

pub fn schema() -> Value {
    let mut properties = base_properties();
    properties["action"] = json!({"type": "string", "enum": ["outcome"]});
    properties["memoryId"] = json!({"type": "integer"});
    properties["worked"] = json!({"type": "boolean"});
    properties["text"] = json!({"type": "string", "description": "Optional free-text note on what happened."});
    json!({
        "type": "object",
        "properties": properties,
        "required": ["projectPath", "action", "memoryId", "worked"]
    })
}

pub fn execute(engine: &Engine, _project: &str, act: ReflectAction, args: &Value) -> DaemonResult<Value> {
    match act {
        ReflectAction::Outcome => {
            let id = i64_field(args, "memoryId")?;
            let worked = bool_field(args, "worked", false);
            let text = opt_str_field(args, "text");
            let result = engine.record_outcome(id, worked, text)?;
            Ok(json!({
                "newImportance": result.new_importance,
                "promotedFact": result.promoted_fact,
            }))
        }
    }
}
