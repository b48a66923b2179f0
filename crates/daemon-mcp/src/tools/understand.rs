//! `understand` — read-only lookups: a single memory, governance rules,
//! and auto-recall triggers.

use serde_json::{json, Value};

use daemon_core::Engine;

use crate::dispatcher::UnderstandAction;
use crate::error::DaemonResult;
use crate::tools::base_properties;
use crate::tools::util::i64_field;

pub fn schema() -> Value {
    let mut properties = base_properties();
    properties["action"] = json!({"type": "string", "enum": ["get", "rules", "triggers"]});
    properties["memoryId"] = json!({"type": "integer", "description": "Required for 'get'."});
    json!({
        "type": "object",
        "properties": properties,
        "required": ["projectPath", "action"]
    })
}

pub fn execute(engine: &Engine, _project: &str, act: UnderstandAction, args: &Value) -> DaemonResult<Value> {
    match act {
        UnderstandAction::Get => {
            let id = i64_field(args, "memoryId")?;
            let memory = engine.get_memory(id)?;
            Ok(json!({"memory": memory}))
        }
        UnderstandAction::Rules => Ok(json!({"rules": engine.list_rules()?})),
        UnderstandAction::Triggers => Ok(json!({"triggers": engine.list_triggers()?})),
    }
}
