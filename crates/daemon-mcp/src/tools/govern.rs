//! `govern` — governance rules and auto-recall triggers.

use serde_json::{json, Value};

use daemon_core::{Engine, RuleDraft};

use crate::dispatcher::GovernAction;
use crate::error::DaemonResult;
use crate::tools::base_properties;
use crate::tools::util::{deserialize_field, i64_field, str_field};

pub fn schema() -> Value {
    let mut properties = base_properties();
    properties["action"] = json!({"type": "string", "enum": ["add_rule", "update_rule", "add_trigger", "list_triggers"]});
    properties["rule"] = json!({"type": "object", "description": "Required for 'add_rule'/'update_rule': triggerPhrase, mustDo, mustNot, askFirst, warnings, priority, enabled."});
    properties["ruleId"] = json!({"type": "integer", "description": "Required for 'update_rule'."});
    properties["pattern"] = json!({"type": "string", "description": "Required for 'add_trigger': glob-ish match against a file path, tag, or entity."});
    properties["recallTopic"] = json!({"type": "string", "description": "Required for 'add_trigger': topic auto-recalled when the pattern matches."});
    properties["categoryFilter"] = json!({"type": "array", "description": "Optional for 'add_trigger': category names to restrict the auto-recall to."});
    json!({
        "type": "object",
        "properties": properties,
        "required": ["projectPath", "action"]
    })
}

pub fn execute(engine: &Engine, _project: &str, act: GovernAction, args: &Value) -> DaemonResult<Value> {
    match act {
        GovernAction::AddRule => {
            let draft: RuleDraft = deserialize_field(args, "rule")?;
            let id = engine.add_rule(draft)?;
            Ok(json!({"id": id}))
        }
        GovernAction::UpdateRule => {
            let id = i64_field(args, "ruleId")?;
            let draft: RuleDraft = deserialize_field(args, "rule")?;
            engine.update_rule(id, draft)?;
            Ok(json!({}))
        }
        GovernAction::AddTrigger => {
            let pattern = str_field(args, "pattern")?;
            let recall_topic = str_field(args, "recallTopic")?;
            let category_filter: Vec<String> = args
                .get("categoryFilter")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            let id = engine.add_trigger(pattern, recall_topic, category_filter)?;
            Ok(json!({"id": id}))
        }
        GovernAction::ListTriggers => Ok(json!({"triggers": engine.list_triggers()?})),
    }
}
