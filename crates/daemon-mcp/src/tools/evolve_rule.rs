//! `evolve_rule` — proposes a revision to an existing rule given a fresh
//! observation. Read-only: callers apply the suggestion themselves via
//! `govern.update_rule` if they agree with it.

use serde_json::{json, Value};

use daemon_core::{Engine, EngineError};

use crate::error::DaemonResult;
use crate::tools::base_properties;
use crate::tools::util::{i64_field, str_field};

const NEGATIVE_CUES: &[&str] = &["fail", "broke", "bug", "error", "avoid", "don't", "stopped working", "regression"];

pub fn schema() -> Value {
    let mut properties = base_properties();
    properties["ruleId"] = json!({"type": "integer"});
    properties["observation"] = json!({
        "type": "string",
        "description": "What was just observed about the rule's trigger phrase in practice."
    });
    json!({
        "type": "object",
        "properties": properties,
        "required": ["projectPath", "ruleId", "observation"]
    })
}

pub fn execute(engine: &Engine, args: &Value) -> DaemonResult<Value> {
    let rule_id = i64_field(args, "ruleId")?;
    let observation = str_field(args, "observation")?;

    let rule = engine
        .list_rules()?
        .into_iter()
        .find(|r| r.id == rule_id)
        .ok_or_else(|| EngineError::NotFound(format!("rule {rule_id}")))?;

    let lower = observation.to_lowercase();
    let negative = NEGATIVE_CUES.iter().any(|cue| lower.contains(cue));

    let mut proposed = rule.clone();
    if negative {
        proposed.must_not.push(observation.clone());
    } else {
        proposed.must_do.push(observation.clone());
    }

    Ok(json!({
        "currentRule": rule,
        "proposedRule": {
            "triggerPhrase": proposed.trigger_phrase,
            "mustDo": proposed.must_do,
            "mustNot": proposed.must_not,
            "askFirst": proposed.ask_first,
            "warnings": proposed.warnings,
            "priority": proposed.priority,
            "enabled": proposed.enabled,
        },
        "classifiedAs": if negative { "must_not" } else { "must_do" },
    }))
}
