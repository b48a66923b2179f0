//! `debate_internal` — splits a project's memory on a topic into the case
//! for and the case against, instead of returning one ranked list.

use serde_json::{json, Value};

use daemon_core::search::{Complexity, RetrieveParams};
use daemon_core::{Category, Engine};

use crate::error::DaemonResult;
use crate::tools::base_properties;
use crate::tools::util::str_field;

pub fn schema() -> Value {
    let mut properties = base_properties();
    properties["topic"] = json!({"type": "string"});
    json!({
        "type": "object",
        "properties": properties,
        "required": ["projectPath", "topic"]
    })
}

pub fn execute(engine: &Engine, args: &Value) -> DaemonResult<Value> {
    let topic = str_field(args, "topic")?;
    let (results, _) = engine.recall(RetrieveParams {
        topic: topic.clone(),
        auto_zoom: true,
        complexity_override: Some(Complexity::Complex),
        limit: Some(16),
        ..Default::default()
    })?;

    let (for_results, against_results): (Vec<_>, Vec<_>) = results.into_iter().partition(|r| {
        let good_outcome = r.memory.outcome.as_ref().is_some_and(|o| o.worked);
        let bad_outcome = r.memory.outcome.as_ref().is_some_and(|o| !o.worked);
        let is_warning = r.memory.category == Category::Warning;
        (good_outcome || r.memory.pinned || r.memory.importance_score >= 0.6) && !bad_outcome && !is_warning
    });

    let synthesis = format!(
        "{} memories support \"{topic}\", {} raise concerns or record a failed outcome.",
        for_results.len(),
        against_results.len(),
    );

    Ok(json!({
        "topic": topic,
        "for": for_results.iter().map(|r| &r.memory).collect::<Vec<_>>(),
        "against": against_results.iter().map(|r| &r.memory).collect::<Vec<_>>(),
        "synthesis": synthesis,
    }))
}
