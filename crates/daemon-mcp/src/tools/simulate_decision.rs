//! `simulate_decision` — a dry run for a proposed decision: recalls related
//! context at complex-query depth and separates it into support, warnings,
//! and past conflicts before anything is written.

use serde_json::{json, Value};

use daemon_core::search::{Complexity, RetrieveParams};
use daemon_core::{Category, Engine};

use crate::error::DaemonResult;
use crate::tools::base_properties;
use crate::tools::util::str_field;

pub fn schema() -> Value {
    let mut properties = base_properties();
    properties["proposal"] = json!({
        "type": "string",
        "description": "The decision under consideration, written the way it would be inscribed."
    });
    json!({
        "type": "object",
        "properties": properties,
        "required": ["projectPath", "proposal"]
    })
}

pub fn execute(engine: &Engine, args: &Value) -> DaemonResult<Value> {
    let proposal = str_field(args, "proposal")?;
    let (results, _) = engine.recall(RetrieveParams {
        topic: proposal,
        auto_zoom: true,
        complexity_override: Some(Complexity::Complex),
        limit: Some(10),
        ..Default::default()
    })?;

    let warnings: Vec<_> = results.iter().filter(|r| r.memory.category == Category::Warning).collect();
    let conflicts: Vec<_> = results
        .iter()
        .filter(|r| r.memory.outcome.as_ref().is_some_and(|o| !o.worked))
        .collect();
    let supporting: Vec<_> = results
        .iter()
        .filter(|r| r.memory.category == Category::Pattern || r.memory.outcome.as_ref().is_some_and(|o| o.worked))
        .collect();

    let verdict = if !warnings.is_empty() || !conflicts.is_empty() {
        "caution"
    } else if !supporting.is_empty() {
        "supported"
    } else {
        "no precedent"
    };

    Ok(json!({
        "verdict": verdict,
        "warnings": warnings.iter().map(|r| &r.memory).collect::<Vec<_>>(),
        "conflicts": conflicts.iter().map(|r| &r.memory).collect::<Vec<_>>(),
        "supporting": supporting.iter().map(|r| &r.memory).collect::<Vec<_>>(),
        "relatedCount": results.len(),
    }))
}
