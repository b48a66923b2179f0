//! `maintain` — archival, pruning, duplicate cleanup, and index compaction.

use serde_json::{json, Value};

use daemon_core::Engine;

use crate::dispatcher::MaintainAction;
use crate::error::DaemonResult;
use crate::tools::base_properties;
use crate::tools::util::{bool_field, i64_field, opt_i64_field};

pub fn schema() -> Value {
    let mut properties = base_properties();
    properties["action"] = json!({"type": "string", "enum": ["archive", "prune", "cleanup", "compact"]});
    properties["memoryId"] = json!({"type": "integer", "description": "Required for 'archive'."});
    properties["olderThanDays"] = json!({"type": "integer", "description": "Optional for 'prune'; defaults to 90."});
    properties["dryRun"] = json!({"type": "boolean", "description": "Optional for 'prune'/'cleanup'; defaults to false."});
    json!({
        "type": "object",
        "properties": properties,
        "required": ["projectPath", "action"]
    })
}

pub fn execute(engine: &Engine, _project: &str, act: MaintainAction, args: &Value) -> DaemonResult<Value> {
    match act {
        MaintainAction::Archive => {
            let id = i64_field(args, "memoryId")?;
            engine.archive(id)?;
            Ok(json!({}))
        }
        MaintainAction::Prune => {
            let older_than_days = opt_i64_field(args, "olderThanDays").unwrap_or(90);
            let dry_run = bool_field(args, "dryRun", false);
            Ok(json!({"candidates": engine.prune(older_than_days, dry_run)?}))
        }
        MaintainAction::Cleanup => {
            let dry_run = bool_field(args, "dryRun", false);
            let merged = engine.cleanup(dry_run)?;
            let pairs: Vec<Value> = merged
                .into_iter()
                .map(|(survivor, loser)| json!({"survivor": survivor, "loser": loser}))
                .collect();
            Ok(json!({"merged": pairs}))
        }
        MaintainAction::Compact => Ok(json!({"repairedCount": engine.compact()?})),
    }
}
