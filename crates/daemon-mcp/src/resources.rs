//! `daem0n://` read-only resources: the same context a briefing surfaces,
//! addressable individually for clients that read resources instead of
//! calling tools.
//!
//! URI shapes:
//!   daem0n://warnings/{project}   - all warning-category memories
//!   daem0n://failed/{project}     - memories with a recorded worked=false outcome
//!   daem0n://rules/{project}      - governance rules
//!   daem0n://context/{project}    - pinned active-context entries
//!   daem0n://triggered/{file}     - triggers whose pattern matches a file path

use serde_json::{json, Value};

use crate::error::{DaemonError, DaemonResult};
use crate::protocol::messages::ResourceDescription;
use crate::registry::ProjectRegistry;

const SCHEME: &str = "daem0n://";

pub fn list(project: &str) -> Vec<ResourceDescription> {
    let encoded = urlencode(project);
    vec![
        describe(format!("{SCHEME}warnings/{encoded}"), "Warnings", "Warning-category memories"),
        describe(format!("{SCHEME}failed/{encoded}"), "Failed decisions", "Memories with a recorded worked=false outcome"),
        describe(format!("{SCHEME}rules/{encoded}"), "Rules", "Governance rules"),
        describe(format!("{SCHEME}context/{encoded}"), "Active context", "Currently pinned memories"),
        describe(
            format!("{SCHEME}triggered/{{file}}"),
            "Triggered",
            "Triggers matching a file path, resolved against the process's default project",
        ),
    ]
}

fn describe(uri: String, name: &str, description: &str) -> ResourceDescription {
    ResourceDescription {
        uri,
        name: name.to_string(),
        description: Some(description.to_string()),
        mime_type: Some("application/json".to_string()),
    }
}

/// Reads one resource URI, opening the named project's engine on demand.
pub fn read(registry: &ProjectRegistry, uri: &str) -> DaemonResult<Value> {
    let rest = uri
        .strip_prefix(SCHEME)
        .ok_or_else(|| DaemonError::InvalidArgument(format!("unrecognized resource scheme in '{uri}'")))?;
    let (kind, subject) = rest
        .split_once('/')
        .ok_or_else(|| DaemonError::InvalidArgument(format!("malformed resource uri '{uri}'")))?;
    let subject = urldecode(subject);

    match kind {
        "warnings" => {
            let (engine, _) = registry.get_or_open(&subject)?;
            Ok(json!({"warnings": engine.warnings()?}))
        }
        "failed" => {
            let (engine, _) = registry.get_or_open(&subject)?;
            let memories = engine.failed_decisions()?;
            Ok(json!({"failed": memories}))
        }
        "rules" => {
            let (engine, _) = registry.get_or_open(&subject)?;
            Ok(json!({"rules": engine.list_rules()?}))
        }
        "context" => {
            let (engine, _) = registry.get_or_open(&subject)?;
            Ok(json!({"activeContext": engine.active_context()?}))
        }
        "triggered" => {
            // `subject` here is a file path, not a project; triggers are
            // project-scoped, so this resolves against the process's
            // default project rather than the URI itself naming one.
            let default_project = registry.default_project()?;
            let (engine, _) = registry.get_or_open(&default_project)?;
            let triggers = engine.list_triggers()?;
            let matching: Vec<_> = triggers.into_iter().filter(|t| path_matches(&t.pattern, &subject)).collect();
            Ok(json!({"triggered": matching}))
        }
        other => Err(DaemonError::InvalidArgument(format!("unknown resource kind '{other}'"))),
    }
}

fn path_matches(pattern: &str, path: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix('*') {
        path.ends_with(suffix)
    } else if let Some(prefix) = pattern.strip_suffix('*') {
        path.starts_with(prefix)
    } else {
        path.contains(pattern)
    }
}

fn urlencode(s: &str) -> String {
    s.replace('%', "%25").replace('/', "%2F")
}

fn urldecode(s: &str) -> String {
    s.replace("%2F", "/").replace("%25", "%")
}
