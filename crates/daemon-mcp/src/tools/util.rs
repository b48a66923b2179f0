//! Argument extraction shared by every tool module.
//!
//! Tool arguments arrive as one untyped `serde_json::Value`; these helpers
//! pull individual fields out with a consistent `InvalidArgument` message
//! instead of each module hand-rolling its own `.get().and_then()` chain.

use serde_json::Value;

use crate::error::{DaemonError, DaemonResult};

pub(crate) fn str_field(args: &Value, field: &str) -> DaemonResult<String> {
    args.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DaemonError::InvalidArgument(format!("missing required field '{field}'")))
}

pub(crate) fn opt_str_field(args: &Value, field: &str) -> Option<String> {
    args.get(field).and_then(Value::as_str).map(str::to_string)
}

pub(crate) fn i64_field(args: &Value, field: &str) -> DaemonResult<i64> {
    args.get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| DaemonError::InvalidArgument(format!("missing required integer field '{field}'")))
}

pub(crate) fn opt_i64_field(args: &Value, field: &str) -> Option<i64> {
    args.get(field).and_then(Value::as_i64)
}

pub(crate) fn opt_usize_field(args: &Value, field: &str) -> Option<usize> {
    args.get(field).and_then(Value::as_u64).map(|v| v as usize)
}

pub(crate) fn bool_field(args: &Value, field: &str, default: bool) -> bool {
    args.get(field).and_then(Value::as_bool).unwrap_or(default)
}

pub(crate) fn project_path(args: &Value) -> DaemonResult<String> {
    str_field(args, "projectPath")
}

pub(crate) fn action(args: &Value) -> DaemonResult<String> {
    str_field(args, "action")
}

pub(crate) fn deserialize_field<T: serde::de::DeserializeOwned>(args: &Value, field: &str) -> DaemonResult<T> {
    let raw = args
        .get(field)
        .ok_or_else(|| DaemonError::InvalidArgument(format!("missing required field '{field}'")))?;
    serde_json::from_value(raw.clone())
        .map_err(|e| DaemonError::InvalidArgument(format!("field '{field}' is malformed: {e}")))
}
