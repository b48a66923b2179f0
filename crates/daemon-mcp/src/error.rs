//! Translates `daemon_core::EngineError` (and this crate's own transport
//! failures) into the `{code, message, remediation?}` tool-response
//! envelope described in the engine's error design.

use serde::Serialize;
use serde_json::Value;

use daemon_core::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown action '{0}' for this tool")]
    UnknownAction(String),

    #[error("unknown tool '{0}'")]
    UnknownTool(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<&'static str>,
}

impl DaemonError {
    pub fn to_envelope(&self) -> ErrorEnvelope {
        match self {
            DaemonError::Engine(e) => ErrorEnvelope {
                code: e.code(),
                message: e.to_string(),
                remediation: e.remediation(),
            },
            DaemonError::InvalidArgument(msg) => ErrorEnvelope {
                code: "InvalidArgument",
                message: msg.clone(),
                remediation: None,
            },
            DaemonError::UnknownAction(action) => ErrorEnvelope {
                code: "InvalidArgument",
                message: format!("unknown action '{action}' for this tool"),
                remediation: None,
            },
            DaemonError::UnknownTool(name) => ErrorEnvelope {
                code: "InvalidArgument",
                message: format!("unknown tool '{name}'"),
                remediation: None,
            },
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self.to_envelope()).unwrap_or_else(|_| {
            serde_json::json!({"code": "InternalError", "message": self.to_string()})
        })
    }
}

pub type DaemonResult<T> = std::result::Result<T, DaemonError>;
