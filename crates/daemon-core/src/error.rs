//! Stable error taxonomy shared by every component.
//!
//! Each variant maps to one of the stable string codes below; the MCP
//! crate's `DaemonError` wraps these into the `{code, message, remediation?}`
//! tool-response envelope without re-deriving the mapping.

/// Top-level engine error. Component errors (`StorageError`, `VectorSearchError`,
/// `CovenantError`, ...) convert into this via `#[from]` so call sites can
/// propagate with `?` and still end up with one stable code.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("session must call commune.briefing before this action")]
    CommunionRequired,

    #[error("a valid preflight token is required for this action: {0}")]
    CounselRequired(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("write collided with another writer")]
    Conflict,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("worker queue saturated")]
    Overloaded,

    #[error("all retrieval sources failed")]
    RetrievalFailure,

    #[error("another engine instance owns this project directory")]
    LockHeld,

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl EngineError {
    /// Stable string code, independent of the `Display` message.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::CommunionRequired => "CommunionRequired",
            EngineError::CounselRequired(_) => "CounselRequired",
            EngineError::NotFound(_) => "NotFound",
            EngineError::Conflict => "Conflict",
            EngineError::InvalidArgument(_) => "InvalidArgument",
            EngineError::Overloaded => "Overloaded",
            EngineError::RetrievalFailure => "RetrievalFailure",
            EngineError::LockHeld => "LockHeld",
            EngineError::StorageFailure(_) => "StorageFailure",
            EngineError::InternalError(_) => "InternalError",
        }
    }

    /// Short remediation hint surfaced to the caller, where one applies.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            EngineError::CommunionRequired => {
                Some("call commune.briefing(project_path) before retrying")
            }
            EngineError::CounselRequired(_) => {
                Some("call consult.preflight(description) to obtain a token, then retry")
            }
            EngineError::LockHeld => {
                Some("stop the other engine process for this project, or wait for its lock to release")
            }
            EngineError::Overloaded => Some("retry after a short backoff"),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::StorageFailure(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::StorageFailure(e.to_string())
    }
}
