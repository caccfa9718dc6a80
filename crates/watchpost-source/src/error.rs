use thiserror::Error;

#[derive(Debug, Error)]
/// Failure outcomes of a Discord API call.
pub enum SourceError {
    #[error("discord api {operation} denied access (status {status})")]
    PermissionDenied { operation: String, status: u16 },
    #[error("discord api {operation} failed with status {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("discord api {operation} request failed: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to decode discord {operation}: {source}")]
    Decode {
        operation: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid discord request: {0}")]
    InvalidRequest(String),
}

impl SourceError {
    /// True when the remote rejected access; callers treat this as a skip.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::PermissionDenied { status, .. } | Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type SourceResult<T> = Result<T, SourceError>;
