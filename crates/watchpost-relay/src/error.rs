use thiserror::Error;

#[derive(Debug, Error)]
/// Delivery failures reported by a notification relay.
pub enum RelayError {
    #[error("slack {operation} request failed: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("slack {operation} failed with status {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("slack {operation} rejected the message: {error}")]
    Rejected { operation: String, error: String },
    #[error("failed to decode slack {operation} response: {source}")]
    Decode {
        operation: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type RelayResult<T> = Result<T, RelayError>;
