use thiserror::Error;

use crate::providers::eventstream::EventStreamError;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Failed to sign request: {0}")]
    Signing(String),

    #[error("Request failed: {status} - {body}")]
    Request { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed event stream: {0}")]
    EventStream(#[from] EventStreamError),

    #[error("{kind}: {message}")]
    Exception { kind: String, message: String },
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Failed to serialize inference request: {0}")]
    Serialize(serde_json::Error),

    #[error("Inference call failed: {0}")]
    Invoke(ProviderError),

    #[error("Response stream failed: {0}")]
    Stream(ProviderError),

    #[error("Failed to decode stream chunk: {0}")]
    Decode(serde_json::Error),
}

pub type RelayResult<T> = Result<T, RelayError>;
