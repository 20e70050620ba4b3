use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay::errors::{ProviderError, RelayError};
use serde_json::json;
use thiserror::Error;

pub const ENV_PREFIX: &str = "RELAY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing credential: set {env_var} or {fallback}")]
    MissingCredential { env_var: String, fallback: String },

    #[error("Invalid listen address {addr}: {source}")]
    InvalidAddress {
        addr: String,
        source: std::net::AddrParseError,
    },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Map a settings key such as `provider.access_key_id` to the variable that sets it
pub fn to_env_var(field: &str) -> String {
    format!("{}_{}", ENV_PREFIX, field.to_uppercase().replace('.', "__"))
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed request body: {0}")]
    MalformedRequest(#[from] serde_json::Error),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl AppError {
    /// What the client is told. Provider failures are logged in full but may carry
    /// upstream payloads, so the client only learns the upstream status.
    fn client_message(&self) -> String {
        match self {
            AppError::MalformedRequest(_) => self.to_string(),
            AppError::Relay(RelayError::Serialize(_)) => {
                "Failed to build the inference request".to_string()
            }
            AppError::Relay(RelayError::Invoke(ProviderError::Request { status, .. })) => {
                format!("Model provider request failed with status {}", status)
            }
            AppError::Relay(_) => "Model provider request failed".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            AppError::MalformedRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
            AppError::Relay(RelayError::Serialize(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "server_error")
            }
            AppError::Relay(_) => (StatusCode::BAD_GATEWAY, "provider_error"),
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Rejected request: {}", self);
        }

        let body = Json(json!({
            "error": {
                "message": self.client_message(),
                "type": error_type,
            }
        }));

        (status, body).into_response()
    }
}
