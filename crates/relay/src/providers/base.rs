use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::errors::ProviderError;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A serialized request envelope for a streaming model invocation
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeRequest {
    pub model_id: String,
    pub content_type: String,
    pub accept: String,
    pub body: Bytes,
}

impl InvokeRequest {
    /// A JSON in, JSON out invocation of `model_id`
    pub fn json<S: Into<String>, B: Into<Bytes>>(model_id: S, body: B) -> Self {
        Self {
            model_id: model_id.into(),
            content_type: JSON_CONTENT_TYPE.to_string(),
            accept: JSON_CONTENT_TYPE.to_string(),
            body: body.into(),
        }
    }
}

/// One event of a provider response stream
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    /// Raw payload bytes of a model output chunk
    Chunk(Bytes),
    /// An event type this client does not know, carrying its tag
    Unknown(String),
    /// An event without any type
    Untyped,
}

pub type EventStream = BoxStream<'static, Result<ResponseEvent, ProviderError>>;

/// Base trait for inference providers
///
/// Implementations are built once at startup and shared read-only across requests.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Start a streaming invocation, resolving once the provider has accepted the request
    async fn invoke_stream(&self, request: InvokeRequest) -> Result<EventStream, ProviderError>;
}
