use crate::error::AppError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use bytes::Bytes;
use relay::models::message::ChatMessage;
use relay::streaming::DeltaStream;
use serde::{Deserialize, Deserializer};

// Only the message list is read, anything else in the body is ignored
#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    messages: Vec<ChatMessage>,
}

// `"messages": null` is an empty conversation, the same as leaving the field out
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ChatMessage>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ChatMessage>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Plain text response whose chunks are the model's deltas, written as they arrive
pub struct DeltaResponse {
    stream: DeltaStream,
}

impl DeltaResponse {
    fn new(stream: DeltaStream) -> Self {
        Self { stream }
    }
}

impl IntoResponse for DeltaResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from_stream(self.stream));
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        response
    }
}

async fn handler(State(state): State<AppState>, body: Bytes) -> Result<DeltaResponse, AppError> {
    // Decoded by hand so a missing content type is accepted and every decode failure is a 400
    let request: ChatRequest = serde_json::from_slice(&body)?;
    tracing::debug!(messages = request.messages.len(), "relaying chat request");

    let stream = state.relay.stream(request.messages).await?;
    Ok(DeltaResponse::new(stream))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/claude-haiku-image", post(handler))
        .with_state(state)
}
