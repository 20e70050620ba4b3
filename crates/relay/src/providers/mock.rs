use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use futures::future;
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::sync::{Arc, Mutex};

use super::base::{EventStream, InvokeRequest, Provider, ResponseEvent};
use super::eventstream::{encode_message, HeaderValue};
use crate::errors::ProviderError;

/// One step of a scripted response stream
#[derive(Debug, Clone)]
pub enum ScriptedEvent {
    Event(ResponseEvent),
    /// Fail the stream at this point with an exception of the given message
    Fail(String),
}

/// A mock provider that replays a pre-configured response stream for testing
pub struct MockProvider {
    script: Vec<ScriptedEvent>,
    invoke_error: Option<String>,
    hang: bool,
    requests: Arc<Mutex<Vec<InvokeRequest>>>,
}

impl MockProvider {
    pub fn new(script: Vec<ScriptedEvent>) -> Self {
        Self {
            script,
            invoke_error: None,
            hang: false,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Stream one `content_block_delta` chunk per text
    pub fn with_deltas(texts: &[&str]) -> Self {
        Self::new(
            texts
                .iter()
                .map(|text| ScriptedEvent::Event(ResponseEvent::Chunk(delta_chunk(0, text))))
                .collect(),
        )
    }

    /// Reject every invocation before any event is produced
    pub fn failing<S: Into<String>>(message: S) -> Self {
        Self {
            invoke_error: Some(message.into()),
            ..Self::new(Vec::new())
        }
    }

    /// Accept every invocation and never answer
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new(Vec::new())
        }
    }

    /// Every request this provider has been invoked with, oldest first
    pub fn requests(&self) -> Vec<InvokeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn invoke_stream(&self, request: InvokeRequest) -> Result<EventStream, ProviderError> {
        self.requests.lock().unwrap().push(request);

        if self.hang {
            future::pending::<()>().await;
        }

        if let Some(message) = &self.invoke_error {
            return Err(ProviderError::Request {
                status: 500,
                body: message.clone(),
            });
        }

        let events = self.script.clone().into_iter().map(|step| match step {
            ScriptedEvent::Event(event) => Ok(event),
            ScriptedEvent::Fail(message) => Err(ProviderError::Exception {
                kind: "modelStreamErrorException".to_string(),
                message,
            }),
        });
        Ok(stream::iter(events).boxed())
    }
}

/// The JSON of a Claude `content_block_delta` chunk
pub fn delta_chunk(index: u32, text: &str) -> Bytes {
    Bytes::from(
        json!({
            "type": "content_block_delta",
            "index": index,
            "delta": {"type": "text_delta", "text": text}
        })
        .to_string(),
    )
}

/// A Bedrock `chunk` event wrapping `payload`
pub fn chunk_frame(payload: &[u8]) -> Bytes {
    let body = json!({ "bytes": STANDARD.encode(payload) }).to_string();
    encode_message(
        &[
            (":event-type", HeaderValue::String("chunk".to_string())),
            (":content-type", HeaderValue::String("application/json".to_string())),
            (":message-type", HeaderValue::String("event".to_string())),
        ],
        body.as_bytes(),
    )
}

/// A Bedrock exception message, as sent when a stream fails partway
pub fn exception_frame(kind: &str, message: &str) -> Bytes {
    let body = json!({ "message": message }).to_string();
    encode_message(
        &[
            (":exception-type", HeaderValue::String(kind.to_string())),
            (":content-type", HeaderValue::String("application/json".to_string())),
            (":message-type", HeaderValue::String("exception".to_string())),
        ],
        body.as_bytes(),
    )
}
