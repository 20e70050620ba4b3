//! The streaming relay: one inference call per request, each text delta forwarded as soon
//! as it is decoded.
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::errors::{RelayError, RelayResult};
use crate::models::delta::StreamDelta;
use crate::models::message::ChatMessage;
use crate::models::request::InferenceRequest;
use crate::providers::base::{EventStream, InvokeRequest, Provider, ResponseEvent};
use crate::providers::bedrock::BEDROCK_MODEL;

/// Written in place of output when running in [`ErrorMode::Inline`]
pub const ERROR_TEXT: &str = "ERROR";

/// How failures reach the client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Failures before the first byte are returned as errors, later ones abort the stream
    #[default]
    Status,
    /// Failures are written into the body as the literal `ERROR`, the response is always a 200
    Inline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub model_id: String,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub anthropic_version: String,
    pub error_mode: ErrorMode,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            model_id: BEDROCK_MODEL.to_string(),
            max_tokens: 2048,
            temperature: Some(0.9),
            anthropic_version: "bedrock-2023-05-31".to_string(),
            error_mode: ErrorMode::Status,
        }
    }
}

/// Text deltas in arrival order, each item meant to be flushed on its own
pub type DeltaStream = BoxStream<'static, RelayResult<Bytes>>;

pub struct Relay {
    provider: Arc<dyn Provider>,
    config: RelayConfig,
}

impl Relay {
    pub fn new(provider: Arc<dyn Provider>, config: RelayConfig) -> Self {
        Self { provider, config }
    }

    pub fn build_request(&self, messages: Vec<ChatMessage>) -> InferenceRequest {
        InferenceRequest {
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            anthropic_version: self.config.anthropic_version.clone(),
            messages,
        }
    }

    /// Serialize the envelope and start the provider call
    pub async fn open(&self, messages: Vec<ChatMessage>) -> RelayResult<EventStream> {
        let request = self.build_request(messages);
        let body = request.to_body().map_err(RelayError::Serialize)?;

        debug!(
            model_id = %self.config.model_id,
            messages = request.messages.len(),
            "invoking model"
        );
        self.provider
            .invoke_stream(InvokeRequest::json(self.config.model_id.clone(), body))
            .await
            .map_err(RelayError::Invoke)
    }

    /// Relay `messages` to the model and stream back its text
    ///
    /// In [`ErrorMode::Status`] a failure to start the call is returned as an error so the
    /// caller can answer with a status code. In [`ErrorMode::Inline`] it becomes a stream of
    /// the single item `ERROR`.
    pub async fn stream(&self, messages: Vec<ChatMessage>) -> RelayResult<DeltaStream> {
        match self.open(messages).await {
            Ok(events) => Ok(relay_events(events, self.config.error_mode)),
            Err(e) => {
                error!("Failed to start model stream: {}", e);
                match self.config.error_mode {
                    ErrorMode::Status => Err(e),
                    ErrorMode::Inline => {
                        Ok(stream::once(async { Ok(Bytes::from_static(ERROR_TEXT.as_bytes())) })
                            .boxed())
                    }
                }
            }
        }
    }
}

/// Map provider events to text deltas until the provider closes its stream
pub fn relay_events(events: EventStream, mode: ErrorMode) -> DeltaStream {
    Box::pin(async_stream::stream! {
        let mut events = events;
        let mut relayed = 0usize;

        while let Some(event) = events.next().await {
            match event {
                Ok(ResponseEvent::Chunk(payload)) => {
                    match serde_json::from_slice::<StreamDelta>(&payload) {
                        Ok(delta) => {
                            if let Some(metrics) = &delta.invocation_metrics {
                                info!(
                                    input_tokens = metrics.input_token_count,
                                    output_tokens = metrics.output_token_count,
                                    latency_ms = metrics.invocation_latency,
                                    first_byte_ms = metrics.first_byte_latency,
                                    "model invocation finished"
                                );
                            }
                            if !delta.text().is_empty() {
                                relayed += 1;
                                yield Ok(Bytes::from(delta.into_text()));
                            }
                        }
                        Err(e) => {
                            warn!("Failed to decode chunk: {}", e);
                            match mode {
                                ErrorMode::Inline => {
                                    yield Ok(Bytes::from_static(ERROR_TEXT.as_bytes()));
                                }
                                ErrorMode::Status => {
                                    yield Err(RelayError::Decode(e));
                                    break;
                                }
                            }
                        }
                    }
                }
                Ok(ResponseEvent::Unknown(tag)) => {
                    warn!("unknown tag: {}", tag);
                }
                Ok(ResponseEvent::Untyped) => {
                    warn!("stream event without a type");
                }
                Err(e) => {
                    error!("Model stream failed: {}", e);
                    if mode == ErrorMode::Status {
                        yield Err(RelayError::Stream(e));
                    }
                    break;
                }
            }
        }

        debug!(deltas = relayed, "model stream closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{delta_chunk, MockProvider, ScriptedEvent};
    use futures::TryStreamExt;
    use serde_json::{json, Value};

    fn relay_with(provider: Arc<MockProvider>, error_mode: ErrorMode) -> Relay {
        Relay::new(
            provider,
            RelayConfig {
                error_mode,
                ..RelayConfig::default()
            },
        )
    }

    async fn collect(stream: DeltaStream) -> Vec<RelayResult<Bytes>> {
        stream.collect().await
    }

    fn chunk(json: Value) -> ScriptedEvent {
        ScriptedEvent::Event(ResponseEvent::Chunk(Bytes::from(json.to_string())))
    }

    #[tokio::test]
    async fn test_deltas_relayed_in_order() {
        let provider = Arc::new(MockProvider::with_deltas(&["Hello", ", ", "world"]));
        let relay = relay_with(provider.clone(), ErrorMode::Status);

        let items: Vec<Bytes> = relay
            .stream(vec![ChatMessage::user().with_text("Say hello")])
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(
            items,
            vec![
                Bytes::from("Hello"),
                Bytes::from(", "),
                Bytes::from("world")
            ]
        );
        assert_eq!(items.concat(), b"Hello, world".to_vec());
    }

    #[tokio::test]
    async fn test_envelope_carries_messages_unmodified() {
        let messages = vec![
            ChatMessage::user()
                .with_image("iVBORw0KGgo=", "image/png")
                .with_text("What is this?"),
            ChatMessage::assistant().with_text("A very small image."),
            ChatMessage::new("user", vec![json!({"type": "text", "text": "Are you sure?", "extra": [1, 2]})]),
        ];
        let provider = Arc::new(MockProvider::with_deltas(&[]));
        let relay = relay_with(provider.clone(), ErrorMode::Status);

        let _ = collect(relay.stream(messages.clone()).await.unwrap()).await;

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model_id, BEDROCK_MODEL);
        assert_eq!(requests[0].content_type, "application/json");
        assert_eq!(requests[0].accept, "application/json");

        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["temperature"], 0.9);
        assert_eq!(body["anthropic_version"], "bedrock-2023-05-31");
        assert_eq!(body["messages"], serde_json::to_value(&messages).unwrap());
    }

    #[tokio::test]
    async fn test_non_text_chunks_and_unknown_events_are_silent() {
        let provider = Arc::new(MockProvider::new(vec![
            chunk(json!({"type": "message_start", "message": {"role": "assistant"}})),
            chunk(json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})),
            ScriptedEvent::Event(ResponseEvent::Unknown("metadata".to_string())),
            ScriptedEvent::Event(ResponseEvent::Chunk(delta_chunk(0, "still "))),
            ScriptedEvent::Event(ResponseEvent::Untyped),
            ScriptedEvent::Event(ResponseEvent::Chunk(delta_chunk(0, "here"))),
            chunk(json!({"type": "content_block_stop", "index": 0})),
            chunk(json!({
                "type": "message_stop",
                "amazon-bedrock-invocationMetrics": {"inputTokenCount": 10, "outputTokenCount": 2}
            })),
        ]));
        let relay = relay_with(provider, ErrorMode::Status);

        let items: Vec<Bytes> = relay
            .stream(Vec::new())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(items, vec![Bytes::from("still "), Bytes::from("here")]);
    }

    #[tokio::test]
    async fn test_invoke_failure_status_mode() {
        let provider = Arc::new(MockProvider::failing("AccessDeniedException"));
        let relay = relay_with(provider.clone(), ErrorMode::Status);

        let result = relay.stream(vec![ChatMessage::user().with_text("hi")]).await;

        assert!(matches!(result, Err(RelayError::Invoke(_))));
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_invoke_failure_inline_mode() {
        let provider = Arc::new(MockProvider::failing("AccessDeniedException"));
        let relay = relay_with(provider, ErrorMode::Inline);

        let items: Vec<Bytes> = relay
            .stream(vec![ChatMessage::user().with_text("hi")])
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(items.concat(), b"ERROR".to_vec());
    }

    #[tokio::test]
    async fn test_decode_failure_inline_mode_continues() {
        let provider = Arc::new(MockProvider::new(vec![
            ScriptedEvent::Event(ResponseEvent::Chunk(delta_chunk(0, "before "))),
            ScriptedEvent::Event(ResponseEvent::Chunk(Bytes::from_static(b"{not json"))),
            ScriptedEvent::Event(ResponseEvent::Chunk(delta_chunk(0, " after"))),
        ]));
        let relay = relay_with(provider, ErrorMode::Inline);

        let items: Vec<Bytes> = relay
            .stream(Vec::new())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(items.concat(), b"before ERROR after".to_vec());
    }

    #[tokio::test]
    async fn test_decode_failure_status_mode_aborts() {
        let provider = Arc::new(MockProvider::new(vec![
            ScriptedEvent::Event(ResponseEvent::Chunk(delta_chunk(0, "before"))),
            ScriptedEvent::Event(ResponseEvent::Chunk(Bytes::from_static(b"{not json"))),
            ScriptedEvent::Event(ResponseEvent::Chunk(delta_chunk(0, "after"))),
        ]));
        let relay = relay_with(provider, ErrorMode::Status);

        let items = collect(relay.stream(Vec::new()).await.unwrap()).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &Bytes::from("before"));
        assert!(matches!(items[1], Err(RelayError::Decode(_))));
    }

    #[tokio::test]
    async fn test_stream_failure_by_mode() {
        let script = vec![
            ScriptedEvent::Event(ResponseEvent::Chunk(delta_chunk(0, "partial"))),
            ScriptedEvent::Fail("model stream timed out".to_string()),
            ScriptedEvent::Event(ResponseEvent::Chunk(delta_chunk(0, "never sent"))),
        ];

        let inline = relay_with(Arc::new(MockProvider::new(script.clone())), ErrorMode::Inline);
        let items: Vec<Bytes> = inline
            .stream(Vec::new())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(items, vec![Bytes::from("partial")]);

        let status = relay_with(Arc::new(MockProvider::new(script)), ErrorMode::Status);
        let items = collect(status.stream(Vec::new()).await.unwrap()).await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(RelayError::Stream(_))));
    }

    #[test]
    fn test_error_mode_names() {
        let mode: ErrorMode = serde_json::from_str("\"inline\"").unwrap();
        assert_eq!(mode, ErrorMode::Inline);
        let mode: ErrorMode = serde_json::from_str("\"status\"").unwrap();
        assert_eq!(mode, ErrorMode::Status);
        assert_eq!(ErrorMode::default(), ErrorMode::Status);
    }
}
