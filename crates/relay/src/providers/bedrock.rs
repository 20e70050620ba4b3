use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use std::time::Duration;

use super::base::{EventStream, InvokeRequest, Provider, ResponseEvent};
use super::configs::BedrockProviderConfig;
use super::eventstream::{EventStreamError, Message, MessageDecoder};
use super::sigv4::SigV4Signer;
use crate::errors::ProviderError;

pub const BEDROCK_MODEL: &str = "anthropic.claude-3-haiku-20240307-v1:0";
const SIGNING_SERVICE: &str = "bedrock";

/// Streams model output from the Bedrock runtime `invoke-with-response-stream` API
pub struct BedrockProvider {
    client: Client,
    config: BedrockProviderConfig,
    signer: SigV4Signer,
}

#[derive(Deserialize)]
struct PayloadPart {
    bytes: String,
}

#[derive(Deserialize)]
struct ExceptionBody {
    #[serde(default)]
    message: Option<String>,
}

impl BedrockProvider {
    pub fn new(config: BedrockProviderConfig) -> Result<Self, ProviderError> {
        // Streams stay open as long as the model keeps talking, so only connecting is bounded
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let signer = SigV4Signer::new(
            config.credentials.clone(),
            config.region.clone(),
            SIGNING_SERVICE,
        );

        Ok(Self {
            client,
            config,
            signer,
        })
    }

    fn invoke_url(&self, model_id: &str) -> Result<Url, ProviderError> {
        let url = format!(
            "{}/model/{}/invoke-with-response-stream",
            self.config.endpoint(),
            urlencoding::encode(model_id)
        );
        Url::parse(&url).map_err(|e| ProviderError::InvalidEndpoint(format!("{}: {}", url, e)))
    }

    async fn post(&self, request: &InvokeRequest) -> Result<Response, ProviderError> {
        let url = self.invoke_url(&request.model_id)?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(ProviderError::InvalidEndpoint(url.to_string())),
        };

        let signed = self.signer.sign(
            "POST",
            &host,
            url.path(),
            &[
                ("content-type", request.content_type.as_str()),
                ("accept", request.accept.as_str()),
            ],
            &request.body,
            Utc::now(),
        )?;

        let mut builder = self
            .client
            .post(url)
            .header(CONTENT_TYPE, &request.content_type)
            .header(ACCEPT, &request.accept)
            .header("x-amz-date", signed.amz_date)
            .header(AUTHORIZATION, signed.authorization)
            .body(request.body.clone());
        if let Some(token) = signed.security_token {
            builder = builder.header("x-amz-security-token", token);
        }

        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ProviderError::Request {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl Provider for BedrockProvider {
    async fn invoke_stream(&self, request: InvokeRequest) -> Result<EventStream, ProviderError> {
        tracing::debug!(model_id = %request.model_id, "invoking bedrock model");
        let response = self.post(&request).await?;
        Ok(decode_events(response.bytes_stream()).boxed())
    }
}

/// Turn the raw response body into provider events, one per event stream message
pub fn decode_events<S>(body: S) -> impl Stream<Item = Result<ResponseEvent, ProviderError>>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    async_stream::try_stream! {
        let mut body = Box::pin(body);
        let mut decoder = MessageDecoder::new();

        while let Some(data) = body.next().await {
            decoder.extend(&data?);
            while let Some(message) = decoder.decode()? {
                yield into_event(message)?;
            }
        }

        decoder.finish()?;
    }
}

fn into_event(message: Message) -> Result<ResponseEvent, ProviderError> {
    match message.header_str(":message-type") {
        Some("event") | None => match message.header_str(":event-type") {
            Some("chunk") => {
                let part: PayloadPart = serde_json::from_slice(&message.payload)
                    .map_err(|e| EventStreamError::InvalidPayload(e.to_string()))?;
                let bytes = STANDARD
                    .decode(part.bytes)
                    .map_err(|e| EventStreamError::InvalidPayload(e.to_string()))?;
                Ok(ResponseEvent::Chunk(Bytes::from(bytes)))
            }
            Some(other) => Ok(ResponseEvent::Unknown(other.to_string())),
            None => Ok(ResponseEvent::Untyped),
        },
        Some("exception") => {
            let kind = message
                .header_str(":exception-type")
                .unwrap_or("exception")
                .to_string();
            let message = serde_json::from_slice::<ExceptionBody>(&message.payload)
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| String::from_utf8_lossy(&message.payload).into_owned());
            Err(ProviderError::Exception { kind, message })
        }
        Some("error") => Err(ProviderError::Exception {
            kind: message
                .header_str(":error-code")
                .unwrap_or("error")
                .to_string(),
            message: message
                .header_str(":error-message")
                .unwrap_or_default()
                .to_string(),
        }),
        Some(other) => Ok(ResponseEvent::Unknown(other.to_string())),
    }
}
