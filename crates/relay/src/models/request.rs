use serde::Serialize;

use super::message::ChatMessage;

/// The Anthropic messages envelope expected by Bedrock's Claude models
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceRequest {
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    pub anthropic_version: String,
    pub messages: Vec<ChatMessage>,
}

impl InferenceRequest {
    pub fn to_body(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
