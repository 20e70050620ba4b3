use serde::Deserialize;

/// One decoded chunk of a Claude response stream
///
/// Every chunk kind (`message_start`, `content_block_delta`, `message_stop`, ...) decodes into
/// this shape. Only `content_block_delta` chunks carry text, the rest leave it empty.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StreamDelta {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: Delta,
    /// Attached by Bedrock to the final `message_stop` chunk
    #[serde(rename = "amazon-bedrock-invocationMetrics", default)]
    pub invocation_metrics: Option<InvocationMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Delta {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationMetrics {
    #[serde(default)]
    pub input_token_count: u64,
    #[serde(default)]
    pub output_token_count: u64,
    #[serde(default)]
    pub invocation_latency: u64,
    #[serde(default)]
    pub first_byte_latency: u64,
}

impl StreamDelta {
    pub fn text(&self) -> &str {
        &self.delta.text
    }

    pub fn into_text(self) -> String {
        self.delta.text
    }
}
