use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A single turn of the conversation, as sent by the client
///
/// The content blocks are opaque to the relay and are passed to the provider unmodified.
/// A message sent without `content` is forwarded without it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<Value>>,
}

impl ChatMessage {
    pub fn new<S: Into<String>>(role: S, content: Vec<Value>) -> Self {
        ChatMessage {
            role: role.into(),
            content: Some(content),
        }
    }

    pub fn user() -> Self {
        ChatMessage::new("user", Vec::new())
    }

    pub fn assistant() -> Self {
        ChatMessage::new("assistant", Vec::new())
    }

    fn push(&mut self, block: Value) {
        self.content.get_or_insert_with(Vec::new).push(block);
    }

    /// Add a text block
    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.push(json!({
            "type": "text",
            "text": text.into(),
        }));
        self
    }

    /// Add a base64 encoded image block
    pub fn with_image<S: Into<String>, T: Into<String>>(mut self, data: S, media_type: T) -> Self {
        self.push(json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": media_type.into(),
                "data": data.into(),
            }
        }));
        self
    }
}
