//! These models represent the objects passed through the relay
//!
//! There are three formats we need to interact with:
//! - chat messages, sent from the browser to the relay
//! - the Anthropic messages envelope, sent from the relay to Bedrock
//! - stream chunks, sent from Bedrock back to the relay
//!
//! Message content is never interpreted here. Whatever the browser sends as content blocks
//! (text, base64 images) is forwarded to the model exactly as received.
pub mod delta;
pub mod message;
pub mod request;
