//! Incremental decoder for the AWS event stream framing (`application/vnd.amazon.eventstream`)
//!
//! Each message on the wire is laid out as
//!
//! ```text
//! | total length (u32) | headers length (u32) | prelude crc (u32) |
//! | headers ...                                                  |
//! | payload ...                                                  |
//! | message crc (u32)                                            |
//! ```
//!
//! All integers are big endian and both checksums are CRC32 over every byte that precedes them.
use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

const PRELUDE_LEN: usize = 12;
const CRC_LEN: usize = 4;
const MIN_MESSAGE_LEN: usize = PRELUDE_LEN + CRC_LEN;
const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum EventStreamError {
    #[error("invalid message length {0}")]
    InvalidLength(usize),

    #[error("prelude checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    PreludeChecksum { expected: u32, computed: u32 },

    #[error("message checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    MessageChecksum { expected: u32, computed: u32 },

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("stream ended inside a message, {0} bytes left over")]
    Truncated(usize),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Bytes(Bytes),
    String(String),
    Timestamp(i64),
    Uuid([u8; 16]),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub headers: Vec<(String, HeaderValue)>,
    pub payload: Bytes,
}

impl Message {
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        match self.header(name) {
            Some(HeaderValue::String(value)) => Some(value),
            _ => None,
        }
    }
}

/// Buffers raw bytes until whole messages are available
#[derive(Debug, Default)]
pub struct MessageDecoder {
    buf: BytesMut,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pop the next complete message, `None` if more bytes are needed
    pub fn decode(&mut self) -> Result<Option<Message>, EventStreamError> {
        if self.buf.len() < PRELUDE_LEN {
            return Ok(None);
        }

        let mut prelude = &self.buf[..PRELUDE_LEN];
        let total_len = prelude.get_u32() as usize;
        let headers_len = prelude.get_u32() as usize;
        let prelude_crc = prelude.get_u32();

        let computed = crc32fast::hash(&self.buf[..8]);
        if computed != prelude_crc {
            return Err(EventStreamError::PreludeChecksum {
                expected: prelude_crc,
                computed,
            });
        }
        if !(MIN_MESSAGE_LEN..=MAX_MESSAGE_LEN).contains(&total_len) {
            return Err(EventStreamError::InvalidLength(total_len));
        }
        if headers_len > total_len - MIN_MESSAGE_LEN {
            return Err(EventStreamError::InvalidHeader(format!(
                "headers length {} exceeds message length {}",
                headers_len, total_len
            )));
        }
        if self.buf.len() < total_len {
            return Ok(None);
        }

        let frame = self.buf.split_to(total_len).freeze();
        let message_crc = (&frame[total_len - CRC_LEN..]).get_u32();
        let computed = crc32fast::hash(&frame[..total_len - CRC_LEN]);
        if computed != message_crc {
            return Err(EventStreamError::MessageChecksum {
                expected: message_crc,
                computed,
            });
        }

        let headers = parse_headers(&frame[PRELUDE_LEN..PRELUDE_LEN + headers_len])?;
        let payload = frame.slice(PRELUDE_LEN + headers_len..total_len - CRC_LEN);

        Ok(Some(Message { headers, payload }))
    }

    /// Check that the stream did not stop halfway through a message
    pub fn finish(&self) -> Result<(), EventStreamError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(EventStreamError::Truncated(self.buf.len()))
        }
    }
}

fn parse_headers(mut buf: &[u8]) -> Result<Vec<(String, HeaderValue)>, EventStreamError> {
    let mut headers = Vec::new();

    while buf.has_remaining() {
        let name_len = buf.get_u8() as usize;
        ensure_remaining(buf, name_len)?;
        let name = std::str::from_utf8(&buf[..name_len])
            .map_err(|e| EventStreamError::InvalidHeader(e.to_string()))?
            .to_string();
        buf.advance(name_len);

        ensure_remaining(buf, 1)?;
        let value = match buf.get_u8() {
            0 => HeaderValue::Bool(true),
            1 => HeaderValue::Bool(false),
            2 => {
                ensure_remaining(buf, 1)?;
                HeaderValue::Byte(buf.get_i8())
            }
            3 => {
                ensure_remaining(buf, 2)?;
                HeaderValue::Short(buf.get_i16())
            }
            4 => {
                ensure_remaining(buf, 4)?;
                HeaderValue::Int(buf.get_i32())
            }
            5 => {
                ensure_remaining(buf, 8)?;
                HeaderValue::Long(buf.get_i64())
            }
            6 => HeaderValue::Bytes(read_sized(&mut buf)?),
            7 => {
                let raw = read_sized(&mut buf)?;
                let value = String::from_utf8(raw.to_vec())
                    .map_err(|e| EventStreamError::InvalidHeader(e.to_string()))?;
                HeaderValue::String(value)
            }
            8 => {
                ensure_remaining(buf, 8)?;
                HeaderValue::Timestamp(buf.get_i64())
            }
            9 => {
                ensure_remaining(buf, 16)?;
                let mut uuid = [0u8; 16];
                buf.copy_to_slice(&mut uuid);
                HeaderValue::Uuid(uuid)
            }
            other => {
                return Err(EventStreamError::InvalidHeader(format!(
                    "unknown value type {} for {}",
                    other, name
                )))
            }
        };

        headers.push((name, value));
    }

    Ok(headers)
}

fn read_sized(buf: &mut &[u8]) -> Result<Bytes, EventStreamError> {
    ensure_remaining(buf, 2)?;
    let len = buf.get_u16() as usize;
    ensure_remaining(buf, len)?;
    Ok(buf.copy_to_bytes(len))
}

fn ensure_remaining(buf: &[u8], needed: usize) -> Result<(), EventStreamError> {
    if buf.len() < needed {
        Err(EventStreamError::InvalidHeader(format!(
            "needed {} more bytes, {} left",
            needed,
            buf.len()
        )))
    } else {
        Ok(())
    }
}

/// Frame a message, the inverse of [`MessageDecoder::decode`]
#[cfg(any(test, feature = "testing"))]
pub fn encode_message(headers: &[(&str, HeaderValue)], payload: &[u8]) -> Bytes {
    use bytes::BufMut;

    let mut header_bytes = BytesMut::new();
    for (name, value) in headers {
        header_bytes.put_u8(name.len() as u8);
        header_bytes.put_slice(name.as_bytes());
        match value {
            HeaderValue::Bool(true) => header_bytes.put_u8(0),
            HeaderValue::Bool(false) => header_bytes.put_u8(1),
            HeaderValue::Byte(v) => {
                header_bytes.put_u8(2);
                header_bytes.put_i8(*v);
            }
            HeaderValue::Short(v) => {
                header_bytes.put_u8(3);
                header_bytes.put_i16(*v);
            }
            HeaderValue::Int(v) => {
                header_bytes.put_u8(4);
                header_bytes.put_i32(*v);
            }
            HeaderValue::Long(v) => {
                header_bytes.put_u8(5);
                header_bytes.put_i64(*v);
            }
            HeaderValue::Bytes(v) => {
                header_bytes.put_u8(6);
                header_bytes.put_u16(v.len() as u16);
                header_bytes.put_slice(v);
            }
            HeaderValue::String(v) => {
                header_bytes.put_u8(7);
                header_bytes.put_u16(v.len() as u16);
                header_bytes.put_slice(v.as_bytes());
            }
            HeaderValue::Timestamp(v) => {
                header_bytes.put_u8(8);
                header_bytes.put_i64(*v);
            }
            HeaderValue::Uuid(v) => {
                header_bytes.put_u8(9);
                header_bytes.put_slice(v);
            }
        }
    }

    let total_len = MIN_MESSAGE_LEN + header_bytes.len() + payload.len();
    let mut frame = BytesMut::with_capacity(total_len);
    frame.put_u32(total_len as u32);
    frame.put_u32(header_bytes.len() as u32);
    let prelude_crc = crc32fast::hash(&frame[..8]);
    frame.put_u32(prelude_crc);
    frame.put_slice(&header_bytes);
    frame.put_slice(payload);
    let message_crc = crc32fast::hash(&frame);
    frame.put_u32(message_crc);
    frame.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: &str, payload: &[u8]) -> Bytes {
        encode_message(
            &[
                (":event-type", HeaderValue::String(event_type.to_string())),
                (":message-type", HeaderValue::String("event".to_string())),
            ],
            payload,
        )
    }

    #[test]
    fn test_decode_single_message() {
        let mut decoder = MessageDecoder::new();
        decoder.extend(&event("chunk", br#"{"bytes":"e30="}"#));

        let message = decoder.decode().unwrap().unwrap();
        assert_eq!(message.header_str(":event-type"), Some("chunk"));
        assert_eq!(message.header_str(":message-type"), Some("event"));
        assert_eq!(message.payload.as_ref(), br#"{"bytes":"e30="}"#);

        assert!(decoder.decode().unwrap().is_none());
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_messages_split_across_reads() {
        let mut wire = BytesMut::new();
        wire.extend_from_slice(&event("chunk", b"first"));
        wire.extend_from_slice(&event("chunk", b"second"));

        let mut decoder = MessageDecoder::new();
        let mut payloads = Vec::new();
        // Feed three bytes at a time so every boundary lands mid-field at some point
        for piece in wire.chunks(3) {
            decoder.extend(piece);
            while let Some(message) = decoder.decode().unwrap() {
                payloads.push(message.payload);
            }
        }

        assert_eq!(payloads, vec![Bytes::from("first"), Bytes::from("second")]);
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_every_header_type() {
        let headers = vec![
            ("t", HeaderValue::Bool(true)),
            ("f", HeaderValue::Bool(false)),
            ("b", HeaderValue::Byte(-3)),
            ("s", HeaderValue::Short(512)),
            ("i", HeaderValue::Int(-70_000)),
            ("l", HeaderValue::Long(1 << 40)),
            ("raw", HeaderValue::Bytes(Bytes::from_static(&[0, 1, 2]))),
            ("str", HeaderValue::String("value".to_string())),
            ("ts", HeaderValue::Timestamp(1_700_000_000_000)),
            ("id", HeaderValue::Uuid([7; 16])),
        ];

        let mut decoder = MessageDecoder::new();
        decoder.extend(&encode_message(&headers, b""));
        let message = decoder.decode().unwrap().unwrap();

        let expected: Vec<(String, HeaderValue)> = headers
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        assert_eq!(message.headers, expected);
        assert!(message.payload.is_empty());
    }

    #[test]
    fn test_corrupt_payload_fails_checksum() {
        let mut frame = BytesMut::from(event("chunk", b"payload").as_ref());
        let last_payload_byte = frame.len() - CRC_LEN - 1;
        frame[last_payload_byte] ^= 0xff;

        let mut decoder = MessageDecoder::new();
        decoder.extend(&frame);
        assert!(matches!(
            decoder.decode(),
            Err(EventStreamError::MessageChecksum { .. })
        ));
    }

    #[test]
    fn test_corrupt_prelude_fails_checksum() {
        let mut frame = BytesMut::from(event("chunk", b"payload").as_ref());
        frame[7] ^= 0x01;

        let mut decoder = MessageDecoder::new();
        decoder.extend(&frame);
        assert!(matches!(
            decoder.decode(),
            Err(EventStreamError::PreludeChecksum { .. })
        ));
    }

    #[test]
    fn test_truncated_stream() {
        let frame = event("chunk", b"payload");

        let mut decoder = MessageDecoder::new();
        decoder.extend(&frame[..frame.len() - 2]);
        assert!(decoder.decode().unwrap().is_none());
        assert!(matches!(
            decoder.finish(),
            Err(EventStreamError::Truncated(n)) if n == frame.len() - 2
        ));
    }
}
