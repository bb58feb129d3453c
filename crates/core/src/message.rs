//! Wire message model: bodies, headers, and reply addressing.

use crate::error::CoreError;
use serde::Serialize;
use std::collections::HashMap;

/// Header key under which the ambient `request_id` is propagated.
pub const REQUEST_ID_HEADER: &str = "request_id";

/// A message body. Callers may hand in raw bytes directly, or any
/// `Serialize` value which is encoded to JSON once, at publish time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body(pub Vec<u8>);

impl Body {
    /// Encode a raw byte body. Never fails.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Encode a structured value to the default wire format (JSON).
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, CoreError> {
        serde_json::to_vec(value)
            .map(Body)
            .map_err(|e| CoreError::InvalidBody(e.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decode the body as JSON into `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, CoreError> {
        serde_json::from_slice(&self.0).map_err(|e| CoreError::InvalidBody(e.to_string()))
    }
}

/// A fully-constructed message ready for delivery into a mailbox.
#[derive(Debug, Clone)]
pub struct Message {
    pub body: Body,
    pub headers: HashMap<String, String>,
    pub reply_address: Option<String>,
}

impl Message {
    /// Build a message, stamping `request_id` from the ambient context if present.
    pub fn new(body: Body, request_id: Option<&str>) -> Self {
        let mut headers = HashMap::new();
        if let Some(id) = request_id {
            headers.insert(REQUEST_ID_HEADER.to_string(), id.to_string());
        }
        Self { body, headers, reply_address: None }
    }

    pub fn with_reply_address(mut self, reply_address: impl Into<String>) -> Self {
        self.reply_address = Some(reply_address.into());
        self
    }

    pub fn request_id(&self) -> Option<&str> {
        self.headers.get(REQUEST_ID_HEADER).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_then_decode_roundtrips() {
        let value = json!({"msg": "hi"});
        let body = Body::encode(&value).unwrap();
        let decoded: serde_json::Value = body.decode().unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn new_stamps_request_id_when_present() {
        let msg = Message::new(Body::from_bytes(b"x".to_vec()), Some("req-1"));
        assert_eq!(msg.request_id(), Some("req-1"));
    }

    #[test]
    fn new_without_request_id_has_no_header() {
        let msg = Message::new(Body::from_bytes(b"x".to_vec()), None);
        assert_eq!(msg.request_id(), None);
    }
}
