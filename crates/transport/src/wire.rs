//! The on-the-wire envelope carried by every NATS frame. Mirrors
//! [`verge_core::Message`] so a `request_id` header survives the hop
//! (§4.6: "A `request_id` header is mirrored on every transport frame").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use verge_core::{Body, Message};

#[derive(Debug, Serialize, Deserialize)]
pub struct WireFrame {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
    pub reply_address: Option<String>,
}

impl From<&Message> for WireFrame {
    fn from(msg: &Message) -> Self {
        Self {
            body: msg.body.as_bytes().to_vec(),
            headers: msg.headers.clone(),
            reply_address: msg.reply_address.clone(),
        }
    }
}

impl WireFrame {
    pub fn into_message(self) -> Message {
        Message {
            body: Body::from_bytes(self.body),
            headers: self.headers,
            reply_address: self.reply_address,
        }
    }
}
