//! Messages exchanged with cluster members
//!
//! The invoker treats bodies as opaque bytes; the codec layer decides what
//! goes into the body and which headers are set.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request or response travelling between the client and a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message type used for routing on the member side
    pub message_type: String,

    /// Message body (serialized data)
    pub body: Vec<u8>,

    /// Headers for metadata
    pub headers: HashMap<String, String>,
}

impl Message {
    /// Create a message with a type and body
    pub fn new(message_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            message_type: message_type.into(),
            body,
            headers: HashMap::new(),
        }
    }

    /// Create a message with only a type
    pub fn empty(message_type: impl Into<String>) -> Self {
        Self::new(message_type, Vec::new())
    }

    /// Add a header to the message
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Get header value
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|s| s.as_str())
    }
}
