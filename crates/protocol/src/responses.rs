//! Response envelope for member-to-client replies

use crate::{CodecError, Result, headers};
use meshtx_cluster::Message;

/// Outcome reported by a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseStatus {
    /// Request completed; the body carries the result
    Ok,
    /// Member rejected the request
    Error { message: String },
}

impl ResponseStatus {
    /// Read the status of a response message
    pub fn of(msg: &Message) -> Result<Self> {
        match msg.get_header(headers::STATUS) {
            Some("ok") => Ok(ResponseStatus::Ok),
            Some("error") => {
                let message = msg
                    .get_header(headers::ERROR)
                    .unwrap_or("Unknown error")
                    .to_string();
                Ok(ResponseStatus::Error { message })
            }
            Some(other) => Err(CodecError::InvalidHeader {
                header: headers::STATUS,
                value: other.to_string(),
            }),
            None => Err(CodecError::MissingHeader(headers::STATUS)),
        }
    }
}

/// Build a successful response
pub fn ok_response(message_type: impl Into<String>, body: Vec<u8>) -> Message {
    Message::new(message_type, body).with_header(headers::STATUS, "ok")
}

/// Build an error response
pub fn error_response(message_type: impl Into<String>, error: impl Into<String>) -> Message {
    Message::empty(message_type)
        .with_header(headers::STATUS, "error")
        .with_header(headers::ERROR, error)
}

/// Check the status of a response and hand back its body
pub fn decode_status(msg: &Message) -> Result<&[u8]> {
    match ResponseStatus::of(msg)? {
        ResponseStatus::Ok => Ok(&msg.body),
        ResponseStatus::Error { message } => Err(CodecError::Remote(message)),
    }
}
