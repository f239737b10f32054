//! Codec for the transaction protocol
//!
//! This crate turns transaction control requests (create, commit, rollback)
//! and transactional collection operations into [`Message`]s and decodes the
//! members' responses. Bodies are JSON; identities travel in headers.
//!
//! [`Message`]: meshtx_cluster::Message

pub mod headers;
pub mod messages;
pub mod operations;
pub mod responses;

pub use messages::{
    COMMIT_TRANSACTION, CREATE_TRANSACTION, CreateTransactionRequest, ROLLBACK_TRANSACTION,
    TransactionControlRequest, TransactionKind, decode_create_request, decode_create_transaction,
    encode_commit, encode_create_transaction, encode_rollback,
};
pub use operations::{
    ListOperation, MapOperation, OperationRequest, QueueOperation, SetOperation,
    TransactionalOperation, decode_operation, decode_operation_response, encode_operation,
};
pub use responses::{ResponseStatus, decode_status, error_response, ok_response};

/// Errors that can occur while encoding or decoding messages
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("Invalid value for header {header}: {value}")]
    InvalidHeader { header: &'static str, value: String },

    #[error("Invalid transaction ID: {0}")]
    InvalidTransactionId(String),

    #[error("Member rejected the request: {0}")]
    Remote(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
