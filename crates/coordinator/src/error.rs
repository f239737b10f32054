//! Error types for the transaction session

use meshtx_cluster::InvokeError;
use meshtx_common::{Interrupted, OwnerContext};
use meshtx_protocol::CodecError;
use thiserror::Error;

/// Session error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("No cluster member available: {0}")]
    ConnectionUnavailable(String),

    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    #[error("A transaction is already in progress on this session")]
    NestedTransaction,

    #[error("Transaction is owned by {owner}, not by the calling flow")]
    CrossContextViolation {
        owner: OwnerContext,
        caller: Option<OwnerContext>,
    },

    #[error("Transaction expired")]
    TransactionExpired,

    #[error("Remote operation failed: {0}")]
    RemoteOperationFailed(String),

    #[error("Proxy registry has been disposed")]
    RegistryDisposed,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out")]
    TimedOut,

    #[error("No owner context in scope")]
    MissingOwnerContext,

    #[error("Proxy {0} exists with a different type")]
    ProxyTypeMismatch(String),

    #[error("Proxy {0} has been destroyed")]
    ProxyDestroyed(String),

    #[error("Invalid transaction options: {0}")]
    InvalidOptions(String),

    #[error("Codec error: {0}")]
    Codec(String),
}

impl From<Interrupted> for SessionError {
    fn from(reason: Interrupted) -> Self {
        match reason {
            Interrupted::Cancelled => SessionError::Cancelled,
            Interrupted::DeadlineElapsed => SessionError::TimedOut,
        }
    }
}

impl From<InvokeError> for SessionError {
    fn from(e: InvokeError) -> Self {
        match e {
            InvokeError::Cancelled => SessionError::Cancelled,
            InvokeError::Timeout => SessionError::TimedOut,
            other => SessionError::RemoteOperationFailed(other.to_string()),
        }
    }
}

impl From<CodecError> for SessionError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Remote(message) => SessionError::RemoteOperationFailed(message),
            other => SessionError::Codec(other.to_string()),
        }
    }
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
