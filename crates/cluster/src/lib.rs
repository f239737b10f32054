//! Cluster invocation layer for the transaction client
//!
//! This crate defines the [`ClusterInvoker`] seam the transaction core talks
//! through, the [`Message`] envelope it exchanges, and [`MockCluster`], an
//! in-memory cluster used by tests and demos.

use meshtx_common::Interrupted;
use thiserror::Error;

mod invoker;
mod member;
mod message;
pub mod mock;

pub use invoker::ClusterInvoker;
pub use member::MemberId;
pub use message::Message;
pub use mock::{MockCluster, RecordedRequest};

/// Invocation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Member not connected: {0}")]
    MemberUnavailable(MemberId),

    #[error("No handler for message type: {0}")]
    NoHandler(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,
}

impl From<Interrupted> for InvokeError {
    fn from(reason: Interrupted) -> Self {
        match reason {
            Interrupted::Cancelled => InvokeError::Cancelled,
            Interrupted::DeadlineElapsed => InvokeError::Timeout,
        }
    }
}

pub type Result<T> = std::result::Result<T, InvokeError>;
