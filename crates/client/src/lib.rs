//! Typed transactional collections
//!
//! Each collection is a thin typed layer over a
//! [`TransactionalProxy`](meshtx_coordinator::TransactionalProxy): values are
//! serialized to JSON, sent with the transaction identity attached, and the
//! member's answer is decoded back into Rust types. Obtain them through
//! [`TransactionSession::get_transactional`](meshtx_coordinator::TransactionSession::get_transactional).

mod list;
mod map;
mod queue;
mod set;

pub use list::TransactionalList;
pub use map::TransactionalMap;
pub use queue::TransactionalQueue;
pub use set::TransactionalSet;

use meshtx_coordinator::{Result, SessionError};
use serde::Serialize;
use serde_json::Value;

/// Serialize a user payload for the wire
pub(crate) fn payload<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| SessionError::Codec(e.to_string()))
}
