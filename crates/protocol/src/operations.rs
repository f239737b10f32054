//! Per-operation messages for transactional collections
//!
//! Each operation enum serializes into the request body; the message type
//! tells the member which service and operation it addresses. Keys, values
//! and items are already serialized user payloads (JSON values) by the time
//! they reach this layer.

use crate::messages::{decode_owner, decode_txn_id, require_header};
use crate::responses::decode_status;
use crate::{Result, headers};
use meshtx_cluster::Message;
use meshtx_common::{OwnerContext, TransactionId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An operation executed inside a transaction
pub trait TransactionalOperation: Serialize + DeserializeOwned {
    /// Message type the member routes on
    fn message_type(&self) -> &'static str;
}

/// Transactional map operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MapOperation {
    Get { key: Value },
    Put { key: Value, value: Value },
    Set { key: Value, value: Value },
    Remove { key: Value },
    Delete { key: Value },
    ContainsKey { key: Value },
    Size,
    Keys,
}

impl TransactionalOperation for MapOperation {
    fn message_type(&self) -> &'static str {
        match self {
            Self::Get { .. } => "txmap.get",
            Self::Put { .. } => "txmap.put",
            Self::Set { .. } => "txmap.set",
            Self::Remove { .. } => "txmap.remove",
            Self::Delete { .. } => "txmap.delete",
            Self::ContainsKey { .. } => "txmap.contains_key",
            Self::Size => "txmap.size",
            Self::Keys => "txmap.keys",
        }
    }
}

/// Transactional queue operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum QueueOperation {
    Offer { item: Value },
    Poll,
    Peek,
    Size,
}

impl TransactionalOperation for QueueOperation {
    fn message_type(&self) -> &'static str {
        match self {
            Self::Offer { .. } => "txqueue.offer",
            Self::Poll => "txqueue.poll",
            Self::Peek => "txqueue.peek",
            Self::Size => "txqueue.size",
        }
    }
}

/// Transactional list operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ListOperation {
    Add { item: Value },
    Remove { item: Value },
    Size,
}

impl TransactionalOperation for ListOperation {
    fn message_type(&self) -> &'static str {
        match self {
            Self::Add { .. } => "txlist.add",
            Self::Remove { .. } => "txlist.remove",
            Self::Size => "txlist.size",
        }
    }
}

/// Transactional set operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SetOperation {
    Add { item: Value },
    Remove { item: Value },
    Size,
}

impl TransactionalOperation for SetOperation {
    fn message_type(&self) -> &'static str {
        match self {
            Self::Add { .. } => "txset.add",
            Self::Remove { .. } => "txset.remove",
            Self::Size => "txset.size",
        }
    }
}

/// Decoded operation request (member side)
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest<O> {
    pub txn_id: TransactionId,
    pub owner: OwnerContext,
    pub object_name: String,
    pub operation: O,
}

/// Encode an operation on `object_name` within a transaction
pub fn encode_operation<O: TransactionalOperation>(
    operation: &O,
    object_name: &str,
    txn_id: TransactionId,
    owner: OwnerContext,
) -> Result<Message> {
    let body = serde_json::to_vec(operation)?;
    Ok(Message::new(operation.message_type(), body)
        .with_header(headers::TXN_ID, txn_id.to_string())
        .with_header(headers::OWNER_CONTEXT, owner.as_u64().to_string())
        .with_header(headers::OBJECT_NAME, object_name))
}

/// Decode an operation request
pub fn decode_operation<O: TransactionalOperation>(msg: &Message) -> Result<OperationRequest<O>> {
    Ok(OperationRequest {
        txn_id: decode_txn_id(msg)?,
        owner: decode_owner(msg)?,
        object_name: require_header(msg, headers::OBJECT_NAME)?.to_string(),
        operation: serde_json::from_slice(&msg.body)?,
    })
}

/// Decode the typed result of an operation response
pub fn decode_operation_response<R: DeserializeOwned>(response: &Message) -> Result<R> {
    let body = decode_status(response)?;
    Ok(serde_json::from_slice(body)?)
}
