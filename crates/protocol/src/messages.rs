//! Transaction control messages: create, commit, rollback

use crate::responses::decode_status;
use crate::{CodecError, Result, headers};
use meshtx_cluster::Message;
use meshtx_common::{OwnerContext, TransactionId, TransactionTimeout};
use serde::{Deserialize, Serialize};

pub const CREATE_TRANSACTION: &str = "transaction.create";
pub const COMMIT_TRANSACTION: &str = "transaction.commit";
pub const ROLLBACK_TRANSACTION: &str = "transaction.rollback";

/// Commit protocol the cluster runs for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Single commit round; cheaper but may leave partial results on member failure
    OnePhase,
    /// Prepare then commit
    #[default]
    TwoPhase,
}

impl TransactionKind {
    /// Parse from string header value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "one_phase" => Some(Self::OnePhase),
            "two_phase" => Some(Self::TwoPhase),
            _ => None,
        }
    }

    /// Convert to string header value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnePhase => "one_phase",
            Self::TwoPhase => "two_phase",
        }
    }
}

/// Decoded create-transaction request (member side)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTransactionRequest {
    pub timeout: TransactionTimeout,
    pub durability: u32,
    pub kind: TransactionKind,
    pub owner: OwnerContext,
}

/// Decoded commit or rollback request (member side)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionControlRequest {
    pub txn_id: TransactionId,
    pub owner: OwnerContext,
}

/// Encode a create-transaction request
pub fn encode_create_transaction(
    timeout: TransactionTimeout,
    durability: u32,
    kind: TransactionKind,
    owner: OwnerContext,
) -> Message {
    Message::empty(CREATE_TRANSACTION)
        .with_header(headers::TIMEOUT_MS, timeout.as_millis().to_string())
        .with_header(headers::DURABILITY, durability.to_string())
        .with_header(headers::KIND, kind.as_str())
        .with_header(headers::OWNER_CONTEXT, owner.as_u64().to_string())
}

/// Decode the transaction ID out of a create-transaction response
pub fn decode_create_transaction(response: &Message) -> Result<TransactionId> {
    let body = decode_status(response)?;
    let raw: String = serde_json::from_slice(body)?;
    TransactionId::parse(&raw).map_err(|_| CodecError::InvalidTransactionId(raw))
}

/// Encode a commit request
pub fn encode_commit(txn_id: TransactionId, owner: OwnerContext) -> Message {
    control_message(COMMIT_TRANSACTION, txn_id, owner)
}

/// Encode a rollback request
pub fn encode_rollback(txn_id: TransactionId, owner: OwnerContext) -> Message {
    control_message(ROLLBACK_TRANSACTION, txn_id, owner)
}

fn control_message(message_type: &str, txn_id: TransactionId, owner: OwnerContext) -> Message {
    Message::empty(message_type)
        .with_header(headers::TXN_ID, txn_id.to_string())
        .with_header(headers::OWNER_CONTEXT, owner.as_u64().to_string())
}

/// Decode a create-transaction request
pub fn decode_create_request(msg: &Message) -> Result<CreateTransactionRequest> {
    let timeout_ms: i64 = parse_header(msg, headers::TIMEOUT_MS)?;
    let durability: u32 = parse_header(msg, headers::DURABILITY)?;

    let kind_str = require_header(msg, headers::KIND)?;
    let kind = TransactionKind::parse(kind_str).ok_or_else(|| CodecError::InvalidHeader {
        header: headers::KIND,
        value: kind_str.to_string(),
    })?;

    Ok(CreateTransactionRequest {
        timeout: TransactionTimeout::from_millis(timeout_ms),
        durability,
        kind,
        owner: decode_owner(msg)?,
    })
}

impl TransactionControlRequest {
    /// Decode a commit or rollback request
    pub fn from_message(msg: &Message) -> Result<Self> {
        Ok(Self {
            txn_id: decode_txn_id(msg)?,
            owner: decode_owner(msg)?,
        })
    }
}

pub(crate) fn decode_txn_id(msg: &Message) -> Result<TransactionId> {
    let txn_id_str = require_header(msg, headers::TXN_ID)?;
    TransactionId::parse(txn_id_str)
        .map_err(|_| CodecError::InvalidTransactionId(txn_id_str.to_string()))
}

pub(crate) fn decode_owner(msg: &Message) -> Result<OwnerContext> {
    parse_header(msg, headers::OWNER_CONTEXT).map(OwnerContext::from_raw)
}

pub(crate) fn require_header<'a>(msg: &'a Message, header: &'static str) -> Result<&'a str> {
    msg.get_header(header)
        .ok_or(CodecError::MissingHeader(header))
}

fn parse_header<T: std::str::FromStr>(msg: &Message, header: &'static str) -> Result<T> {
    let value = require_header(msg, header)?;
    value.parse().map_err(|_| CodecError::InvalidHeader {
        header,
        value: value.to_string(),
    })
}
