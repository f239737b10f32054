//! Transaction options and session configuration

use crate::error::{Result, SessionError};
use meshtx_common::TransactionTimeout;
use meshtx_protocol::TransactionKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options sent to the cluster when a transaction is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionOptions {
    /// How long the transaction may stay open
    pub timeout: TransactionTimeout,

    /// Number of backups the transaction log is replicated to
    pub durability: u32,

    /// Commit protocol
    pub kind: TransactionKind,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            timeout: TransactionTimeout::Finite(Duration::from_secs(120)),
            durability: 1,
            kind: TransactionKind::TwoPhase,
        }
    }
}

impl TransactionOptions {
    pub fn with_timeout(mut self, timeout: impl Into<TransactionTimeout>) -> Self {
        self.timeout = timeout.into();
        self
    }

    pub fn with_durability(mut self, durability: u32) -> Self {
        self.durability = durability;
        self
    }

    pub fn with_kind(mut self, kind: TransactionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Reject options the cluster would refuse
    pub fn validate(&self) -> Result<()> {
        match self.timeout {
            TransactionTimeout::Finite(d) if d.is_zero() => Err(SessionError::InvalidOptions(
                "timeout must be positive or infinite".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Configuration of a transaction session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Options for the transaction the session begins
    pub options: TransactionOptions,

    /// Pause between member lookups while connecting
    pub connect_retry_interval: Duration,

    /// Upper bound for a single transactional object operation
    pub invocation_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            options: TransactionOptions::default(),
            connect_retry_interval: Duration::from_millis(100),
            invocation_timeout: Duration::from_secs(120),
        }
    }
}

impl SessionConfig {
    pub fn with_options(mut self, options: TransactionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_connect_retry_interval(mut self, interval: Duration) -> Self {
        self.connect_retry_interval = interval;
        self
    }

    pub fn with_invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = timeout;
        self
    }
}
