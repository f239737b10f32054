//! Session lifecycle states
//!
//! The session keeps one tagged state instead of an ownership flag next to a
//! state enum, so "a transaction attempt is in flight" and "which transaction
//! it is" can never disagree.

use meshtx_cluster::MemberId;
use meshtx_common::{OwnerContext, TransactionId};
use tokio::time::Instant;

/// Lifecycle state as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// No transaction has been begun
    None,
    /// Transaction is active and accepting operations
    Active,
    /// A commit attempt failed; only a local rollback remains
    RollingBack,
    /// Transaction has been committed
    Committed,
    /// Transaction has been rolled back
    RolledBack,
}

/// A transaction the cluster has created for this session
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ActiveTransaction {
    pub id: TransactionId,
    pub owner: OwnerContext,
    /// Member that created the transaction; commit and rollback go here
    pub member: MemberId,
    pub started_at: Instant,
    /// `None` for an infinite timeout
    pub deadline: Option<Instant>,
}

impl ActiveTransaction {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

/// Internal session state including in-flight transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionState {
    Idle,
    /// Create-transaction request in flight
    Beginning { owner: OwnerContext },
    Active(ActiveTransaction),
    /// Commit request in flight
    Committing(ActiveTransaction),
    /// Rollback request in flight
    Aborting(ActiveTransaction),
    /// Commit failed
    RollingBack { owner: OwnerContext },
    Committed,
    RolledBack,
}

impl SessionState {
    /// State reported to callers
    pub fn public(&self) -> TransactionState {
        match self {
            Self::Idle | Self::Beginning { .. } => TransactionState::None,
            Self::Active(_) | Self::Committing(_) | Self::Aborting(_) => TransactionState::Active,
            Self::RollingBack { .. } => TransactionState::RollingBack,
            Self::Committed => TransactionState::Committed,
            Self::RolledBack => TransactionState::RolledBack,
        }
    }

    /// Whether a transaction attempt currently owns the session
    pub fn holds_ownership(&self) -> bool {
        matches!(
            self,
            Self::Beginning { .. } | Self::Active(_) | Self::Committing(_) | Self::Aborting(_)
        )
    }

    pub fn transaction(&self) -> Option<&ActiveTransaction> {
        match self {
            Self::Active(txn) | Self::Committing(txn) | Self::Aborting(txn) => Some(txn),
            _ => None,
        }
    }

    pub fn owner(&self) -> Option<OwnerContext> {
        match self {
            Self::Beginning { owner } | Self::RollingBack { owner } => Some(*owner),
            other => other.transaction().map(|txn| txn.owner),
        }
    }
}
