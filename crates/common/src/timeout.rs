//! Transaction timeout with a distinguished infinite value

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// How long a transaction may stay open on the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionTimeout {
    /// The transaction never expires
    Infinite,
    /// The transaction expires after the given duration
    Finite(Duration),
}

impl TransactionTimeout {
    /// Wire value in milliseconds; `-1` stands for infinite
    pub fn as_millis(&self) -> i64 {
        match self {
            Self::Infinite => -1,
            Self::Finite(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
        }
    }

    /// Parse the wire value back
    pub fn from_millis(ms: i64) -> Self {
        if ms < 0 {
            Self::Infinite
        } else {
            Self::Finite(Duration::from_millis(ms as u64))
        }
    }

    /// Deadline relative to `start`, `None` when infinite
    pub fn deadline_from(&self, start: Instant) -> Option<Instant> {
        match self {
            Self::Infinite => None,
            Self::Finite(d) => start.checked_add(*d),
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Self::Infinite)
    }
}

impl From<Duration> for TransactionTimeout {
    fn from(d: Duration) -> Self {
        Self::Finite(d)
    }
}
