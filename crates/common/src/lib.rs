//! Common types shared by the transaction client crates
//!
//! This crate defines:
//! - Transaction IDs handed out by the cluster (UUIDv7-based)
//! - Owner contexts, the logical flow identity a transaction is bound to
//! - Cancellation tokens with optional deadlines
//! - Transaction timeouts with an infinite value

mod cancel;
mod context;
mod timeout;
mod transaction_id;

pub use cancel::{CancellationToken, Interrupted};
pub use context::OwnerContext;
pub use timeout::TransactionTimeout;
pub use transaction_id::TransactionId;
