//! Client-side coordination of distributed transactions
//!
//! This crate re-exports the pieces of the workspace a caller needs:
//! - [`TransactionSession`]: connect, begin, commit, rollback and dispose
//! - [`ProxyRegistry`]: single-flight cache of distributed object proxies
//! - Typed transactional collections ([`TransactionalMap`] and friends)
//! - [`OwnerContext`] and [`CancellationToken`] plumbing
//! - [`ClusterInvoker`], the seam to the cluster, and [`MockCluster`]

pub use meshtx_client::{TransactionalList, TransactionalMap, TransactionalQueue, TransactionalSet};
pub use meshtx_cluster::{ClusterInvoker, InvokeError, MemberId, Message, MockCluster};
pub use meshtx_common::{
    CancellationToken, Interrupted, OwnerContext, TransactionId, TransactionTimeout,
};
pub use meshtx_coordinator::{
    DistributedObject, ProxyKey, ProxyRegistry, Result, SessionConfig, SessionError,
    TransactionOptions, TransactionSession, TransactionState, TransactionalObject,
    TransactionalProxy,
};
pub use meshtx_protocol::TransactionKind;
