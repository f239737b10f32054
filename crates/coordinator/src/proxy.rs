//! Base for proxies that forward operations inside a transaction
//!
//! A transactional proxy is bound to one transaction, the flow that began it
//! and the member the session is connected to. Every operation checks that
//! the caller is that flow before anything goes over the wire.

use crate::error::{Result, SessionError};
use crate::registry::DistributedObject;
use crate::session::{check_owner, invoke};
use async_trait::async_trait;
use meshtx_cluster::{ClusterInvoker, MemberId};
use meshtx_common::{CancellationToken, OwnerContext, TransactionId};
use meshtx_protocol::{TransactionalOperation, decode_operation_response, encode_operation};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Transaction-bound handle to one named server-side object
pub struct TransactionalProxy {
    service_name: &'static str,
    name: String,
    txn_id: TransactionId,
    owner: OwnerContext,
    member: MemberId,
    invoker: Arc<dyn ClusterInvoker>,
    invocation_timeout: Duration,
    destroyed: AtomicBool,
}

impl TransactionalProxy {
    pub(crate) fn new(
        service_name: &'static str,
        name: impl Into<String>,
        txn_id: TransactionId,
        owner: OwnerContext,
        member: MemberId,
        invoker: Arc<dyn ClusterInvoker>,
        invocation_timeout: Duration,
    ) -> Self {
        Self {
            service_name,
            name: name.into(),
            txn_id,
            owner,
            member,
            invoker,
            invocation_timeout,
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn service_name(&self) -> &'static str {
        self.service_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.txn_id
    }

    pub fn owner(&self) -> OwnerContext {
        self.owner
    }

    pub fn member(&self) -> &MemberId {
        &self.member
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Fail unless the calling flow is the one that began the transaction
    pub fn check_owner(&self) -> Result<()> {
        check_owner(self.owner)
    }

    /// Execute an operation bounded by the configured invocation timeout
    pub async fn invoke<O, R>(&self, operation: &O) -> Result<R>
    where
        O: TransactionalOperation + Sync,
        R: DeserializeOwned,
    {
        let cancel = CancellationToken::with_timeout(self.invocation_timeout);
        self.invoke_with(operation, &cancel).await
    }

    /// Execute an operation, stopping early when `cancel` fires
    pub async fn invoke_with<O, R>(&self, operation: &O, cancel: &CancellationToken) -> Result<R>
    where
        O: TransactionalOperation + Sync,
        R: DeserializeOwned,
    {
        self.check_owner()?;
        if self.is_destroyed() {
            return Err(SessionError::ProxyDestroyed(self.to_string()));
        }

        let request = encode_operation(operation, &self.name, self.txn_id, self.owner)?;
        tracing::debug!(
            "Invoking {} on {} in transaction {}",
            request.message_type,
            self.name,
            self.txn_id
        );

        let response = invoke(self.invoker.as_ref(), request, &self.member, cancel).await?;
        Ok(decode_operation_response(&response)?)
    }

    pub(crate) fn mark_destroyed(&self) {
        self.destroyed.store(true, Ordering::Release);
    }
}

impl fmt::Debug for TransactionalProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionalProxy")
            .field("service_name", &self.service_name)
            .field("name", &self.name)
            .field("txn_id", &self.txn_id)
            .field("owner", &self.owner)
            .field("member", &self.member)
            .finish()
    }
}

impl fmt::Display for TransactionalProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.service_name, self.name, self.txn_id)
    }
}

/// A typed collection built on top of a [`TransactionalProxy`]
pub trait TransactionalObject: Send + Sync + Sized + 'static {
    /// Service the collection type belongs to
    const SERVICE_NAME: &'static str;

    fn from_proxy(proxy: TransactionalProxy) -> Self;

    fn proxy(&self) -> &TransactionalProxy;
}

#[async_trait]
impl<T: TransactionalObject> DistributedObject for T {
    fn service_name(&self) -> &str {
        T::SERVICE_NAME
    }

    fn name(&self) -> &str {
        self.proxy().name()
    }

    async fn destroy(&self) -> Result<()> {
        self.proxy().mark_destroyed();
        Ok(())
    }
}
