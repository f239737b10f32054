//! Transactional FIFO queue

use crate::payload;
use meshtx_coordinator::{Result, TransactionalObject, TransactionalProxy};
use meshtx_protocol::QueueOperation;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Queue whose offers and polls take effect when the transaction commits
#[derive(Debug)]
pub struct TransactionalQueue<T> {
    proxy: TransactionalProxy,
    _item: PhantomData<fn() -> T>,
}

impl<T> TransactionalQueue<T>
where
    T: Serialize + DeserializeOwned + Sync,
{
    /// Append an item; `false` if the queue is at capacity
    pub async fn offer(&self, item: &T) -> Result<bool> {
        self.proxy
            .invoke(&QueueOperation::Offer {
                item: payload(item)?,
            })
            .await
    }

    /// Take the head item, if any
    pub async fn poll(&self) -> Result<Option<T>> {
        self.proxy.invoke(&QueueOperation::Poll).await
    }

    pub async fn peek(&self) -> Result<Option<T>> {
        self.proxy.invoke(&QueueOperation::Peek).await
    }

    pub async fn size(&self) -> Result<usize> {
        self.proxy.invoke(&QueueOperation::Size).await
    }
}

impl<T: 'static> TransactionalObject for TransactionalQueue<T> {
    const SERVICE_NAME: &'static str = "meshtx:queue";

    fn from_proxy(proxy: TransactionalProxy) -> Self {
        Self {
            proxy,
            _item: PhantomData,
        }
    }

    fn proxy(&self) -> &TransactionalProxy {
        &self.proxy
    }
}
