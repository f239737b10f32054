//! Transactional set

use crate::payload;
use meshtx_coordinator::{Result, TransactionalObject, TransactionalProxy};
use meshtx_protocol::SetOperation;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

#[derive(Debug)]
pub struct TransactionalSet<T> {
    proxy: TransactionalProxy,
    _item: PhantomData<fn() -> T>,
}

impl<T> TransactionalSet<T>
where
    T: Serialize + DeserializeOwned + Sync,
{
    /// Add an item; `false` if it was already present
    pub async fn add(&self, item: &T) -> Result<bool> {
        self.proxy
            .invoke(&SetOperation::Add {
                item: payload(item)?,
            })
            .await
    }

    pub async fn remove(&self, item: &T) -> Result<bool> {
        self.proxy
            .invoke(&SetOperation::Remove {
                item: payload(item)?,
            })
            .await
    }

    pub async fn size(&self) -> Result<usize> {
        self.proxy.invoke(&SetOperation::Size).await
    }
}

impl<T: 'static> TransactionalObject for TransactionalSet<T> {
    const SERVICE_NAME: &'static str = "meshtx:set";

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
