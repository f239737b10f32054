//! Transactional list

use crate::payload;
use meshtx_coordinator::{Result, TransactionalObject, TransactionalProxy};
use meshtx_protocol::ListOperation;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

#[derive(Debug)]
pub struct TransactionalList<T> {
    proxy: TransactionalProxy,
    _item: PhantomData<fn() -> T>,
}

impl<T> TransactionalList<T>
where
    T: Serialize + DeserializeOwned + Sync,
{
    pub async fn add(&self, item: &T) -> Result<bool> {
        self.proxy
            .invoke(&ListOperation::Add {
                item: payload(item)?,
            })
            .await
    }

    /// Remove the first occurrence of an item
    pub async fn remove(&self, item: &T) -> Result<bool> {
        self.proxy
            .invoke(&ListOperation::Remove {
                item: payload(item)?,
            })
            .await
    }

    pub async fn size(&self) -> Result<usize> {
        self.proxy.invoke(&ListOperation::Size).await
    }
}

impl<T: 'static> TransactionalObject for TransactionalList<T> {
    const SERVICE_NAME: &'static str = "meshtx:list";

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
