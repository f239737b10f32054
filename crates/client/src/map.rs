//! Transactional key-value map

use crate::payload;
use meshtx_coordinator::{Result, TransactionalObject, TransactionalProxy};
use meshtx_protocol::MapOperation;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Map whose reads and writes are isolated in the session's transaction
#[derive(Debug)]
pub struct TransactionalMap<K, V> {
    proxy: TransactionalProxy,
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K, V> TransactionalMap<K, V>
where
    K: Serialize + DeserializeOwned + Sync,
    V: Serialize + DeserializeOwned + Sync,
{
    /// Get the value for a key
    pub async fn get(&self, key: &K) -> Result<Option<V>> {
        self.proxy
            .invoke(&MapOperation::Get { key: payload(key)? })
            .await
    }

    /// Put a value, returning the previous one
    pub async fn put(&self, key: &K, value: &V) -> Result<Option<V>> {
        let operation = MapOperation::Put {
            key: payload(key)?,
            value: payload(value)?,
        };
        self.proxy.invoke(&operation).await
    }

    /// Put a value without reading the previous one
    pub async fn set(&self, key: &K, value: &V) -> Result<()> {
        let operation = MapOperation::Set {
            key: payload(key)?,
            value: payload(value)?,
        };
        self.proxy.invoke(&operation).await
    }

    /// Remove a key, returning its value
    pub async fn remove(&self, key: &K) -> Result<Option<V>> {
        self.proxy
            .invoke(&MapOperation::Remove { key: payload(key)? })
            .await
    }

    /// Remove a key without reading its value
    pub async fn delete(&self, key: &K) -> Result<()> {
        self.proxy
            .invoke(&MapOperation::Delete { key: payload(key)? })
            .await
    }

    pub async fn contains_key(&self, key: &K) -> Result<bool> {
        self.proxy
            .invoke(&MapOperation::ContainsKey { key: payload(key)? })
            .await
    }

    pub async fn size(&self) -> Result<usize> {
        self.proxy.invoke(&MapOperation::Size).await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.size().await? == 0)
    }

    /// Keys visible to the transaction
    pub async fn keys(&self) -> Result<Vec<K>> {
        self.proxy.invoke(&MapOperation::Keys).await
    }
}

impl<K: 'static, V: 'static> TransactionalObject for TransactionalMap<K, V> {
    const SERVICE_NAME: &'static str = "meshtx:map";

    fn from_proxy(proxy: TransactionalProxy) -> Self {
        Self {
            proxy,
            _types: PhantomData,
        }
    }

    fn proxy(&self) -> &TransactionalProxy {
        &self.proxy
    }
}
