//! Keyed cache of distributed object proxies with single-flight creation
//!
//! The first caller for a key claims a pending slot under the lock, releases
//! the lock and runs the factory; later callers for the same key wait on the
//! pending slot instead of running the factory again. The lock is never held
//! while a factory runs, so slow creations do not block other keys.

use crate::error::{Result, SessionError};
use async_trait::async_trait;
use meshtx_common::{CancellationToken, TransactionId};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::watch;

/// Type-erasure helper so registry entries can be downcast to their proxy type
pub trait AsAny: Send + Sync {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Client-side handle to a server-side distributed object
#[async_trait]
pub trait DistributedObject: AsAny {
    /// Service the object belongs to
    fn service_name(&self) -> &str;

    /// Object name within its service
    fn name(&self) -> &str;

    /// Release the handle
    async fn destroy(&self) -> Result<()>;
}

/// Registry key: service, object name and, for transaction-scoped proxies,
/// the transaction the proxy is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyKey {
    pub service_name: String,
    pub name: String,
    pub transaction_id: Option<TransactionId>,
}

impl ProxyKey {
    pub fn new(service_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            name: name.into(),
            transaction_id: None,
        }
    }

    pub fn transactional(
        service_name: impl Into<String>,
        name: impl Into<String>,
        transaction_id: TransactionId,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            name: name.into(),
            transaction_id: Some(transaction_id),
        }
    }
}

impl fmt::Display for ProxyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.transaction_id {
            Some(txn_id) => write!(f, "{}/{}@{}", self.service_name, self.name, txn_id),
            None => write!(f, "{}/{}", self.service_name, self.name),
        }
    }
}

type SharedObject = Arc<dyn DistributedObject>;
type Outcome = std::result::Result<SharedObject, SessionError>;

enum Slot {
    Ready(SharedObject),
    Pending(watch::Receiver<Option<Outcome>>),
}

struct RegistryInner<K> {
    slots: HashMap<K, Slot>,
    disposed: bool,
}

enum Claim {
    Join(watch::Receiver<Option<Outcome>>),
    Create(watch::Sender<Option<Outcome>>),
}

/// Concurrent proxy cache guaranteeing one successful creation per key
pub struct ProxyRegistry<K = ProxyKey> {
    inner: Mutex<RegistryInner<K>>,
}

impl<K> Default for ProxyRegistry<K> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                slots: HashMap::new(),
                disposed: false,
            }),
        }
    }
}

impl<K> ProxyRegistry<K>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the proxy for `key`, creating it with `factory` if needed
    ///
    /// Concurrent callers for the same key share one factory run and receive
    /// the same instance. A failed run is reported to everyone waiting on it
    /// and leaves the key free for a later attempt.
    pub async fn get_or_create<T, F, Fut>(
        &self,
        key: K,
        factory: F,
        cancel: &CancellationToken,
    ) -> Result<Arc<T>>
    where
        T: DistributedObject + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let claim = {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return Err(SessionError::RegistryDisposed);
            }
            match inner.slots.get(&key) {
                Some(Slot::Ready(object)) => return downcast(object.clone(), &key),
                Some(Slot::Pending(rx)) => Claim::Join(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    inner.slots.insert(key.clone(), Slot::Pending(rx));
                    Claim::Create(tx)
                }
            }
        };

        match claim {
            Claim::Join(rx) => {
                tracing::debug!("Joining in-flight creation of proxy {}", key);
                let object = Self::join(rx, cancel).await?;
                downcast(object, &key)
            }
            Claim::Create(tx) => self.create(key, tx, factory, cancel).await,
        }
    }

    async fn create<T, F, Fut>(
        &self,
        key: K,
        tx: watch::Sender<Option<Outcome>>,
        factory: F,
        cancel: &CancellationToken,
    ) -> Result<Arc<T>>
    where
        T: DistributedObject + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut pending = PendingSlot {
            registry: self,
            key: Some(key.clone()),
        };

        tracing::debug!("Creating proxy {}", key);
        let created = match cancel.run(factory()).await {
            Ok(result) => result.map(Arc::new),
            Err(reason) => Err(reason.into()),
        };

        let object = match created {
            Ok(object) => object,
            Err(e) => {
                pending.release();
                tx.send_replace(Some(Err(e.clone())));
                return Err(e);
            }
        };

        let shared: SharedObject = object.clone();
        let disposed = {
            let mut inner = self.inner.lock();
            pending.disarm();
            if inner.disposed {
                true
            } else {
                inner.slots.insert(key.clone(), Slot::Ready(shared.clone()));
                false
            }
        };

        if disposed {
            tx.send_replace(Some(Err(SessionError::RegistryDisposed)));
            if let Err(e) = shared.destroy().await {
                tracing::warn!("Failed to destroy proxy {} created during disposal: {}", key, e);
            }
            return Err(SessionError::RegistryDisposed);
        }

        tx.send_replace(Some(Ok(shared)));
        Ok(object)
    }

    async fn join(
        mut rx: watch::Receiver<Option<Outcome>>,
        cancel: &CancellationToken,
    ) -> Result<SharedObject> {
        let waited = cancel
            .run(async move {
                match rx.wait_for(Option::is_some).await {
                    Ok(outcome) => (*outcome).clone(),
                    // Creator went away without publishing
                    Err(_) => None,
                }
            })
            .await?;

        waited.unwrap_or(Err(SessionError::Cancelled))
    }

    /// Destroy every proxy created so far and refuse further lookups
    ///
    /// Teardown is best-effort: failures are logged and do not stop the
    /// remaining proxies from being released.
    pub async fn dispose(&self) {
        let objects: Vec<(K, SharedObject)> = {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            inner
                .slots
                .drain()
                .filter_map(|(key, slot)| match slot {
                    Slot::Ready(object) => Some((key, object)),
                    Slot::Pending(_) => None,
                })
                .collect()
        };

        tracing::debug!("Disposing proxy registry with {} proxies", objects.len());
        for (key, object) in objects {
            if let Err(e) = object.destroy().await {
                tracing::warn!("Failed to destroy proxy {}: {}", key, e);
            }
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    /// Number of keys with a created or in-flight proxy
    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of proxies that finished creation
    pub fn keys(&self) -> Vec<K> {
        self.inner
            .lock()
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

fn downcast<T, K>(object: SharedObject, key: &K) -> Result<Arc<T>>
where
    T: DistributedObject + 'static,
    K: fmt::Display,
{
    object
        .into_any()
        .downcast::<T>()
        .map_err(|_| SessionError::ProxyTypeMismatch(key.to_string()))
}

/// Clears a pending slot if the creating caller stops before publishing
struct PendingSlot<'a, K>
where
    K: Eq + Hash,
{
    registry: &'a ProxyRegistry<K>,
    key: Option<K>,
}

impl<K: Eq + Hash> PendingSlot<'_, K> {
    fn disarm(&mut self) {
        self.key = None;
    }

    fn release(&mut self) {
        if let Some(key) = self.key.take() {
            let mut inner = self.registry.inner.lock();
            if matches!(inner.slots.get(&key), Some(Slot::Pending(_))) {
                inner.slots.remove(&key);
            }
        }
    }
}

impl<K: Eq + Hash> Drop for PendingSlot<'_, K> {
    fn drop(&mut self) {
        self.release();
    }
}
