//! Owner context: the logical flow identity a transaction is bound to
//!
//! A transaction may only be driven by the flow that began it. Execution hops
//! between worker threads at every `.await`, so the identity cannot live in a
//! thread-local; it is carried as a tokio task-local instead and stays stable
//! across suspension points for as long as the scoped future runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static CURRENT: OwnerContext;
}

/// Identity of one logical flow of control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerContext(u64);

impl OwnerContext {
    /// Allocate a process-unique context identity
    pub fn allocate() -> Self {
        Self(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Rebuild a context from its raw value (wire decoding)
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value for the wire
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The context of the calling flow, if it runs inside a scope
    pub fn current() -> Option<Self> {
        CURRENT.try_with(|ctx| *ctx).ok()
    }

    /// Whether the calling flow runs inside this context
    pub fn is_current(&self) -> bool {
        Self::current() == Some(*self)
    }

    /// Run `future` inside a freshly allocated context
    pub async fn scope<F: Future>(future: F) -> F::Output {
        Self::allocate().enter(future).await
    }

    /// Run `future` inside this context
    ///
    /// Tasks spawned from within do not inherit the context; they have to
    /// enter it explicitly.
    pub async fn enter<F: Future>(self, future: F) -> F::Output {
        CURRENT.scope(self, future).await
    }
}

impl fmt::Display for OwnerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}
