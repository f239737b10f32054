//! Client-side coordinator for distributed transactions
//!
//! [`TransactionSession`] drives one transaction through connect, begin,
//! commit or rollback, and dispose. Transaction-scoped proxies are handed out
//! through the session's [`ProxyRegistry`], which creates each proxy at most
//! once even under concurrent requests.

mod error;
mod options;
mod proxy;
mod registry;
mod session;
mod state;

pub use error::{Result, SessionError};
pub use options::{SessionConfig, TransactionOptions};
pub use proxy::{TransactionalObject, TransactionalProxy};
pub use registry::{AsAny, DistributedObject, ProxyKey, ProxyRegistry};
pub use session::TransactionSession;
pub use state::TransactionState;
