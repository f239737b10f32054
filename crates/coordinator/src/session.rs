//! Transaction session: lifecycle of one distributed transaction
//!
//! A session is pinned to one cluster member by `connect`, hosts at most one
//! transaction attempt, and may only be driven by the flow that began it.
//! Sessions are single-use: once committed or rolled back they stay there.

use crate::error::{Result, SessionError};
use crate::options::{SessionConfig, TransactionOptions};
use crate::proxy::{TransactionalObject, TransactionalProxy};
use crate::registry::{ProxyKey, ProxyRegistry};
use crate::state::{ActiveTransaction, SessionState, TransactionState};
use meshtx_cluster::{ClusterInvoker, MemberId, Message};
use meshtx_common::{CancellationToken, OwnerContext, TransactionId};
use meshtx_protocol::{
    decode_create_transaction, decode_status, encode_commit, encode_create_transaction,
    encode_rollback,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Send a request to `member`, giving up when `cancel` fires
pub(crate) async fn invoke(
    invoker: &dyn ClusterInvoker,
    request: Message,
    member: &MemberId,
    cancel: &CancellationToken,
) -> Result<Message> {
    let response = cancel
        .run(invoker.send_request(request, member, cancel))
        .await??;
    Ok(response)
}

/// Client-side coordinator of one distributed transaction
pub struct TransactionSession {
    invoker: Arc<dyn ClusterInvoker>,
    config: SessionConfig,
    member: Mutex<Option<MemberId>>,
    state: Mutex<SessionState>,
    registry: ProxyRegistry,
}

impl TransactionSession {
    pub fn new(invoker: Arc<dyn ClusterInvoker>, config: SessionConfig) -> Self {
        Self {
            invoker,
            config,
            member: Mutex::new(None),
            state: Mutex::new(SessionState::Idle),
            registry: ProxyRegistry::new(),
        }
    }

    pub fn with_defaults(invoker: Arc<dyn ClusterInvoker>) -> Self {
        Self::new(invoker, SessionConfig::default())
    }

    /// Pin the session to a connected member, waiting for one to appear
    ///
    /// Only an idle session can be pinned. A connect that is still waiting
    /// when a transaction begins fails instead of moving the session.
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<MemberId> {
        {
            let state = self.state.lock();
            if *state != SessionState::Idle {
                return Err(invalid_state("connect", &state));
            }
        }

        loop {
            if let Some(member) = self.invoker.pick_any_connected_member() {
                let state = self.state.lock();
                if *state != SessionState::Idle {
                    return Err(invalid_state("connect", &state));
                }
                *self.member.lock() = Some(member.clone());
                tracing::debug!("Session connected to member {}", member);
                return Ok(member);
            }

            let retry = tokio::time::sleep(self.config.connect_retry_interval);
            if let Err(reason) = cancel.run(retry).await {
                tracing::warn!("Gave up waiting for a cluster member: {}", reason);
                return Err(SessionError::ConnectionUnavailable(format!(
                    "no connected member ({})",
                    reason
                )));
            }
        }
    }

    pub async fn connect_with_timeout(&self, timeout: Duration) -> Result<MemberId> {
        self.connect(&CancellationToken::with_timeout(timeout)).await
    }

    /// Ask the cluster for a new transaction owned by the calling flow
    ///
    /// All-or-nothing: on any failure, including cancellation, the session
    /// is back where it was before the call. If the session is disposed
    /// while the request is in flight, the new transaction is rolled back
    /// and [`SessionError::RegistryDisposed`] is returned.
    pub async fn begin(&self, cancel: &CancellationToken) -> Result<TransactionId> {
        let options = self.config.options;
        let caller = OwnerContext::current();

        let (owner, member) = {
            let mut state = self.state.lock();
            let member = self.require_member("begin")?;
            if self.registry.is_disposed() {
                return Err(SessionError::RegistryDisposed);
            }
            if state.holds_ownership() {
                return Err(SessionError::NestedTransaction);
            }
            if *state != SessionState::Idle {
                return Err(invalid_state("begin", &state));
            }
            let owner = caller.ok_or(SessionError::MissingOwnerContext)?;
            options.validate()?;
            *state = SessionState::Beginning { owner };
            (owner, member)
        };

        let guard = TransitionGuard::new(
            &self.state,
            SessionState::Beginning { owner },
            SessionState::Idle,
        );
        let started_at = Instant::now();

        let id = match self.request_create(&options, owner, &member, cancel).await {
            Ok(id) => id,
            Err(e) => {
                guard.complete(SessionState::Idle);
                tracing::debug!("Begin failed for {}: {}", owner, e);
                return Err(e);
            }
        };

        let txn = ActiveTransaction {
            id,
            owner,
            member,
            started_at,
            deadline: options.timeout.deadline_from(started_at),
        };

        // Checked under the state lock so a concurrent dispose either sees
        // the active transaction or is seen here
        let orphaned = {
            let mut state = self.state.lock();
            let orphaned = self.registry.is_disposed();
            *state = if orphaned {
                SessionState::Aborting(txn.clone())
            } else {
                SessionState::Active(txn.clone())
            };
            orphaned
        };
        drop(guard);

        if orphaned {
            tracing::warn!("Session disposed while transaction {} was starting", id);
            let cancel = CancellationToken::with_timeout(self.config.invocation_timeout);
            self.abort(txn, &cancel).await;
            return Err(SessionError::RegistryDisposed);
        }

        tracing::debug!("Began transaction {} for {} on {}", id, owner, txn.member);
        Ok(id)
    }

    pub async fn begin_with_timeout(&self, timeout: Duration) -> Result<TransactionId> {
        self.begin(&CancellationToken::with_timeout(timeout)).await
    }

    /// Commit the active transaction
    ///
    /// A transaction past its deadline fails with
    /// [`SessionError::TransactionExpired`] without contacting the cluster.
    /// Any other failure leaves the session in
    /// [`TransactionState::RollingBack`].
    pub async fn commit(&self, cancel: &CancellationToken) -> Result<()> {
        let txn = {
            let mut state = self.state.lock();
            let SessionState::Active(txn) = state.clone() else {
                return Err(invalid_state("commit", &state));
            };
            check_owner(txn.owner)?;
            if txn.is_expired(Instant::now()) {
                tracing::debug!("Transaction {} expired before commit", txn.id);
                return Err(SessionError::TransactionExpired);
            }
            *state = SessionState::Committing(txn.clone());
            txn
        };

        let rolling_back = SessionState::RollingBack { owner: txn.owner };
        let guard = TransitionGuard::new(
            &self.state,
            SessionState::Committing(txn.clone()),
            rolling_back.clone(),
        );

        match self.request_commit(&txn, cancel).await {
            Ok(()) => {
                guard.complete(SessionState::Committed);
                tracing::debug!("Committed transaction {}", txn.id);
                Ok(())
            }
            Err(e) => {
                guard.complete(rolling_back);
                tracing::warn!("Commit of transaction {} failed: {}", txn.id, e);
                Err(e)
            }
        }
    }

    pub async fn commit_with_timeout(&self, timeout: Duration) -> Result<()> {
        self.commit(&CancellationToken::with_timeout(timeout)).await
    }

    /// Roll the transaction back
    ///
    /// After a failed commit this only settles local state. Otherwise the
    /// rollback request is sent, and its failure is logged but not returned.
    pub async fn rollback(&self, cancel: &CancellationToken) -> Result<()> {
        let txn = {
            let mut state = self.state.lock();
            match state.clone() {
                SessionState::RollingBack { .. } => {
                    *state = SessionState::RolledBack;
                    tracing::debug!("Rolled back locally after failed commit");
                    return Ok(());
                }
                SessionState::Active(txn) => {
                    check_owner(txn.owner)?;
                    *state = SessionState::Aborting(txn.clone());
                    txn
                }
                _ => return Err(invalid_state("rollback", &state)),
            }
        };

        let id = txn.id;
        self.abort(txn, cancel).await;
        tracing::debug!("Rolled back transaction {}", id);
        Ok(())
    }

    pub async fn rollback_with_timeout(&self, timeout: Duration) -> Result<()> {
        self.rollback(&CancellationToken::with_timeout(timeout)).await
    }

    /// Typed proxy for the object `name` bound to the active transaction
    pub async fn get_transactional<T: TransactionalObject>(&self, name: &str) -> Result<Arc<T>> {
        let cancel = CancellationToken::with_timeout(self.config.invocation_timeout);
        self.get_transactional_with(name, &cancel).await
    }

    pub async fn get_transactional_with<T: TransactionalObject>(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<T>> {
        if self.registry.is_disposed() {
            return Err(SessionError::RegistryDisposed);
        }

        let txn = {
            let state = self.state.lock();
            let SessionState::Active(txn) = &*state else {
                return Err(invalid_state("get a transactional object", &state));
            };
            txn.clone()
        };
        check_owner(txn.owner)?;

        let key = ProxyKey::transactional(T::SERVICE_NAME, name, txn.id);
        let invoker = self.invoker.clone();
        let invocation_timeout = self.config.invocation_timeout;
        let name = name.to_string();

        self.registry
            .get_or_create(
                key,
                move || {
                    let proxy = TransactionalProxy::new(
                        T::SERVICE_NAME,
                        name,
                        txn.id,
                        txn.owner,
                        txn.member,
                        invoker,
                        invocation_timeout,
                    );
                    async move { Ok(T::from_proxy(proxy)) }
                },
                cancel,
            )
            .await
    }

    /// Release the session and every proxy it handed out
    ///
    /// Proxies are destroyed first, then an active transaction is rolled
    /// back on a best-effort basis. Calling this more than once is harmless.
    pub async fn dispose(&self) {
        self.registry.dispose().await;

        let pending = {
            let mut state = self.state.lock();
            match state.clone() {
                SessionState::Active(txn) => {
                    *state = SessionState::Aborting(txn.clone());
                    Some(txn)
                }
                SessionState::RollingBack { .. } => {
                    *state = SessionState::RolledBack;
                    None
                }
                _ => None,
            }
        };

        if let Some(txn) = pending {
            tracing::debug!("Disposing session with active transaction {}", txn.id);
            let cancel = CancellationToken::with_timeout(self.config.invocation_timeout);
            self.abort(txn, &cancel).await;
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state.lock().public()
    }

    /// Identity of the transaction, present while it is active
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.state.lock().transaction().map(|txn| txn.id)
    }

    pub fn bound_member(&self) -> Option<MemberId> {
        self.member.lock().clone()
    }

    /// Flow that began the current transaction attempt
    pub fn owner_context(&self) -> Option<OwnerContext> {
        self.state.lock().owner()
    }

    pub fn start_time(&self) -> Option<Instant> {
        self.state.lock().transaction().map(|txn| txn.started_at)
    }

    /// Local deadline of the active transaction; `None` when there is no
    /// transaction or its timeout is infinite
    pub fn deadline(&self) -> Option<Instant> {
        self.state.lock().transaction().and_then(|txn| txn.deadline)
    }

    pub fn options(&self) -> &TransactionOptions {
        &self.config.options
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_disposed(&self) -> bool {
        self.registry.is_disposed()
    }

    fn require_member(&self, operation: &str) -> Result<MemberId> {
        self.member.lock().clone().ok_or_else(|| {
            SessionError::InvalidSessionState(format!("cannot {} before connect", operation))
        })
    }

    /// Send the rollback for a transaction already marked as aborting and
    /// settle on rolled back whatever the outcome
    async fn abort(&self, txn: ActiveTransaction, cancel: &CancellationToken) {
        let guard = TransitionGuard::new(
            &self.state,
            SessionState::Aborting(txn.clone()),
            SessionState::RolledBack,
        );
        if let Err(e) = self.request_rollback(&txn, cancel).await {
            tracing::warn!("Rollback of transaction {} failed: {}", txn.id, e);
        }
        guard.complete(SessionState::RolledBack);
    }

    async fn request_create(
        &self,
        options: &TransactionOptions,
        owner: OwnerContext,
        member: &MemberId,
        cancel: &CancellationToken,
    ) -> Result<TransactionId> {
        let request =
            encode_create_transaction(options.timeout, options.durability, options.kind, owner);
        let response = invoke(self.invoker.as_ref(), request, member, cancel).await?;
        Ok(decode_create_transaction(&response)?)
    }

    async fn request_commit(&self, txn: &ActiveTransaction, cancel: &CancellationToken) -> Result<()> {
        let request = encode_commit(txn.id, txn.owner);
        let response = invoke(self.invoker.as_ref(), request, &txn.member, cancel).await?;
        decode_status(&response)?;
        Ok(())
    }

    async fn request_rollback(
        &self,
        txn: &ActiveTransaction,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let request = encode_rollback(txn.id, txn.owner);
        let response = invoke(self.invoker.as_ref(), request, &txn.member, cancel).await?;
        decode_status(&response)?;
        Ok(())
    }
}

/// Fail unless the calling flow is `owner`
pub(crate) fn check_owner(owner: OwnerContext) -> Result<()> {
    if owner.is_current() {
        Ok(())
    } else {
        Err(SessionError::CrossContextViolation {
            owner,
            caller: OwnerContext::current(),
        })
    }
}

fn invalid_state(operation: &str, state: &SessionState) -> SessionError {
    SessionError::InvalidSessionState(format!(
        "cannot {} while {:?}",
        operation,
        state.public()
    ))
}

/// Settles an in-flight transition when the request finishes or its future
/// is dropped
///
/// Only replaces the state if it still is the in-flight one.
struct TransitionGuard<'a> {
    state: &'a Mutex<SessionState>,
    in_flight: SessionState,
    outcome: SessionState,
}

impl<'a> TransitionGuard<'a> {
    fn new(state: &'a Mutex<SessionState>, in_flight: SessionState, fallback: SessionState) -> Self {
        Self {
            state,
            in_flight,
            outcome: fallback,
        }
    }

    fn complete(mut self, outcome: SessionState) {
        self.outcome = outcome;
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if *state == self.in_flight {
            *state = self.outcome.clone();
        }
    }
}
