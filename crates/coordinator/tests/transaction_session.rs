//! Integration tests driving a transaction session against the mock cluster

use meshtx_cluster::{InvokeError, MemberId, MockCluster};
use meshtx_common::{CancellationToken, OwnerContext, TransactionId, TransactionTimeout};
use meshtx_coordinator::{
    Result, SessionConfig, SessionError, TransactionOptions, TransactionSession,
    TransactionState, TransactionalObject, TransactionalProxy,
};
use meshtx_protocol::{
    COMMIT_TRANSACTION, CREATE_TRANSACTION, ListOperation, ROLLBACK_TRANSACTION, error_response,
    headers, ok_response,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Minimal transactional collection for exercising the proxy path
#[derive(Debug)]
struct TestList {
    proxy: TransactionalProxy,
}

impl TestList {
    async fn add(&self, item: i64) -> Result<bool> {
        self.proxy
            .invoke(&ListOperation::Add { item: json!(item) })
            .await
    }
}

impl TransactionalObject for TestList {
    const SERVICE_NAME: &'static str = "txlist";

    fn from_proxy(proxy: TransactionalProxy) -> Self {
        Self { proxy }
    }

    fn proxy(&self) -> &TransactionalProxy {
        &self.proxy
    }
}

fn cluster() -> Arc<MockCluster> {
    let cluster = Arc::new(MockCluster::with_members(["member-1"]));
    cluster.register_handler(CREATE_TRANSACTION, |msg, _| {
        let body = serde_json::to_vec(&TransactionId::new().to_string()).unwrap();
        Ok(ok_response(&msg.message_type, body))
    });
    cluster.register_handler(COMMIT_TRANSACTION, |msg, _| {
        Ok(ok_response(&msg.message_type, Vec::new()))
    });
    cluster.register_handler(ROLLBACK_TRANSACTION, |msg, _| {
        Ok(ok_response(&msg.message_type, Vec::new()))
    });
    cluster.register_handler("txlist.add", |msg, _| {
        Ok(ok_response(&msg.message_type, b"true".to_vec()))
    });
    cluster
}

async fn connected_session(cluster: &Arc<MockCluster>) -> TransactionSession {
    connected_session_with(cluster, SessionConfig::default()).await
}

async fn connected_session_with(
    cluster: &Arc<MockCluster>,
    config: SessionConfig,
) -> TransactionSession {
    let session = TransactionSession::new(cluster.clone(), config);
    session
        .connect(&CancellationToken::new())
        .await
        .unwrap();
    session
}

fn token() -> CancellationToken {
    CancellationToken::new()
}

#[tokio::test]
async fn test_begin_commit() {
    let cluster = cluster();
    let session = connected_session(&cluster).await;
    assert_eq!(session.state(), TransactionState::None);
    assert_eq!(session.bound_member(), Some(MemberId::new("member-1")));

    OwnerContext::scope(async {
        let txn_id = session.begin(&token()).await.unwrap();
        assert_eq!(session.state(), TransactionState::Active);
        assert_eq!(session.transaction_id(), Some(txn_id));
        assert_eq!(session.owner_context(), OwnerContext::current());
        assert!(session.start_time().is_some());
        assert!(session.deadline().is_some());

        session.commit(&token()).await.unwrap();
    })
    .await;

    assert_eq!(session.state(), TransactionState::Committed);
    assert!(session.transaction_id().is_none());

    let requests = cluster.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].message.message_type, CREATE_TRANSACTION);
    assert_eq!(
        requests[0].message.get_header(headers::TIMEOUT_MS),
        Some("120000")
    );
    assert_eq!(requests[1].message.message_type, COMMIT_TRANSACTION);
    assert!(requests.iter().all(|r| r.member == MemberId::new("member-1")));
}

#[tokio::test]
async fn test_nested_begin_is_rejected() {
    let cluster = cluster();
    let session = connected_session(&cluster).await;

    OwnerContext::scope(async {
        let txn_id = session.begin(&token()).await.unwrap();
        let err = session.begin(&token()).await.unwrap_err();
        assert_eq!(err, SessionError::NestedTransaction);
        assert_eq!(session.state(), TransactionState::Active);
        assert_eq!(session.transaction_id(), Some(txn_id));
    })
    .await;

    assert_eq!(cluster.request_count(CREATE_TRANSACTION), 1);
}

#[tokio::test]
async fn test_commit_before_begin() {
    let cluster = cluster();
    let session = connected_session(&cluster).await;

    let err = OwnerContext::scope(session.commit(&token()))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidSessionState(_)));

    let err = OwnerContext::scope(session.rollback(&token()))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidSessionState(_)));

    assert_eq!(cluster.total_requests(), 0);
}

#[tokio::test]
async fn test_failed_commit_forces_local_rollback() {
    let cluster = cluster();
    cluster.fail_next(
        COMMIT_TRANSACTION,
        InvokeError::Connection("connection reset".into()),
        1,
    );
    let session = connected_session(&cluster).await;

    OwnerContext::scope(async {
        session.begin(&token()).await.unwrap();
        let err = session.commit(&token()).await.unwrap_err();
        assert!(matches!(err, SessionError::RemoteOperationFailed(_)));
        assert_eq!(session.state(), TransactionState::RollingBack);
        assert!(session.transaction_id().is_none());

        session.rollback(&token()).await.unwrap();
    })
    .await;

    assert_eq!(session.state(), TransactionState::RolledBack);
    assert_eq!(cluster.request_count(ROLLBACK_TRANSACTION), 0);
}

#[tokio::test]
async fn test_rejected_commit_surfaces_remote_error() {
    let cluster = cluster();
    cluster.register_handler(COMMIT_TRANSACTION, |msg, _| {
        Ok(error_response(&msg.message_type, "participant vetoed"))
    });
    let session = connected_session(&cluster).await;

    let err = OwnerContext::scope(async {
        session.begin(&token()).await.unwrap();
        session.commit(&token()).await.unwrap_err()
    })
    .await;

    assert_eq!(
        err,
        SessionError::RemoteOperationFailed("participant vetoed".into())
    );
    assert_eq!(session.state(), TransactionState::RollingBack);
}

#[tokio::test]
async fn test_rollback_swallows_remote_failure() {
    let cluster = cluster();
    cluster.fail_next(
        ROLLBACK_TRANSACTION,
        InvokeError::Connection("broken pipe".into()),
        1,
    );
    let session = connected_session(&cluster).await;

    OwnerContext::scope(async {
        session.begin(&token()).await.unwrap();
        session.rollback(&token()).await.unwrap();
    })
    .await;

    assert_eq!(session.state(), TransactionState::RolledBack);
    assert_eq!(cluster.request_count(ROLLBACK_TRANSACTION), 1);
}

#[tokio::test]
async fn test_failed_begin_reverts_everything() {
    let cluster = cluster();
    cluster.fail_next(
        CREATE_TRANSACTION,
        InvokeError::Connection("refused".into()),
        1,
    );
    let session = connected_session(&cluster).await;

    OwnerContext::scope(async {
        let err = session.begin(&token()).await.unwrap_err();
        assert!(matches!(err, SessionError::RemoteOperationFailed(_)));
        assert_eq!(session.state(), TransactionState::None);
        assert!(session.owner_context().is_none());
        assert!(session.transaction_id().is_none());
        assert!(session.start_time().is_none());

        // The session is usable again
        session.begin(&token()).await.unwrap();
        assert_eq!(session.state(), TransactionState::Active);
    })
    .await;
}

#[tokio::test]
async fn test_cancelled_begin_reverts() {
    let cluster = cluster();
    let session = connected_session(&cluster).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = OwnerContext::scope(session.begin(&cancel))
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::Cancelled);
    assert_eq!(session.state(), TransactionState::None);
    assert_eq!(cluster.total_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_commit_timeout_leaves_rolling_back() {
    let cluster = cluster();
    cluster.set_latency(COMMIT_TRANSACTION, Duration::from_secs(30));
    let session = connected_session(&cluster).await;

    let err = OwnerContext::scope(async {
        session.begin(&token()).await.unwrap();
        session
            .commit_with_timeout(Duration::from_secs(1))
            .await
            .unwrap_err()
    })
    .await;

    assert_eq!(err, SessionError::TimedOut);
    assert_eq!(session.state(), TransactionState::RollingBack);
}

#[tokio::test]
async fn test_session_is_single_use() {
    let cluster = cluster();
    let session = connected_session(&cluster).await;

    OwnerContext::scope(async {
        session.begin(&token()).await.unwrap();
        session.commit(&token()).await.unwrap();

        let err = session.begin(&token()).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidSessionState(_)));
    })
    .await;

    let err = session.connect(&token()).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidSessionState(_)));
    assert_eq!(cluster.request_count(CREATE_TRANSACTION), 1);
}

#[tokio::test]
async fn test_commit_from_another_flow() {
    let cluster = cluster();
    let session = connected_session(&cluster).await;

    let owner = OwnerContext::allocate();
    owner.enter(session.begin(&token())).await.unwrap();

    let err = OwnerContext::scope(session.commit(&token()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::CrossContextViolation { owner: o, .. } if o == owner
    ));
    assert_eq!(session.state(), TransactionState::Active);
    assert_eq!(cluster.request_count(COMMIT_TRANSACTION), 0);

    owner.enter(session.commit(&token())).await.unwrap();
    assert_eq!(session.state(), TransactionState::Committed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_owner_survives_thread_hops() {
    let cluster = cluster();
    cluster.set_latency(CREATE_TRANSACTION, Duration::from_millis(5));
    let session = connected_session(&cluster).await;

    OwnerContext::scope(async {
        session.begin(&token()).await.unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        session.commit(&token()).await.unwrap();
    })
    .await;

    assert_eq!(session.state(), TransactionState::Committed);
}

#[tokio::test]
async fn test_proxy_from_another_flow_never_reaches_network() {
    let cluster = cluster();
    let session = connected_session(&cluster).await;
    let owner = OwnerContext::allocate();

    let list: Arc<TestList> = owner
        .enter(async {
            session.begin(&token()).await.unwrap();
            let list: Arc<TestList> = session.get_transactional("orders").await.unwrap();
            assert!(list.add(1).await.unwrap());
            list
        })
        .await;

    let err = OwnerContext::scope(list.add(2)).await.unwrap_err();
    assert!(matches!(err, SessionError::CrossContextViolation { .. }));

    let err = list.add(3).await.unwrap_err();
    assert_eq!(
        err,
        SessionError::CrossContextViolation {
            owner,
            caller: None
        }
    );

    assert_eq!(cluster.request_count("txlist.add"), 1);

    let err = OwnerContext::scope(session.get_transactional::<TestList>("orders"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::CrossContextViolation { .. }));
}

#[tokio::test]
async fn test_proxy_operations_carry_transaction() {
    let cluster = cluster();
    let session = connected_session(&cluster).await;

    let txn_id = OwnerContext::scope(async {
        let txn_id = session.begin(&token()).await.unwrap();
        let list: Arc<TestList> = session.get_transactional("orders").await.unwrap();
        assert_eq!(list.proxy().transaction_id(), txn_id);
        assert_eq!(list.proxy().member(), &MemberId::new("member-1"));
        list.add(7).await.unwrap();
        txn_id
    })
    .await;

    let request = cluster
        .requests()
        .into_iter()
        .find(|r| r.message.message_type == "txlist.add")
        .unwrap();
    assert_eq!(
        request.message.get_header(headers::TXN_ID),
        Some(txn_id.to_string().as_str())
    );
    assert_eq!(request.message.get_header(headers::OBJECT_NAME), Some("orders"));
}

#[tokio::test]
async fn test_get_transactional_requires_active_transaction() {
    let cluster = cluster();
    let session = connected_session(&cluster).await;

    let err = OwnerContext::scope(session.get_transactional::<TestList>("orders"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidSessionState(_)));
}

// Scenario: connect blocks until a member shows up
#[tokio::test(start_paused = true)]
async fn test_connect_waits_for_member() {
    let cluster = Arc::new(MockCluster::new());
    let session = TransactionSession::with_defaults(cluster.clone());

    let joiner = tokio::spawn({
        let cluster = cluster.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            cluster.add_member("late-joiner")
        }
    });

    let member = session
        .connect_with_timeout(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(member, joiner.await.unwrap());
    assert_eq!(session.bound_member(), Some(member));
}

#[tokio::test(start_paused = true)]
async fn test_connect_gives_up() {
    let cluster = Arc::new(MockCluster::new());
    let session = TransactionSession::with_defaults(cluster);

    let err = session
        .connect_with_timeout(Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::ConnectionUnavailable(_)));
    assert!(session.bound_member().is_none());
}

// Scenario: an expired transaction cannot be committed
#[tokio::test(start_paused = true)]
async fn test_expired_transaction_is_not_committed() {
    let cluster = cluster();
    let config = SessionConfig::default()
        .with_options(TransactionOptions::default().with_timeout(Duration::from_secs(5)));
    let session = connected_session_with(&cluster, config).await;

    OwnerContext::scope(async {
        session.begin(&token()).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        let err = session.commit(&token()).await.unwrap_err();
        assert_eq!(err, SessionError::TransactionExpired);
        let err = session
            .commit_with_timeout(Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::TransactionExpired);

        // Rollback is still allowed
        session.rollback(&token()).await.unwrap();
    })
    .await;

    assert_eq!(cluster.request_count(COMMIT_TRANSACTION), 0);
    assert_eq!(session.state(), TransactionState::RolledBack);
}

#[tokio::test(start_paused = true)]
async fn test_infinite_timeout_never_expires() {
    let cluster = cluster();
    let config = SessionConfig::default()
        .with_options(TransactionOptions::default().with_timeout(TransactionTimeout::Infinite));
    let session = connected_session_with(&cluster, config).await;

    OwnerContext::scope(async {
        session.begin(&token()).await.unwrap();
        assert!(session.deadline().is_none());
        tokio::time::advance(Duration::from_secs(24 * 60 * 60)).await;
        session.commit(&token()).await.unwrap();
    })
    .await;

    let create = &cluster.requests()[0].message;
    assert_eq!(create.get_header(headers::TIMEOUT_MS), Some("-1"));
}

// Scenario: concurrent lookups of one name share the proxy
#[tokio::test]
async fn test_concurrent_lookups_share_proxy() {
    let cluster = cluster();
    let session = connected_session(&cluster).await;

    OwnerContext::scope(async {
        session.begin(&token()).await.unwrap();
        let (a, b) = tokio::join!(
            session.get_transactional::<TestList>("orders"),
            session.get_transactional::<TestList>("orders"),
        );
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));

        let other: Arc<TestList> = session.get_transactional("invoices").await.unwrap();
        assert_eq!(other.proxy().name(), "invoices");
    })
    .await;
}

// Scenario: dispose releases every proxy
#[tokio::test]
async fn test_dispose_releases_proxies() {
    let cluster = cluster();
    let session = connected_session(&cluster).await;

    let (orders, invoices) = OwnerContext::scope(async {
        session.begin(&token()).await.unwrap();
        let orders: Arc<TestList> = session.get_transactional("orders").await.unwrap();
        let invoices: Arc<TestList> = session.get_transactional("invoices").await.unwrap();

        session.dispose().await;

        let err = session
            .get_transactional::<TestList>("orders")
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::RegistryDisposed);

        let err = orders.add(1).await.unwrap_err();
        assert!(matches!(err, SessionError::ProxyDestroyed(_)));
        (orders, invoices)
    })
    .await;

    assert!(orders.proxy().is_destroyed());
    assert!(invoices.proxy().is_destroyed());
    assert!(session.is_disposed());

    // The active transaction was rolled back on the way out
    assert_eq!(session.state(), TransactionState::RolledBack);
    assert_eq!(cluster.request_count(ROLLBACK_TRANSACTION), 1);
    assert_eq!(cluster.request_count("txlist.add"), 0);

    session.dispose().await;
    assert_eq!(cluster.request_count(ROLLBACK_TRANSACTION), 1);
}

#[tokio::test]
async fn test_dispose_after_commit_sends_nothing() {
    let cluster = cluster();
    let session = connected_session(&cluster).await;

    OwnerContext::scope(async {
        session.begin(&token()).await.unwrap();
        session.commit(&token()).await.unwrap();
    })
    .await;
    session.dispose().await;

    assert_eq!(session.state(), TransactionState::Committed);
    assert_eq!(cluster.request_count(ROLLBACK_TRANSACTION), 0);
}

#[tokio::test]
async fn test_rollback_from_another_flow() {
    let cluster = cluster();
    let session = connected_session(&cluster).await;

    let owner = OwnerContext::allocate();
    owner.enter(session.begin(&token())).await.unwrap();

    let err = OwnerContext::scope(session.rollback(&token()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::CrossContextViolation { owner: o, .. } if o == owner
    ));
    let err = session.rollback(&token()).await.unwrap_err();
    assert!(matches!(err, SessionError::CrossContextViolation { .. }));

    assert_eq!(session.state(), TransactionState::Active);
    assert_eq!(cluster.request_count(ROLLBACK_TRANSACTION), 0);

    owner.enter(session.rollback(&token())).await.unwrap();
    assert_eq!(session.state(), TransactionState::RolledBack);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_rollback_still_rolls_back() {
    let cluster = cluster();
    cluster.set_latency(ROLLBACK_TRANSACTION, Duration::from_secs(30));
    let session = connected_session(&cluster).await;

    OwnerContext::scope(async {
        session.begin(&token()).await.unwrap();
        session
            .rollback_with_timeout(Duration::from_secs(1))
            .await
            .unwrap();
    })
    .await;

    assert_eq!(session.state(), TransactionState::RolledBack);
    assert_eq!(cluster.request_count(ROLLBACK_TRANSACTION), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_rollback_still_rolls_back() {
    let cluster = cluster();
    cluster.set_latency(ROLLBACK_TRANSACTION, Duration::from_secs(30));
    let session = connected_session(&cluster).await;

    OwnerContext::scope(async {
        session.begin(&token()).await.unwrap();
        let cancel = token();
        let rollback = session.rollback(&cancel);
        let raced = tokio::time::timeout(Duration::from_secs(1), rollback).await;
        assert!(raced.is_err());
    })
    .await;

    assert_eq!(session.state(), TransactionState::RolledBack);
    assert!(session.transaction_id().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_begin_from_two_flows() {
    let cluster = cluster();
    cluster.set_latency(CREATE_TRANSACTION, Duration::from_secs(1));
    let session = connected_session(&cluster).await;

    let first_cancel = token();
    let second_cancel = token();
    let (first, second) = tokio::join!(
        OwnerContext::scope(session.begin(&first_cancel)),
        OwnerContext::scope(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(session.state(), TransactionState::None);
            session.begin(&second_cancel).await
        }),
    );

    let txn_id = first.unwrap();
    assert_eq!(second.unwrap_err(), SessionError::NestedTransaction);
    assert_eq!(session.transaction_id(), Some(txn_id));
    assert_eq!(cluster.request_count(CREATE_TRANSACTION), 1);
}

#[tokio::test(start_paused = true)]
async fn test_waiting_connect_cannot_move_active_transaction() {
    let cluster = cluster();
    let first = MemberId::new("member-1");
    let session = Arc::new(connected_session(&cluster).await);

    // A second connect starts waiting while no member is reachable
    cluster.disconnect(&first);
    let late_connect = tokio::spawn({
        let session = session.clone();
        async move { session.connect(&CancellationToken::new()).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    cluster.reconnect(&first);
    let owner = OwnerContext::allocate();
    owner.enter(session.begin(&token())).await.unwrap();

    // Only another member is reachable when the waiting connect retries
    cluster.disconnect(&first);
    cluster.add_member("member-2");

    let err = late_connect.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::InvalidSessionState(_)));
    assert_eq!(session.bound_member(), Some(first.clone()));

    cluster.reconnect(&first);
    owner.enter(session.commit(&token())).await.unwrap();

    let requests = cluster.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].message.message_type, COMMIT_TRANSACTION);
    assert!(requests.iter().all(|r| r.member == first));
}
