//! Walk-through of a transaction session against an in-memory cluster
//!
//! Run with `RUST_LOG=debug` to see every state transition.

use meshtx::{
    CancellationToken, InvokeError, Message, MockCluster, OwnerContext, SessionConfig,
    SessionError, TransactionId, TransactionOptions, TransactionSession, TransactionalMap,
};
use meshtx_protocol::{
    COMMIT_TRANSACTION, CREATE_TRANSACTION, MapOperation, ROLLBACK_TRANSACTION, decode_operation,
    ok_response,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const MAP_OPS: &[&str] = &["txmap.get", "txmap.put", "txmap.size"];

#[tokio::main]
async fn main() -> Result<(), SessionError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    println!("=== meshtx: transaction session demo ===\n");

    let cluster = demo_cluster();

    demo_commit(cluster.clone()).await?;
    demo_failed_commit(cluster.clone()).await?;
    demo_expired(cluster).await?;

    println!("\n=== Demo completed ===");
    Ok(())
}

async fn demo_commit(cluster: Arc<MockCluster>) -> Result<(), SessionError> {
    println!("--- Commit ---");
    let session = TransactionSession::with_defaults(cluster);
    let member = session.connect_with_timeout(Duration::from_secs(5)).await?;
    println!("Connected to {}", member);

    OwnerContext::scope(async {
        let txn_id = session.begin_with_timeout(Duration::from_secs(5)).await?;
        println!("Began transaction {}", txn_id);

        let balances: Arc<TransactionalMap<String, i64>> =
            session.get_transactional("balances").await?;
        balances.put(&"alice".to_string(), &100).await?;
        balances.put(&"bob".to_string(), &50).await?;
        println!("Map now holds {} entries", balances.size().await?);

        session.commit_with_timeout(Duration::from_secs(5)).await?;
        println!("State after commit: {:?}", session.state());
        Ok::<_, SessionError>(())
    })
    .await?;

    session.dispose().await;
    Ok(())
}

async fn demo_failed_commit(cluster: Arc<MockCluster>) -> Result<(), SessionError> {
    println!("\n--- Failed commit ---");
    cluster.fail_next(
        COMMIT_TRANSACTION,
        InvokeError::Connection("connection reset by peer".to_string()),
        1,
    );

    let session = TransactionSession::with_defaults(cluster);
    session.connect(&CancellationToken::new()).await?;

    OwnerContext::scope(async {
        session.begin(&CancellationToken::new()).await?;
        if let Err(e) = session.commit(&CancellationToken::new()).await {
            println!("Commit failed: {}", e);
            println!("State after failed commit: {:?}", session.state());
        }
        session.rollback(&CancellationToken::new()).await?;
        println!("State after rollback: {:?}", session.state());
        Ok::<_, SessionError>(())
    })
    .await?;

    session.dispose().await;
    Ok(())
}

async fn demo_expired(cluster: Arc<MockCluster>) -> Result<(), SessionError> {
    println!("\n--- Expired transaction ---");
    let options = TransactionOptions::default().with_timeout(Duration::from_millis(50));
    let session = TransactionSession::new(cluster, SessionConfig::default().with_options(options));
    session.connect(&CancellationToken::new()).await?;

    OwnerContext::scope(async {
        session.begin(&CancellationToken::new()).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        match session.commit(&CancellationToken::new()).await {
            Err(SessionError::TransactionExpired) => println!("Commit refused: transaction expired"),
            other => println!("Unexpected commit outcome: {:?}", other),
        }
        session.rollback(&CancellationToken::new()).await
    })
    .await?;

    // Dispose is safe to call more than once
    session.dispose().await;
    session.dispose().await;
    Ok(())
}

/// Two members sharing one in-memory map service
fn demo_cluster() -> Arc<MockCluster> {
    let cluster = Arc::new(MockCluster::with_members(["member-1", "member-2"]));

    cluster.register_handler(CREATE_TRANSACTION, |msg, _| {
        reply(msg, TransactionId::new().to_string())
    });
    cluster.register_handler(COMMIT_TRANSACTION, |msg, _| reply(msg, ()));
    cluster.register_handler(ROLLBACK_TRANSACTION, |msg, _| reply(msg, ()));

    let store: Arc<Mutex<BTreeMap<String, serde_json::Value>>> = Arc::default();
    for op in MAP_OPS {
        let store = store.clone();
        cluster.register_handler(*op, move |msg, _| {
            let request = decode_operation::<MapOperation>(msg)
                .map_err(|e| InvokeError::Connection(e.to_string()))?;
            let mut store = store.lock();
            match request.operation {
                MapOperation::Get { key } => reply(msg, store.get(&key.to_string())),
                MapOperation::Put { key, value } => {
                    reply(msg, store.insert(key.to_string(), value))
                }
                MapOperation::Size => reply(msg, store.len()),
                other => Err(InvokeError::NoHandler(format!("{:?}", other))),
            }
        });
    }

    cluster
}

fn reply<T: serde::Serialize>(msg: &Message, value: T) -> meshtx_cluster::Result<Message> {
    let body = serde_json::to_vec(&value).map_err(|e| InvokeError::Connection(e.to_string()))?;
    Ok(ok_response(&msg.message_type, body))
}
