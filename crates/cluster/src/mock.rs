//! In-memory cluster for tests and demos
//!
//! Members can join, drop and reconnect at runtime. Requests are answered by
//! handlers registered per message type; every request that reaches the
//! cluster is recorded so callers can assert on what was (or was not) sent.

use crate::{ClusterInvoker, InvokeError, MemberId, Message, Result};
use async_trait::async_trait;
use meshtx_common::CancellationToken;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Type alias for request handlers
type Handler = Arc<dyn Fn(&Message, &MemberId) -> Result<Message> + Send + Sync>;

/// A request as it reached the cluster
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub member: MemberId,
    pub message: Message,
}

#[derive(Debug, Clone)]
struct MockMember {
    id: MemberId,
    connected: bool,
}

/// Mock cluster that simulates a set of members answering requests
#[derive(Default)]
pub struct MockCluster {
    /// Members in join order
    members: Mutex<Vec<MockMember>>,

    /// Request handlers by message type
    handlers: Mutex<HashMap<String, Handler>>,

    /// Every request that reached a member
    requests: Mutex<Vec<RecordedRequest>>,

    /// Failures to return for the next requests of a message type
    injected_failures: Mutex<HashMap<String, VecDeque<InvokeError>>>,

    /// Artificial latency per message type
    latency: Mutex<HashMap<String, Duration>>,
}

impl MockCluster {
    /// Create a cluster without members
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cluster with connected members
    pub fn with_members<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cluster = Self::new();
        for id in ids {
            cluster.add_member(id);
        }
        cluster
    }

    /// Add a connected member
    pub fn add_member(&self, id: impl Into<String>) -> MemberId {
        let id = MemberId::new(id);
        let mut members = self.members.lock();
        match members.iter_mut().find(|m| m.id == id) {
            Some(member) => member.connected = true,
            None => members.push(MockMember {
                id: id.clone(),
                connected: true,
            }),
        }
        tracing::debug!("Member {} joined the mock cluster", id);
        id
    }

    /// Drop the connection to a member
    pub fn disconnect(&self, id: &MemberId) {
        if let Some(member) = self.members.lock().iter_mut().find(|m| &m.id == id) {
            member.connected = false;
        }
    }

    /// Restore the connection to a member
    pub fn reconnect(&self, id: &MemberId) {
        if let Some(member) = self.members.lock().iter_mut().find(|m| &m.id == id) {
            member.connected = true;
        }
    }

    /// Register a handler for a message type, replacing any previous one
    pub fn register_handler<F>(&self, message_type: impl Into<String>, handler: F)
    where
        F: Fn(&Message, &MemberId) -> Result<Message> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .insert(message_type.into(), Arc::new(handler));
    }

    /// Make the next `count` requests of `message_type` fail with `error`
    pub fn fail_next(&self, message_type: impl Into<String>, error: InvokeError, count: usize) {
        let mut failures = self.injected_failures.lock();
        let queue = failures.entry(message_type.into()).or_default();
        queue.extend(std::iter::repeat_n(error, count));
    }

    /// Delay every response of `message_type`
    pub fn set_latency(&self, message_type: impl Into<String>, latency: Duration) {
        self.latency.lock().insert(message_type.into(), latency);
    }

    /// All requests that reached the cluster so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests of a message type that reached the cluster
    pub fn request_count(&self, message_type: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.message.message_type == message_type)
            .count()
    }

    /// Total number of requests that reached the cluster
    pub fn total_requests(&self) -> usize {
        self.requests.lock().len()
    }

    fn is_connected(&self, id: &MemberId) -> bool {
        self.members
            .lock()
            .iter()
            .any(|m| &m.id == id && m.connected)
    }

    fn take_injected_failure(&self, message_type: &str) -> Option<InvokeError> {
        self.injected_failures
            .lock()
            .get_mut(message_type)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl ClusterInvoker for MockCluster {
    async fn send_request(
        &self,
        request: Message,
        target: &MemberId,
        cancel: &CancellationToken,
    ) -> Result<Message> {
        cancel.check()?;

        if !self.is_connected(target) {
            return Err(InvokeError::MemberUnavailable(target.clone()));
        }

        let message_type = request.message_type.clone();
        self.requests.lock().push(RecordedRequest {
            member: target.clone(),
            message: request.clone(),
        });

        let latency = self.latency.lock().get(&message_type).copied();
        if let Some(latency) = latency {
            cancel.run(tokio::time::sleep(latency)).await?;
        }

        if let Some(error) = self.take_injected_failure(&message_type) {
            tracing::debug!("Injected failure for {}: {}", message_type, error);
            return Err(error);
        }

        // Clone the handler out so it does not run under the lock
        let handler = self.handlers.lock().get(&message_type).cloned();
        match handler {
            Some(handler) => handler(&request, target),
            None => Err(InvokeError::NoHandler(message_type)),
        }
    }

    fn pick_any_connected_member(&self) -> Option<MemberId> {
        self.members
            .lock()
            .iter()
            .find(|m| m.connected)
            .map(|m| m.id.clone())
    }
}
