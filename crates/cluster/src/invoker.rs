//! The seam between the transaction core and the network

use crate::{Message, MemberId, Result};
use async_trait::async_trait;
use meshtx_common::CancellationToken;

/// Sends encoded requests to cluster members
///
/// Implementations own connection management and routing; the transaction
/// core only ever asks for "any connected member" and then talks to that one.
#[async_trait]
pub trait ClusterInvoker: Send + Sync {
    /// Send `request` to `target` and wait for its response
    async fn send_request(
        &self,
        request: Message,
        target: &MemberId,
        cancel: &CancellationToken,
    ) -> Result<Message>;

    /// Pick any member with a live connection, if there is one
    fn pick_any_connected_member(&self) -> Option<MemberId>;
}

