//! Destination address resolution (C1).
//!
//! The transport never owns cluster membership; it asks a resolver for a
//! dialable address each time it needs one, so that membership changes
//! (a node's address changing after a restart, say) are picked up on the
//! next connect attempt rather than cached for the transport's lifetime.

use async_trait::async_trait;
use raft_proto::NodeId;

/// Resolves a `NodeId` to a dialable address, e.g. `http://10.0.0.4:26257`.
/// Implementations typically consult a gossiped node descriptor table.
#[async_trait]
pub trait NodeAddressResolver: Send + Sync {
    async fn resolve(&self, node_id: NodeId) -> Result<String, String>;
}
