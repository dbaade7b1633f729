//! Generated gRPC bindings for the raft message transport, plus a thin layer
//! of domain newtypes and constructors on top of the generated message types.
//!
//! The generated code (from `proto/raft_transport.proto`) is the concrete
//! stand-in for "the RPC layer" -- everything in this crate outside of the
//! `pb` module is plain Rust glue that the transport core depends on instead
//! of reaching into `pb` directly, so that renaming or regenerating the
//! proto doesn't ripple through the rest of the workspace.

pub mod pb {
    tonic::include_proto!("raft.transport.v1");
}

pub use pb::{
    CoalescedHeartbeat, PayloadKind, RaftError, RaftMessageRequest, RaftMessageRequestBatch,
    RaftMessageResponse, ReplicaDescriptor, SnapshotRequest, SnapshotRequestHeader,
    SnapshotResponse, raft_transport_client, raft_transport_server,
};
pub use pb::snapshot_response::Status as SnapshotStatus;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse node-level addressing identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Fine-grained (store within a node) addressing identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreId(pub u64);

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl ReplicaDescriptor {
    pub fn node_id(&self) -> NodeId {
        NodeId(self.node_id)
    }

    pub fn store_id(&self) -> StoreId {
        StoreId(self.store_id)
    }
}

impl RaftMessageRequest {
    /// True if this request carries only coalesced heartbeats or
    /// heartbeat responses (the one kind of traffic allowed on range 0).
    pub fn is_heartbeat_only(&self) -> bool {
        !self.heartbeats.is_empty() || !self.heartbeat_resps.is_empty()
    }

    pub fn payload_kind(&self) -> PayloadKind {
        PayloadKind::try_from(self.payload_kind).unwrap_or(PayloadKind::Unspecified)
    }
}

/// Constructs the response for `req`, reversing `from`/`to` per the wire
/// contract: a response's `from_replica` is the request's `to_replica` and
/// vice versa.
pub fn new_response(req: &RaftMessageRequest, error: Option<RaftError>) -> RaftMessageResponse {
    RaftMessageResponse {
        range_id: req.range_id,
        to_replica: req.from_replica.clone(),
        from_replica: req.to_replica.clone(),
        error,
    }
}

pub fn store_not_found_error(store_id: StoreId) -> RaftError {
    RaftError {
        message: format!("store not found: {store_id}"),
    }
}
