//! Raft message transport.
//!
//! Multiplexes outbound consensus traffic between cluster nodes: each
//! destination gets a bounded queue and a lazily-spawned worker that holds
//! one streaming gRPC connection open and drains the queue into it, backed
//! by a circuit breaker so a down peer fails fast instead of piling up
//! queued messages. Inbound traffic is dispatched by store ID to whatever
//! local handler is registered for it.
//!
//! See [`RaftTransport`] for the entry point.

pub mod breaker;
pub mod config;
pub mod error;
pub mod handlers;
pub mod inbound;
pub mod outbound;
pub mod resolver;
pub mod snapshot;
pub mod stats;
pub mod stats_reporter;
pub mod transport;
mod worker;

pub use breaker::Breaker;
pub use config::{ConfigError, TransportConfig};
pub use error::{ConnectError, SnapshotSendError, WorkerError};
pub use handlers::{RaftMessageHandler, ResponseSink, SnapshotOutcome};
pub use resolver::NodeAddressResolver;
pub use snapshot::SnapshotSender;
pub use stats::StatsSnapshot;
pub use transport::RaftTransport;

/// Re-exported so hosts constructing a [`RaftTransport`] don't need a direct
/// `tokio-util` dependency just to build the shutdown token its constructor
/// takes.
pub use tokio_util::sync::CancellationToken;

pub use raft_proto::{
    NodeId, PayloadKind, RaftError, RaftMessageRequest, RaftMessageRequestBatch,
    RaftMessageResponse, ReplicaDescriptor, SnapshotRequest, SnapshotRequestHeader,
    SnapshotResponse, SnapshotStatus, StoreId,
};
