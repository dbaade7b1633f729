//! Top-level transport: wires the outbound registry, inbound service and
//! handler table together into the single type hosts construct and share.

use crate::breaker::Breaker;
use crate::config::TransportConfig;
use crate::error::SnapshotSendError;
use crate::handlers::{HandlerTable, RaftMessageHandler};
use crate::inbound::InboundService;
use crate::outbound::OutboundRegistry;
use crate::resolver::NodeAddressResolver;
use crate::snapshot::SnapshotSender;
use crate::stats::StatsSnapshot;
use raft_proto::pb::raft_transport_server::RaftTransportServer;
use raft_proto::{NodeId, RaftMessageRequest, StoreId};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Multiplexes outbound raft traffic to every other node in the cluster and
/// dispatches inbound traffic to whichever local stores have registered a
/// handler. Cheap to clone: all state lives behind `Arc`s.
#[derive(Clone)]
pub struct RaftTransport {
    outbound: Arc<OutboundRegistry>,
    handlers: Arc<HandlerTable>,
    resolver: Arc<dyn NodeAddressResolver>,
    shutdown: CancellationToken,
}

impl RaftTransport {
    /// Builds a transport whose outbound workers and inbound stream handlers
    /// all cancel when `shutdown` fires. The token is process-wide: hosts
    /// typically construct one at startup and cancel it once, on the signal
    /// that tears down the whole process.
    pub fn new(
        resolver: Arc<dyn NodeAddressResolver>,
        config: TransportConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let handlers = Arc::new(HandlerTable::new());
        let outbound = Arc::new(OutboundRegistry::new(
            resolver.clone(),
            handlers.clone(),
            config,
            shutdown.clone(),
        ));
        Self {
            outbound,
            handlers,
            resolver,
            shutdown,
        }
    }

    /// Builds the tonic service to mount on the host's gRPC server, e.g.
    /// `Server::builder().add_service(transport.service()).serve(addr)`.
    pub fn service(&self) -> RaftTransportServer<InboundService> {
        RaftTransportServer::new(InboundService::new(
            self.handlers.clone(),
            self.shutdown.clone(),
        ))
    }

    /// Registers `handler` to receive traffic addressed to `store_id`.
    pub fn listen(&self, store_id: StoreId, handler: Arc<dyn RaftMessageHandler>) {
        self.handlers.listen(store_id, handler);
    }

    /// Unregisters the handler for `store_id`.
    pub fn stop(&self, store_id: StoreId) {
        self.handlers.stop(store_id);
    }

    /// Returns the circuit breaker controlling connection attempts to
    /// `node_id`, creating it on first use.
    pub fn circuit_breaker(&self, node_id: NodeId) -> Breaker {
        self.outbound.breaker(node_id)
    }

    /// Queues `req` for asynchronous delivery to its destination. Returns
    /// `false` if the message was dropped (breaker open or queue full).
    ///
    /// # Panics
    ///
    /// See [`OutboundRegistry::send_async`].
    pub fn send_async(&self, req: RaftMessageRequest) -> bool {
        self.outbound.send_async(req)
    }

    /// Opens a snapshot stream to `node_id`'s circuit breaker, for use by
    /// the caller to push `SnapshotRequest` chunks and await the terminal
    /// response.
    pub async fn send_snapshot(&self, node_id: NodeId) -> Result<SnapshotSender, SnapshotSendError> {
        let breaker = self.outbound.breaker(node_id);
        crate::snapshot::send_snapshot(node_id, self.resolver.as_ref(), &breaker, &self.shutdown)
            .await
    }

    /// A point-in-time snapshot of every destination's counters, for the
    /// periodic stats reporter or ad hoc inspection.
    pub fn stats_snapshot(&self) -> Vec<StatsSnapshot> {
        self.outbound.stats_snapshot()
    }

    /// True if a worker is currently running for `node_id`.
    pub fn has_worker(&self, node_id: NodeId) -> bool {
        self.outbound.has_worker(node_id)
    }
}
