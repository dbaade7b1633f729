//! Outbound queue manager (C6).
//!
//! Holds the per-destination queue, stats and breaker registries and
//! implements `send_async`'s fast paths. The actual connect-and-drain loop
//! lives in [`crate::worker`], spawned here the first time a destination is
//! used.

use crate::breaker::BreakerRegistry;
use crate::config::TransportConfig;
use crate::handlers::HandlerTable;
use crate::resolver::NodeAddressResolver;
use crate::stats::{DestinationStats, DestinationStatsHandle};
use crate::worker;
use raft_proto::{NodeId, PayloadKind, RaftMessageRequest};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, warn};

struct Destination {
    tx: mpsc::Sender<RaftMessageRequest>,
}

/// Shared outbound state: one queue/stats pair per destination node, created
/// lazily on first send and torn down by the worker itself once it idles
/// out or its connection is lost.
pub struct OutboundRegistry {
    destinations: Mutex<HashMap<NodeId, Destination>>,
    stats: Mutex<HashMap<NodeId, DestinationStatsHandle>>,
    breakers: BreakerRegistry,
    resolver: Arc<dyn NodeAddressResolver>,
    handlers: Arc<HandlerTable>,
    config: TransportConfig,
    shutdown: CancellationToken,
}

impl OutboundRegistry {
    pub fn new(
        resolver: Arc<dyn NodeAddressResolver>,
        handlers: Arc<HandlerTable>,
        config: TransportConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            destinations: Mutex::new(HashMap::new()),
            stats: Mutex::new(HashMap::new()),
            breakers: BreakerRegistry::new(
                config.breaker_failure_threshold,
                config.breaker_initial_backoff,
                config.breaker_max_backoff,
            ),
            resolver,
            handlers,
            config,
            shutdown,
        }
    }

    pub fn breaker(&self, node_id: NodeId) -> crate::breaker::Breaker {
        self.breakers.get(node_id)
    }

    fn stats_for(&self, node_id: NodeId) -> DestinationStatsHandle {
        self.stats
            .lock()
            .unwrap()
            .entry(node_id)
            .or_insert_with(|| Arc::new(DestinationStats::default()))
            .clone()
    }

    /// Sends `req` to its destination's outbound queue, spawning that
    /// destination's worker if this is the first send to it. Returns `false`
    /// if the breaker is open or the queue is full; the caller should treat
    /// that as "unreachable" and not retry synchronously.
    ///
    /// # Panics
    ///
    /// Panics if `req` violates either of the two caller preconditions:
    /// a non-heartbeat message addressed to range 0, or a request carrying
    /// a snapshot payload (snapshots must use [`crate::transport::RaftTransport::send_snapshot`]).
    pub fn send_async(self: &Arc<Self>, req: RaftMessageRequest) -> bool {
        assert!(
            req.range_id != 0 || req.is_heartbeat_only(),
            "only messages with coalesced heartbeats or heartbeat responses may be sent to range ID 0"
        );
        assert!(
            req.payload_kind() != PayloadKind::Snapshot,
            "snapshots must be sent using send_snapshot"
        );

        let to_node = req.to_replica.as_ref().map(|r| r.node_id()).unwrap_or(NodeId(0));
        let breaker = self.breakers.get(to_node);
        let stats = self.stats_for(to_node);

        if !breaker.ready() {
            stats.record_dropped();
            return false;
        }
        if self.shutdown.is_cancelled() {
            stats.record_dropped();
            return false;
        }

        let mut destinations = self.destinations.lock().unwrap();
        if !destinations.contains_key(&to_node) {
            let (tx, rx) = mpsc::channel(self.config.send_buffer_size);
            destinations.insert(to_node, Destination { tx: tx.clone() });
            drop(destinations);

            let registry = self.clone();
            let stats = stats.clone();
            let breaker = breaker.clone();
            let resolver = self.resolver.clone();
            let handlers = self.handlers.clone();
            let idle_timeout = self.config.idle_timeout;
            let shutdown = self.shutdown.clone();
            tokio::spawn(
                async move {
                    if let Err(e) = worker::run(
                        to_node,
                        rx,
                        stats,
                        breaker,
                        resolver,
                        handlers,
                        idle_timeout,
                        shutdown,
                    )
                    .await
                    {
                        warn!(node = %to_node, error = %e, "raft outbound worker exited with an error");
                    }
                    registry.destinations.lock().unwrap().remove(&to_node);
                }
                .instrument(tracing::info_span!("raft_outbound_worker", node = %to_node)),
            );
        } else {
            drop(destinations);
        }

        let destinations = self.destinations.lock().unwrap();
        let Some(dest) = destinations.get(&to_node) else {
            // The worker we just spawned already exited (e.g. queue capacity
            // 0 in tests); treat it the same as a full queue.
            stats.record_dropped();
            return false;
        };
        match dest.tx.try_send(req) {
            Ok(()) => {
                stats.observe_queue_len(dest.tx.max_capacity() - dest.tx.capacity());
                true
            }
            Err(_) => {
                stats.record_dropped();
                false
            }
        }
    }

    pub fn stats_snapshot(&self) -> Vec<crate::stats::StatsSnapshot> {
        let destinations = self.destinations.lock().unwrap();
        let stats = self.stats.lock().unwrap();
        stats
            .iter()
            .map(|(node_id, s)| {
                let queue_len = destinations
                    .get(node_id)
                    .map(|d| d.tx.max_capacity() - d.tx.capacity())
                    .unwrap_or(0);
                s.snapshot(*node_id, queue_len)
            })
            .collect()
    }

    /// True if a worker is currently registered for `node_id`. Exists mainly
    /// so tests can observe idle reclamation without racing on timing alone.
    pub fn has_worker(&self, node_id: NodeId) -> bool {
        self.destinations.lock().unwrap().contains_key(&node_id)
    }
}
