//! Periodic stats logging, mirroring the original's 10-second debug ticker
//! that prints a table of queue depth and throughput per destination.

use crate::transport::RaftTransport;
use std::time::Duration;
use tracing::info;

/// Runs until `transport` is dropped, logging one line per destination
/// every `interval`. Intended to be spawned once at startup behind a
/// verbosity check, the way the original only ran this loop under `log.V(1)`.
pub async fn run(transport: RaftTransport, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick fires immediately; skip it
    loop {
        ticker.tick().await;
        for s in transport.stats_snapshot() {
            info!(
                node = %s.node_id,
                queue_len = s.queue_len,
                queue_max_ever = s.queue_max_ever,
                client_sent = s.client_sent,
                client_recv = s.client_recv,
                client_dropped = s.client_dropped,
                server_sent = s.server_sent,
                server_recv = s.server_recv,
                "raft transport stats"
            );
        }
    }
}
