//! E2: a stalled peer fills the queue and the excess is dropped, not queued.

use raft_proto::NodeId;
use raft_test_support::{FakeResolver, raft_request};
use raft_transport::{CancellationToken, RaftTransport, TransportConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

#[tokio::test]
async fn overflowing_a_four_slot_queue_drops_exactly_six_of_ten() {
    init_tracing();
    // A bare listener that accepts the TCP connection but never completes the
    // gRPC handshake -- the "stalled peer" from the scenario.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _keep_open = tokio::spawn(async move {
        loop {
            if listener.accept().await.is_err() {
                return;
            }
        }
    });

    let resolver = Arc::new(FakeResolver::new());
    resolver.register(NodeId(4), format!("http://{addr}"));
    let transport = RaftTransport::new(
        resolver,
        TransportConfig {
            send_buffer_size: 4,
            ..TransportConfig::default()
        },
        CancellationToken::new(),
    );

    let mut accepted = 0;
    let mut dropped = 0;
    for i in 1..=10u64 {
        let req = raft_request(i, (4, 40, 1), (1, 10, 1));
        if transport.send_async(req) {
            accepted += 1;
        } else {
            dropped += 1;
        }
    }

    // The worker drains queued entries into its connect attempt as soon as
    // it's spawned, so give it a moment before asserting final counts.
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The loop above never yields to the scheduler, so the worker it spawns
    // cannot have drained anything before the queue fills -- the split is
    // deterministic, not just bounded.
    assert_eq!(accepted, 4);
    assert_eq!(dropped, 6);
    let snap = transport
        .stats_snapshot()
        .into_iter()
        .find(|s| s.node_id == NodeId(4))
        .expect("stats recorded for node 4");
    assert_eq!(snap.client_dropped, 6);
    assert_eq!(snap.queue_max_ever, 4);
}
