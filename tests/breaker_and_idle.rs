//! E3: breaker trips on connect failure and recovers after backoff.
//! E4: a worker reclaims itself after `idle_timeout` with nothing queued.

use raft_proto::NodeId;
use raft_test_support::{FakeResolver, LoopbackNode, RecordingHandler, raft_request};
use raft_transport::{CancellationToken, RaftTransport, TransportConfig};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

#[tokio::test]
async fn breaker_trips_then_recovers_once_the_peer_becomes_reachable() {
    init_tracing();
    let resolver = Arc::new(FakeResolver::new()); // node 9 unregistered: resolve fails
    let transport = RaftTransport::new(
        resolver.clone(),
        TransportConfig {
            breaker_initial_backoff: Duration::from_millis(30),
            ..TransportConfig::default()
        },
        CancellationToken::new(),
    );

    assert!(transport.send_async(raft_request(1, (9, 90, 1), (1, 10, 1))));
    // Give the worker a chance to attempt (and fail) the connect.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!transport.circuit_breaker(NodeId(9)).ready());

    assert!(!transport.send_async(raft_request(2, (9, 90, 1), (1, 10, 1))));
    let dropped_before = transport
        .stats_snapshot()
        .into_iter()
        .find(|s| s.node_id == NodeId(9))
        .unwrap()
        .client_dropped;
    assert!(dropped_before >= 1);

    tokio::time::sleep(Duration::from_millis(40)).await;

    let peer = LoopbackNode::spawn(Arc::new(FakeResolver::new())).await;
    let handler = Arc::new(RecordingHandler::new());
    peer.transport.listen(raft_proto::StoreId(90), handler.clone());
    resolver.register(NodeId(9), peer.addr.clone());

    assert!(transport.send_async(raft_request(3, (9, 90, 1), (1, 10, 1))));
    tokio::time::timeout(Duration::from_secs(2), async {
        while handler.request_count() < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("request should reach the now-reachable peer");
}

#[tokio::test]
async fn idle_worker_reclaims_itself_and_a_later_send_starts_a_fresh_one() {
    init_tracing();
    let peer_resolver = Arc::new(FakeResolver::new());
    let peer = LoopbackNode::spawn(peer_resolver).await;
    let handler = Arc::new(RecordingHandler::new());
    peer.transport.listen(raft_proto::StoreId(110), handler.clone());

    let resolver = Arc::new(FakeResolver::new());
    resolver.register(NodeId(11), peer.addr.clone());
    let transport = RaftTransport::new(
        resolver,
        TransportConfig {
            idle_timeout: Duration::from_millis(50),
            ..TransportConfig::default()
        },
        CancellationToken::new(),
    );

    assert!(transport.send_async(raft_request(1, (11, 110, 1), (1, 10, 1))));
    tokio::time::timeout(Duration::from_secs(2), async {
        while handler.request_count() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(transport.has_worker(NodeId(11)));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!transport.has_worker(NodeId(11)));

    assert!(transport.send_async(raft_request(2, (11, 110, 1), (1, 10, 1))));
    assert!(transport.has_worker(NodeId(11)));
}
