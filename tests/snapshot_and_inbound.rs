//! E5: a snapshot stream with no header in its first message.
//! E6: an inbound request addressed to an unregistered store.

use raft_proto::{NodeId, SnapshotStatus, StoreId};
use raft_test_support::{
    AsyncReplyHandler, FakeResolver, LoopbackNode, RecordingHandler, raft_request, replica,
};
use raft_transport::{CancellationToken, RaftTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

#[tokio::test]
async fn snapshot_stream_missing_header_gets_one_error_response_then_closes() {
    init_tracing();
    let peer = LoopbackNode::spawn(Arc::new(FakeResolver::new())).await;
    let handler = Arc::new(RecordingHandler::new());
    peer.transport.listen(StoreId(50), handler.clone());

    let resolver = Arc::new(FakeResolver::new());
    resolver.register(NodeId(5), peer.addr.clone());
    let sender = RaftTransport::new(resolver, Default::default(), CancellationToken::new());

    let mut sess = sender.send_snapshot(NodeId(5)).await.unwrap();
    sess.send_chunk(raft_proto::SnapshotRequest {
        header: None,
        kv_batch: Vec::new(),
        final_batch: false,
    })
    .await
    .unwrap();

    let resp = sess.finish().await.unwrap();
    assert_eq!(resp.status, SnapshotStatus::Error as i32);
    assert_eq!(
        resp.message,
        "client error: no header in first snapshot request message"
    );

    // Regular message transport to the same peer remains healthy afterward.
    assert!(sender.send_async(raft_request(1, (5, 50, 1), (1, 10, 1))));
    tokio::time::timeout(Duration::from_secs(2), async {
        while handler.request_count() < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn request_to_unregistered_store_gets_store_not_found_with_reversed_addressing() {
    init_tracing();
    let peer = LoopbackNode::spawn(Arc::new(FakeResolver::new())).await;
    // Deliberately do not register any handler for store 61.

    let mut client =
        raft_proto::raft_transport_client::RaftTransportClient::connect(peer.addr.clone())
            .await
            .unwrap();
    let (tx, rx) = tokio::sync::mpsc::channel(4);
    let outbound = tokio_stream::wrappers::ReceiverStream::new(rx);
    let mut inbound = client.message_batch(outbound).await.unwrap().into_inner();

    let req = raft_proto::RaftMessageRequest {
        range_id: 7,
        to_replica: Some(replica(6, 61, 1)),
        from_replica: Some(replica(1, 10, 1)),
        message: Vec::new(),
        payload_kind: raft_proto::PayloadKind::Normal as i32,
        heartbeats: Vec::new(),
        heartbeat_resps: Vec::new(),
    };
    tx.send(raft_proto::RaftMessageRequestBatch {
        requests: vec![req],
    })
    .await
    .unwrap();

    let resp = inbound.next().await.unwrap().unwrap();
    assert_eq!(resp.range_id, 7);
    assert_eq!(resp.from_replica.unwrap().store_id(), StoreId(61));
    assert_eq!(resp.to_replica.unwrap().store_id(), StoreId(10));
    let err = resp.error.expect("store-not-found error");
    assert!(err.message.contains("store not found"));
}

#[tokio::test]
async fn handler_replying_through_its_response_stream_reaches_the_caller() {
    init_tracing();
    let peer = LoopbackNode::spawn(Arc::new(FakeResolver::new())).await;
    let handler = Arc::new(AsyncReplyHandler {
        message: "rejected asynchronously".into(),
    });
    peer.transport.listen(StoreId(80), handler.clone());

    let mut client =
        raft_proto::raft_transport_client::RaftTransportClient::connect(peer.addr.clone())
            .await
            .unwrap();
    let (tx, rx) = tokio::sync::mpsc::channel(4);
    let outbound = tokio_stream::wrappers::ReceiverStream::new(rx);
    let mut inbound = client.message_batch(outbound).await.unwrap().into_inner();

    let req = raft_proto::RaftMessageRequest {
        range_id: 9,
        to_replica: Some(replica(8, 80, 1)),
        from_replica: Some(replica(1, 10, 1)),
        message: Vec::new(),
        payload_kind: raft_proto::PayloadKind::Normal as i32,
        heartbeats: Vec::new(),
        heartbeat_resps: Vec::new(),
    };
    tx.send(raft_proto::RaftMessageRequestBatch {
        requests: vec![req],
    })
    .await
    .unwrap();

    // The handler returns Ok(()) immediately and replies from a spawned
    // task, so the response only shows up once that task runs -- this
    // would hang forever if `handle_raft_request` could only answer through
    // its `Result`.
    let resp = tokio::time::timeout(Duration::from_secs(2), inbound.next())
        .await
        .expect("response should arrive asynchronously")
        .unwrap()
        .unwrap();
    let err = resp.error.expect("asynchronous error response");
    assert_eq!(err.message, "rejected asynchronously");
}
