//! Test doubles for exercising the transport against a real socket instead
//! of mocked streams, the same style as the forwarder/server harness's
//! `mock_ws_client`/`mock_ws_server`: bind to an ephemeral port, hand back
//! a dialable address, and let the transport under test talk real gRPC.

use async_trait::async_trait;
use raft_proto::{NodeId, RaftMessageRequest, RaftMessageResponse, SnapshotRequest};
use raft_transport::{
    CancellationToken, RaftMessageHandler, RaftTransport, ResponseSink, SnapshotOutcome,
    TransportConfig,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Resolves every `NodeId` registered with [`FakeResolver::register`] to a
/// fixed loopback address; unregistered nodes fail to resolve.
#[derive(Default)]
pub struct FakeResolver {
    addrs: Mutex<HashMap<NodeId, String>>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, node_id: NodeId, addr: String) {
        self.addrs.lock().unwrap().insert(node_id, addr);
    }
}

#[async_trait]
impl raft_transport::NodeAddressResolver for FakeResolver {
    async fn resolve(&self, node_id: NodeId) -> Result<String, String> {
        self.addrs
            .lock()
            .unwrap()
            .get(&node_id)
            .cloned()
            .ok_or_else(|| format!("no known address for {node_id}"))
    }
}

/// A real `RaftTransport` bound to an ephemeral loopback port with its gRPC
/// service already being served, for use as the "other end" in tests that
/// exercise outbound connect/send behavior against a live listener.
pub struct LoopbackNode {
    pub transport: RaftTransport,
    pub addr: String,
    server: JoinHandle<()>,
}

impl LoopbackNode {
    pub async fn spawn(resolver: Arc<dyn raft_transport::NodeAddressResolver>) -> Self {
        Self::spawn_with_config(resolver, TransportConfig::default()).await
    }

    pub async fn spawn_with_config(
        resolver: Arc<dyn raft_transport::NodeAddressResolver>,
        config: TransportConfig,
    ) -> Self {
        let transport = RaftTransport::new(resolver, config, CancellationToken::new());
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback listener");
        let local_addr = listener.local_addr().expect("local_addr");
        let addr = format!("http://{local_addr}");

        let service = transport.service();
        let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);
        let server = tokio::spawn(async move {
            let _ = tonic::transport::Server::builder()
                .add_service(service)
                .serve_with_incoming(incoming)
                .await;
        });

        Self {
            transport,
            addr,
            server,
        }
    }
}

impl Drop for LoopbackNode {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Records every request, response and snapshot chunk it receives, for
/// assertions in tests. `handle_raft_request` always succeeds unless
/// `fail_requests` is set.
#[derive(Default)]
pub struct RecordingHandler {
    pub requests: Mutex<Vec<RaftMessageRequest>>,
    pub responses: Mutex<Vec<RaftMessageResponse>>,
    pub snapshot_chunks: Mutex<Vec<SnapshotRequest>>,
    pub fail_requests_with: Mutex<Option<String>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl RaftMessageHandler for RecordingHandler {
    async fn handle_raft_request(
        &self,
        req: RaftMessageRequest,
        _response_stream: Option<ResponseSink>,
    ) -> Result<(), String> {
        self.requests.lock().unwrap().push(req);
        if let Some(msg) = self.fail_requests_with.lock().unwrap().clone() {
            return Err(msg);
        }
        Ok(())
    }

    async fn handle_raft_response(&self, resp: RaftMessageResponse) -> Result<(), String> {
        self.responses.lock().unwrap().push(resp);
        Ok(())
    }

    async fn handle_snapshot(
        &self,
        chunk: SnapshotRequest,
    ) -> Result<SnapshotOutcome, String> {
        let final_batch = chunk.final_batch;
        self.snapshot_chunks.lock().unwrap().push(chunk);
        if final_batch {
            Ok(SnapshotOutcome::Done(
                raft_proto::SnapshotStatus::Applied,
                "applied".into(),
            ))
        } else {
            Ok(SnapshotOutcome::Continue)
        }
    }
}

/// A handler that always rejects, for testing the store-not-found/error
/// response path without needing a second real store.
pub struct RejectingHandler {
    pub message: String,
}

#[async_trait]
impl RaftMessageHandler for RejectingHandler {
    async fn handle_raft_request(
        &self,
        _req: RaftMessageRequest,
        _response_stream: Option<ResponseSink>,
    ) -> Result<(), String> {
        Err(self.message.clone())
    }

    async fn handle_raft_response(&self, _resp: RaftMessageResponse) -> Result<(), String> {
        Ok(())
    }

    async fn handle_snapshot(
        &self,
        _chunk: SnapshotRequest,
    ) -> Result<SnapshotOutcome, String> {
        Err(self.message.clone())
    }
}

/// A handler that hands every request off to a spawned task and replies
/// through its `ResponseSink` instead of its `Result`, exercising the
/// asynchronous half of the dual-mode contract. Always returns `Ok(())`
/// immediately; the error arrives later on the stream.
#[derive(Default)]
pub struct AsyncReplyHandler {
    pub message: String,
}

#[async_trait]
impl RaftMessageHandler for AsyncReplyHandler {
    async fn handle_raft_request(
        &self,
        _req: RaftMessageRequest,
        response_stream: Option<ResponseSink>,
    ) -> Result<(), String> {
        let sink = response_stream.expect("AsyncReplyHandler requires a live response stream");
        let message = self.message.clone();
        tokio::spawn(async move {
            let _ = sink.send_error(message).await;
        });
        Ok(())
    }

    async fn handle_raft_response(&self, _resp: RaftMessageResponse) -> Result<(), String> {
        Ok(())
    }

    async fn handle_snapshot(
        &self,
        _chunk: SnapshotRequest,
    ) -> Result<SnapshotOutcome, String> {
        Ok(SnapshotOutcome::Continue)
    }
}

pub fn replica(node_id: u64, store_id: u64, replica_id: u64) -> raft_proto::ReplicaDescriptor {
    raft_proto::ReplicaDescriptor {
        node_id,
        store_id,
        replica_id,
    }
}

pub fn raft_request(range_id: u64, to: (u64, u64, u64), from: (u64, u64, u64)) -> RaftMessageRequest {
    RaftMessageRequest {
        range_id,
        to_replica: Some(replica(to.0, to.1, to.2)),
        from_replica: Some(replica(from.0, from.1, from.2)),
        message: Vec::new(),
        payload_kind: raft_proto::PayloadKind::Normal as i32,
        heartbeats: Vec::new(),
        heartbeat_resps: Vec::new(),
    }
}
