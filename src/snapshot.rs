//! Outbound snapshot sending (C9).
//!
//! Unlike `send_async`, a snapshot send uses `Breaker::call` directly: there
//! is no separate queue/worker to own the half-open probe, so the whole
//! resolve-dial-open-stream sequence inside `call` *is* the probe, and a
//! failure anywhere in it -- including a stream-open rejection after a
//! successful dial -- counts against the breaker. Only post-connect
//! chunk-send/recv errors on an already-open stream are left to the caller
//! without touching the breaker.

use crate::breaker::{Breaker, CallError};
use crate::error::SnapshotSendError;
use crate::resolver::NodeAddressResolver;
use raft_proto::raft_transport_client::RaftTransportClient;
use raft_proto::{NodeId, SnapshotRequest, SnapshotResponse};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tracing::warn;

/// A handle for streaming one outgoing snapshot's chunks and reading back
/// the final status. Obtained from
/// [`crate::transport::RaftTransport::send_snapshot`].
pub struct SnapshotSender {
    tx: tokio::sync::mpsc::Sender<SnapshotRequest>,
    inbound: tonic::Streaming<SnapshotResponse>,
}

impl SnapshotSender {
    /// Streams one chunk. Callers send the header on the first chunk and set
    /// `final_batch` on the last, matching the wire contract in
    /// `SnapshotRequestHeader`.
    pub async fn send_chunk(&self, chunk: SnapshotRequest) -> Result<(), SnapshotSendError> {
        self.tx
            .send(chunk)
            .await
            .map_err(|_| SnapshotSendError::ShuttingDown)
    }

    /// Closes the outbound half of the stream and waits for the peer's
    /// terminal response.
    pub async fn finish(mut self) -> Result<SnapshotResponse, SnapshotSendError> {
        drop(self.tx);
        match self.inbound.message().await? {
            Some(resp) => Ok(resp),
            None => Err(SnapshotSendError::Stream(tonic::Status::unavailable(
                "snapshot stream closed without a final response",
            ))),
        }
    }
}

/// Opens a snapshot stream to `node_id`, gated by that destination's circuit
/// breaker. Resolving, dialing and opening the stream all happen inside a
/// single `breaker.call`, so a rejection at any of those steps records a
/// breaker failure; only chunk send/recv errors once the stream is open are
/// left untouched.
pub async fn send_snapshot(
    node_id: NodeId,
    resolver: &dyn NodeAddressResolver,
    breaker: &Breaker,
    shutdown: &CancellationToken,
) -> Result<SnapshotSender, SnapshotSendError> {
    if shutdown.is_cancelled() {
        return Err(SnapshotSendError::ShuttingDown);
    }

    let result = breaker
        .call(|| async {
            let addr = resolver
                .resolve(node_id)
                .await
                .map_err(SnapshotSendError::Resolve)?;
            let channel = Channel::from_shared(addr)
                .map_err(|e| SnapshotSendError::Resolve(e.to_string()))?
                .connect()
                .await?;
            let mut client = RaftTransportClient::new(channel);

            let (tx, rx) = tokio::sync::mpsc::channel::<SnapshotRequest>(1);
            let outbound = ReceiverStream::new(rx);
            let inbound = client.snapshot(outbound).await?.into_inner();
            Ok::<_, SnapshotSendError>((tx, inbound))
        })
        .await;

    let (tx, inbound) = match result {
        Ok(pair) => pair,
        Err(CallError::Open) => return Err(SnapshotSendError::ShuttingDown),
        Err(CallError::Inner(e)) => {
            warn!(node = %node_id, error = %e, "failed to open outgoing snapshot stream");
            return Err(e);
        }
    };

    Ok(SnapshotSender { tx, inbound })
}
