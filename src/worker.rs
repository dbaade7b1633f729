//! Outbound worker (C7): connects to one destination, drains its queue
//! until the connection breaks, the destination goes idle, or shutdown
//! fires.
//!
//! Mirrors `connectAndProcess`/`processQueue`: the breaker's `Ready` check
//! already happened in `send_async`, so this module only records the
//! resulting `Success`/`Fail`, using the counters captured at the top of
//! the attempt to decide whether the outcome is worth a log line.

use crate::breaker::Breaker;
use crate::error::{ConnectError, WorkerError};
use crate::handlers::HandlerTable;
use crate::resolver::NodeAddressResolver;
use crate::stats::DestinationStatsHandle;
use raft_proto::raft_transport_client::RaftTransportClient;
use raft_proto::{NodeId, RaftMessageRequest, RaftMessageRequestBatch};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tracing::{info, warn};

const OUTBOUND_CHANNEL_DEPTH: usize = 1;

/// Runs until the connection to `node_id` is lost, the destination has gone
/// idle for `idle_timeout`, or `shutdown` is cancelled. Removing the
/// destination's entry from the outbound registry is the caller's job,
/// matching `processQueue`'s contract that a new worker is spawned by the
/// next `SendAsync`.
pub async fn run(
    node_id: NodeId,
    rx: mpsc::Receiver<RaftMessageRequest>,
    stats: DestinationStatsHandle,
    breaker: Breaker,
    resolver: Arc<dyn NodeAddressResolver>,
    handlers: Arc<HandlerTable>,
    idle_timeout: Duration,
    shutdown: CancellationToken,
) -> Result<(), WorkerError> {
    if shutdown.is_cancelled() {
        return Ok(());
    }
    let counters = breaker.counters();
    match connect(node_id, resolver.as_ref()).await {
        Ok(client) => {
            if counters.just_recovered() {
                info!(node = %node_id, "raft transport stream established");
            }
            breaker.success();
            process_queue(node_id, rx, stats, handlers, client, idle_timeout, shutdown).await
        }
        Err(err) => {
            if counters.consec_failures == 0 {
                warn!(node = %node_id, error = %err, "raft transport stream failed");
            }
            breaker.fail();
            Err(WorkerError::Connect(err))
        }
    }
}

async fn connect(
    node_id: NodeId,
    resolver: &dyn NodeAddressResolver,
) -> Result<RaftTransportClient<Channel>, ConnectError> {
    let addr = resolver
        .resolve(node_id)
        .await
        .map_err(ConnectError::Resolve)?;
    let channel = Channel::from_shared(addr)
        .map_err(|e| ConnectError::Resolve(e.to_string()))?
        .connect()
        .await?;
    Ok(RaftTransportClient::new(channel))
}

async fn process_queue(
    node_id: NodeId,
    mut rx: mpsc::Receiver<RaftMessageRequest>,
    stats: DestinationStatsHandle,
    handlers: Arc<HandlerTable>,
    mut client: RaftTransportClient<Channel>,
    idle_timeout: Duration,
    shutdown: CancellationToken,
) -> Result<(), WorkerError> {
    let (out_tx, out_rx) = mpsc::channel::<RaftMessageRequestBatch>(OUTBOUND_CHANNEL_DEPTH);
    let outbound = ReceiverStream::new(out_rx);
    let response_stream = match client.message_batch(outbound).await {
        Ok(resp) => resp.into_inner(),
        Err(status) => {
            warn!(node = %node_id, %status, "raft transport failed to open message stream");
            return Err(WorkerError::Send(status));
        }
    };

    let (err_tx, mut err_rx) = mpsc::channel::<WorkerError>(1);
    let reader_stats = stats.clone();
    let reader = tokio::spawn(async move {
        let mut response_stream = response_stream;
        loop {
            match response_stream.message().await {
                Ok(Some(resp)) => {
                    reader_stats.record_response_received();
                    let Some(to) = resp.to_replica.as_ref().map(|r| r.store_id()) else {
                        continue;
                    };
                    let Some(handler) = handlers.lookup(to) else {
                        warn!(node = %node_id, store = %to, "no handler found for raft response");
                        continue;
                    };
                    if let Err(e) = handler.handle_raft_response(resp).await {
                        let _ = err_tx.try_send(WorkerError::Handler(e));
                        return;
                    }
                }
                Ok(None) => return,
                Err(status) => {
                    let _ = err_tx.try_send(WorkerError::Send(status));
                    return;
                }
            }
        }
    });

    let mut result = Ok(());
    loop {
        let mut batch = RaftMessageRequestBatch::default();
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            reader_err = err_rx.recv() => {
                if let Some(e) = reader_err {
                    result = Err(e);
                }
                break;
            }
            req = rx.recv() => {
                match req {
                    Some(req) => batch.requests.push(req),
                    None => break,
                }
            }
            () = tokio::time::sleep(idle_timeout) => {
                break;
            }
        }
        if batch.requests.is_empty() {
            continue;
        }
        // Drain whatever else is already queued so one wakeup sends one batch.
        while let Ok(req) = rx.try_recv() {
            batch.requests.push(req);
        }

        let sent = out_tx.send(batch).await.is_ok();
        stats.record_batch_sent();
        if !sent {
            break;
        }
    }

    drop(out_tx);
    reader.abort();
    result
}
