//! Inbound server endpoints (C8): the gRPC service implementation that
//! proxies incoming streams to whatever handler is registered for the
//! addressed store.

use crate::handlers::{HandlerTable, ResponseSink, SnapshotOutcome};
use crate::stats::DestinationStats;
use async_stream::try_stream;
use raft_proto::pb::raft_transport_server::RaftTransport as RaftTransportService;
use raft_proto::{RaftMessageResponse, SnapshotRequest, SnapshotResponse, SnapshotStatus};
use raft_proto::{new_response, store_not_found_error};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};
use tracing::warn;

const RESPONSE_CHANNEL_DEPTH: usize = 16;

/// Implements the generated `RaftTransport` service trait, dispatching each
/// inbound request or snapshot chunk to the store registered in `handlers`.
pub struct InboundService {
    handlers: Arc<HandlerTable>,
    /// Per-source-node stats, keyed independently from the outbound
    /// registry's map since a node we've never sent to may still send to us.
    stats: Arc<Mutex<HashMap<raft_proto::NodeId, Arc<DestinationStats>>>>,
    /// Cancelling this ends every open `message_batch`/`snapshot` loop and
    /// returns a clean (non-error) end of stream, matching the shutdown
    /// contract described for the outbound side.
    shutdown: CancellationToken,
}

impl InboundService {
    pub fn new(handlers: Arc<HandlerTable>, shutdown: CancellationToken) -> Self {
        Self {
            handlers,
            stats: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        }
    }
}

type ResponseStream = Pin<Box<dyn Stream<Item = Result<RaftMessageResponse, Status>> + Send>>;
type SnapshotRespStream = Pin<Box<dyn Stream<Item = Result<SnapshotResponse, Status>> + Send>>;

#[tonic::async_trait]
impl RaftTransportService for InboundService {
    type MessageBatchStream = ResponseStream;
    type SnapshotStream = SnapshotRespStream;

    async fn message_batch(
        &self,
        request: Request<Streaming<raft_proto::RaftMessageRequestBatch>>,
    ) -> Result<Response<Self::MessageBatchStream>, Status> {
        let mut inbound = request.into_inner();
        let handlers = self.handlers.clone();
        let this_stats = self.stats.clone();
        let shutdown = self.shutdown.clone();
        let (tx, rx) = mpsc::channel::<Result<RaftMessageResponse, Status>>(RESPONSE_CHANNEL_DEPTH);

        // Dispatch runs in its own task rather than directly inside the
        // stream body so that a handler using its `ResponseSink` to answer
        // asynchronously can write onto `tx` from a context other than this
        // loop, alongside the synchronous error responses below.
        tokio::spawn(async move {
            let mut stats: Option<Arc<DestinationStats>> = None;
            loop {
                let batch = tokio::select! {
                    () = shutdown.cancelled() => return,
                    next = inbound.next() => match next {
                        Some(Ok(batch)) => batch,
                        Some(Err(status)) => {
                            let _ = tx.send(Err(status)).await;
                            return;
                        }
                        None => return,
                    },
                };
                if batch.requests.is_empty() {
                    continue;
                }
                if stats.is_none() {
                    if let Some(from) = batch.requests[0].from_replica.as_ref() {
                        let node_id = from.node_id();
                        let handle = this_stats
                            .lock()
                            .unwrap()
                            .entry(node_id)
                            .or_insert_with(|| Arc::new(DestinationStats::default()))
                            .clone();
                        stats = Some(handle);
                    }
                }
                for req in batch.requests {
                    if let Some(s) = &stats {
                        s.record_request_received();
                    }
                    let store_id = req.to_replica.as_ref().map(|r| r.store_id());
                    let Some(store_id) = store_id else { continue };
                    match handlers.lookup(store_id) {
                        Some(handler) => {
                            let sink = ResponseSink::new(tx.clone(), req.clone());
                            if let Err(e) = handler.handle_raft_request(req.clone(), Some(sink)).await {
                                if let Some(s) = &stats {
                                    s.record_error_response_sent();
                                }
                                let resp = new_response(&req, Some(raft_proto::RaftError { message: e }));
                                if tx.send(Ok(resp)).await.is_err() {
                                    return;
                                }
                            }
                        }
                        None => {
                            warn!(store = %store_id, "unable to accept raft message: no handler registered");
                            if let Some(s) = &stats {
                                s.record_error_response_sent();
                            }
                            let resp = new_response(&req, Some(store_not_found_error(store_id)));
                            if tx.send(Ok(resp)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }

    async fn snapshot(
        &self,
        request: Request<Streaming<SnapshotRequest>>,
    ) -> Result<Response<Self::SnapshotStream>, Status> {
        let mut inbound = request.into_inner();
        let handlers = self.handlers.clone();
        let shutdown = self.shutdown.clone();

        let output = try_stream! {
            let first = tokio::select! {
                () = shutdown.cancelled() => return,
                next = inbound.next() => match next {
                    Some(first) => first?,
                    None => return,
                },
            };
            let Some(header) = first.header.as_ref() else {
                yield SnapshotResponse {
                    status: SnapshotStatus::Error as i32,
                    message: "client error: no header in first snapshot request message".into(),
                };
                return;
            };
            let store_id = header
                .raft_message_request
                .as_ref()
                .and_then(|r| r.to_replica.as_ref())
                .map(|r| r.store_id());
            let Some(store_id) = store_id else {
                yield SnapshotResponse {
                    status: SnapshotStatus::Error as i32,
                    message: "client error: header missing destination replica".into(),
                };
                return;
            };
            let Some(handler) = handlers.lookup(store_id) else {
                warn!(store = %store_id, "unable to accept raft snapshot: no handler registered");
                yield SnapshotResponse {
                    status: SnapshotStatus::Error as i32,
                    message: store_not_found_error(store_id).message,
                };
                return;
            };

            let mut chunk = first;
            loop {
                match handler.handle_snapshot(chunk).await {
                    Ok(SnapshotOutcome::Continue) => {}
                    Ok(SnapshotOutcome::Done(status, message)) => {
                        yield SnapshotResponse { status: status as i32, message };
                        return;
                    }
                    Err(e) => {
                        yield SnapshotResponse { status: SnapshotStatus::Error as i32, message: e };
                        return;
                    }
                }
                chunk = tokio::select! {
                    () = shutdown.cancelled() => return,
                    next = inbound.next() => match next {
                        Some(next) => next?,
                        None => return,
                    },
                };
            }
        };

        Ok(Response::new(Box::pin(output)))
    }
}
