//! Inbound handler table (C5).
//!
//! Consensus stores register themselves here to receive requests addressed
//! to them; the inbound server endpoints (C8) look handlers up by
//! `StoreId` as each request or snapshot chunk arrives.

use async_trait::async_trait;
use raft_proto::{RaftMessageRequest, RaftMessageResponse, SnapshotRequest, StoreId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

/// A handle back onto the stream that carried a request, letting a handler
/// reply asynchronously instead of through its `Result`. Cloneable so a
/// handler can hand it off to whatever task actually produces the response.
#[derive(Clone)]
pub struct ResponseSink {
    tx: mpsc::Sender<Result<RaftMessageResponse, tonic::Status>>,
    req: RaftMessageRequest,
}

impl ResponseSink {
    pub(crate) fn new(
        tx: mpsc::Sender<Result<RaftMessageResponse, tonic::Status>>,
        req: RaftMessageRequest,
    ) -> Self {
        Self { tx, req }
    }

    /// Sends an error response for the request this sink was handed out
    /// for, reversing `from`/`to` the same way the synchronous path does.
    /// Returns `Err` if the stream has already closed.
    pub async fn send_error(&self, message: String) -> Result<(), String> {
        self.tx
            .send(Ok(raft_proto::new_response(
                &self.req,
                Some(raft_proto::RaftError { message }),
            )))
            .await
            .map_err(|_| "response stream closed".to_string())
    }
}

/// Implemented by consensus stores that want to receive inbound raft
/// traffic. A store registers one handler under its `StoreId` via
/// [`HandlerTable::listen`].
#[async_trait]
pub trait RaftMessageHandler: Send + Sync {
    /// Handles one inbound request. If `response_stream` is `None` the
    /// handler must process synchronously and report failure through its
    /// `Result`, which the inbound endpoint turns into an error response.
    /// If it is `Some`, the handler may instead process asynchronously and
    /// send its own error directly onto the stream via
    /// [`ResponseSink::send_error`], returning `Ok(())` either way once
    /// it has handed the request off.
    async fn handle_raft_request(
        &self,
        req: RaftMessageRequest,
        response_stream: Option<ResponseSink>,
    ) -> Result<(), String>;

    /// Handles a response to a request this store previously sent, read off
    /// an outbound worker's inbound direction.
    async fn handle_raft_response(&self, resp: RaftMessageResponse) -> Result<(), String>;

    /// Handles one chunk of an inbound snapshot stream, returning the
    /// stream's terminal status once `final_batch` is reached. Called once
    /// per chunk with the accumulated header from the stream's first chunk.
    async fn handle_snapshot(&self, chunk: SnapshotRequest) -> Result<SnapshotOutcome, String>;
}

/// Result of feeding one chunk of a snapshot stream to a handler.
pub enum SnapshotOutcome {
    /// More chunks are expected; no response should be written yet.
    Continue,
    /// The snapshot stream is complete; write this response and close.
    Done(raft_proto::SnapshotStatus, String),
}

/// Registry mapping `StoreId` to the handler currently listening for it.
/// Guarded by its own lock, independent of the outbound registries in
/// [`crate::outbound::OutboundRegistry`], since inbound dispatch must never
/// block on outbound queue contention.
#[derive(Default)]
pub struct HandlerTable {
    handlers: RwLock<HashMap<StoreId, Arc<dyn RaftMessageHandler>>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` to receive traffic addressed to `store_id`,
    /// replacing any handler previously registered for that store.
    pub fn listen(&self, store_id: StoreId, handler: Arc<dyn RaftMessageHandler>) {
        self.handlers.write().unwrap().insert(store_id, handler);
    }

    /// Unregisters the handler for `store_id`, if one is registered.
    pub fn stop(&self, store_id: StoreId) {
        self.handlers.write().unwrap().remove(&store_id);
    }

    pub fn lookup(&self, store_id: StoreId) -> Option<Arc<dyn RaftMessageHandler>> {
        self.handlers.read().unwrap().get(&store_id).cloned()
    }
}
