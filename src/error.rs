//! Error types for the transport's recoverable failure paths.
//!
//! Caller-contract violations (the `SendAsync` preconditions) are not
//! modeled here -- they `panic!`, matching the original's `panic()` calls.

/// Failure establishing or maintaining an outbound connection to a
/// destination. Always recoverable: the next `SendAsync` to the same
/// destination starts a fresh worker.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("resolving address: {0}")]
    Resolve(String),
    #[error("dialing peer: {0}")]
    Dial(#[from] tonic::transport::Error),
    #[error("opening stream: {0}")]
    Stream(#[from] tonic::Status),
}

/// Failure inside a running outbound worker's send/receive loop.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error("stream send failed: {0}")]
    Send(#[from] tonic::Status),
    #[error("inbound response handler returned an error: {0}")]
    Handler(String),
}

/// Failure sending a snapshot. Never feeds back into the destination's
/// circuit breaker -- see `SendSnapshot`'s design note on why.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotSendError {
    #[error("resolving address: {0}")]
    Resolve(String),
    #[error("dialing peer: {0}")]
    Dial(#[from] tonic::transport::Error),
    #[error("snapshot stream error: {0}")]
    Stream(#[from] tonic::Status),
    #[error("transport is shutting down")]
    ShuttingDown,
}
