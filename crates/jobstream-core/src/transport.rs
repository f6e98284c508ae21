//! Transport seam.
//!
//! The engine never talks to the network itself. Everything it needs from the
//! backend (request/response RPCs plus a push subscription) goes through
//! [`JobTransport`], so the RPC client can be swapped for an in-memory fake in
//! tests or a recorded session in the CLI.

use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use jobstream_types::{
    ArtifactSet, JobId, JobSpec, JobState, PushMessage, SubscribeRequest, TestCaseMeta,
};

/// Push messages for one subscription. The stream ending means the
/// connection dropped.
pub type PushStream = BoxStream<'static, PushMessage>;

/// Error categories for transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection could not be established or was lost.
    Connection,
    /// Request timed out.
    Timeout,
    /// The backend answered with an error.
    Rpc,
    /// A payload could not be decoded.
    Decode,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Connection => write!(f, "connection"),
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::Rpc => write!(f, "rpc"),
            TransportErrorKind::Decode => write!(f, "decode"),
        }
    }
}

/// Structured transport error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    /// One-line summary suitable for the error banner.
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connection, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn rpc(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Rpc, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Decode, message)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TransportError {}

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Request/response plus server-push primitives of the job backend.
#[async_trait]
pub trait JobTransport: Send + Sync {
    /// Opens a subscription. Messages arrive on the returned stream until the
    /// connection drops.
    async fn subscribe(&self, request: SubscribeRequest) -> TransportResult<PushStream>;

    async fn unsubscribe(&self, job_id: &JobId) -> TransportResult<()>;

    async fn get_state(&self, job_id: &JobId) -> TransportResult<JobState>;

    async fn get_artifacts(&self, job_id: &JobId, names: &[String])
    -> TransportResult<ArtifactSet>;

    /// Test listing for the read-only tests panel; the engine itself does not
    /// consume it.
    async fn get_tests(&self, job_id: &JobId) -> TransportResult<Vec<TestCaseMeta>>;

    async fn cancel(&self, job_id: &JobId) -> TransportResult<()>;

    async fn create(&self, spec: &JobSpec) -> TransportResult<JobId>;

    async fn start(&self, job_id: &JobId) -> TransportResult<()>;
}
