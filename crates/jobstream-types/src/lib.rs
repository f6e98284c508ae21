//! Wire types exchanged with the job transport.
//!
//! Everything in this crate is plain data: request/response payloads for the
//! job RPCs and the raw push messages delivered on a subscription. Validation
//! into engine events happens in `jobstream-core`.

mod job;
mod push;

pub use job::{
    ArtifactSet, JobId, JobSpec, JobState, JobStatus, StreamName, SubscribeRequest, TestCaseMeta,
};
pub use push::{AgentStatusItem, AgentStatusParams, PushMessage, TerminalParams};
