//! Job stream reconciliation engine.
//!
//! Turns the push stream and the polled status of a remote coding job into
//! one ordered, de-duplicated transcript. The RPC layer stays behind
//! [`transport::JobTransport`]; everything else (ingestion, buffering,
//! classification, finalization) lives here.

pub mod classify;
pub mod config;
pub mod core;
pub mod feedback;
pub mod logging;
pub mod text;
pub mod transcript;
pub mod transport;
pub mod vocab;

pub use config::Config;
pub use core::controller::JobController;
pub use core::view::{JobView, ViewSnapshot};
