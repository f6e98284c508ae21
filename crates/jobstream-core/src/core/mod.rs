//! Engine runtime: event decoding, per-job stream state, the shared view and
//! the tasks that feed it.

pub mod controller;
pub mod events;
pub mod live;
pub mod poller;
pub mod reasoning;
pub mod session;
pub mod view;
