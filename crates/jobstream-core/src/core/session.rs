//! Resubscribing stream loop.
//!
//! One task per active job: subscribe from the highest offsets seen, feed
//! every push message into the [`JobView`] until the stream ends, wait a
//! fixed backoff and subscribe again. The loop has two suspension points
//! (stream consumption and the backoff sleep) and stops at either one when
//! its token is cancelled, unsubscribing on the way out.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use jobstream_types::JobId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::view::JobView;
use crate::transport::{JobTransport, TransportError};

/// Banner prefix for subscription failures.
pub const STREAM_ERROR_PREFIX: &str = "实时连接失败：";

enum AttemptEnd {
    Disconnected { received: usize },
    Failed(TransportError),
}

/// Runs until `cancel` fires. Subscribe failures and disconnects are retried
/// forever with a fixed `backoff`.
pub async fn run_stream_loop(
    view: JobView,
    transport: Arc<dyn JobTransport>,
    job_id: JobId,
    backoff: Duration,
    cancel: CancellationToken,
) {
    info!(job_id = %job_id, "Stream loop started");

    loop {
        let end = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            end = stream_once(&view, transport.as_ref(), &job_id) => end,
        };

        match end {
            AttemptEnd::Disconnected { received } => {
                debug!(job_id = %job_id, received, "Subscription ended, resubscribing");
            }
            AttemptEnd::Failed(err) => {
                warn!(job_id = %job_id, kind = %err.kind, error = %err, "Subscribe failed");
                view.set_error(format!("{STREAM_ERROR_PREFIX}{err}"));
            }
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(backoff) => {}
        }
    }

    if let Err(err) = transport.unsubscribe(&job_id).await {
        warn!(job_id = %job_id, error = %err, "Unsubscribe failed");
    }
    info!(job_id = %job_id, "Stream loop stopped");
}

async fn stream_once(view: &JobView, transport: &dyn JobTransport, job_id: &JobId) -> AttemptEnd {
    let request = view.subscribe_request(job_id);
    debug!(
        job_id = %job_id,
        agent_status_offset = request.agent_status_offset,
        terminal_offset = request.terminal_offset,
        "Subscribing"
    );

    let mut stream = match transport.subscribe(request).await {
        Ok(stream) => stream,
        Err(err) => return AttemptEnd::Failed(err),
    };
    view.clear_error_with_prefix(STREAM_ERROR_PREFIX);

    let mut received = 0;
    while let Some(message) = stream.next().await {
        received += 1;
        view.handle_push(&message);
    }
    AttemptEnd::Disconnected { received }
}
