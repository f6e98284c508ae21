//! Status poller and finalizer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use jobstream_types::JobId;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::view::JobView;
use crate::transport::{JobTransport, TransportError, TransportResult};

/// Banner prefix for failed status polls.
pub const POLL_ERROR_PREFIX: &str = "状态查询失败：";

/// Banner prefix for a failed artifact fetch.
pub const ARTIFACT_ERROR_PREFIX: &str = "获取结果失败：";

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    /// Upper bound for one `get_state` or `get_artifacts` call.
    pub request_timeout: Duration,
    pub artifact_names: Vec<String>,
}

impl PollSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.stream.poll_interval(),
            request_timeout: config.stream.request_timeout(),
            artifact_names: config.artifacts.names.clone(),
        }
    }
}

async fn with_timeout<T>(
    limit: Duration,
    request: impl Future<Output = TransportResult<T>>,
) -> TransportResult<T> {
    tokio::time::timeout(limit, request)
        .await
        .unwrap_or_else(|_| {
            Err(TransportError::timeout(format!(
                "no response within {}ms",
                limit.as_millis()
            )))
        })
}

/// Polls job status until it is terminal, then finalizes the job once and
/// applies its artifacts.
///
/// The first poll happens immediately. Poll failures are surfaced as the
/// error banner, polling continues and the next successful poll clears it.
pub async fn run_status_poller(
    view: JobView,
    transport: Arc<dyn JobTransport>,
    job_id: JobId,
    settings: PollSettings,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(job_id = %job_id, "Status poller cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = with_timeout(settings.request_timeout, transport.get_state(&job_id)) => result,
        };
        match result {
            Ok(state) => {
                view.clear_error_with_prefix(POLL_ERROR_PREFIX);
                let status = state.status.clone();
                if view.apply_state(&job_id, state) {
                    info!(job_id = %job_id, status = %status, "Job reached terminal status");
                    break;
                }
            }
            Err(err) => {
                warn!(job_id = %job_id, kind = %err.kind, error = %err, "Status poll failed");
                view.set_error(format!("{POLL_ERROR_PREFIX}{err}"));
            }
        }
    }

    if !view.try_finalize(&job_id) {
        debug!(job_id = %job_id, "Job already finalized");
        return;
    }

    let artifacts = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        result = with_timeout(
            settings.request_timeout,
            transport.get_artifacts(&job_id, &settings.artifact_names),
        ) => result,
    };
    match artifacts {
        Ok(set) => view.apply_artifacts(&job_id, &set),
        Err(err) => {
            warn!(job_id = %job_id, kind = %err.kind, error = %err, "Artifact fetch failed");
            view.set_error(format!("{ARTIFACT_ERROR_PREFIX}{err}"));
        }
    }
}
