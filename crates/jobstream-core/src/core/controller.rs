//! Job creation, continuation and activation.
//!
//! The controller owns the background tasks of the active job. Activating a
//! job cancels the previous job's tasks (they unsubscribe on their own) and
//! spawns a fresh stream loop and status poller.

use std::sync::Arc;

use jobstream_types::{JobId, JobSpec, JobStatus};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::poller::{PollSettings, run_status_poller};
use crate::core::session::run_stream_loop;
use crate::core::view::{JobRun, JobView};
use crate::transcript::Message;
use crate::transport::{JobTransport, TransportResult};

struct ActiveJob {
    job_id: JobId,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

pub struct JobController {
    view: JobView,
    transport: Arc<dyn JobTransport>,
    config: Config,
    /// Problem statement of the initial run, reused for continuations.
    problem: Option<String>,
    active: Option<ActiveJob>,
}

impl JobController {
    pub fn new(view: JobView, transport: Arc<dyn JobTransport>, config: Config) -> Self {
        Self {
            view,
            transport,
            config,
            problem: None,
            active: None,
        }
    }

    pub fn view(&self) -> &JobView {
        &self.view
    }

    pub fn active_job(&self) -> Option<&JobId> {
        self.active.as_ref().map(|a| &a.job_id)
    }

    /// Makes `job_id` active and starts its stream loop and status poller.
    /// Must be called inside a tokio runtime.
    pub fn activate(&mut self, job_id: JobId) {
        self.deactivate();
        self.view.activate(&job_id);

        let cancel = CancellationToken::new();
        let stream = tokio::spawn(run_stream_loop(
            self.view.clone(),
            Arc::clone(&self.transport),
            job_id.clone(),
            self.config.stream.resubscribe_backoff(),
            cancel.clone(),
        ));
        let poller = tokio::spawn(run_status_poller(
            self.view.clone(),
            Arc::clone(&self.transport),
            job_id.clone(),
            PollSettings::from_config(&self.config),
            cancel.clone(),
        ));

        info!(job_id = %job_id, "Job activated");
        self.active = Some(ActiveJob {
            job_id,
            cancel,
            tasks: vec![stream, poller],
        });
    }

    /// Cancels the active job's tasks without waiting for them.
    pub fn deactivate(&mut self) {
        if let Some(active) = self.active.take() {
            debug!(job_id = %active.job_id, "Deactivating job");
            active.cancel.cancel();
        }
    }

    /// Cancels the active job's tasks and waits until they have stopped.
    pub async fn shutdown(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.cancel.cancel();
        for task in active.tasks {
            if let Err(err) = task.await {
                warn!(job_id = %active.job_id, error = %err, "Job task ended abnormally");
            }
        }
    }

    /// Creates, starts and activates the first job of the session.
    ///
    /// Runs at most once; a failed attempt releases the guard so it can be
    /// retried. Failures are reported in the transcript and the error
    /// banner, and `None` is returned.
    pub async fn start_initial_run(
        &mut self,
        problem: &str,
        seed_main_cpp: Option<String>,
    ) -> Option<JobId> {
        if !self.view.try_begin_initial_run() {
            debug!("Initial run already started");
            return None;
        }

        let spec = JobSpec {
            problem: problem.to_string(),
            seed_main_cpp: seed_main_cpp.clone(),
            ..JobSpec::default()
        };
        match self.create_and_start(&spec).await {
            Ok(job_id) => {
                self.problem = Some(problem.to_string());
                self.view.record_run(JobRun {
                    status: Some(JobStatus::Created),
                    seed_main_cpp,
                    ..JobRun::new(job_id.clone())
                });
                self.activate(job_id.clone());
                Some(job_id)
            }
            Err(err) => {
                self.view.rollback_initial_run();
                self.report_failure("创建任务失败", &err.to_string());
                None
            }
        }
    }

    /// Sends a follow-up: records the user turn and starts a continuation
    /// job seeded with the active job's latest `main.cpp`.
    pub async fn send_message(&mut self, text: &str) -> Option<JobId> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.view.push_message(Message::user(text));

        let parent = self.view.active_job();
        let seed = parent
            .as_ref()
            .and_then(|job_id| self.view.latest_main_cpp(job_id));
        let spec = JobSpec {
            problem: self.problem.clone().unwrap_or_default(),
            seed_main_cpp: seed.clone(),
            user_message: Some(text.to_string()),
            parent_job_id: parent.clone(),
            ..JobSpec::default()
        };

        match self.create_and_start(&spec).await {
            Ok(job_id) => {
                self.view.record_run(JobRun {
                    user_message: Some(text.to_string()),
                    status: Some(JobStatus::Created),
                    seed_main_cpp: seed,
                    parent_job_id: parent,
                    ..JobRun::new(job_id.clone())
                });
                self.activate(job_id.clone());
                Some(job_id)
            }
            Err(err) => {
                self.report_failure("发送失败", &err.to_string());
                None
            }
        }
    }

    /// Requests cancellation of the active job. The poller observes the
    /// resulting terminal status.
    pub async fn cancel_job(&self) -> bool {
        let Some(job_id) = self.active_job() else {
            return false;
        };
        match self.transport.cancel(job_id).await {
            Ok(()) => {
                info!(job_id = %job_id, "Cancellation requested");
                true
            }
            Err(err) => {
                warn!(job_id = %job_id, error = %err, "Cancel failed");
                self.view.set_error(format!("取消任务失败：{err}"));
                false
            }
        }
    }

    async fn create_and_start(&self, spec: &JobSpec) -> TransportResult<JobId> {
        let job_id = self.transport.create(spec).await?;
        debug!(job_id = %job_id, parent = ?spec.parent_job_id, "Job created");
        self.transport.start(&job_id).await?;
        Ok(job_id)
    }

    fn report_failure(&self, what: &str, error: &str) {
        warn!(error, "{what}");
        let text = format!("{what}：{error}");
        self.view.push_message(Message::assistant(text.clone()));
        self.view.set_error(text);
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        self.deactivate();
    }
}
