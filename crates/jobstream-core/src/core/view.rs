//! Shared job view.
//!
//! [`JobView`] is the one piece of state the stream loop, the status poller
//! and the UI share. Every operation takes the lock, performs a complete
//! replace-or-append and releases it; nothing awaits while holding it, so a
//! [`ViewSnapshot`] is always internally consistent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use jobstream_types::{
    ArtifactSet, JobId, JobState, JobStatus, PushMessage, StreamName, SubscribeRequest,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::classify::TokenStreamItem;
use crate::config::Config;
use crate::core::events::Notification;
use crate::core::live::{IngestOutcome, JobStream};
use crate::feedback::{
    MAIN_CPP, REPORT_JSON, Report, SOLUTION_JSON, Solution, derive_diff_text, synthesize_feedback,
};
use crate::text::{DiffLine, parse_unified_diff};
use crate::transcript::{
    Message, Transcript, feedback_key, result_key, token_key, visible_messages,
};
use crate::vocab::{StatusMeta, status_meta};

/// One backend execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRun {
    pub job_id: JobId,
    pub created_at: DateTime<Utc>,
    pub user_message: Option<String>,
    /// Written by the poller only.
    pub status: Option<JobStatus>,
    pub seed_main_cpp: Option<String>,
    pub parent_job_id: Option<JobId>,
}

impl JobRun {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            created_at: Utc::now(),
            user_message: None,
            status: None,
            seed_main_cpp: None,
            parent_job_id: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct JobArtifacts {
    main_cpp: Option<String>,
    report: Option<Report>,
    diff_text: Option<String>,
}

/// Everything the UI reads, copied under one lock.
#[derive(Debug, Clone, Serialize)]
pub struct ViewSnapshot {
    pub active_job: Option<JobId>,
    pub visible_messages: Vec<Message>,
    pub status_meta: StatusMeta,
    pub main_cpp: Option<String>,
    pub diff_text: Option<String>,
    pub has_diff: bool,
    pub diff_lines: Vec<DiffLine>,
    pub report: Option<Value>,
    pub error_text: Option<String>,
}

#[derive(Debug)]
struct ViewState {
    transcript: Transcript,
    runs: Vec<JobRun>,
    active_job: Option<JobId>,
    streams: HashMap<JobId, JobStream>,
    states: HashMap<JobId, JobState>,
    artifacts: HashMap<JobId, JobArtifacts>,
    error_text: Option<String>,
    initial_run_started: bool,
    max_terminal_chars: usize,
}

impl ViewState {
    fn stream_mut(&mut self, job_id: &JobId) -> &mut JobStream {
        let max = self.max_terminal_chars;
        self.streams
            .entry(job_id.clone())
            .or_insert_with(|| JobStream::new(max))
    }

    fn run(&self, job_id: &JobId) -> Option<&JobRun> {
        self.runs.iter().find(|run| &run.job_id == job_id)
    }

    fn ingest(&mut self, notification: Notification) -> IngestOutcome {
        let job_id = notification.job_id().clone();
        let stream = self.stream_mut(&job_id);
        let outcome = match notification {
            Notification::AgentStatus { offset, event, .. } => {
                stream.apply_agent_status(offset, event)
            }
            Notification::Terminal { offset, chunk, .. } => stream.apply_terminal(offset, &chunk),
        };
        if outcome == IngestOutcome::Applied {
            self.materialize_live(&job_id, true);
        }
        outcome
    }

    /// Writes the job's current stream text into its live slot.
    fn materialize_live(&mut self, job_id: &JobId, streaming: bool) {
        let Some(stream) = self.streams.get(job_id) else {
            return;
        };
        let text = stream.stream_text();
        let key = token_key(job_id);
        if text.trim().is_empty() {
            if !streaming && let Some(existing) = self.transcript.get(&key).cloned() {
                self.transcript.upsert(existing.with_streaming(false));
            }
            return;
        }
        self.transcript.upsert(
            Message::assistant(text)
                .for_job(job_id.clone())
                .keyed(key)
                .with_streaming(streaming),
        );
    }

    fn finalize(&mut self, job_id: &JobId) -> bool {
        if !self.stream_mut(job_id).try_seal() {
            return false;
        }
        self.materialize_live(job_id, false);

        let answer = self
            .streams
            .get(job_id)
            .map(|s| s.live().result().trim().to_string())
            .unwrap_or_default();
        if !answer.is_empty() {
            self.transcript.upsert(
                Message::assistant(answer)
                    .for_job(job_id.clone())
                    .keyed(result_key(job_id)),
            );
        }
        true
    }

    fn apply_artifacts(&mut self, job_id: &JobId, set: &ArtifactSet) {
        let seed = self.run(job_id).and_then(|r| r.seed_main_cpp.clone());
        let main_cpp = set.get(MAIN_CPP).map(str::to_string);

        let report = match set.get(REPORT_JSON).map(Report::parse).transpose() {
            Ok(report) => report,
            Err(err) => {
                let message = format!("{err:#}");
                warn!(job_id = %job_id, error = %message, "Ignoring malformed report");
                self.error_text = Some(message);
                None
            }
        };
        let solution = match set.get(SOLUTION_JSON).map(Solution::parse).transpose() {
            Ok(solution) => solution,
            Err(err) => {
                let message = format!("{err:#}");
                warn!(job_id = %job_id, error = %message, "Ignoring malformed solution");
                self.error_text = Some(message);
                None
            }
        };

        let diff_text = derive_diff_text(solution.as_ref(), seed.as_deref(), main_cpp.as_deref());
        if let Some(solution) = &solution {
            let text = synthesize_feedback(solution, report.as_ref());
            if !text.is_empty() {
                self.transcript.upsert(
                    Message::assistant(text)
                        .for_job(job_id.clone())
                        .keyed(feedback_key(job_id)),
                );
            }
        }

        let entry = self.artifacts.entry(job_id.clone()).or_default();
        entry.main_cpp = main_cpp;
        entry.report = report;
        entry.diff_text = diff_text;
    }
}

/// Cloneable handle to the shared view state.
#[derive(Debug, Clone)]
pub struct JobView {
    inner: Arc<Mutex<ViewState>>,
}

impl JobView {
    pub fn new(max_terminal_chars: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ViewState {
                transcript: Transcript::default(),
                runs: Vec::new(),
                active_job: None,
                streams: HashMap::new(),
                states: HashMap::new(),
                artifacts: HashMap::new(),
                error_text: None,
                initial_run_started: false,
                max_terminal_chars,
            })),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.stream.max_terminal_chars)
    }

    fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes `job_id` the active job with a fresh stream state.
    pub fn activate(&self, job_id: &JobId) {
        let mut state = self.lock();
        let max = state.max_terminal_chars;
        state.streams.insert(job_id.clone(), JobStream::new(max));
        state.active_job = Some(job_id.clone());
        state.error_text = None;
    }

    pub fn active_job(&self) -> Option<JobId> {
        self.lock().active_job.clone()
    }

    pub fn push_message(&self, message: Message) {
        self.lock().transcript.upsert(message);
    }

    pub fn record_run(&self, run: JobRun) {
        let mut state = self.lock();
        match state.runs.iter_mut().find(|r| r.job_id == run.job_id) {
            Some(existing) => *existing = run,
            None => state.runs.push(run),
        }
    }

    pub fn run(&self, job_id: &JobId) -> Option<JobRun> {
        self.lock().run(job_id).cloned()
    }

    pub fn runs(&self) -> Vec<JobRun> {
        self.lock().runs.clone()
    }

    /// Claims the one-shot initial run. Returns false if already claimed.
    pub fn try_begin_initial_run(&self) -> bool {
        let mut state = self.lock();
        if state.initial_run_started {
            return false;
        }
        state.initial_run_started = true;
        true
    }

    pub fn rollback_initial_run(&self) {
        self.lock().initial_run_started = false;
    }

    /// Decodes and ingests one push message. Malformed payloads are logged
    /// and dropped; `None` means nothing was ingested.
    pub fn handle_push(&self, message: &PushMessage) -> Option<IngestOutcome> {
        match Notification::decode(message) {
            Ok(Some(notification)) => Some(self.handle_notification(notification)),
            Ok(None) => {
                debug!(method = %message.method, "Ignoring push method");
                None
            }
            Err(err) => {
                warn!(method = %message.method, error = %err, "Skipping malformed push message");
                None
            }
        }
    }

    pub fn handle_notification(&self, notification: Notification) -> IngestOutcome {
        self.lock().ingest(notification)
    }

    /// Subscription request resuming from the highest offsets seen.
    pub fn subscribe_request(&self, job_id: &JobId) -> SubscribeRequest {
        let state = self.lock();
        let stream = state.streams.get(job_id);
        SubscribeRequest {
            job_id: job_id.clone(),
            streams: vec![StreamName::AgentStatus, StreamName::Terminal],
            agent_status_offset: stream
                .and_then(JobStream::agent_status_offset)
                .unwrap_or(0),
            terminal_offset: stream.and_then(JobStream::terminal_offset).unwrap_or(0),
        }
    }

    /// Stores a polled state and updates the run. Returns true when the
    /// status is terminal.
    pub fn apply_state(&self, job_id: &JobId, job_state: JobState) -> bool {
        let mut state = self.lock();
        let terminal = job_state.status.is_terminal();
        if let Some(run) = state.runs.iter_mut().find(|r| &r.job_id == job_id) {
            run.status = Some(job_state.status.clone());
        }
        state.states.insert(job_id.clone(), job_state);
        terminal
    }

    /// Seals the job and writes its final messages. Only the first caller
    /// gets true; later calls change nothing.
    pub fn try_finalize(&self, job_id: &JobId) -> bool {
        self.lock().finalize(job_id)
    }

    pub fn is_sealed(&self, job_id: &JobId) -> bool {
        self.lock()
            .streams
            .get(job_id)
            .is_some_and(JobStream::is_sealed)
    }

    /// Stores fetched artifacts and upserts the feedback message.
    pub fn apply_artifacts(&self, job_id: &JobId, set: &ArtifactSet) {
        self.lock().apply_artifacts(job_id, set);
    }

    /// Latest `main.cpp` of a job, falling back to its seed.
    pub fn latest_main_cpp(&self, job_id: &JobId) -> Option<String> {
        let state = self.lock();
        state
            .artifacts
            .get(job_id)
            .and_then(|a| a.main_cpp.clone())
            .or_else(|| state.run(job_id).and_then(|r| r.seed_main_cpp.clone()))
    }

    pub fn set_error(&self, message: impl Into<String>) {
        self.lock().error_text = Some(message.into());
    }

    /// Clears the banner only when it was set with `prefix`, so one loop's
    /// recovery does not hide another loop's failure.
    pub fn clear_error_with_prefix(&self, prefix: &str) {
        let mut state = self.lock();
        if state
            .error_text
            .as_deref()
            .is_some_and(|text| text.starts_with(prefix))
        {
            state.error_text = None;
        }
    }

    pub fn token_stream(&self, job_id: &JobId) -> Vec<TokenStreamItem> {
        self.lock()
            .streams
            .get(job_id)
            .map(JobStream::token_stream)
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        let state = self.lock();
        let active = state.active_job.as_ref();

        let job_state = active.and_then(|j| state.states.get(j));
        let status = job_state
            .map(|s| &s.status)
            .or_else(|| active.and_then(|j| state.run(j)).and_then(|r| r.status.as_ref()));
        let stage = active
            .and_then(|j| state.streams.get(j))
            .and_then(JobStream::last_stage)
            .or_else(|| job_state.and_then(|s| s.stage.as_deref()));

        let artifacts = active.and_then(|j| state.artifacts.get(j));
        let main_cpp = artifacts
            .and_then(|a| a.main_cpp.clone())
            .or_else(|| active.and_then(|j| state.run(j)).and_then(|r| r.seed_main_cpp.clone()));
        let diff_text = artifacts.and_then(|a| a.diff_text.clone());
        let diff_lines = diff_text
            .as_deref()
            .map(parse_unified_diff)
            .unwrap_or_default();

        ViewSnapshot {
            active_job: active.cloned(),
            visible_messages: visible_messages(state.transcript.messages(), active),
            status_meta: status_meta(status, stage),
            main_cpp,
            has_diff: !diff_lines.is_empty(),
            diff_text,
            diff_lines,
            report: artifacts.and_then(|a| a.report.as_ref().map(|r| r.raw.clone())),
            error_text: state.error_text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use jobstream_types::AgentStatusItem;
    use serde_json::json;

    use super::*;
    use crate::core::events::METHOD_AGENT_STATUS;
    use crate::transcript::Role;
    use crate::vocab::Lifecycle;

    fn status_push(job: &str, offset: u64, item: serde_json::Value) -> PushMessage {
        PushMessage::new(
            METHOD_AGENT_STATUS,
            json!({"job_id": job, "offset": offset, "item": item}),
        )
    }

    fn active_view(job: &str) -> (JobView, JobId) {
        let view = JobView::new(10_000);
        let job_id = JobId::from(job);
        view.record_run(JobRun::new(job_id.clone()));
        view.activate(&job_id);
        (view, job_id)
    }

    #[test]
    fn test_push_materializes_single_live_slot() {
        let (view, job) = active_view("j1");
        for seq in 1..=3 {
            view.handle_push(&status_push(
                "j1",
                seq,
                json!({"seq": seq, "kind": "command_output_delta", "delta": format!("line{seq}\n")}),
            ));
        }

        let snapshot = view.snapshot();
        assert_eq!(snapshot.visible_messages.len(), 1);
        let live = &snapshot.visible_messages[0];
        assert_eq!(live.message_key.as_deref(), Some("job-token-j1"));
        assert!(live.streaming);
        assert_eq!(live.content, "【执行输出】\nline1\nline2\nline3");
        assert_eq!(view.subscribe_request(&job).agent_status_offset, 3);
    }

    #[test]
    fn test_malformed_push_is_skipped() {
        let (view, _) = active_view("j1");
        assert_eq!(
            view.handle_push(&PushMessage::new(METHOD_AGENT_STATUS, json!({"item": 1}))),
            None
        );
        assert!(view.snapshot().visible_messages.is_empty());
    }

    #[test]
    fn test_finalize_then_late_event() {
        let (view, job) = active_view("j1");
        view.handle_push(&status_push(
            "j1",
            1,
            json!({"seq": 1, "kind": "agent_message_delta", "delta": "answer"}),
        ));
        view.handle_push(&status_push(
            "j1",
            2,
            json!({"seq": 2, "kind": "reasoning_summary_delta", "delta": "pending thought"}),
        ));

        assert!(view.try_finalize(&job));
        assert!(!view.try_finalize(&job));
        assert_eq!(
            view.handle_push(&status_push(
                "j1",
                3,
                json!({"seq": 3, "kind": "command_output_delta", "delta": "late"}),
            )),
            Some(IngestOutcome::Sealed)
        );

        let snapshot = view.snapshot();
        let live = &snapshot.visible_messages[0];
        assert!(!live.streaming);
        assert_eq!(live.content, "【思考】\npending thought");
        let answer = &snapshot.visible_messages[1];
        assert_eq!(answer.message_key.as_deref(), Some("job-result-j1"));
        assert_eq!(answer.content, "answer");
    }

    #[test]
    fn test_finalize_without_events_seals() {
        let (view, job) = active_view("j1");
        assert!(view.try_finalize(&job));
        assert!(view.is_sealed(&job));
        assert!(view.snapshot().visible_messages.is_empty());
    }

    #[test]
    fn test_artifacts_produce_one_feedback_and_diff() {
        let (view, job) = active_view("j1");
        view.record_run(JobRun {
            seed_main_cpp: Some("int a;\n".to_string()),
            ..JobRun::new(job.clone())
        });
        let mut set = ArtifactSet::default();
        set.items
            .insert(MAIN_CPP.to_string(), Some("int b;\n".to_string()));
        set.items.insert(
            SOLUTION_JSON.to_string(),
            Some(r#"{"solved": true, "feedback": "fixed"}"#.to_string()),
        );
        set.items.insert(REPORT_JSON.to_string(), None);

        view.apply_artifacts(&job, &set);
        view.apply_artifacts(&job, &set);

        let snapshot = view.snapshot();
        let feedback: Vec<&Message> = snapshot
            .visible_messages
            .iter()
            .filter(|m| m.message_key.as_deref() == Some("job-feedback-j1"))
            .collect();
        assert_eq!(feedback.len(), 1);
        assert_eq!(feedback[0].role, Role::Assistant);
        assert_eq!(feedback[0].content, "【结果】已通过\n\nfixed");
        assert_eq!(snapshot.main_cpp.as_deref(), Some("int b;\n"));
        assert!(snapshot.has_diff);
        assert!(snapshot.report.is_none());
        assert_eq!(view.latest_main_cpp(&job).as_deref(), Some("int b;\n"));
    }

    #[test]
    fn test_malformed_solution_sets_error() {
        let (view, job) = active_view("j1");
        let mut set = ArtifactSet::default();
        set.items
            .insert(SOLUTION_JSON.to_string(), Some("{broken".to_string()));
        view.apply_artifacts(&job, &set);

        let snapshot = view.snapshot();
        assert!(
            snapshot
                .error_text
                .is_some_and(|e| e.contains("solution.json"))
        );
        assert!(snapshot.visible_messages.is_empty());
    }

    #[test]
    fn test_status_meta_follows_state_and_stage() {
        let (view, job) = active_view("j1");
        assert_eq!(view.snapshot().status_meta.lifecycle, Lifecycle::Idle);

        let state: JobState = serde_json::from_value(json!({"status": "running"})).unwrap();
        assert!(!view.apply_state(&job, state));
        let item: AgentStatusItem =
            serde_json::from_value(json!({"seq": 1, "stage": "compile"})).unwrap();
        view.handle_notification(Notification::AgentStatus {
            job_id: job.clone(),
            offset: None,
            event: item.into(),
        });

        let meta = view.snapshot().status_meta;
        assert_eq!(meta.lifecycle, Lifecycle::Running);
        assert_eq!(meta.phase.as_deref(), Some("编译"));
        assert_eq!(
            view.run(&job).and_then(|r| r.status),
            Some(JobStatus::Running)
        );

        let state: JobState = serde_json::from_value(json!({"status": "succeeded"})).unwrap();
        assert!(view.apply_state(&job, state));
        assert_eq!(view.snapshot().status_meta.lifecycle, Lifecycle::Succeeded);
    }

    #[test]
    fn test_activation_resets_stream_and_scopes_messages() {
        let (view, first) = active_view("j1");
        view.handle_push(&status_push(
            "j1",
            5,
            json!({"seq": 1, "kind": "command_output_delta", "delta": "x"}),
        ));
        view.push_message(Message::user("follow up"));

        let second = JobId::from("j2");
        view.activate(&second);
        let snapshot = view.snapshot();
        assert_eq!(snapshot.visible_messages.len(), 1);
        assert_eq!(snapshot.visible_messages[0].content, "follow up");

        view.activate(&first);
        assert_eq!(view.subscribe_request(&first).agent_status_offset, 0);
    }

    #[test]
    fn test_initial_run_guard() {
        let view = JobView::new(100);
        assert!(view.try_begin_initial_run());
        assert!(!view.try_begin_initial_run());
        view.rollback_initial_run();
        assert!(view.try_begin_initial_run());
    }

    #[test]
    fn test_error_banner_cleared_only_by_matching_prefix() {
        let view = JobView::new(100);
        view.set_error("状态查询失败：timeout");
        view.clear_error_with_prefix("实时连接失败：");
        assert_eq!(
            view.snapshot().error_text.as_deref(),
            Some("状态查询失败：timeout")
        );

        view.clear_error_with_prefix("状态查询失败：");
        assert_eq!(view.snapshot().error_text, None);
    }
}
