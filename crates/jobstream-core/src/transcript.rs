//! Transcript messages and keyed-slot reconciliation.
//!
//! Unkeyed messages are append-only. Keyed messages are mutable slots: an
//! upsert with an existing key replaces that message in place, so a job's
//! live stream, final answer and feedback each occupy exactly one position.

use std::collections::HashMap;

use jobstream_types::JobId;
use serde::Serialize;

const TOKEN_KEY_PREFIX: &str = "job-token-";
const FEEDBACK_KEY_PREFIX: &str = "job-feedback-";
const RESULT_KEY_PREFIX: &str = "job-result-";

/// Keys of channels that are recorded but never shown.
const INTERNAL_KEY_PREFIXES: &[&str] = &["job-stream-raw-", "job-final-stream-"];

/// Fixed notices older backends posted on job creation.
const LEGACY_CREATED_NOTICES: &[&str] = &["已创建任务", "任务已创建", "Job created", "job created"];

/// Live streaming slot of a job.
pub fn token_key(job_id: &JobId) -> String {
    format!("{TOKEN_KEY_PREFIX}{job_id}")
}

/// Synthesized feedback slot of a job.
pub fn feedback_key(job_id: &JobId) -> String {
    format!("{FEEDBACK_KEY_PREFIX}{job_id}")
}

/// Final agent answer slot of a job.
pub fn result_key(job_id: &JobId) -> String {
    format!("{RESULT_KEY_PREFIX}{job_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_key: Option<String>,
    /// True while the slot is still receiving stream updates.
    pub streaming: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            job_id: None,
            message_key: None,
            streaming: false,
        }
    }

    #[must_use]
    pub fn for_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    #[must_use]
    pub fn keyed(mut self, key: impl Into<String>) -> Self {
        self.message_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    fn is_internal(&self) -> bool {
        self.message_key
            .as_deref()
            .is_some_and(|key| INTERNAL_KEY_PREFIXES.iter().any(|p| key.starts_with(p)))
    }

    fn is_legacy_notice(&self) -> bool {
        self.role == Role::Assistant
            && LEGACY_CREATED_NOTICES
                .iter()
                .any(|notice| self.content.contains(notice))
    }
}

/// Ordered message list of the session.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Appends an unkeyed message, or replaces the first message with the
    /// same key in place (appending when none exists).
    pub fn upsert(&mut self, message: Message) {
        let existing = message.message_key.as_deref().and_then(|key| {
            self.messages
                .iter()
                .position(|m| m.message_key.as_deref() == Some(key))
        });
        match existing {
            Some(idx) => self.messages[idx] = message,
            None => self.messages.push(message),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Message> {
        self.messages
            .iter()
            .find(|m| m.message_key.as_deref() == Some(key))
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Messages the user should see for `active_job`.
///
/// Drops internal channels, legacy creation notices and messages scoped to
/// other jobs (job-less messages always pass), then collapses repeated keys:
/// the last occurrence's content is shown at the first occurrence's position.
pub fn visible_messages(all: &[Message], active_job: Option<&JobId>) -> Vec<Message> {
    let mut visible: Vec<Message> = Vec::with_capacity(all.len());
    let mut slots: HashMap<&str, usize> = HashMap::new();

    for message in all {
        if message.is_internal() || message.is_legacy_notice() {
            continue;
        }
        if message
            .job_id
            .as_ref()
            .is_some_and(|job| Some(job) != active_job)
        {
            continue;
        }
        match message.message_key.as_deref() {
            Some(key) => {
                if let Some(&idx) = slots.get(key) {
                    visible[idx] = message.clone();
                } else {
                    slots.insert(key, visible.len());
                    visible.push(message.clone());
                }
            }
            None => visible.push(message.clone()),
        }
    }
    visible
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> JobId {
        JobId::from(id)
    }

    #[test]
    fn test_repeated_upserts_keep_one_slot() {
        let mut transcript = Transcript::default();
        transcript.upsert(Message::user("hi"));
        for n in 0..5 {
            transcript.upsert(
                Message::assistant(format!("v{n}"))
                    .for_job(job("j1"))
                    .keyed(token_key(&job("j1"))),
            );
        }
        transcript.upsert(Message::user("later"));

        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.messages()[1].content, "v4");
        assert_eq!(transcript.messages()[2].content, "later");
    }

    #[test]
    fn test_unkeyed_messages_append() {
        let mut transcript = Transcript::default();
        transcript.upsert(Message::user("same"));
        transcript.upsert(Message::user("same"));
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn test_visible_filters_internal_legacy_and_other_jobs() {
        let active = job("j2");
        let all = vec![
            Message::user("solve this"),
            Message::assistant("old run").for_job(job("j1")),
            Message::assistant("raw")
                .for_job(active.clone())
                .keyed("job-stream-raw-j2"),
            Message::assistant("final raw")
                .for_job(active.clone())
                .keyed("job-final-stream-j2"),
            Message::assistant("已创建任务 j2").for_job(active.clone()),
            Message::assistant("Job created: j2"),
            Message::assistant("thinking").for_job(active.clone()),
        ];

        let visible = visible_messages(&all, Some(&active));
        let contents: Vec<&str> = visible.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["solve this", "thinking"]);
    }

    #[test]
    fn test_no_active_job_hides_job_scoped_messages() {
        let all = vec![
            Message::user("q"),
            Message::assistant("a").for_job(job("j1")),
        ];
        assert_eq!(visible_messages(&all, None).len(), 1);
    }

    #[test]
    fn test_visible_collapses_duplicate_keys_at_first_position() {
        let active = job("j1");
        let key = token_key(&active);
        let all = vec![
            Message::assistant("first")
                .for_job(active.clone())
                .keyed(key.clone()),
            Message::user("between"),
            Message::assistant("second")
                .for_job(active.clone())
                .keyed(key.clone())
                .with_streaming(true),
        ];

        let visible = visible_messages(&all, Some(&active));
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].content, "second");
        assert!(visible[0].streaming);
        assert_eq!(visible[1].content, "between");
    }

    #[test]
    fn test_slot_keys() {
        let id = job("abc");
        assert_eq!(token_key(&id), "job-token-abc");
        assert_eq!(feedback_key(&id), "job-feedback-abc");
        assert_eq!(result_key(&id), "job-result-abc");
    }
}
