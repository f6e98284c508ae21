//! Replay a recorded session through the engine.
//!
//! A session file holds one JSON record per line, tagged by `type`:
//! `activate`, `user`, `push`, `state` or `artifacts`. Blank lines and lines
//! starting with `#` are skipped.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use jobstream_core::Config;
use jobstream_core::core::view::{JobRun, JobView, ViewSnapshot};
use jobstream_core::transcript::{Message, Role};
use jobstream_types::{ArtifactSet, JobId, JobState, PushMessage};
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record {
    Activate {
        job_id: JobId,
        #[serde(default)]
        seed_main_cpp: Option<String>,
        #[serde(default)]
        user_message: Option<String>,
        #[serde(default)]
        parent_job_id: Option<JobId>,
    },
    User {
        content: String,
    },
    Push(PushMessage),
    State {
        job_id: JobId,
        state: JobState,
    },
    Artifacts {
        job_id: JobId,
        items: BTreeMap<String, Option<String>>,
    },
}

fn apply(view: &JobView, record: Record) {
    match record {
        Record::Activate {
            job_id,
            seed_main_cpp,
            user_message,
            parent_job_id,
        } => {
            view.record_run(JobRun {
                seed_main_cpp,
                user_message,
                parent_job_id,
                ..JobRun::new(job_id.clone())
            });
            view.activate(&job_id);
        }
        Record::User { content } => view.push_message(Message::user(content)),
        Record::Push(message) => {
            view.handle_push(&message);
        }
        Record::State { job_id, state } => {
            if view.apply_state(&job_id, state) && view.try_finalize(&job_id) {
                info!(job_id = %job_id, "Job finalized");
            }
        }
        Record::Artifacts { job_id, items } => {
            view.apply_artifacts(&job_id, &ArtifactSet { items });
        }
    }
}

pub fn run(path: &Path, config: &Config, json: bool) -> Result<()> {
    let text = super::read_lossy(path)?;
    let view = JobView::from_config(config);

    let mut records = 0usize;
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let record: Record = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid record", path.display(), idx + 1))?;
        apply(&view, record);
        records += 1;
    }
    debug!(records, "Replay finished");

    let snapshot = view.snapshot();
    if json {
        let out = serde_json::to_string_pretty(&snapshot).context("serialize snapshot")?;
        println!("{out}");
    } else {
        print_transcript(&snapshot);
    }
    Ok(())
}

fn print_transcript(snapshot: &ViewSnapshot) {
    let meta = &snapshot.status_meta;
    match &meta.phase {
        Some(phase) => println!("状态：{} · {phase}", meta.headline),
        None => println!("状态：{}", meta.headline),
    }
    if let Some(error) = &snapshot.error_text {
        println!("错误：{error}");
    }
    if snapshot.has_diff {
        println!("diff: {} rows", snapshot.diff_lines.len());
    }

    for message in &snapshot.visible_messages {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        let key = message
            .message_key
            .as_deref()
            .map(|k| format!(" [{k}]"))
            .unwrap_or_default();
        let streaming = if message.streaming { " (streaming)" } else { "" };
        println!();
        println!("== {role}{key}{streaming} ==");
        println!("{}", message.content);
    }
}
