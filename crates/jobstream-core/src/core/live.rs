//! Per-job live stream state.
//!
//! [`JobStream`] owns everything the engine accumulates for one job while it
//! streams: the agent narrative, the pending reasoning paragraph, the raw
//! terminal fallback, sequence/offset bookkeeping and the seal flag. All
//! ingestion goes through its methods, and every method is a no-op once the
//! job is sealed.

use tracing::debug;

use crate::classify::{TokenStreamItem, classify, clean_stream_text};
use crate::core::events::{AgentStatusEvent, SequencedEvent};
use crate::core::reasoning::{ReasoningBuffer, normalize_paragraph};
use crate::text::cap_tail;
use crate::vocab::{THINKING_LABEL, stage_label};

/// Marker label for command output inside the rendered narrative.
pub const EXECUTION_LABEL: &str = "执行输出";

/// One piece of the agent narrative, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NarrativeEntry {
    /// A completed reasoning paragraph.
    Thought(String),
    /// A `【label】summary` progress line.
    Stage { label: String, summary: String },
    /// Command output. Consecutive chunks are merged.
    Output(String),
}

/// Reasoning, execution and result channels for one job.
///
/// Reasoning and execution share one ordered entry list so they can be
/// rendered interleaved; the result channel is kept apart for the final
/// agent message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentLiveState {
    entries: Vec<NarrativeEntry>,
    result: String,
}

impl AgentLiveState {
    pub fn push_thought(&mut self, paragraph: String) {
        self.entries.push(NarrativeEntry::Thought(paragraph));
    }

    pub fn push_stage(&mut self, label: String, summary: String) {
        self.entries.push(NarrativeEntry::Stage { label, summary });
    }

    pub fn push_output(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        if let Some(NarrativeEntry::Output(text)) = self.entries.last_mut() {
            text.push_str(delta);
        } else {
            self.entries.push(NarrativeEntry::Output(delta.to_string()));
        }
    }

    pub fn push_result(&mut self, delta: &str) {
        self.result.push_str(delta);
    }

    pub fn entries(&self) -> &[NarrativeEntry] {
        &self.entries
    }

    /// Reasoning channel: one line per paragraph or stage line.
    pub fn reasoning(&self) -> String {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                NarrativeEntry::Thought(text) => Some(text.clone()),
                NarrativeEntry::Stage { label, summary } => Some(format!("【{label}】{summary}")),
                NarrativeEntry::Output(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Execution channel: all command output concatenated.
    pub fn execution(&self) -> String {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                NarrativeEntry::Output(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn result(&self) -> &str {
        &self.result
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.result.is_empty()
    }

    /// Renders the interleaved narrative with block markers the classifier
    /// understands. `pending` is an in-progress paragraph shown last.
    pub fn render(&self, pending: Option<&str>) -> String {
        let mut blocks: Vec<String> = Vec::new();
        let mut thoughts: Vec<&str> = Vec::new();

        let flush_thoughts = |thoughts: &mut Vec<&str>, blocks: &mut Vec<String>| {
            if !thoughts.is_empty() {
                blocks.push(format!("【{THINKING_LABEL}】\n{}", thoughts.join("\n\n")));
                thoughts.clear();
            }
        };

        for entry in &self.entries {
            match entry {
                NarrativeEntry::Thought(text) => thoughts.push(text),
                NarrativeEntry::Stage { label, summary } => {
                    flush_thoughts(&mut thoughts, &mut blocks);
                    blocks.push(format!("【{label}】{summary}"));
                }
                NarrativeEntry::Output(text) => {
                    flush_thoughts(&mut thoughts, &mut blocks);
                    blocks.push(format!("【{EXECUTION_LABEL}】\n{}", text.trim_end()));
                }
            }
        }
        if let Some(pending) = pending {
            thoughts.push(pending);
        }
        flush_thoughts(&mut thoughts, &mut blocks);
        blocks.join("\n\n")
    }
}

/// What happened to an ingested item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// State changed.
    Applied,
    /// Sequence number or offset already seen.
    Duplicate,
    /// Accepted for bookkeeping but nothing to render.
    Ignored,
    /// The job is sealed.
    Sealed,
}

/// Everything accumulated for one job's stream.
#[derive(Debug, Clone)]
pub struct JobStream {
    live: AgentLiveState,
    reasoning: ReasoningBuffer,
    terminal: String,
    sealed: bool,
    has_agent_status_event: bool,
    last_agent_status_seq: Option<u64>,
    agent_status_offset: Option<u64>,
    terminal_offset: Option<u64>,
    last_stage: Option<String>,
    max_terminal_chars: usize,
}

impl JobStream {
    pub fn new(max_terminal_chars: usize) -> Self {
        Self {
            live: AgentLiveState::default(),
            reasoning: ReasoningBuffer::default(),
            terminal: String::new(),
            sealed: false,
            has_agent_status_event: false,
            last_agent_status_seq: None,
            agent_status_offset: None,
            terminal_offset: None,
            last_stage: None,
            max_terminal_chars,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Check-and-set seal. Flushes pending reasoning and returns true for
    /// the one caller that performed the transition.
    pub fn try_seal(&mut self) -> bool {
        if self.sealed {
            return false;
        }
        self.flush_reasoning(true);
        self.sealed = true;
        true
    }

    pub fn has_agent_status_event(&self) -> bool {
        self.has_agent_status_event
    }

    pub fn last_agent_status_seq(&self) -> Option<u64> {
        self.last_agent_status_seq
    }

    /// Highest `agent_status` offset observed, used to resume.
    pub fn agent_status_offset(&self) -> Option<u64> {
        self.agent_status_offset
    }

    /// Highest terminal offset observed, used to resume.
    pub fn terminal_offset(&self) -> Option<u64> {
        self.terminal_offset
    }

    /// Most recent stage code from a stage event.
    pub fn last_stage(&self) -> Option<&str> {
        self.last_stage.as_deref()
    }

    pub fn live(&self) -> &AgentLiveState {
        &self.live
    }

    pub fn reasoning_buffer(&self) -> &ReasoningBuffer {
        &self.reasoning
    }

    pub fn terminal_text(&self) -> &str {
        &self.terminal
    }

    /// Handles one `agent_status` notification.
    ///
    /// Any structured event switches the job off the terminal fallback.
    pub fn apply_agent_status(
        &mut self,
        offset: Option<u64>,
        event: SequencedEvent,
    ) -> IngestOutcome {
        if self.sealed {
            return IngestOutcome::Sealed;
        }
        if let Some(offset) = offset {
            self.agent_status_offset =
                Some(self.agent_status_offset.map_or(offset, |o| o.max(offset)));
        }
        self.has_agent_status_event = true;
        self.apply_event(event)
    }

    /// Sequence-checked dispatch of one agent event.
    pub fn apply_event(&mut self, event: SequencedEvent) -> IngestOutcome {
        if self.sealed {
            return IngestOutcome::Sealed;
        }
        if let Some(seq) = event.seq {
            if self.last_agent_status_seq.is_some_and(|last| seq <= last) {
                debug!(seq, last = ?self.last_agent_status_seq, "dropping replayed agent event");
                return IngestOutcome::Duplicate;
            }
            self.last_agent_status_seq = Some(seq);
        }

        match event.event {
            AgentStatusEvent::ReasoningSummaryDelta {
                summary_index,
                delta,
            } => {
                if summary_index != self.reasoning.summary_index() {
                    self.flush_reasoning(true);
                }
                self.reasoning.set_summary_index(summary_index);
                self.reasoning.push(&delta);
                self.flush_reasoning(false);
            }
            AgentStatusEvent::ReasoningSummaryBoundary { summary_index } => {
                self.flush_reasoning(true);
                self.reasoning.set_summary_index(summary_index);
            }
            AgentStatusEvent::CommandOutputDelta { delta } => {
                self.flush_reasoning(true);
                self.live.push_output(&delta);
            }
            AgentStatusEvent::AgentMessageDelta { delta } => {
                self.flush_reasoning(true);
                self.live.push_result(&delta);
            }
            AgentStatusEvent::Stage { stage, summary } => {
                self.flush_reasoning(true);
                let label = stage_label(stage.as_deref());
                if let Some(code) = stage.filter(|s| !s.trim().is_empty()) {
                    self.last_stage = Some(code);
                }
                let summary = summary
                    .as_deref()
                    .and_then(normalize_paragraph)
                    .unwrap_or_default();
                self.live.push_stage(label, summary);
            }
            AgentStatusEvent::Unsupported { kind } => {
                debug!(kind = %kind, "ignoring unsupported agent event kind");
                return IngestOutcome::Ignored;
            }
        }
        IngestOutcome::Applied
    }

    /// Buffers a raw terminal chunk.
    ///
    /// Chunks at or below the highest offset seen are replays. Terminal text
    /// is only kept while no structured event has arrived for the job.
    pub fn apply_terminal(&mut self, offset: Option<u64>, chunk: &str) -> IngestOutcome {
        if self.sealed {
            return IngestOutcome::Sealed;
        }
        if let Some(offset) = offset {
            if self.terminal_offset.is_some_and(|last| offset <= last) {
                return IngestOutcome::Duplicate;
            }
            self.terminal_offset = Some(offset);
        }
        if self.has_agent_status_event {
            return IngestOutcome::Ignored;
        }
        self.terminal.push_str(chunk);
        cap_tail(&mut self.terminal, self.max_terminal_chars);
        IngestOutcome::Applied
    }

    fn flush_reasoning(&mut self, force: bool) {
        for paragraph in self.reasoning.flush(force) {
            self.live.push_thought(paragraph);
        }
    }

    /// Text for the live transcript slot: the structured narrative when any
    /// agent event arrived, cleaned terminal output (shell noise removed)
    /// otherwise.
    pub fn stream_text(&self) -> String {
        if self.has_agent_status_event {
            let pending = normalize_paragraph(self.reasoning.pending());
            self.live.render(pending.as_deref())
        } else {
            clean_stream_text(&self.terminal)
        }
    }

    /// Typed blocks for the stream view, recomputed from the current text.
    pub fn token_stream(&self) -> Vec<TokenStreamItem> {
        classify(&self.stream_text())
    }
}
