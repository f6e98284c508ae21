//! Typed stream events.
//!
//! Push messages arrive as loosely-shaped JSON. This module validates them
//! once, at the boundary, into [`Notification`] values; everything past this
//! point works with tagged enums and never inspects raw JSON again.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use jobstream_types::{AgentStatusItem, AgentStatusParams, JobId, PushMessage, TerminalParams};
use serde_json::Value;

use crate::transport::{TransportError, TransportResult};

pub const METHOD_AGENT_STATUS: &str = "agent_status";
pub const METHOD_TERMINAL: &str = "terminal";

/// One structured progress event from the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStatusEvent {
    /// Chunk of a reasoning summary. Summaries are numbered independently.
    ReasoningSummaryDelta {
        summary_index: Option<u64>,
        delta: String,
    },

    /// Explicit end of a reasoning summary.
    ReasoningSummaryBoundary { summary_index: Option<u64> },

    /// Output of a command the agent ran.
    CommandOutputDelta { delta: String },

    /// Chunk of the agent's final answer.
    AgentMessageDelta { delta: String },

    /// Stage transition with an optional one-line summary.
    Stage {
        stage: Option<String>,
        summary: Option<String>,
    },

    /// A kind this client does not render. Still counts for sequencing.
    Unsupported { kind: String },
}

/// An event plus its optional sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedEvent {
    pub seq: Option<u64>,
    pub event: AgentStatusEvent,
}

impl From<AgentStatusItem> for SequencedEvent {
    fn from(item: AgentStatusItem) -> Self {
        let summary_index = item.meta.as_ref().and_then(summary_index_from_meta);
        let kind = item
            .kind
            .as_deref()
            .map(|k| k.trim().to_ascii_lowercase())
            .unwrap_or_default();
        let delta = item.delta;

        let event = match kind.as_str() {
            "reasoning_summary_delta" => AgentStatusEvent::ReasoningSummaryDelta {
                summary_index,
                delta: delta.unwrap_or_default(),
            },
            "reasoning_summary_boundary" => {
                AgentStatusEvent::ReasoningSummaryBoundary { summary_index }
            }
            "command_output_delta" => AgentStatusEvent::CommandOutputDelta {
                delta: delta.unwrap_or_default(),
            },
            "agent_message_delta" => AgentStatusEvent::AgentMessageDelta {
                delta: delta.unwrap_or_default(),
            },
            _ if delta.is_none() && (item.stage.is_some() || item.summary.is_some()) => {
                AgentStatusEvent::Stage {
                    stage: item.stage,
                    summary: item.summary,
                }
            }
            _ => AgentStatusEvent::Unsupported { kind },
        };

        SequencedEvent {
            seq: item.seq,
            event,
        }
    }
}

/// `summary_index` may arrive as a number or a numeric string.
fn summary_index_from_meta(meta: &Value) -> Option<u64> {
    match meta.get("summary_index")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A decoded push notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    AgentStatus {
        job_id: JobId,
        offset: Option<u64>,
        event: SequencedEvent,
    },
    Terminal {
        job_id: JobId,
        offset: Option<u64>,
        /// Decoded chunk, lossily converted to UTF-8.
        chunk: String,
    },
}

impl Notification {
    pub fn job_id(&self) -> &JobId {
        match self {
            Notification::AgentStatus { job_id, .. } | Notification::Terminal { job_id, .. } => {
                job_id
            }
        }
    }

    /// Decodes a raw push message.
    ///
    /// Returns `Ok(None)` for methods this client does not subscribe to.
    ///
    /// # Errors
    /// Returns a decode error when the params do not match the method.
    pub fn decode(message: &PushMessage) -> TransportResult<Option<Self>> {
        match message.method.as_str() {
            METHOD_AGENT_STATUS => {
                let params: AgentStatusParams = serde_json::from_value(message.params.clone())
                    .map_err(|err| {
                        TransportError::decode(format!("Failed to parse agent_status: {err}"))
                    })?;
                Ok(Some(Notification::AgentStatus {
                    job_id: params.job_id,
                    offset: params.offset,
                    event: params.item.into(),
                }))
            }
            METHOD_TERMINAL => {
                let params: TerminalParams = serde_json::from_value(message.params.clone())
                    .map_err(|err| {
                        TransportError::decode(format!("Failed to parse terminal: {err}"))
                    })?;
                let bytes = BASE64.decode(params.chunk_b64.trim()).map_err(|err| {
                    TransportError::decode(format!("Invalid terminal chunk encoding: {err}"))
                })?;
                Ok(Some(Notification::Terminal {
                    job_id: params.job_id,
                    offset: params.offset,
                    chunk: String::from_utf8_lossy(&bytes).into_owned(),
                }))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn item(value: Value) -> SequencedEvent {
        serde_json::from_value::<AgentStatusItem>(value)
            .unwrap()
            .into()
    }

    #[test]
    fn test_reasoning_delta_reads_summary_index_from_meta() {
        let ev = item(json!({
            "seq": 4,
            "kind": "reasoning_summary_delta",
            "delta": "abc",
            "meta": {"summary_index": "2"}
        }));
        assert_eq!(ev.seq, Some(4));
        assert_eq!(
            ev.event,
            AgentStatusEvent::ReasoningSummaryDelta {
                summary_index: Some(2),
                delta: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_string_seq_is_sequenced() {
        let ev = item(json!({"seq": "5", "kind": "agent_message_delta", "delta": "ok"}));
        assert_eq!(ev.seq, Some(5));
        assert_eq!(
            ev.event,
            AgentStatusEvent::AgentMessageDelta {
                delta: "ok".to_string()
            }
        );
    }

    #[test]
    fn test_stage_event_without_delta() {
        let ev = item(json!({"stage": "compile", "summary": "g++ ok"}));
        assert_eq!(
            ev.event,
            AgentStatusEvent::Stage {
                stage: Some("compile".to_string()),
                summary: Some("g++ ok".to_string())
            }
        );
    }

    #[test]
    fn test_unknown_kind_with_delta_is_unsupported() {
        let ev = item(json!({"kind": "Tool_Call_Delta", "delta": "x"}));
        assert_eq!(
            ev.event,
            AgentStatusEvent::Unsupported {
                kind: "tool_call_delta".to_string()
            }
        );
    }

    #[test]
    fn test_decode_terminal_chunk() {
        let msg = PushMessage::new(
            METHOD_TERMINAL,
            json!({"job_id": "j1", "offset": 7, "chunk_b64": BASE64.encode("hi\n")}),
        );
        let decoded = Notification::decode(&msg).unwrap().unwrap();
        assert_eq!(
            decoded,
            Notification::Terminal {
                job_id: JobId::from("j1"),
                offset: Some(7),
                chunk: "hi\n".to_string()
            }
        );
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        let msg = PushMessage::new(METHOD_AGENT_STATUS, json!({"job_id": 5}));
        assert!(Notification::decode(&msg).is_err());

        let msg = PushMessage::new(
            METHOD_TERMINAL,
            json!({"job_id": "j1", "chunk_b64": "not base64!!"}),
        );
        assert!(Notification::decode(&msg).is_err());
    }

    #[test]
    fn test_decode_ignores_other_methods() {
        let msg = PushMessage::new("heartbeat", Value::Null);
        assert_eq!(Notification::decode(&msg).unwrap(), None);
    }
}
