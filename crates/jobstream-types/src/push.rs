use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::JobId;

/// Raw server-push message as delivered by the transport.
///
/// `params` stays untyped here so a malformed payload can be rejected per
/// message without tearing down the subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl PushMessage {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Params of an `agent_status` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatusParams {
    pub job_id: JobId,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub offset: Option<u64>,
    pub item: AgentStatusItem,
}

/// One structured progress item. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStatusItem {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub seq: Option<u64>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub delta: Option<String>,
    #[serde(default)]
    pub meta: Option<Value>,
}

/// Params of a `terminal` push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalParams {
    pub job_id: JobId,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub offset: Option<u64>,
    #[serde(default)]
    pub chunk_b64: String,
}

/// Counters may arrive as numbers or numeric strings. Anything else reads as
/// absent.
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
