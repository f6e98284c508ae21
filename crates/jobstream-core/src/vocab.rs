//! Stage and status vocabulary.
//!
//! Maps backend stage codes and job status codes to the labels shown in the
//! transcript and status header, and buckets statuses into lifecycle phases.

use jobstream_types::JobStatus;
use serde::Serialize;

/// Label used when an event carries a summary but no stage code.
pub const DEFAULT_STAGE_LABEL: &str = "进度";

/// Label of the thinking stage; blocks under this marker classify as thinking.
pub const THINKING_LABEL: &str = "思考";

/// Returns the display label for a backend stage code.
///
/// Unknown codes are shown verbatim so new backend stages stay visible.
pub fn stage_label(code: Option<&str>) -> String {
    let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) else {
        return DEFAULT_STAGE_LABEL.to_string();
    };
    let label = match code.to_ascii_lowercase().as_str() {
        "queued" | "queue" => "排队中",
        "analyze" | "analysis" => "分析题目",
        "reasoning" | "thinking" | "think" => THINKING_LABEL,
        "coding" | "generate" | "codegen" => "编写代码",
        "compile" | "build" => "编译",
        "test" | "testing" | "judge" => "运行测试",
        "repair" | "fix" | "debug" => "修复",
        "report" | "finalize" => "生成报告",
        "retry" => "重试",
        "done" | "complete" | "completed" => "完成",
        _ => return code.to_string(),
    };
    label.to_string()
}

/// Lifecycle bucket of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// No job or no status observed yet.
    Idle,
    /// Accepted but not yet executing.
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl Lifecycle {
    pub fn from_status(status: &JobStatus) -> Self {
        match status {
            JobStatus::Created | JobStatus::Queued | JobStatus::Starting => Lifecycle::Pending,
            JobStatus::Running => Lifecycle::Running,
            JobStatus::Succeeded => Lifecycle::Succeeded,
            JobStatus::Failed => Lifecycle::Failed,
            JobStatus::Cancelled => Lifecycle::Cancelled,
            // Unknown non-empty codes mean the backend is doing something.
            JobStatus::Unknown(code) if code.trim().is_empty() => Lifecycle::Idle,
            JobStatus::Unknown(_) => Lifecycle::Running,
        }
    }
}

/// Human-readable status summary for the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMeta {
    pub lifecycle: Lifecycle,
    pub headline: String,
    /// Current stage label while the job runs.
    pub phase: Option<String>,
    pub badge: &'static str,
}

/// Builds the status header from the latest status and stage code.
pub fn status_meta(status: Option<&JobStatus>, stage: Option<&str>) -> StatusMeta {
    let lifecycle = status.map_or(Lifecycle::Idle, Lifecycle::from_status);
    let (headline, badge) = match lifecycle {
        Lifecycle::Idle => ("等待提交".to_string(), "idle"),
        Lifecycle::Pending => ("排队中".to_string(), "pending"),
        Lifecycle::Running => ("正在处理".to_string(), "running"),
        Lifecycle::Succeeded => ("已完成".to_string(), "success"),
        Lifecycle::Failed => ("运行失败".to_string(), "error"),
        Lifecycle::Cancelled => ("已取消".to_string(), "muted"),
    };
    let headline = match status {
        Some(JobStatus::Unknown(code)) if !code.trim().is_empty() => format!("{headline}（{code}）"),
        _ => headline,
    };
    let phase = matches!(lifecycle, Lifecycle::Running | Lifecycle::Pending)
        .then(|| stage.filter(|s| !s.trim().is_empty()))
        .flatten()
        .map(|code| stage_label(Some(code)));
    StatusMeta {
        lifecycle,
        headline,
        phase,
        badge,
    }
}
