//! Post-run artifacts: solution metadata, test report, feedback text and
//! the code diff shown next to the transcript.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use similar::TextDiff;

pub const MAIN_CPP: &str = "main.cpp";
pub const SOLUTION_JSON: &str = "solution.json";
pub const REPORT_JSON: &str = "report.json";

/// `solution.json` as written by the worker. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Solution {
    pub solved: Option<bool>,
    pub status: Option<String>,
    pub attempts: Option<u32>,
    pub model: Option<String>,
    #[serde(alias = "elapsed")]
    pub elapsed_seconds: Option<f64>,
    #[serde(alias = "user_feedback")]
    pub feedback: Option<String>,
    pub solution_idea: Option<String>,
    #[serde(alias = "code_review")]
    pub prior_code_review: Option<String>,
    pub bug_reason: Option<String>,
    pub diff: Option<String>,
}

impl Solution {
    /// # Errors
    /// Returns an error if the text is not a JSON object.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse solution.json")
    }
}

/// One entry of `report.json`'s test list.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReportCase {
    pub name: Option<String>,
    pub status: Option<String>,
    pub passed: Option<bool>,
}

impl ReportCase {
    fn is_pass(&self) -> bool {
        self.passed.unwrap_or_else(|| {
            self.status.as_deref().is_some_and(|s| {
                matches!(
                    s.trim().to_ascii_lowercase().as_str(),
                    "pass" | "passed" | "ok" | "ac" | "accepted"
                )
            })
        })
    }
}

/// Parsed `report.json`, plus the raw value for display.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub passed: Option<u32>,
    pub total: Option<u32>,
    pub cases: Vec<ReportCase>,
    pub raw: Value,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ReportShape {
    #[serde(alias = "tests_passed")]
    passed: Option<u32>,
    #[serde(alias = "tests_total")]
    total: Option<u32>,
    #[serde(alias = "cases")]
    tests: Vec<ReportCase>,
}

impl Report {
    /// # Errors
    /// Returns an error if the text is not valid JSON.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(text).context("Failed to parse report.json")?;
        let shape: ReportShape = serde_json::from_value(raw.clone()).unwrap_or_default();
        Ok(Self {
            passed: shape.passed,
            total: shape.total,
            cases: shape.tests,
            raw,
        })
    }

    /// `(passed, total)`, from explicit counts or the case list.
    pub fn test_counts(&self) -> Option<(u32, u32)> {
        if let (Some(passed), Some(total)) = (self.passed, self.total) {
            return Some((passed, total));
        }
        if self.cases.is_empty() {
            return None;
        }
        let passed = self.cases.iter().filter(|c| c.is_pass()).count() as u32;
        Some((passed, self.cases.len() as u32))
    }
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

/// Builds the feedback message shown after a run.
pub fn synthesize_feedback(solution: &Solution, report: Option<&Report>) -> String {
    let mut out = String::new();

    let verdict = match solution.solved {
        Some(true) => Some("已通过".to_string()),
        Some(false) => Some("未通过".to_string()),
        None => non_blank(solution.status.as_deref()).map(str::to_string),
    };
    if let Some(verdict) = verdict {
        let _ = writeln!(out, "【结果】{verdict}");
    }

    let mut meta: Vec<String> = Vec::new();
    if let Some(model) = non_blank(solution.model.as_deref()) {
        meta.push(format!("模型：{model}"));
    }
    if let Some(attempts) = solution.attempts {
        meta.push(format!("尝试次数：{attempts}"));
    }
    if let Some(secs) = solution.elapsed_seconds {
        meta.push(format!("用时：{secs:.1}s"));
    }
    if let Some((passed, total)) = report.and_then(Report::test_counts) {
        meta.push(format!("测试：{passed}/{total} 通过"));
    }
    if !meta.is_empty() {
        let _ = writeln!(out, "{}", meta.join(" · "));
    }

    if let Some(feedback) = non_blank(solution.feedback.as_deref()) {
        let _ = write!(out, "\n{feedback}\n");
    }

    let sections = [
        ("解题思路", &solution.solution_idea),
        ("原代码评审", &solution.prior_code_review),
        ("错误原因", &solution.bug_reason),
    ];
    for (title, body) in sections {
        if let Some(body) = non_blank(body.as_deref()) {
            let _ = write!(out, "\n【{title}】\n{body}\n");
        }
    }

    out.trim().to_string()
}

/// Diff between the seed and the final `main.cpp`.
///
/// Prefers the worker's own diff from `solution.json`; otherwise computes a
/// unified diff. `None` when there is nothing to compare or no change.
pub fn derive_diff_text(
    solution: Option<&Solution>,
    seed: Option<&str>,
    main_cpp: Option<&str>,
) -> Option<String> {
    if let Some(diff) = solution.and_then(|s| non_blank(s.diff.as_deref())) {
        return Some(diff.to_string());
    }
    let (seed, main_cpp) = (seed?, main_cpp?);
    if seed == main_cpp {
        return None;
    }
    let diff = TextDiff::from_lines(seed, main_cpp)
        .unified_diff()
        .context_radius(3)
        .header("a/main.cpp", "b/main.cpp")
        .to_string();
    (!diff.trim().is_empty()).then_some(diff)
}
