use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

/// One execution instance of a suite, with a lifecycle status.
///
/// `optimistic` marks a locally synthesized placeholder that has not been
/// confirmed by the backend yet; it never survives reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: String,
    pub project_id: String,
    #[serde(default)]
    pub suite: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    #[serde(default)]
    pub triggered_by: String,
    #[serde(default)]
    pub logs_path: Option<String>,
    #[serde(default)]
    pub logs_url: Option<String>,
    #[serde(default, rename = "_optimistic", skip_serializing_if = "is_false")]
    pub optimistic: bool,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Passed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Passed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "queued" => Ok(RunStatus::Queued),
            "running" => Ok(RunStatus::Running),
            "passed" => Ok(RunStatus::Passed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("Unknown run status: {other}")),
        }
    }
}

/// Per-status run counts for one project's loaded run list.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    #[serde(default)]
    pub passed: usize,
    #[serde(default)]
    pub failed: usize,
    #[serde(default)]
    pub running: usize,
    #[serde(default)]
    pub queued: usize,
}

impl RunSummary {
    /// Counts statuses over `runs`. Every run lands in exactly one bucket,
    /// so the counts always sum to `runs.len()`.
    pub fn of(runs: &[Run]) -> Self {
        let mut summary = Self::default();
        for run in runs {
            match run.status {
                RunStatus::Passed => summary.passed += 1,
                RunStatus::Failed => summary.failed += 1,
                RunStatus::Running => summary.running += 1,
                RunStatus::Queued => summary.queued += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.running + self.queued
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub estimated_duration_seconds: Option<u64>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Runner {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: RunnerStatus,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunnerStatus {
    #[default]
    Idle,
    Busy,
    Offline,
}

impl RunnerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerStatus::Idle => "idle",
            RunnerStatus::Busy => "busy",
            RunnerStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for RunnerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRun {
    pub run_id: String,
    pub task_id: String,
    pub runner_id: String,
    pub status: ActiveRunStatus,
    #[serde(default)]
    pub progress_percent: Option<u8>,
    pub started_at: DateTime<Utc>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActiveRunStatus {
    Pending,
    Running,
    Stopping,
}

impl ActiveRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActiveRunStatus::Pending => "pending",
            ActiveRunStatus::Running => "running",
            ActiveRunStatus::Stopping => "stopping",
        }
    }
}

impl fmt::Display for ActiveRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub source: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn run(id: &str, status: RunStatus) -> Run {
        Run {
            id: id.to_string(),
            project_id: "proj-1".to_string(),
            suite: "e2e/warehouse".to_string(),
            status,
            started_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            duration_seconds: Some(120),
            triggered_by: "scheduler".to_string(),
            logs_path: Some(format!("/mock/logs/{id}")),
            logs_url: None,
            optimistic: false,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn summary_counts_sum_to_list_length() {
        let runs = vec![
            run("run-1", RunStatus::Passed),
            run("run-2", RunStatus::Passed),
            run("run-3", RunStatus::Failed),
            run("run-4", RunStatus::Running),
            run("run-5", RunStatus::Queued),
        ];
        let summary = RunSummary::of(&runs);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.running, 1);
        assert_eq!(summary.queued, 1);
        assert_eq!(summary.total(), runs.len());
    }

    #[test]
    fn summary_of_empty_list_is_zero() {
        let summary = RunSummary::of(&[]);
        assert_eq!(summary, RunSummary::default());
        assert_eq!(summary.total(), 0);
    }

    #[test]
    fn run_status_round_trips_through_strings() {
        for status in [
            RunStatus::Queued,
            RunStatus::Running,
            RunStatus::Passed,
            RunStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert_eq!(" Passed ".parse::<RunStatus>().unwrap(), RunStatus::Passed);
        assert!("exploded".parse::<RunStatus>().is_err());
    }

    #[test]
    fn run_serializes_with_camel_case_wire_names() {
        let value = serde_json::to_value(run("run-9", RunStatus::Queued)).unwrap();
        assert_eq!(value["projectId"], "proj-1");
        assert_eq!(value["startedAt"], "2024-05-01T12:00:00Z");
        assert_eq!(value["durationSeconds"], 120);
        assert_eq!(value["triggeredBy"], "scheduler");
        assert!(value.get("_optimistic").is_none());
    }

    #[test]
    fn optimistic_marker_round_trips() {
        let mut placeholder = run("optimistic-1", RunStatus::Queued);
        placeholder.optimistic = true;
        let value = serde_json::to_value(&placeholder).unwrap();
        assert_eq!(value["_optimistic"], true);
        let parsed: Run = serde_json::from_value(value).unwrap();
        assert!(parsed.optimistic);
    }

    #[test]
    fn run_parses_wire_payload_with_unknown_fields() {
        let parsed: Run = serde_json::from_str(
            r#"{
                "id": "run-1024",
                "projectId": "proj-1",
                "suite": "e2e/warehouse",
                "status": "passed",
                "startedAt": "2024-05-01T10:00:00Z",
                "durationSeconds": 562,
                "triggeredBy": "scheduler",
                "logsPath": "/mock/logs/run-1024",
                "shard": 3
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.status, RunStatus::Passed);
        assert!(!parsed.optimistic);
        assert_eq!(parsed.extra["shard"], 3);
    }
}
