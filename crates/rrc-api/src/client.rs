use crate::{config::ApiConfig, http::HttpClient, mock::MockBackend, ApiError};
use async_trait::async_trait;
use rrc_core::{ActiveRun, LogEntry, Project, Run, RunSummary, Runner, TaskSpec};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

/// Body for the generic start-run operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    pub runner_id: String,
    pub task_id: String,
    #[serde(default)]
    pub parameters: Value,
}

/// The seam the sync engines consume. Implemented by the facade and by the
/// mock directly, so tests drive the engines against a controlled backend.
#[async_trait]
pub trait RunnerApi: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<Project>, ApiError>;
    async fn latest_summary(&self, project_id: &str) -> Result<RunSummary, ApiError>;
    async fn fetch_runs(&self, project_id: &str) -> Result<Vec<Run>, ApiError>;
    async fn start_test(&self, project_id: &str) -> Result<Run, ApiError>;
    /// Synchronous: resolves where a run's logs can be opened, if anywhere.
    fn logs_url(&self, run: &Run) -> Option<String>;

    async fn list_tasks(&self) -> Result<Vec<TaskSpec>, ApiError>;
    async fn list_runners(&self) -> Result<Vec<Runner>, ApiError>;
    async fn list_active_runs(&self) -> Result<Vec<ActiveRun>, ApiError>;
    async fn fetch_logs(&self, limit: usize) -> Result<Vec<LogEntry>, ApiError>;
    async fn start_task_run(&self, request: &StartRunRequest) -> Result<ActiveRun, ApiError>;
    async fn stop_run(&self, run_id: &str) -> Result<(), ApiError>;
}

#[async_trait]
impl RunnerApi for MockBackend {
    async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        MockBackend::list_projects(self).await
    }

    async fn latest_summary(&self, project_id: &str) -> Result<RunSummary, ApiError> {
        MockBackend::latest_summary(self, project_id).await
    }

    async fn fetch_runs(&self, project_id: &str) -> Result<Vec<Run>, ApiError> {
        MockBackend::fetch_runs(self, project_id).await
    }

    async fn start_test(&self, project_id: &str) -> Result<Run, ApiError> {
        MockBackend::start_test(self, project_id).await
    }

    fn logs_url(&self, run: &Run) -> Option<String> {
        resolve_logs_url("", run)
    }

    async fn list_tasks(&self) -> Result<Vec<TaskSpec>, ApiError> {
        MockBackend::list_tasks(self).await
    }

    async fn list_runners(&self) -> Result<Vec<Runner>, ApiError> {
        MockBackend::list_runners(self).await
    }

    async fn list_active_runs(&self) -> Result<Vec<ActiveRun>, ApiError> {
        MockBackend::list_active_runs(self).await
    }

    async fn fetch_logs(&self, limit: usize) -> Result<Vec<LogEntry>, ApiError> {
        MockBackend::fetch_logs(self, limit).await
    }

    async fn start_task_run(&self, request: &StartRunRequest) -> Result<ActiveRun, ApiError> {
        MockBackend::start_task_run(self, request).await
    }

    async fn stop_run(&self, run_id: &str) -> Result<(), ApiError> {
        MockBackend::stop_run(self, run_id).await
    }
}

/// Routes each call to the real transport when configured, degrading to the
/// simulated backend on any error so the cockpit keeps working offline.
pub struct ApiFacade {
    config: ApiConfig,
    http: HttpClient,
    mock: MockBackend,
}

impl ApiFacade {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let http = HttpClient::new(config.api_base.clone())?;
        Ok(Self {
            config,
            http,
            mock: MockBackend::seeded(),
        })
    }

    pub fn with_backends(config: ApiConfig, http: HttpClient, mock: MockBackend) -> Self {
        Self { config, http, mock }
    }

    fn mock_only(&self) -> bool {
        self.config.use_mocks || self.config.api_base.is_empty()
    }
}

macro_rules! real_then_mock {
    ($self:ident, $label:literal, $real:expr, $fallback:expr) => {{
        if !$self.mock_only() {
            match $real.await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(operation = $label, error = %err, "api call failed; using simulated backend");
                }
            }
        }
        $fallback.await
    }};
}

#[async_trait]
impl RunnerApi for ApiFacade {
    async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        real_then_mock!(
            self,
            "list projects",
            self.http.get_json::<Vec<Project>>("/projects"),
            self.mock.list_projects()
        )
    }

    async fn latest_summary(&self, project_id: &str) -> Result<RunSummary, ApiError> {
        if project_id.is_empty() {
            return Ok(RunSummary::default());
        }
        real_then_mock!(
            self,
            "latest summary",
            self.http
                .get_json::<RunSummary>(&format!("/projects/{project_id}/summary/latest")),
            self.mock.latest_summary(project_id)
        )
    }

    async fn fetch_runs(&self, project_id: &str) -> Result<Vec<Run>, ApiError> {
        if project_id.is_empty() {
            return Ok(Vec::new());
        }
        real_then_mock!(
            self,
            "fetch runs",
            self.http
                .get_json::<Vec<Run>>(&format!("/projects/{project_id}/runs")),
            self.mock.fetch_runs(project_id)
        )
    }

    async fn start_test(&self, project_id: &str) -> Result<Run, ApiError> {
        if project_id.is_empty() {
            return Err(ApiError::Validation(
                "projectId is required to start a test".to_string(),
            ));
        }
        real_then_mock!(
            self,
            "start test",
            self.http.post_json::<Run>(
                &format!("/projects/{project_id}/runs"),
                &json!({"trigger": "ui"}),
            ),
            self.mock.start_test(project_id)
        )
    }

    fn logs_url(&self, run: &Run) -> Option<String> {
        resolve_logs_url(&self.config.api_base, run)
    }

    async fn list_tasks(&self) -> Result<Vec<TaskSpec>, ApiError> {
        real_then_mock!(
            self,
            "list tasks",
            self.http.get_json::<Vec<TaskSpec>>("/tasks"),
            self.mock.list_tasks()
        )
    }

    async fn list_runners(&self) -> Result<Vec<Runner>, ApiError> {
        real_then_mock!(
            self,
            "list runners",
            self.http.get_json::<Vec<Runner>>("/runners"),
            self.mock.list_runners()
        )
    }

    async fn list_active_runs(&self) -> Result<Vec<ActiveRun>, ApiError> {
        real_then_mock!(
            self,
            "list active runs",
            self.http.get_json::<Vec<ActiveRun>>("/runs/active"),
            self.mock.list_active_runs()
        )
    }

    async fn fetch_logs(&self, limit: usize) -> Result<Vec<LogEntry>, ApiError> {
        real_then_mock!(
            self,
            "fetch logs",
            self.http
                .get_json::<Vec<LogEntry>>(&format!("/logs?limit={limit}")),
            self.mock.fetch_logs(limit)
        )
    }

    async fn start_task_run(&self, request: &StartRunRequest) -> Result<ActiveRun, ApiError> {
        if request.runner_id.is_empty() || request.task_id.is_empty() {
            return Err(ApiError::Validation(
                "runnerId and taskId are required to start a run".to_string(),
            ));
        }
        let body = serde_json::to_value(request)
            .map_err(|err| ApiError::Decode(err.to_string()))?;
        real_then_mock!(
            self,
            "start run",
            self.http.post_json::<ActiveRun>("/runs", &body),
            self.mock.start_task_run(request)
        )
    }

    async fn stop_run(&self, run_id: &str) -> Result<(), ApiError> {
        if run_id.is_empty() {
            return Err(ApiError::Validation("runId is required".to_string()));
        }
        if !self.mock_only() {
            match self
                .http
                .request(
                    reqwest::Method::POST,
                    &format!("/runs/{run_id}/stop"),
                    None,
                )
                .await
            {
                Ok(_) => return Ok(()),
                Err(err) => {
                    warn!(error = %err, "stop run failed; using simulated backend");
                }
            }
        }
        self.mock.stop_run(run_id).await
    }
}

/// Server-supplied URL wins; otherwise the logs path (or the `/runs/{id}/logs`
/// convention) is anchored on the configured origin. Relative when no origin
/// is configured.
fn resolve_logs_url(api_base: &str, run: &Run) -> Option<String> {
    if let Some(url) = run.logs_url.as_deref() {
        if !url.is_empty() {
            return Some(url.to_string());
        }
    }
    if run.id.is_empty() {
        return None;
    }
    if let Some(path) = run.logs_path.as_deref() {
        if !path.is_empty() {
            return Some(format!("{api_base}{path}"));
        }
    }
    Some(format!("{api_base}/runs/{}/logs", run.id))
}
