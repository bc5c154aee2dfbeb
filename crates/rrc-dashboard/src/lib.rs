pub mod control;

pub use control::{ControlState, ControlSync, Notice, NoticeTone};

use rrc_api::RunnerApi;
use rrc_core::{Project, Run, RunStatus, RunSummary};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

/// Everything the view layer needs to render the dashboard. Cloneable
/// snapshot published through a watch channel; the engine is the only
/// writer.
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    pub projects: Vec<Project>,
    pub selected_project_id: Option<String>,
    pub summary: RunSummary,
    pub runs: Vec<Run>,
    pub loading_projects: bool,
    pub loading_summary: bool,
    pub loading_runs: bool,
    pub starting: bool,
    pub error: Option<String>,
}

impl DashboardState {
    pub fn selected_project(&self) -> Option<&Project> {
        let id = self.selected_project_id.as_deref()?;
        self.projects.iter().find(|project| project.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptPhase {
    Pending,
    Committed,
    RolledBack,
}

/// One optimistic start-run mutation. The placeholder goes in immediately;
/// the attempt then either commits (placeholder swapped for the authoritative
/// run) or rolls back (placeholder removed, list restored). A `Pending`
/// attempt never outlives the operation that began it.
struct StartAttempt {
    placeholder: Run,
    phase: AttemptPhase,
}

impl StartAttempt {
    fn begin(project_id: &str) -> Self {
        let placeholder = Run {
            id: format!("optimistic-{}", Uuid::new_v4()),
            project_id: project_id.to_string(),
            suite: "default/suite".to_string(),
            status: RunStatus::Queued,
            started_at: chrono::Utc::now(),
            duration_seconds: None,
            triggered_by: "ui".to_string(),
            logs_path: None,
            logs_url: None,
            optimistic: true,
            extra: HashMap::new(),
        };
        Self {
            placeholder,
            phase: AttemptPhase::Pending,
        }
    }

    fn insert(&self, runs: &mut Vec<Run>) {
        merge_run_to_top(runs, self.placeholder.clone());
    }

    fn commit(&mut self, runs: &mut Vec<Run>, created: Run) {
        runs.retain(|run| run.id != self.placeholder.id);
        merge_run_to_top(runs, created);
        self.phase = AttemptPhase::Committed;
    }

    fn roll_back(&mut self, runs: &mut Vec<Run>) {
        runs.retain(|run| run.id != self.placeholder.id);
        self.phase = AttemptPhase::RolledBack;
    }

    fn settled(&self) -> bool {
        self.phase != AttemptPhase::Pending
    }
}

/// Dedupe by id, insert on top.
fn merge_run_to_top(runs: &mut Vec<Run>, run: Run) {
    runs.retain(|existing| existing.id != run.id);
    runs.insert(0, run);
}

/// Single source of truth for project selection, run lists, summaries, and
/// in-flight operations.
///
/// Every public operation swallows its failures into `DashboardState.error`;
/// none of them return a `Result`. Responses are sequence-gated per resource
/// category so a slow reply for an abandoned selection can never overwrite a
/// newer one, and `close` suppresses all further commits.
pub struct DashboardSync<A: RunnerApi> {
    api: A,
    forced_project: Option<String>,
    state_tx: watch::Sender<DashboardState>,
    projects_seq: AtomicU64,
    detail_seq: AtomicU64,
    alive: AtomicBool,
    start_in_flight: AtomicBool,
}

impl<A: RunnerApi> DashboardSync<A> {
    pub fn new(api: A) -> Self {
        Self::build(api, None)
    }

    /// Externally controlled selection: `select_project` becomes a no-op and
    /// project loading never touches the selection.
    pub fn with_forced_project(api: A, project_id: impl Into<String>) -> Self {
        Self::build(api, Some(project_id.into()))
    }

    fn build(api: A, forced_project: Option<String>) -> Self {
        let state = DashboardState {
            selected_project_id: forced_project.clone(),
            ..DashboardState::default()
        };
        let (state_tx, _) = watch::channel(state);
        Self {
            api,
            forced_project,
            state_tx,
            projects_seq: AtomicU64::new(0),
            detail_seq: AtomicU64::new(0),
            alive: AtomicBool::new(true),
            start_in_flight: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.state_tx.subscribe()
    }

    pub fn snapshot(&self) -> DashboardState {
        self.state_tx.borrow().clone()
    }

    pub fn selected_project_id(&self) -> Option<String> {
        self.state_tx.borrow().selected_project_id.clone()
    }

    /// Suppresses every later state commit, including from operations already
    /// past their await point.
    pub fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    fn commit(&self, mutate: impl FnOnce(&mut DashboardState)) {
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }
        self.state_tx.send_modify(mutate);
    }

    fn commit_if_current(
        &self,
        counter: &AtomicU64,
        seq: u64,
        mutate: impl FnOnce(&mut DashboardState),
    ) {
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }
        if counter.load(Ordering::SeqCst) != seq {
            debug!(seq, "discarding stale response");
            return;
        }
        self.state_tx.send_modify(mutate);
    }

    /// Initial boot: projects first, then details for whatever got selected.
    pub async fn bootstrap(&self) {
        self.load_projects().await;
        let selection = self.selected_project_id().unwrap_or_default();
        self.load_summary_and_runs(&selection).await;
    }

    pub async fn load_projects(&self) {
        let seq = self.projects_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.commit(|state| {
            state.loading_projects = true;
            state.error = None;
        });

        match self.api.list_projects().await {
            Ok(projects) => {
                let mut defaulted = None;
                self.commit_if_current(&self.projects_seq, seq, |state| {
                    state.projects = projects;
                    // Idempotent default: only when nothing is selected yet
                    // and the caller is not forcing the selection.
                    if self.forced_project.is_none() && state.selected_project_id.is_none() {
                        state.selected_project_id =
                            state.projects.first().map(|project| project.id.clone());
                        defaulted = state.selected_project_id.clone();
                    }
                    state.loading_projects = false;
                });
                if let Some(project_id) = defaulted {
                    self.load_summary_and_runs(&project_id).await;
                }
            }
            Err(err) => {
                warn!(error = %err, "project load failed");
                self.commit_if_current(&self.projects_seq, seq, |state| {
                    state.error = Some(err.to_string());
                    state.projects.clear();
                    if self.forced_project.is_none() {
                        state.selected_project_id = None;
                    }
                    state.loading_projects = false;
                });
            }
        }
    }

    /// Fetches summary and runs concurrently; one failure aborts both.
    pub async fn load_summary_and_runs(&self, project_id: &str) {
        if project_id.is_empty() {
            self.commit(|state| {
                state.summary = RunSummary::default();
                state.runs.clear();
            });
            return;
        }

        let seq = self.detail_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.commit(|state| {
            state.error = None;
            state.loading_summary = true;
            state.loading_runs = true;
        });

        let (summary, runs) = tokio::join!(
            self.api.latest_summary(project_id),
            self.api.fetch_runs(project_id)
        );

        match (summary, runs) {
            (Ok(summary), Ok(runs)) => {
                self.commit_if_current(&self.detail_seq, seq, |state| {
                    state.summary = summary;
                    state.runs = runs;
                    state.loading_summary = false;
                    state.loading_runs = false;
                });
            }
            (Err(err), _) | (_, Err(err)) => {
                warn!(%project_id, error = %err, "summary/runs load failed");
                self.commit_if_current(&self.detail_seq, seq, |state| {
                    state.error = Some(err.to_string());
                    state.summary = RunSummary::default();
                    state.runs.clear();
                    state.loading_summary = false;
                    state.loading_runs = false;
                });
            }
        }
    }

    /// No-op when the selection is externally controlled; otherwise updates
    /// the selection and reloads its summary and runs.
    pub async fn select_project(&self, project_id: &str) {
        if self.forced_project.is_some() {
            return;
        }
        self.commit(|state| {
            state.selected_project_id = Some(project_id.to_string());
        });
        self.load_summary_and_runs(project_id).await;
    }

    /// Optimistic start: a placeholder run appears at the head of the list
    /// before any network round trip resolves. Guarded so a second call while
    /// one is in flight is a no-op.
    pub async fn start_test(&self) {
        let Some(project_id) = self.selected_project_id() else {
            return;
        };
        if self.start_in_flight.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut attempt = StartAttempt::begin(&project_id);
        self.commit(|state| {
            state.starting = true;
            state.error = None;
            attempt.insert(&mut state.runs);
        });

        match self.api.start_test(&project_id).await {
            Ok(created) => {
                self.commit(|state| {
                    attempt.commit(&mut state.runs, created);
                });
                // Reconcile background drift (delayed status transitions,
                // updated lastRunAt ordering) with a full reload.
                self.load_projects().await;
                self.load_summary_and_runs(&project_id).await;
            }
            Err(err) => {
                warn!(%project_id, error = %err, "start test failed");
                self.commit(|state| {
                    attempt.roll_back(&mut state.runs);
                    state.error = Some(err.to_string());
                });
            }
        }
        debug_assert!(attempt.settled() || !self.alive.load(Ordering::SeqCst));

        self.commit(|state| {
            state.starting = false;
        });
        self.start_in_flight.store(false, Ordering::SeqCst);
    }

    /// Projects first, then details for the current selection.
    pub async fn refresh(&self) {
        self.load_projects().await;
        let selection = self.selected_project_id().unwrap_or_default();
        self.load_summary_and_runs(&selection).await;
    }

    /// Resolves where a run's logs can be opened; the caller owns the actual
    /// opening. None means nothing to open.
    pub fn logs_url(&self, run: &Run) -> Option<String> {
        self.api.logs_url(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rrc_api::{ApiError, StartRunRequest};
    use rrc_core::{ActiveRun, LogEntry, Runner, TaskSpec};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use tokio::time::sleep;

    fn project(id: &str) -> Project {
        Project {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            last_run_at: Some(Utc::now()),
            extra: HashMap::new(),
        }
    }

    fn run(id: &str, project_id: &str, status: RunStatus) -> Run {
        Run {
            id: id.to_string(),
            project_id: project_id.to_string(),
            suite: "default/suite".to_string(),
            status,
            started_at: Utc::now(),
            duration_seconds: None,
            triggered_by: "test".to_string(),
            logs_path: None,
            logs_url: None,
            optimistic: false,
            extra: HashMap::new(),
        }
    }

    /// Scripted backend: per-project run-fetch delays, failure switches, and
    /// an optional gate that blocks start_test until released.
    #[derive(Default)]
    struct StubApi {
        projects: Vec<Project>,
        runs: std::sync::Mutex<HashMap<String, Vec<Run>>>,
        runs_delay_ms: HashMap<String, u64>,
        fail_runs_for: HashSet<String>,
        fail_projects: bool,
        fail_start: bool,
        start_gate: Option<Arc<Semaphore>>,
    }

    impl StubApi {
        fn seed_runs(&self, project_id: &str, runs: Vec<Run>) {
            self.runs
                .lock()
                .unwrap()
                .insert(project_id.to_string(), runs);
        }
    }

    #[async_trait]
    impl RunnerApi for StubApi {
        async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
            if self.fail_projects {
                return Err(ApiError::Validation("projects unavailable".to_string()));
            }
            Ok(self.projects.clone())
        }

        async fn latest_summary(&self, project_id: &str) -> Result<RunSummary, ApiError> {
            let runs = self.fetch_runs(project_id).await?;
            Ok(RunSummary::of(&runs))
        }

        async fn fetch_runs(&self, project_id: &str) -> Result<Vec<Run>, ApiError> {
            if let Some(delay) = self.runs_delay_ms.get(project_id) {
                sleep(Duration::from_millis(*delay)).await;
            }
            if self.fail_runs_for.contains(project_id) {
                return Err(ApiError::Http {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(self
                .runs
                .lock()
                .unwrap()
                .get(project_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn start_test(&self, project_id: &str) -> Result<Run, ApiError> {
            if let Some(gate) = &self.start_gate {
                let permit = gate.acquire().await.expect("gate closed");
                permit.forget();
            }
            if self.fail_start {
                return Err(ApiError::Http {
                    status: 502,
                    body: "runner pool exhausted".to_string(),
                });
            }
            let created = run("run-created", project_id, RunStatus::Queued);
            self.runs
                .lock()
                .unwrap()
                .entry(project_id.to_string())
                .or_default()
                .insert(0, created.clone());
            Ok(created)
        }

        fn logs_url(&self, run: &Run) -> Option<String> {
            if run.id.is_empty() {
                None
            } else {
                Some(format!("/runs/{}/logs", run.id))
            }
        }

        async fn list_tasks(&self) -> Result<Vec<TaskSpec>, ApiError> {
            Ok(Vec::new())
        }

        async fn list_runners(&self) -> Result<Vec<Runner>, ApiError> {
            Ok(Vec::new())
        }

        async fn list_active_runs(&self) -> Result<Vec<ActiveRun>, ApiError> {
            Ok(Vec::new())
        }

        async fn fetch_logs(&self, _limit: usize) -> Result<Vec<LogEntry>, ApiError> {
            Ok(Vec::new())
        }

        async fn start_task_run(&self, _request: &StartRunRequest) -> Result<ActiveRun, ApiError> {
            Err(ApiError::Validation("not scripted".to_string()))
        }

        async fn stop_run(&self, _run_id: &str) -> Result<(), ApiError> {
            Err(ApiError::Validation("not scripted".to_string()))
        }
    }

    fn two_project_stub() -> StubApi {
        let stub = StubApi {
            projects: vec![project("proj-1"), project("proj-2")],
            ..StubApi::default()
        };
        stub.seed_runs(
            "proj-1",
            vec![
                run("run-11", "proj-1", RunStatus::Passed),
                run("run-12", "proj-1", RunStatus::Failed),
            ],
        );
        stub.seed_runs("proj-2", vec![run("run-21", "proj-2", RunStatus::Running)]);
        stub
    }

    #[tokio::test]
    async fn bootstrap_defaults_selection_and_loads_details() {
        let sync = DashboardSync::new(two_project_stub());
        sync.bootstrap().await;

        let state = sync.snapshot();
        assert_eq!(state.selected_project_id.as_deref(), Some("proj-1"));
        assert_eq!(state.runs.len(), 2);
        assert_eq!(state.summary.passed, 1);
        assert_eq!(state.summary.failed, 1);
        assert_eq!(state.summary.total(), state.runs.len());
        assert!(state.error.is_none());
        assert!(!state.loading_projects);
    }

    #[tokio::test]
    async fn default_selection_never_overrides_existing_choice() {
        let sync = DashboardSync::new(two_project_stub());
        sync.bootstrap().await;
        sync.select_project("proj-2").await;
        sync.load_projects().await;

        let state = sync.snapshot();
        assert_eq!(state.selected_project_id.as_deref(), Some("proj-2"));
    }

    #[tokio::test]
    async fn forced_selection_ignores_select_and_defaulting() {
        let sync = DashboardSync::with_forced_project(two_project_stub(), "proj-2");
        sync.bootstrap().await;
        sync.select_project("proj-1").await;

        let state = sync.snapshot();
        assert_eq!(state.selected_project_id.as_deref(), Some("proj-2"));
        assert_eq!(state.runs.len(), 1);
    }

    #[tokio::test]
    async fn stale_detail_responses_are_discarded() {
        let mut stub = two_project_stub();
        stub.runs_delay_ms.insert("proj-1".to_string(), 80);
        let sync = Arc::new(DashboardSync::new(stub));

        sync.load_projects().await;
        let slow = Arc::clone(&sync);
        let slow_task = tokio::spawn(async move {
            slow.load_summary_and_runs("proj-1").await;
        });
        sleep(Duration::from_millis(10)).await;
        sync.select_project("proj-2").await;
        slow_task.await.unwrap();

        let state = sync.snapshot();
        assert_eq!(state.selected_project_id.as_deref(), Some("proj-2"));
        assert_eq!(state.runs.len(), 1);
        assert_eq!(state.runs[0].id, "run-21");
        assert_eq!(state.summary.running, 1);
    }

    #[tokio::test]
    async fn start_test_shows_placeholder_then_exactly_one_real_run() {
        let gate = Arc::new(Semaphore::new(0));
        let mut stub = two_project_stub();
        stub.start_gate = Some(Arc::clone(&gate));
        let sync = Arc::new(DashboardSync::new(stub));
        sync.bootstrap().await;

        let starter = Arc::clone(&sync);
        let start_task = tokio::spawn(async move {
            starter.start_test().await;
        });
        sleep(Duration::from_millis(10)).await;

        let mid_flight = sync.snapshot();
        assert!(mid_flight.starting);
        assert!(mid_flight.runs[0].optimistic);
        assert!(mid_flight.runs[0].id.starts_with("optimistic-"));

        gate.add_permits(1);
        start_task.await.unwrap();

        let settled = sync.snapshot();
        assert!(!settled.starting);
        assert!(settled.runs.iter().all(|run| !run.optimistic));
        let created = settled
            .runs
            .iter()
            .filter(|run| run.id == "run-created")
            .count();
        assert_eq!(created, 1);
        assert_eq!(settled.runs.len(), 3);
        assert_eq!(settled.summary.total(), settled.runs.len());
    }

    #[tokio::test]
    async fn second_start_while_in_flight_is_a_no_op() {
        let gate = Arc::new(Semaphore::new(0));
        let mut stub = two_project_stub();
        stub.start_gate = Some(Arc::clone(&gate));
        let sync = Arc::new(DashboardSync::new(stub));
        sync.bootstrap().await;
        let baseline = sync.snapshot().runs.len();

        let first = Arc::clone(&sync);
        let first_task = tokio::spawn(async move { first.start_test().await });
        sleep(Duration::from_millis(10)).await;
        sync.start_test().await; // guarded: returns immediately

        let mid_flight = sync.snapshot();
        let placeholders = mid_flight.runs.iter().filter(|run| run.optimistic).count();
        assert_eq!(placeholders, 1);
        assert_eq!(mid_flight.runs.len(), baseline + 1);

        gate.add_permits(2);
        first_task.await.unwrap();
    }

    #[tokio::test]
    async fn failed_start_restores_the_run_list() {
        let mut stub = two_project_stub();
        stub.fail_start = true;
        let sync = DashboardSync::new(stub);
        sync.bootstrap().await;
        let before = sync.snapshot().runs.clone();

        sync.start_test().await;

        let state = sync.snapshot();
        assert_eq!(state.runs, before);
        assert!(!state.starting);
        let message = state.error.expect("error surfaced");
        assert!(message.contains("502"));
    }

    #[tokio::test]
    async fn start_without_selection_is_a_no_op() {
        let stub = StubApi::default();
        let sync = DashboardSync::new(stub);
        sync.start_test().await;
        let state = sync.snapshot();
        assert!(state.runs.is_empty());
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn detail_failure_aborts_both_summary_and_runs() {
        let mut stub = two_project_stub();
        stub.fail_runs_for.insert("proj-1".to_string());
        let sync = DashboardSync::new(stub);
        sync.load_summary_and_runs("proj-1").await;

        let state = sync.snapshot();
        assert!(state.runs.is_empty());
        assert_eq!(state.summary, RunSummary::default());
        assert!(state.error.is_some());
        assert!(!state.loading_summary);
        assert!(!state.loading_runs);
    }

    #[tokio::test]
    async fn empty_selection_resets_details_without_fetching() {
        let sync = DashboardSync::new(two_project_stub());
        sync.load_summary_and_runs("").await;
        let state = sync.snapshot();
        assert!(state.runs.is_empty());
        assert_eq!(state.summary, RunSummary::default());
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn project_failure_clears_list_and_selection() {
        let mut stub = two_project_stub();
        stub.fail_projects = true;
        let sync = DashboardSync::new(stub);
        sync.load_projects().await;

        let state = sync.snapshot();
        assert!(state.projects.is_empty());
        assert!(state.selected_project_id.is_none());
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn close_suppresses_all_further_commits() {
        let sync = DashboardSync::new(two_project_stub());
        sync.bootstrap().await;
        let before = sync.snapshot();

        sync.close();
        sync.select_project("proj-2").await;
        sync.refresh().await;

        let after = sync.snapshot();
        assert_eq!(after.selected_project_id, before.selected_project_id);
        assert_eq!(after.runs.len(), before.runs.len());
    }

    #[tokio::test]
    async fn logs_url_delegates_to_the_api() {
        let sync = DashboardSync::new(two_project_stub());
        let sample = run("run-11", "proj-1", RunStatus::Passed);
        assert_eq!(
            sync.logs_url(&sample).as_deref(),
            Some("/runs/run-11/logs")
        );
        let mut missing = sample.clone();
        missing.id = String::new();
        assert!(sync.logs_url(&missing).is_none());
    }

    #[test]
    fn merge_run_to_top_dedupes_by_id() {
        let mut runs = vec![
            run("run-1", "proj-1", RunStatus::Passed),
            run("run-2", "proj-1", RunStatus::Failed),
        ];
        merge_run_to_top(&mut runs, run("run-2", "proj-1", RunStatus::Queued));
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, "run-2");
        assert_eq!(runs[0].status, RunStatus::Queued);
    }

    #[test]
    fn start_attempt_settles_exactly_once() {
        let mut runs = Vec::new();
        let mut attempt = StartAttempt::begin("proj-1");
        attempt.insert(&mut runs);
        assert!(!attempt.settled());
        assert!(runs[0].optimistic);

        attempt.commit(&mut runs, run("run-real", "proj-1", RunStatus::Queued));
        assert!(attempt.settled());
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, "run-real");
        assert!(!runs[0].optimistic);
    }

    #[test]
    fn start_attempt_rollback_leaves_prior_list() {
        let mut runs = vec![run("run-1", "proj-1", RunStatus::Passed)];
        let mut attempt = StartAttempt::begin("proj-1");
        attempt.insert(&mut runs);
        assert_eq!(runs.len(), 2);

        attempt.roll_back(&mut runs);
        assert!(attempt.settled());
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, "run-1");
    }
}
