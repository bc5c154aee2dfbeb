use crate::{client::StartRunRequest, ApiError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rrc_core::{
    ActiveRun, ActiveRunStatus, LogEntry, LogLevel, Project, Run, RunStatus, RunSummary, Runner,
    RunnerStatus, TaskSpec,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::sleep;
use tracing::debug;

const LOG_CAPACITY: usize = 500;

/// Simulated backend. State lives behind one mutex; spawned progression
/// timers re-lock it, so calls from any runtime thread stay consistent.
#[derive(Clone)]
pub struct MockBackend {
    store: Arc<Mutex<MockStore>>,
    read_latency: LatencyRange,
    start_latency: LatencyRange,
    queued_delay: Duration,
    terminal_delay: Duration,
    fail_permille: u32,
    now: fn() -> DateTime<Utc>,
}

/// Millisecond latency window applied to simulated calls. A zero `max_ms`
/// disables the sleep entirely, which is what deterministic tests want.
#[derive(Debug, Clone, Copy)]
pub struct LatencyRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl LatencyRange {
    pub const fn none() -> Self {
        Self {
            min_ms: 0,
            max_ms: 0,
        }
    }
}

pub struct MockOptions {
    pub projects: Vec<Project>,
    pub runs: Vec<Run>,
    pub tasks: Vec<TaskSpec>,
    pub runners: Vec<Runner>,
    pub logs: Vec<LogEntry>,
    pub read_latency: LatencyRange,
    pub start_latency: LatencyRange,
    /// Delay before a queued run flips to running.
    pub queued_delay: Duration,
    /// Delay before a started run settles to passed or failed.
    pub terminal_delay: Duration,
    /// Failure probability of a settled run, in permille.
    pub fail_permille: u32,
    pub seed: u64,
    pub now: fn() -> DateTime<Utc>,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            projects: Vec::new(),
            runs: Vec::new(),
            tasks: Vec::new(),
            runners: Vec::new(),
            logs: Vec::new(),
            read_latency: LatencyRange {
                min_ms: 180,
                max_ms: 520,
            },
            start_latency: LatencyRange {
                min_ms: 260,
                max_ms: 720,
            },
            queued_delay: Duration::from_millis(900),
            terminal_delay: Duration::from_millis(3800),
            fail_permille: 180,
            seed: clock_seed(),
            now: Utc::now,
        }
    }
}

impl MockOptions {
    /// Deterministic variant for tests: fixed seed, no latency, compressed
    /// progression schedule.
    pub fn deterministic(seed: u64) -> Self {
        Self {
            read_latency: LatencyRange::none(),
            start_latency: LatencyRange::none(),
            queued_delay: Duration::from_millis(20),
            terminal_delay: Duration::from_millis(60),
            seed,
            ..Self::default()
        }
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_nanos() as u64)
        .unwrap_or(1)
}

struct MockStore {
    projects: Vec<Project>,
    runs_by_project: HashMap<String, Vec<Run>>,
    tasks: Vec<TaskSpec>,
    runners: Vec<Runner>,
    active_runs: Vec<ActiveRun>,
    logs: VecDeque<LogEntry>,
    rng: XorShift,
}

impl MockStore {
    fn push_log(&mut self, ts: DateTime<Utc>, level: LogLevel, source: &str, message: String) {
        if self.logs.len() == LOG_CAPACITY {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry {
            ts,
            level,
            source: source.to_string(),
            message,
        });
    }
}

/// xorshift64* over an FNV-mixed seed. Good enough for jitter and pass/fail
/// draws; reproducible from `MockOptions.seed`.
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        let mut mixed: u64 = 1469598103934665603 ^ seed;
        mixed = mixed.wrapping_mul(1099511628211);
        Self(mixed.max(1))
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    fn in_range(&mut self, min: u64, max: u64) -> u64 {
        if max <= min {
            return min;
        }
        min + self.next() % (max - min + 1)
    }

    fn permille(&mut self) -> u32 {
        (self.next() % 1000) as u32
    }
}

impl MockBackend {
    pub fn new(options: MockOptions) -> Self {
        let mut runs_by_project: HashMap<String, Vec<Run>> = HashMap::new();
        for run in options.runs {
            runs_by_project
                .entry(run.project_id.clone())
                .or_default()
                .push(run);
        }

        let mut logs = VecDeque::with_capacity(LOG_CAPACITY);
        logs.extend(options.logs);

        let store = MockStore {
            projects: options.projects,
            runs_by_project,
            tasks: options.tasks,
            runners: options.runners,
            active_runs: Vec::new(),
            logs,
            rng: XorShift::new(options.seed),
        };

        Self {
            store: Arc::new(Mutex::new(store)),
            read_latency: options.read_latency,
            start_latency: options.start_latency,
            queued_delay: options.queued_delay,
            terminal_delay: options.terminal_delay,
            fail_permille: options.fail_permille,
            now: options.now,
        }
    }

    /// Stock fixture set: three robot-automation projects with run history,
    /// a task library, and a runner fleet.
    pub fn seeded() -> Self {
        let options = MockOptions::default();
        Self::with_seed_data(options)
    }

    pub fn with_seed_data(mut options: MockOptions) -> Self {
        let now = (options.now)();
        options.projects = seed_projects(now);
        options.runs = seed_runs(now);
        options.tasks = seed_tasks();
        options.runners = seed_runners();
        options.logs = seed_logs(now);
        Self::new(options)
    }

    async fn simulate_latency(&self, range: LatencyRange) {
        if range.max_ms == 0 {
            return;
        }
        let jitter = {
            let mut store = self.store.lock().expect("mock store poisoned");
            store.rng.in_range(range.min_ms, range.max_ms)
        };
        sleep(Duration::from_millis(jitter)).await;
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        self.simulate_latency(self.read_latency).await;
        let store = self.store.lock().expect("mock store poisoned");
        let mut projects = store.projects.clone();
        // Most recently run first; projects that never ran sort last.
        projects.sort_by(|a, b| b.last_run_at.cmp(&a.last_run_at));
        Ok(projects)
    }

    pub async fn fetch_runs(&self, project_id: &str) -> Result<Vec<Run>, ApiError> {
        self.simulate_latency(self.read_latency).await;
        if project_id.is_empty() {
            return Ok(Vec::new());
        }
        let store = self.store.lock().expect("mock store poisoned");
        let mut runs = store
            .runs_by_project
            .get(project_id)
            .cloned()
            .unwrap_or_default();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    pub async fn latest_summary(&self, project_id: &str) -> Result<RunSummary, ApiError> {
        self.simulate_latency(self.read_latency).await;
        if project_id.is_empty() {
            return Ok(RunSummary::default());
        }
        let store = self.store.lock().expect("mock store poisoned");
        let runs = store
            .runs_by_project
            .get(project_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(RunSummary::of(runs))
    }

    pub async fn start_test(&self, project_id: &str) -> Result<Run, ApiError> {
        self.simulate_latency(self.start_latency).await;
        if project_id.is_empty() {
            return Err(ApiError::Validation(
                "projectId is required to start a test".to_string(),
            ));
        }

        let now = (self.now)();
        let run = {
            let mut store = self.store.lock().expect("mock store poisoned");
            let suffix = store.rng.in_range(1000, 9999);
            let run_id = format!("run-{}-{suffix}", now.timestamp_millis());
            let run = Run {
                id: run_id.clone(),
                project_id: project_id.to_string(),
                suite: "default/suite".to_string(),
                status: RunStatus::Queued,
                started_at: now,
                duration_seconds: None,
                triggered_by: "ui".to_string(),
                logs_path: Some(format!("/mock/logs/{run_id}")),
                logs_url: None,
                optimistic: false,
                extra: HashMap::new(),
            };

            store
                .runs_by_project
                .entry(project_id.to_string())
                .or_default()
                .insert(0, run.clone());
            if let Some(project) = store
                .projects
                .iter_mut()
                .find(|project| project.id == project_id)
            {
                project.last_run_at = Some(now);
            }
            store.push_log(
                now,
                LogLevel::Info,
                "mock",
                format!("run {run_id} queued for {project_id}"),
            );
            run
        };

        self.schedule_progression(project_id.to_string(), run.id.clone());
        Ok(run)
    }

    /// Two independent, non-cancelable timers: queued -> running, then
    /// running -> passed|failed. Mirrors how a real scheduler drifts state
    /// underneath the client between refreshes.
    fn schedule_progression(&self, project_id: String, run_id: String) {
        let store = Arc::clone(&self.store);
        let queued_delay = self.queued_delay;
        let run = run_id.clone();
        let project = project_id.clone();
        tokio::spawn(async move {
            sleep(queued_delay).await;
            let mut store = store.lock().expect("mock store poisoned");
            let duration = store.rng.in_range(15, 95);
            if let Some(found) = find_run(&mut store, &project, &run) {
                if found.status == RunStatus::Queued {
                    found.status = RunStatus::Running;
                    found.duration_seconds = Some(duration);
                }
            }
        });

        let store = Arc::clone(&self.store);
        let terminal_delay = self.terminal_delay;
        let fail_permille = self.fail_permille;
        tokio::spawn(async move {
            sleep(terminal_delay).await;
            let mut store = store.lock().expect("mock store poisoned");
            let failed = store.rng.permille() < fail_permille;
            let duration = store.rng.in_range(90, 690);
            if let Some(found) = find_run(&mut store, &project_id, &run_id) {
                found.status = if failed {
                    RunStatus::Failed
                } else {
                    RunStatus::Passed
                };
                found.duration_seconds = Some(duration);
            }
        });
    }

    pub async fn list_tasks(&self) -> Result<Vec<TaskSpec>, ApiError> {
        self.simulate_latency(self.read_latency).await;
        let store = self.store.lock().expect("mock store poisoned");
        Ok(store.tasks.clone())
    }

    pub async fn list_runners(&self) -> Result<Vec<Runner>, ApiError> {
        self.simulate_latency(self.read_latency).await;
        let store = self.store.lock().expect("mock store poisoned");
        Ok(store.runners.clone())
    }

    pub async fn list_active_runs(&self) -> Result<Vec<ActiveRun>, ApiError> {
        self.simulate_latency(self.read_latency).await;
        let store = self.store.lock().expect("mock store poisoned");
        Ok(store.active_runs.clone())
    }

    pub async fn fetch_logs(&self, limit: usize) -> Result<Vec<LogEntry>, ApiError> {
        self.simulate_latency(self.read_latency).await;
        let store = self.store.lock().expect("mock store poisoned");
        let skip = store.logs.len().saturating_sub(limit);
        Ok(store.logs.iter().skip(skip).cloned().collect())
    }

    pub async fn start_task_run(&self, request: &StartRunRequest) -> Result<ActiveRun, ApiError> {
        self.simulate_latency(self.start_latency).await;
        if request.runner_id.is_empty() || request.task_id.is_empty() {
            return Err(ApiError::Validation(
                "runnerId and taskId are required to start a run".to_string(),
            ));
        }

        let now = (self.now)();
        let active = {
            let mut store = self.store.lock().expect("mock store poisoned");
            if !store.tasks.iter().any(|task| task.id == request.task_id) {
                return Err(ApiError::Validation(format!(
                    "unknown task: {}",
                    request.task_id
                )));
            }
            let Some(runner) = store
                .runners
                .iter_mut()
                .find(|runner| runner.id == request.runner_id)
            else {
                return Err(ApiError::Validation(format!(
                    "unknown runner: {}",
                    request.runner_id
                )));
            };
            runner.status = RunnerStatus::Busy;

            let suffix = store.rng.in_range(1000, 9999);
            let active = ActiveRun {
                run_id: format!("arun-{}-{suffix}", now.timestamp_millis()),
                task_id: request.task_id.clone(),
                runner_id: request.runner_id.clone(),
                status: ActiveRunStatus::Running,
                progress_percent: Some(5),
                started_at: now,
                extra: HashMap::new(),
            };
            store.active_runs.push(active.clone());
            store.push_log(
                now,
                LogLevel::Info,
                "mock",
                format!(
                    "run {} started: task {} on runner {}",
                    active.run_id, request.task_id, request.runner_id
                ),
            );
            active
        };

        self.schedule_active_completion(active.run_id.clone());
        Ok(active)
    }

    fn schedule_active_completion(&self, run_id: String) {
        let store = Arc::clone(&self.store);
        let terminal_delay = self.terminal_delay;
        let now = self.now;
        tokio::spawn(async move {
            sleep(terminal_delay).await;
            let mut store = store.lock().expect("mock store poisoned");
            let Some(index) = store
                .active_runs
                .iter()
                .position(|active| active.run_id == run_id)
            else {
                return;
            };
            let finished = store.active_runs.remove(index);
            if let Some(runner) = store
                .runners
                .iter_mut()
                .find(|runner| runner.id == finished.runner_id)
            {
                runner.status = RunnerStatus::Idle;
            }
            store.push_log(
                now(),
                LogLevel::Info,
                "mock",
                format!("run {run_id} finished"),
            );
        });
    }

    pub async fn stop_run(&self, run_id: &str) -> Result<(), ApiError> {
        self.simulate_latency(self.start_latency).await;
        let now = (self.now)();
        {
            let mut store = self.store.lock().expect("mock store poisoned");
            let Some(active) = store
                .active_runs
                .iter_mut()
                .find(|active| active.run_id == run_id)
            else {
                return Err(ApiError::Validation(format!("unknown run: {run_id}")));
            };
            active.status = ActiveRunStatus::Stopping;
            store.push_log(
                now,
                LogLevel::Warn,
                "mock",
                format!("stop requested for run {run_id}"),
            );
        }

        // Stop confirmation arrives shortly after, freeing the runner.
        let store = Arc::clone(&self.store);
        let queued_delay = self.queued_delay;
        let run_id = run_id.to_string();
        let now = self.now;
        let task_run_id = run_id.clone();
        tokio::spawn(async move {
            let run_id = task_run_id;
            sleep(queued_delay).await;
            let mut store = store.lock().expect("mock store poisoned");
            let Some(index) = store
                .active_runs
                .iter()
                .position(|active| active.run_id == run_id)
            else {
                return;
            };
            let stopped = store.active_runs.remove(index);
            if let Some(runner) = store
                .runners
                .iter_mut()
                .find(|runner| runner.id == stopped.runner_id)
            {
                runner.status = RunnerStatus::Idle;
            }
            store.push_log(
                now(),
                LogLevel::Warn,
                "mock",
                format!("run {run_id} stopped"),
            );
        });
        debug!(%run_id, "mock stop scheduled");
        Ok(())
    }
}

fn find_run<'a>(store: &'a mut MockStore, project_id: &str, run_id: &str) -> Option<&'a mut Run> {
    store
        .runs_by_project
        .get_mut(project_id)?
        .iter_mut()
        .find(|run| run.id == run_id)
}

fn seed_projects(now: DateTime<Utc>) -> Vec<Project> {
    let project = |id: &str, name: &str, description: &str, hours_ago: i64| Project {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        last_run_at: Some(now - ChronoDuration::hours(hours_ago)),
        extra: HashMap::new(),
    };
    vec![
        project("proj-1", "Warehouse Regression", "Nightly E2E suite", 2),
        project("proj-2", "Robot Arm Calibration", "Calibration validations", 6),
        project("proj-3", "Navigation Smoke", "Quick smoke checks", 28),
    ]
}

fn seed_runs(now: DateTime<Utc>) -> Vec<Run> {
    let run = |id: &str,
               project_id: &str,
               suite: &str,
               status: RunStatus,
               minutes_ago: i64,
               duration: Option<u64>,
               triggered_by: &str| Run {
        id: id.to_string(),
        project_id: project_id.to_string(),
        suite: suite.to_string(),
        status,
        started_at: now - ChronoDuration::minutes(minutes_ago),
        duration_seconds: duration,
        triggered_by: triggered_by.to_string(),
        logs_path: Some(format!("/mock/logs/{id}")),
        logs_url: None,
        optimistic: false,
        extra: HashMap::new(),
    };
    vec![
        run(
            "run-1024",
            "proj-1",
            "e2e/warehouse",
            RunStatus::Passed,
            2 * 60,
            Some(562),
            "scheduler",
        ),
        run(
            "run-1023",
            "proj-1",
            "e2e/warehouse",
            RunStatus::Failed,
            5 * 60,
            Some(611),
            "alex",
        ),
        run(
            "run-1018",
            "proj-1",
            "e2e/warehouse",
            RunStatus::Passed,
            27 * 60,
            Some(534),
            "api",
        ),
        run(
            "run-2042",
            "proj-2",
            "calibration/arm",
            RunStatus::Passed,
            6 * 60,
            Some(312),
            "sam",
        ),
        run(
            "run-2041",
            "proj-2",
            "calibration/arm",
            RunStatus::Queued,
            6 * 60 + 12,
            None,
            "scheduler",
        ),
        run(
            "run-3007",
            "proj-3",
            "smoke/navigation",
            RunStatus::Running,
            25,
            Some(190),
            "api",
        ),
        run(
            "run-3006",
            "proj-3",
            "smoke/navigation",
            RunStatus::Passed,
            29 * 60,
            Some(144),
            "scheduler",
        ),
    ]
}

fn seed_tasks() -> Vec<TaskSpec> {
    let task = |id: &str, name: &str, description: &str, tags: &[&str], estimate: u64| TaskSpec {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
        estimated_duration_seconds: Some(estimate),
        extra: HashMap::new(),
    };
    vec![
        task(
            "task-pick-pack",
            "Pick & Pack Cycle",
            "Full warehouse pick and pack loop",
            &["e2e", "warehouse"],
            600,
        ),
        task(
            "task-arm-cal",
            "Arm Calibration Sweep",
            "Joint calibration across all axes",
            &["calibration"],
            320,
        ),
        task(
            "task-nav-smoke",
            "Navigation Smoke",
            "Waypoint navigation sanity pass",
            &["smoke", "navigation"],
            180,
        ),
    ]
}

fn seed_runners() -> Vec<Runner> {
    let runner = |id: &str, name: &str, status: RunnerStatus, capabilities: &[&str]| Runner {
        id: id.to_string(),
        name: name.to_string(),
        status,
        capabilities: capabilities.iter().map(|cap| cap.to_string()).collect(),
        extra: HashMap::new(),
    };
    vec![
        runner(
            "runner-alpha",
            "Alpha Cell",
            RunnerStatus::Idle,
            &["warehouse", "vision"],
        ),
        runner(
            "runner-beta",
            "Beta Cell",
            RunnerStatus::Busy,
            &["calibration"],
        ),
        runner(
            "runner-gamma",
            "Gamma Cell",
            RunnerStatus::Offline,
            &["navigation"],
        ),
    ]
}

fn seed_logs(now: DateTime<Utc>) -> Vec<LogEntry> {
    let entry = |minutes_ago: i64, level: LogLevel, message: &str| LogEntry {
        ts: now - ChronoDuration::minutes(minutes_ago),
        level,
        source: "mock".to_string(),
        message: message.to_string(),
    };
    vec![
        entry(40, LogLevel::Info, "runner fleet heartbeat ok"),
        entry(25, LogLevel::Info, "run run-3007 started on runner-gamma"),
        entry(12, LogLevel::Warn, "runner-gamma battery below 30%"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn deterministic_backend() -> MockBackend {
        let mut options = MockOptions::deterministic(7);
        options.now = fixed_now;
        MockBackend::with_seed_data(options)
    }

    #[tokio::test]
    async fn projects_sort_most_recent_first() {
        let backend = deterministic_backend();
        let projects = backend.list_projects().await.unwrap();
        let ids: Vec<&str> = projects.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["proj-1", "proj-2", "proj-3"]);
    }

    #[tokio::test]
    async fn seeded_summary_matches_run_history() {
        let backend = deterministic_backend();
        let summary = backend.latest_summary("proj-1").await.unwrap();
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.running, 0);
        assert_eq!(summary.queued, 0);
    }

    #[tokio::test]
    async fn runs_for_unknown_or_empty_project_are_empty() {
        let backend = deterministic_backend();
        assert!(backend.fetch_runs("").await.unwrap().is_empty());
        assert!(backend.fetch_runs("proj-404").await.unwrap().is_empty());
        let summary = backend.latest_summary("proj-404").await.unwrap();
        assert_eq!(summary, RunSummary::default());
    }

    #[tokio::test]
    async fn start_test_requires_a_project_id() {
        let backend = deterministic_backend();
        let err = backend.start_test("").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn started_run_progresses_queued_running_terminal() {
        let backend = deterministic_backend();
        let created = backend.start_test("proj-2").await.unwrap();
        assert_eq!(created.status, RunStatus::Queued);
        assert_eq!(created.triggered_by, "ui");

        let head = &backend.fetch_runs("proj-2").await.unwrap()[0];
        assert_eq!(head.id, created.id);

        sleep(Duration::from_millis(40)).await;
        let after_short = backend.fetch_runs("proj-2").await.unwrap();
        let found = after_short.iter().find(|run| run.id == created.id).unwrap();
        assert_eq!(found.status, RunStatus::Running);

        sleep(Duration::from_millis(60)).await;
        let after_long = backend.fetch_runs("proj-2").await.unwrap();
        let found = after_long.iter().find(|run| run.id == created.id).unwrap();
        assert!(found.status.is_terminal());
        assert!(found.duration_seconds.unwrap() >= 90);
    }

    #[tokio::test]
    async fn start_test_bumps_project_last_run_at() {
        let backend = deterministic_backend();
        backend.start_test("proj-3").await.unwrap();
        let projects = backend.list_projects().await.unwrap();
        assert_eq!(projects[0].id, "proj-3");
        assert_eq!(projects[0].last_run_at, Some(fixed_now()));
    }

    #[tokio::test]
    async fn task_run_lifecycle_marks_runner_busy_then_idle() {
        let backend = deterministic_backend();
        let request = StartRunRequest {
            runner_id: "runner-alpha".to_string(),
            task_id: "task-nav-smoke".to_string(),
            parameters: serde_json::json!({"speed": "normal"}),
        };
        let active = backend.start_task_run(&request).await.unwrap();
        assert_eq!(active.status, ActiveRunStatus::Running);

        let runners = backend.list_runners().await.unwrap();
        let alpha = runners.iter().find(|r| r.id == "runner-alpha").unwrap();
        assert_eq!(alpha.status, RunnerStatus::Busy);

        sleep(Duration::from_millis(90)).await;
        assert!(backend.list_active_runs().await.unwrap().is_empty());
        let runners = backend.list_runners().await.unwrap();
        let alpha = runners.iter().find(|r| r.id == "runner-alpha").unwrap();
        assert_eq!(alpha.status, RunnerStatus::Idle);
    }

    #[tokio::test]
    async fn stop_run_rejects_unknown_ids_and_stops_known_ones() {
        let backend = deterministic_backend();
        let err = backend.stop_run("arun-nope").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let request = StartRunRequest {
            runner_id: "runner-alpha".to_string(),
            task_id: "task-arm-cal".to_string(),
            parameters: serde_json::Value::Null,
        };
        let active = backend.start_task_run(&request).await.unwrap();
        backend.stop_run(&active.run_id).await.unwrap();
        let runs = backend.list_active_runs().await.unwrap();
        assert_eq!(runs[0].status, ActiveRunStatus::Stopping);

        sleep(Duration::from_millis(40)).await;
        assert!(backend.list_active_runs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_logs_honors_limit_and_appends_run_events() {
        let backend = deterministic_backend();
        backend.start_test("proj-1").await.unwrap();
        let logs = backend.fetch_logs(250).await.unwrap();
        assert!(logs.len() >= 4);
        assert!(logs.last().unwrap().message.contains("queued for proj-1"));

        let tail = backend.fetch_logs(2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.last().unwrap().message, logs.last().unwrap().message);
    }
}
