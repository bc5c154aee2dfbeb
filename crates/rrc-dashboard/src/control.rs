use rrc_api::{ChannelStatus, RealtimeEvent, RunnerApi, StartRunRequest};
use rrc_core::{ActiveRun, LogEntry, Runner, TaskSpec};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, warn};

const LOG_FETCH_LIMIT: usize = 250;
const MAX_NOTICES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeTone {
    Info,
    Success,
    Warn,
    Error,
}

/// Transient operator feedback ("Run started", "Stop requested"). The view
/// decides how long to show these; `dismiss_notice` drops one by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub title: String,
    pub message: String,
    pub tone: NoticeTone,
}

#[derive(Debug, Clone, Default)]
pub struct ControlState {
    pub tasks: Vec<TaskSpec>,
    pub runners: Vec<Runner>,
    pub active_runs: Vec<ActiveRun>,
    pub logs: Vec<LogEntry>,
    pub selected_task_id: String,
    pub selected_runner_id: String,
    pub realtime: Option<ChannelStatus>,
    pub notices: Vec<Notice>,
}

impl ControlState {
    pub fn selected_task(&self) -> Option<&TaskSpec> {
        self.tasks.iter().find(|task| task.id == self.selected_task_id)
    }

    pub fn selected_runner(&self) -> Option<&Runner> {
        self.runners
            .iter()
            .find(|runner| runner.id == self.selected_runner_id)
    }

    /// Active runs scoped to the selected runner.
    pub fn runs_for_selection(&self) -> Vec<&ActiveRun> {
        self.active_runs
            .iter()
            .filter(|run| run.runner_id == self.selected_runner_id)
            .collect()
    }
}

/// Runner-control surface: task/runner selection, active runs, the log tail,
/// and the start/stop operations with operator notices. Refreshes are
/// all-or-nothing; a poll-driven refresh that fails leaves the previous state
/// on screen rather than tearing half of it down.
pub struct ControlSync<A: RunnerApi> {
    api: A,
    state_tx: watch::Sender<ControlState>,
    notice_seq: AtomicU64,
    alive: AtomicBool,
}

impl<A: RunnerApi> ControlSync<A> {
    pub fn new(api: A) -> Self {
        let (state_tx, _) = watch::channel(ControlState::default());
        Self {
            api,
            state_tx,
            notice_seq: AtomicU64::new(0),
            alive: AtomicBool::new(true),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ControlState> {
        self.state_tx.subscribe()
    }

    pub fn snapshot(&self) -> ControlState {
        self.state_tx.borrow().clone()
    }

    pub fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    fn commit(&self, mutate: impl FnOnce(&mut ControlState)) {
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }
        self.state_tx.send_modify(mutate);
    }

    /// Fetches tasks, runners, active runs, and the log tail concurrently and
    /// commits them together. Any failure leaves state untouched.
    pub async fn refresh_all(&self) -> Result<(), String> {
        let (tasks, runners, active_runs, logs) = tokio::join!(
            self.api.list_tasks(),
            self.api.list_runners(),
            self.api.list_active_runs(),
            self.api.fetch_logs(LOG_FETCH_LIMIT)
        );

        match (tasks, runners, active_runs, logs) {
            (Ok(tasks), Ok(runners), Ok(active_runs), Ok(logs)) => {
                self.commit(|state| {
                    state.tasks = tasks;
                    state.runners = runners;
                    state.active_runs = active_runs;
                    state.logs = logs;
                });
                Ok(())
            }
            (tasks, runners, active_runs, logs) => {
                let err = [
                    tasks.err().map(|e| e.to_string()),
                    runners.err().map(|e| e.to_string()),
                    active_runs.err().map(|e| e.to_string()),
                    logs.err().map(|e| e.to_string()),
                ]
                .into_iter()
                .flatten()
                .next()
                .unwrap_or_else(|| "refresh failed".to_string());
                warn!(error = %err, "control refresh failed");
                Err(err)
            }
        }
    }

    pub fn set_selection(&self, task_id: Option<&str>, runner_id: Option<&str>) {
        self.commit(|state| {
            if let Some(task_id) = task_id {
                state.selected_task_id = task_id.to_string();
            }
            if let Some(runner_id) = runner_id {
                state.selected_runner_id = runner_id.to_string();
            }
        });
    }

    pub fn set_realtime_status(&self, status: ChannelStatus) {
        self.commit(|state| {
            state.realtime = Some(status);
        });
    }

    pub async fn start_run(&self, runner_id: &str, task_id: &str, parameters: Value) {
        let request = StartRunRequest {
            runner_id: runner_id.to_string(),
            task_id: task_id.to_string(),
            parameters,
        };
        match self.api.start_task_run(&request).await {
            Ok(active) => {
                self.push_notice(
                    "Run started",
                    format!("Run {} started on {runner_id}.", active.run_id),
                    NoticeTone::Success,
                );
                let _ = self.refresh_all().await;
            }
            Err(err) => {
                warn!(%runner_id, %task_id, error = %err, "start run failed");
                self.push_notice("Start failed", err.to_string(), NoticeTone::Error);
            }
        }
    }

    pub async fn stop_run(&self, run_id: &str) {
        match self.api.stop_run(run_id).await {
            Ok(()) => {
                self.push_notice(
                    "Stop requested",
                    format!("Stop requested for {run_id}."),
                    NoticeTone::Warn,
                );
                let _ = self.refresh_all().await;
            }
            Err(err) => {
                warn!(%run_id, error = %err, "stop run failed");
                self.push_notice("Stop failed", err.to_string(), NoticeTone::Error);
            }
        }
    }

    /// Push events refresh the surface; typed events also raise a notice so
    /// the operator sees what arrived.
    pub async fn handle_event(&self, event: &RealtimeEvent) {
        if let RealtimeEvent::Json(value) = event {
            if value.get("type").is_some() {
                self.push_notice("Realtime event", event.kind().to_string(), NoticeTone::Info);
            }
        }
        if let Err(err) = self.refresh_all().await {
            debug!(error = %err, "event-driven refresh failed");
        }
    }

    /// Polling fallback tick; failures are silent, the next tick retries.
    pub async fn tick(&self) {
        if let Err(err) = self.refresh_all().await {
            debug!(error = %err, "poll refresh failed");
        }
    }

    pub fn push_notice(&self, title: &str, message: String, tone: NoticeTone) {
        let id = self.notice_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.commit(|state| {
            state.notices.insert(
                0,
                Notice {
                    id,
                    title: title.to_string(),
                    message,
                    tone,
                },
            );
            state.notices.truncate(MAX_NOTICES);
        });
    }

    pub fn dismiss_notice(&self, id: u64) {
        self.commit(|state| {
            state.notices.retain(|notice| notice.id != id);
        });
    }
}
