use crossterm::event::{KeyCode, KeyEvent};
use ratatui::widgets::TableState;
use rrc_api::ChannelStatus;
use rrc_dashboard::{ControlState, DashboardState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Dashboard,
    Control,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Projects,
    Runs,
    Runners,
    Tasks,
    ActiveRuns,
}

/// Async work the key handler asks the main loop to perform. The handler
/// itself only moves cursors; everything that talks to an engine goes through
/// one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    Refresh,
    SelectProject(String),
    StartTest,
    OpenLogs(usize),
    StartTaskRun { runner_id: String, task_id: String },
    StopRun(String),
}

/// View-local state: engine snapshots plus cursors. All mutation happens on
/// the main loop; engines publish snapshots through watch channels.
pub struct App {
    pub tab: Tab,
    pub focus: Focus,
    pub dashboard: DashboardState,
    pub control: ControlState,
    pub realtime: ChannelStatus,
    pub project_cursor: usize,
    pub run_cursor: usize,
    pub runner_cursor: usize,
    pub task_cursor: usize,
    pub active_cursor: usize,
    pub runs_table: TableState,
    pub status_line: Option<String>,
    pub should_quit: bool,
}

impl App {
    pub fn new() -> Self {
        Self {
            tab: Tab::default(),
            focus: Focus::default(),
            dashboard: DashboardState::default(),
            control: ControlState::default(),
            realtime: ChannelStatus::Disabled,
            project_cursor: 0,
            run_cursor: 0,
            runner_cursor: 0,
            task_cursor: 0,
            active_cursor: 0,
            runs_table: TableState::default(),
            status_line: None,
            should_quit: false,
        }
    }

    pub fn apply_dashboard(&mut self, state: DashboardState) {
        self.dashboard = state;
        self.clamp_cursors();
        // Keep the project cursor on the selected project after reloads.
        if let Some(selected) = self.dashboard.selected_project_id.as_deref() {
            if let Some(index) = self
                .dashboard
                .projects
                .iter()
                .position(|project| project.id == selected)
            {
                self.project_cursor = index;
            }
        }
    }

    pub fn apply_control(&mut self, state: ControlState) {
        self.control = state;
        self.clamp_cursors();
    }

    fn clamp_cursors(&mut self) {
        self.project_cursor = clamp(self.project_cursor, self.dashboard.projects.len());
        self.run_cursor = clamp(self.run_cursor, self.dashboard.runs.len());
        self.runner_cursor = clamp(self.runner_cursor, self.control.runners.len());
        self.task_cursor = clamp(self.task_cursor, self.control.tasks.len());
        self.active_cursor = clamp(self.active_cursor, self.control.active_runs.len());
        self.runs_table.select(if self.dashboard.runs.is_empty() {
            None
        } else {
            Some(self.run_cursor)
        });
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
                return Some(Action::Quit);
            }
            KeyCode::Char('1') => {
                self.tab = Tab::Dashboard;
                self.focus = Focus::Projects;
            }
            KeyCode::Char('2') => {
                self.tab = Tab::Control;
                self.focus = Focus::Runners;
            }
            KeyCode::Tab => self.cycle_focus(),
            KeyCode::Char('r') => return Some(Action::Refresh),
            KeyCode::Down | KeyCode::Char('j') => self.move_cursor(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_cursor(-1),
            KeyCode::Enter => return self.activate(),
            KeyCode::Char('s') => {
                return match self.tab {
                    Tab::Dashboard => Some(Action::StartTest),
                    Tab::Control => self.start_task_run(),
                }
            }
            KeyCode::Char('o') => {
                if self.tab == Tab::Dashboard && !self.dashboard.runs.is_empty() {
                    return Some(Action::OpenLogs(self.run_cursor));
                }
            }
            KeyCode::Char('x') => {
                if self.tab == Tab::Control {
                    return self
                        .control
                        .active_runs
                        .get(self.active_cursor)
                        .map(|run| Action::StopRun(run.run_id.clone()));
                }
            }
            _ => {}
        }
        None
    }

    fn cycle_focus(&mut self) {
        self.focus = match (self.tab, self.focus) {
            (Tab::Dashboard, Focus::Projects) => Focus::Runs,
            (Tab::Dashboard, _) => Focus::Projects,
            (Tab::Control, Focus::Runners) => Focus::Tasks,
            (Tab::Control, Focus::Tasks) => Focus::ActiveRuns,
            (Tab::Control, _) => Focus::Runners,
        };
    }

    fn move_cursor(&mut self, delta: i64) {
        let (cursor, len) = match self.focus {
            Focus::Projects => (&mut self.project_cursor, self.dashboard.projects.len()),
            Focus::Runs => (&mut self.run_cursor, self.dashboard.runs.len()),
            Focus::Runners => (&mut self.runner_cursor, self.control.runners.len()),
            Focus::Tasks => (&mut self.task_cursor, self.control.tasks.len()),
            Focus::ActiveRuns => (&mut self.active_cursor, self.control.active_runs.len()),
        };
        if len == 0 {
            return;
        }
        let next = (*cursor as i64 + delta).rem_euclid(len as i64);
        *cursor = next as usize;
        self.clamp_cursors();
    }

    /// Enter confirms the focused row: project selection on the dashboard,
    /// runner/task selection on the control tab.
    fn activate(&mut self) -> Option<Action> {
        match self.focus {
            Focus::Projects => self
                .dashboard
                .projects
                .get(self.project_cursor)
                .map(|project| Action::SelectProject(project.id.clone())),
            Focus::Runs => {
                if self.dashboard.runs.is_empty() {
                    None
                } else {
                    Some(Action::OpenLogs(self.run_cursor))
                }
            }
            Focus::Runners | Focus::Tasks | Focus::ActiveRuns => None,
        }
    }

    fn start_task_run(&self) -> Option<Action> {
        let runner = self.control.runners.get(self.runner_cursor)?;
        let task = self.control.tasks.get(self.task_cursor)?;
        Some(Action::StartTaskRun {
            runner_id: runner.id.clone(),
            task_id: task.id.clone(),
        })
    }
}

fn clamp(cursor: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        cursor.min(len - 1)
    }
}
