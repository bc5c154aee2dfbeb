mod state;
mod theme;
mod ui;

use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use rrc_api::{ApiConfig, ApiFacade, HttpClient, MockBackend, Poller, RealtimeChannel};
use rrc_dashboard::{ControlSync, DashboardSync};
use serde_json::json;
use state::{Action, App};
use std::{env, error::Error, fs::OpenOptions, io, path::PathBuf, sync::Arc, time::Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = ApiConfig::from_env();
    init_logging(&config);
    info!(api_base = %config.api_base, use_mocks = config.use_mocks, "cockpit starting");

    // Both engines share one facade pair over the same simulated store, so a
    // run started from the control tab shows up in the dashboard's world too.
    let http = HttpClient::new(config.api_base.clone())?;
    let mock = MockBackend::seeded();
    let dashboard = Arc::new(DashboardSync::new(ApiFacade::with_backends(
        config.clone(),
        http.clone(),
        mock.clone(),
    )));
    let control = Arc::new(ControlSync::new(ApiFacade::with_backends(
        config.clone(),
        http,
        mock,
    )));

    let channel = RealtimeChannel::new(config.ws_url.clone());
    channel.connect();
    let mut channel_events = channel.subscribe();
    let mut channel_status = channel.status();

    dashboard.bootstrap().await;
    let _ = control.refresh_all().await;
    control.set_realtime_status(channel.current_status());

    let (_poller, mut ticks) = Poller::spawn(POLL_INTERVAL);

    let mut app = App::new();
    app.apply_dashboard(dashboard.snapshot());
    app.apply_control(control.snapshot());
    app.realtime = channel.current_status();

    let mut dashboard_rx = dashboard.subscribe();
    let mut control_rx = control.subscribe();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let mut term_events = EventStream::new();

    loop {
        terminal.draw(|frame| ui::render(frame, &mut app))?;

        tokio::select! {
            maybe_event = term_events.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key)))
                        if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) =>
                    {
                        if let Some(action) = app.handle_key(key) {
                            dispatch(action, &mut app, &dashboard, &control);
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
            changed = dashboard_rx.changed() => {
                if changed.is_ok() {
                    let snapshot = dashboard_rx.borrow_and_update().clone();
                    app.apply_dashboard(snapshot);
                }
            }
            changed = control_rx.changed() => {
                if changed.is_ok() {
                    let snapshot = control_rx.borrow_and_update().clone();
                    app.apply_control(snapshot);
                }
            }
            changed = channel_status.changed() => {
                if changed.is_ok() {
                    let status = channel_status.borrow_and_update().clone();
                    app.realtime = status.clone();
                    control.set_realtime_status(status);
                }
            }
            event = channel_events.recv() => {
                if let Some(event) = event {
                    let control = Arc::clone(&control);
                    let dashboard = Arc::clone(&dashboard);
                    tokio::spawn(async move {
                        control.handle_event(&event).await;
                        dashboard.refresh().await;
                    });
                }
            }
            tick = ticks.recv() => {
                if tick.is_some() {
                    let control = Arc::clone(&control);
                    let dashboard = Arc::clone(&dashboard);
                    tokio::spawn(async move {
                        control.tick().await;
                        dashboard.refresh().await;
                    });
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    dashboard.close();
    control.close();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn dispatch(
    action: Action,
    app: &mut App,
    dashboard: &Arc<DashboardSync<ApiFacade>>,
    control: &Arc<ControlSync<ApiFacade>>,
) {
    match action {
        Action::Quit => {}
        Action::Refresh => {
            let dashboard = Arc::clone(dashboard);
            let control = Arc::clone(control);
            tokio::spawn(async move {
                dashboard.refresh().await;
                control.tick().await;
            });
        }
        Action::SelectProject(project_id) => {
            let dashboard = Arc::clone(dashboard);
            tokio::spawn(async move {
                dashboard.select_project(&project_id).await;
            });
        }
        Action::StartTest => {
            let dashboard = Arc::clone(dashboard);
            tokio::spawn(async move {
                dashboard.start_test().await;
            });
        }
        Action::OpenLogs(index) => {
            let Some(run) = app.dashboard.runs.get(index).cloned() else {
                return;
            };
            match dashboard.logs_url(&run) {
                Some(url) => {
                    info!(run = %run.id, %url, "logs requested");
                    app.status_line = Some(format!("logs: {url}"));
                }
                None => {
                    app.status_line = Some("no logs available for this run".to_string());
                }
            }
        }
        Action::StartTaskRun { runner_id, task_id } => {
            let control = Arc::clone(control);
            tokio::spawn(async move {
                control
                    .start_run(&runner_id, &task_id, json!({"speed": "normal", "retries": 1}))
                    .await;
            });
        }
        Action::StopRun(run_id) => {
            let control = Arc::clone(control);
            tokio::spawn(async move {
                control.stop_run(&run_id).await;
            });
        }
    }
}

/// The terminal belongs to the TUI, so traces only go to a file, and only
/// when RRC_LOG_DIR points somewhere.
fn init_logging(config: &ApiConfig) {
    let Ok(dir) = env::var("RRC_LOG_DIR") else {
        return;
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    let path = PathBuf::from(dir.trim()).join("rrc-cockpit.log");
    let file = match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            return;
        }
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
