use crate::state::{App, Focus, Tab};
use crate::theme;
use chrono::{DateTime, Utc};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, List, ListItem, Paragraph, Row, Table, Wrap},
    Frame,
};

pub fn render(f: &mut Frame, app: &mut App) {
    let area = f.size();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(8),
            Constraint::Length(1),
        ])
        .split(area);

    render_header(f, app, rows[0]);
    match app.tab {
        Tab::Dashboard => render_dashboard(f, app, rows[1]),
        Tab::Control => render_control(f, app, rows[1]),
    }
    render_status_line(f, app, rows[2]);
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let tab_label = |tab: Tab, label: &str| {
        if app.tab == tab {
            Span::styled(format!(" {label} "), theme::SELECTED_STYLE)
        } else {
            Span::styled(format!(" {label} "), theme::DIM_STYLE)
        }
    };
    let realtime_icon = if app.realtime.is_connected() {
        theme::icons::LIVE
    } else {
        theme::icons::POLLING
    };
    let line = Line::from(vec![
        Span::styled("Robot Runner Cockpit", theme::HEADER_STYLE),
        Span::raw("  "),
        tab_label(Tab::Dashboard, "1:Dashboard"),
        tab_label(Tab::Control, "2:Control"),
        Span::raw("  "),
        Span::styled(
            format!("{realtime_icon} {}", app.realtime.label()),
            theme::DIM_STYLE,
        ),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn render_status_line(f: &mut Frame, app: &App, area: Rect) {
    let line = if let Some(error) = app.dashboard.error.as_deref() {
        Line::from(Span::styled(format!("error: {error}"), theme::ERROR_STYLE))
    } else if let Some(status) = app.status_line.as_deref() {
        Line::from(Span::styled(status.to_string(), theme::DIM_STYLE))
    } else {
        Line::from(Span::styled(
            "q quit | tab focus | enter select | s start | o logs | x stop | r refresh",
            theme::DIM_STYLE,
        ))
    };
    f.render_widget(Paragraph::new(line), area);
}

fn render_dashboard(f: &mut Frame, app: &mut App, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(32), Constraint::Min(40)])
        .split(area);

    render_projects(f, app, columns[0]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(5)])
        .split(columns[1]);
    render_summary_cards(f, app, right[0]);
    render_runs_table(f, app, right[1]);
}

fn render_projects(f: &mut Frame, app: &App, area: Rect) {
    let focused = app.focus == Focus::Projects;
    let border = if focused { Color::Yellow } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Projects")
        .border_style(Style::default().fg(border));

    let mut items = Vec::new();
    for (index, project) in app.dashboard.projects.iter().enumerate() {
        let selected = app.dashboard.selected_project_id.as_deref() == Some(project.id.as_str());
        let marker = if selected { "> " } else { "  " };
        let mut style = theme::zebra_row_style(index);
        if index == app.project_cursor && focused {
            style = theme::SELECTED_STYLE;
        }
        items.push(ListItem::new(Line::from(vec![
            Span::raw(marker.to_string()),
            Span::styled(project.name.clone(), style),
            Span::styled(
                format!("  {}", relative_time(project.last_run_at)),
                theme::DIM_STYLE,
            ),
        ])));
    }
    if items.is_empty() {
        let placeholder = if app.dashboard.loading_projects {
            "loading projects…"
        } else {
            "no projects"
        };
        items.push(ListItem::new(Span::styled(placeholder, theme::DIM_STYLE)));
    }
    f.render_widget(List::new(items).block(block), area);
}

fn render_summary_cards(f: &mut Frame, app: &App, area: Rect) {
    let cards = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(25),
            Constraint::Percentage(25),
            Constraint::Percentage(25),
            Constraint::Percentage(25),
        ])
        .split(area);

    let summary = &app.dashboard.summary;
    let card = |label: &str, value: usize, color: Color| {
        Paragraph::new(vec![
            Line::from(Span::styled(
                value.to_string(),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(label.to_string(), theme::DIM_STYLE)),
        ])
        .block(Block::default().borders(Borders::ALL))
    };
    f.render_widget(card("passed", summary.passed, Color::Rgb(184, 187, 38)), cards[0]);
    f.render_widget(card("failed", summary.failed, Color::Rgb(251, 73, 52)), cards[1]);
    f.render_widget(
        card("running", summary.running, Color::Rgb(131, 165, 152)),
        cards[2],
    );
    f.render_widget(
        card("queued", summary.queued, Color::Rgb(250, 189, 47)),
        cards[3],
    );
}

fn render_runs_table(f: &mut Frame, app: &mut App, area: Rect) {
    let focused = app.focus == Focus::Runs;
    let border = if focused { Color::Yellow } else { Color::DarkGray };
    let title = match app.dashboard.selected_project() {
        Some(project) => format!("Recent runs — {}", project.name),
        None => "Recent runs".to_string(),
    };
    let mut block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(border));
    if app.dashboard.starting {
        block = block.title_bottom(Line::from(Span::styled("starting…", theme::DIM_STYLE)));
    }

    let header = Row::new(vec!["", "run", "suite", "status", "started", "dur", "by"])
        .style(theme::HEADER_STYLE);
    let rows: Vec<Row> = app
        .dashboard
        .runs
        .iter()
        .enumerate()
        .map(|(index, run)| {
            let status_cell = Cell::from(Span::styled(
                run.status.as_str(),
                Style::default().fg(theme::run_status_color(run.status)),
            ));
            let icon = if run.optimistic {
                "…"
            } else {
                theme::run_status_icon(run.status)
            };
            Row::new(vec![
                Cell::from(icon),
                Cell::from(run.id.clone()),
                Cell::from(run.suite.clone()),
                status_cell,
                Cell::from(relative_time(Some(run.started_at))),
                Cell::from(
                    run.duration_seconds
                        .map(|secs| format!("{secs}s"))
                        .unwrap_or_else(|| "—".to_string()),
                ),
                Cell::from(run.triggered_by.clone()),
            ])
            .style(theme::zebra_row_style(index))
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(2),
            Constraint::Length(24),
            Constraint::Length(18),
            Constraint::Length(8),
            Constraint::Length(12),
            Constraint::Length(6),
            Constraint::Min(8),
        ],
    )
    .header(header)
    .block(block)
    .highlight_style(theme::SELECTED_STYLE);

    f.render_stateful_widget(table, area, &mut app.runs_table);
}

fn render_control(f: &mut Frame, app: &App, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(36), Constraint::Min(40)])
        .split(area);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(columns[0]);
    render_runners(f, app, left[0]);
    render_tasks(f, app, left[1]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Percentage(40),
            Constraint::Percentage(20),
        ])
        .split(columns[1]);
    render_active_runs(f, app, right[0]);
    render_logs(f, app, right[1]);
    render_notices(f, app, right[2]);
}

fn render_runners(f: &mut Frame, app: &App, area: Rect) {
    let focused = app.focus == Focus::Runners;
    let border = if focused { Color::Yellow } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Runners")
        .border_style(Style::default().fg(border));

    let items: Vec<ListItem> = app
        .control
        .runners
        .iter()
        .enumerate()
        .map(|(index, runner)| {
            let style = if index == app.runner_cursor && focused {
                theme::SELECTED_STYLE
            } else {
                theme::zebra_row_style(index)
            };
            ListItem::new(Line::from(vec![
                Span::styled(runner.name.clone(), style),
                Span::styled(
                    format!(" [{}]", runner.status),
                    Style::default().fg(theme::runner_status_color(runner.status)),
                ),
            ]))
        })
        .collect();
    f.render_widget(List::new(items).block(block), area);
}

fn render_tasks(f: &mut Frame, app: &App, area: Rect) {
    let focused = app.focus == Focus::Tasks;
    let border = if focused { Color::Yellow } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Task library")
        .border_style(Style::default().fg(border));

    let items: Vec<ListItem> = app
        .control
        .tasks
        .iter()
        .enumerate()
        .map(|(index, task)| {
            let style = if index == app.task_cursor && focused {
                theme::SELECTED_STYLE
            } else {
                theme::zebra_row_style(index)
            };
            ListItem::new(Line::from(vec![
                Span::styled(task.name.clone(), style),
                Span::styled(format!("  {}", task.tags.join(",")), theme::DIM_STYLE),
            ]))
        })
        .collect();
    f.render_widget(List::new(items).block(block), area);
}

fn render_active_runs(f: &mut Frame, app: &App, area: Rect) {
    let focused = app.focus == Focus::ActiveRuns;
    let border = if focused { Color::Yellow } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Active runs")
        .border_style(Style::default().fg(border));

    let header = Row::new(vec!["run", "task", "runner", "status", "%"]).style(theme::HEADER_STYLE);
    let rows: Vec<Row> = app
        .control
        .active_runs
        .iter()
        .enumerate()
        .map(|(index, active)| {
            let style = if index == app.active_cursor && focused {
                theme::SELECTED_STYLE
            } else {
                theme::zebra_row_style(index)
            };
            Row::new(vec![
                Cell::from(active.run_id.clone()),
                Cell::from(active.task_id.clone()),
                Cell::from(active.runner_id.clone()),
                Cell::from(active.status.as_str()),
                Cell::from(
                    active
                        .progress_percent
                        .map(|pct| format!("{pct}%"))
                        .unwrap_or_else(|| "—".to_string()),
                ),
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(24),
            Constraint::Length(16),
            Constraint::Length(14),
            Constraint::Length(9),
            Constraint::Min(4),
        ],
    )
    .header(header)
    .block(block);
    f.render_widget(table, area);
}

fn render_logs(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Logs")
        .border_style(Style::default().fg(Color::DarkGray));
    let visible = area.height.saturating_sub(2) as usize;
    let skip = app.control.logs.len().saturating_sub(visible);
    let lines: Vec<Line> = app
        .control
        .logs
        .iter()
        .skip(skip)
        .map(|entry| {
            Line::from(vec![
                Span::styled(
                    entry.ts.format("%H:%M:%S ").to_string(),
                    theme::DIM_STYLE,
                ),
                Span::styled(
                    format!("{:5} ", entry.level),
                    Style::default().fg(theme::log_level_color(entry.level)),
                ),
                Span::raw(entry.message.clone()),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: true }), area);
}

fn render_notices(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Notices")
        .border_style(Style::default().fg(Color::DarkGray));
    let lines: Vec<Line> = app
        .control
        .notices
        .iter()
        .take(area.height.saturating_sub(2) as usize)
        .map(|notice| {
            Line::from(vec![
                Span::styled(
                    format!("{}: ", notice.title),
                    Style::default()
                        .fg(theme::notice_tone_color(notice.tone))
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw(notice.message.clone()),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn relative_time(ts: Option<DateTime<Utc>>) -> String {
    let Some(ts) = ts else {
        return "never".to_string();
    };
    let delta = Utc::now().signed_duration_since(ts);
    let minutes = delta.num_minutes();
    if minutes < 1 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if minutes < 48 * 60 {
        format!("{}h ago", delta.num_hours())
    } else {
        format!("{}d ago", delta.num_days())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_time_buckets() {
        let now = Utc::now();
        assert_eq!(relative_time(None), "never");
        assert_eq!(relative_time(Some(now)), "just now");
        assert_eq!(
            relative_time(Some(now - chrono::Duration::minutes(5))),
            "5m ago"
        );
        assert_eq!(
            relative_time(Some(now - chrono::Duration::hours(3))),
            "3h ago"
        );
        assert_eq!(
            relative_time(Some(now - chrono::Duration::days(4))),
            "4d ago"
        );
    }

    #[test]
    fn summary_card_values_track_state() {
        // Keep the card layout honest about its inputs.
        let summary = rrc_core::RunSummary {
            passed: 2,
            failed: 1,
            running: 0,
            queued: 0,
        };
        assert_eq!(summary.total(), 3);
    }
}
