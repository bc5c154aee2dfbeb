use ratatui::style::{Color, Modifier, Style};
use rrc_core::{LogLevel, RunStatus, RunnerStatus};
use rrc_dashboard::NoticeTone;

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Rgb(142, 192, 124))
    .add_modifier(Modifier::BOLD);
pub const SELECTED_STYLE: Style = Style::new()
    .bg(Color::Rgb(131, 165, 152))
    .fg(Color::Black)
    .add_modifier(Modifier::BOLD);
pub const DIM_STYLE: Style = Style::new().fg(Color::Rgb(146, 131, 116));
pub const ERROR_STYLE: Style = Style::new()
    .fg(Color::Rgb(251, 73, 52))
    .add_modifier(Modifier::BOLD);

pub fn zebra_row_style(index: usize) -> Style {
    let bg = if index % 2 == 0 {
        Color::Rgb(18, 20, 26)
    } else {
        Color::Rgb(24, 27, 34)
    };
    Style::new().bg(bg)
}

pub fn run_status_color(status: RunStatus) -> Color {
    match status {
        RunStatus::Passed => Color::Rgb(184, 187, 38),
        RunStatus::Failed => Color::Rgb(251, 73, 52),
        RunStatus::Running => Color::Rgb(131, 165, 152),
        RunStatus::Queued => Color::Rgb(250, 189, 47),
    }
}

pub fn runner_status_color(status: RunnerStatus) -> Color {
    match status {
        RunnerStatus::Idle => Color::Rgb(131, 165, 152),
        RunnerStatus::Busy => Color::Rgb(250, 189, 47),
        RunnerStatus::Offline => Color::Rgb(146, 131, 116),
    }
}

pub fn log_level_color(level: LogLevel) -> Color {
    match level {
        LogLevel::Debug => Color::Rgb(146, 131, 116),
        LogLevel::Info => Color::Rgb(131, 165, 152),
        LogLevel::Warn => Color::Rgb(250, 189, 47),
        LogLevel::Error => Color::Rgb(251, 73, 52),
    }
}

pub fn notice_tone_color(tone: NoticeTone) -> Color {
    match tone {
        NoticeTone::Info => Color::Rgb(131, 165, 152),
        NoticeTone::Success => Color::Rgb(184, 187, 38),
        NoticeTone::Warn => Color::Rgb(250, 189, 47),
        NoticeTone::Error => Color::Rgb(251, 73, 52),
    }
}

pub mod icons {
    pub const PASSED: &str = "+";
    pub const FAILED: &str = "x";
    pub const RUNNING: &str = ">";
    pub const QUEUED: &str = ".";
    pub const LIVE: &str = "*";
    pub const POLLING: &str = "~";
}

pub fn run_status_icon(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Passed => icons::PASSED,
        RunStatus::Failed => icons::FAILED,
        RunStatus::Running => icons::RUNNING,
        RunStatus::Queued => icons::QUEUED,
    }
}
