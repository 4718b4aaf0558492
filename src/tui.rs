use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::controller::{ProgressEvent, ProgressSink};
use crate::domain::BackendKind;
use crate::error::HarvestError;
use crate::pacing::CancelFlag;
use crate::report::BatchCounters;

const EVENTS_MAX: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Fetch,
    Cooldown,
    Retry,
    Store,
    Archive,
    Done,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Start => "Start",
            Phase::Fetch => "Fetch",
            Phase::Cooldown => "Cooldown",
            Phase::Retry => "Retry",
            Phase::Store => "Store",
            Phase::Archive => "Archive",
            Phase::Done => "Done",
        }
    }

    fn color(self) -> Color {
        match self {
            Phase::Cooldown => Color::Yellow,
            Phase::Retry => Color::Magenta,
            Phase::Done => Color::Green,
            _ => Color::Cyan,
        }
    }
}

#[derive(Debug)]
struct DashboardState {
    phase: Phase,
    status: String,
    counters: BatchCounters,
    latency_ms: Option<u128>,
    events: VecDeque<String>,
    started: Instant,
    cancelling: bool,
}

/// Full-screen batch dashboard. The batch runs on a worker thread while this
/// thread draws and listens for `q`/`Esc`, which request cancellation.
pub struct Tui {
    backend: BackendKind,
    cancel: CancelFlag,
    state: Arc<Mutex<DashboardState>>,
}

struct TuiProgress {
    state: Arc<Mutex<DashboardState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            if let Some((phase, payload)) = parse_phase(&message) {
                state.phase = phase;
                state.status = payload.to_string();
            } else {
                state.status = message.clone();
            }
            if let Some(latency) = parse_latency(&message) {
                state.latency_ms = Some(latency);
            }
            if let Some(counters) = event.counters {
                state.counters = counters;
            }
            let line = format!("[{}] {}", Local::now().format("%H:%M:%S"), state.status);
            push_event(&mut state.events, line);
        }
    }
}

impl Tui {
    pub fn new(backend: BackendKind, cancel: CancelFlag) -> Self {
        Self {
            backend,
            cancel,
            state: Arc::new(Mutex::new(DashboardState {
                phase: Phase::Start,
                status: "starting".to_string(),
                counters: BatchCounters::default(),
                latency_ms: None,
                events: VecDeque::new(),
                started: Instant::now(),
                cancelling: false,
            })),
        }
    }

    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, HarvestError> + Send + 'static,
        R: Send + 'static,
    {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_ui(frame, self.backend, &state, tick))
                    .into_diagnostic()?;
            }

            match rx.try_recv() {
                Ok(result) => {
                    restore_terminal()?;
                    handle.join().ok();
                    return result.map_err(miette::Report::new);
                }
                Err(TryRecvError::Disconnected) => {
                    restore_terminal()?;
                    handle.join().ok();
                    return Err(miette::Report::msg("batch worker stopped unexpectedly"));
                }
                Err(TryRecvError::Empty) => {}
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()?
                && let Event::Key(key) = event::read().into_diagnostic()?
            {
                self.handle_key(key);
            }

            tick = tick.wrapping_add(1);
        }
    }

    fn handle_key(&self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        let wants_cancel = match key.code {
            KeyCode::Char('q') | KeyCode::Esc => true,
            KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
            _ => false,
        };
        if wants_cancel {
            self.cancel.cancel();
            if let Ok(mut state) = self.state.lock() {
                state.cancelling = true;
            }
        }
    }
}

fn restore_terminal() -> miette::Result<()> {
    disable_raw_mode().into_diagnostic()?;
    io::stdout()
        .execute(LeaveAlternateScreen)
        .into_diagnostic()?;
    Ok(())
}

fn draw_ui(frame: &mut ratatui::Frame, backend: BackendKind, state: &DashboardState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(10),
            Constraint::Length(1),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(backend, state, tick), chunks[0]);

    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);
    frame.render_widget(draw_counters_panel(state), main[0]);
    frame.render_widget(draw_events_panel(state), main[1]);

    let footer = if state.cancelling {
        Span::styled(
            "cancelling: finishing writes, please wait",
            Style::default().fg(Color::Yellow),
        )
    } else {
        Span::styled("q / Esc: cancel run", Style::default().fg(Color::Gray))
    };
    frame.render_widget(Paragraph::new(Line::from(footer)), chunks[2]);
}

fn draw_header(backend: BackendKind, state: &DashboardState, tick: usize) -> Paragraph<'static> {
    let hb = if tick % 2 == 0 { "*" } else { " " };
    let line = Line::from(vec![
        Span::styled(
            "CONTRACT-HARVEST",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw(format!("   Backend: {backend}   Phase: ")),
        Span::styled(state.phase.label(), Style::default().fg(state.phase.color())),
        Span::raw(format!("   Elapsed: {}   ", format_elapsed(state.started.elapsed()))),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ]);
    Paragraph::new(vec![line])
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_counters_panel(state: &DashboardState) -> Paragraph<'static> {
    let counters = state.counters;
    let percent = percent(counters.processed(), counters.total);
    let latency = state
        .latency_ms
        .map(|v| format!("{v} ms"))
        .unwrap_or_else(|| "--".to_string());
    let label = |text: &'static str| Span::styled(text, Style::default().fg(Color::Gray));

    let lines = vec![
        Line::from(Span::styled(
            "PROGRESS",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            label("Processed: "),
            Span::raw(format!("{}/{} ", counters.processed(), counters.total)),
            Span::raw(progress_bar(percent)),
            Span::raw(format!(" {percent:>3}%")),
        ]),
        Line::from(vec![
            label("Success:   "),
            Span::styled(counters.success.to_string(), Style::default().fg(Color::Green)),
        ]),
        Line::from(vec![
            label("Failure:   "),
            Span::styled(counters.failure.to_string(), Style::default().fg(Color::Red)),
        ]),
        Line::from(vec![
            label("Skipped:   "),
            Span::styled(counters.skipped.to_string(), Style::default().fg(Color::Yellow)),
        ]),
        Line::from(vec![
            label("Attempts:  "),
            Span::raw(format!("{} ({} retries)", counters.attempts, counters.retried)),
        ]),
        Line::from(vec![label("Queued:    "), Span::raw(counters.queued.to_string())]),
        Line::from(vec![label("Latency:   "), Span::raw(latency)]),
        Line::from(vec![label("Status:    "), Span::raw(state.status.clone())]),
    ];

    Paragraph::new(lines)
        .block(Block::default().borders(Borders::RIGHT))
        .wrap(Wrap { trim: true })
}

fn draw_events_panel(state: &DashboardState) -> Paragraph<'static> {
    let mut lines = vec![Line::from(Span::styled(
        "RECENT EVENTS",
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    ))];
    for event in state.events.iter().rev() {
        lines.push(Line::from(format!("- {event}")));
    }
    Paragraph::new(lines).wrap(Wrap { trim: true })
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done.min(total) * 100) / total) as u8
}

fn progress_bar(percent: u8) -> String {
    let total = 20;
    let filled = (percent as usize * total) / 100;
    let mut out = String::from("[");
    for i in 0..total {
        out.push(if i < filled { '#' } else { '.' });
    }
    out.push(']');
    out
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

fn parse_phase(message: &str) -> Option<(Phase, &str)> {
    let rest = message.strip_prefix("phase=")?;
    let (name, payload) = rest.split_once(';')?;
    let phase = match name {
        "Fetch" => Phase::Fetch,
        "Cooldown" => Phase::Cooldown,
        "Retry" => Phase::Retry,
        "Store" => Phase::Store,
        "Archive" => Phase::Archive,
        "Done" => Phase::Done,
        _ => return None,
    };
    Some((phase, payload.trim()))
}

fn parse_latency(message: &str) -> Option<u128> {
    message
        .split("latency_ms=")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse::<u128>().ok())
}

fn push_event(buffer: &mut VecDeque<String>, item: String) {
    buffer.push_back(item);
    while buffer.len() > EVENTS_MAX {
        buffer.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_phase_prefix() {
        let (phase, payload) = parse_phase("phase=Cooldown; 60s before attempt 100").unwrap();
        assert_eq!(phase, Phase::Cooldown);
        assert_eq!(payload, "60s before attempt 100");
        assert!(parse_phase("phase=Unknown; x").is_none());
    }

    #[test]
    fn reads_latency_from_attempt_message() {
        assert_eq!(
            parse_latency("phase=Fetch; abc success latency_ms=42"),
            Some(42)
        );
    }

    #[test]
    fn progress_event_updates_dashboard() {
        let tui = Tui::new(BackendKind::Api, CancelFlag::new());
        let progress = TuiProgress {
            state: tui.state.clone(),
        };
        progress.event(ProgressEvent {
            message: "phase=Retry; 2 identifiers".to_string(),
            elapsed: None,
            counters: None,
        });
        let state = tui.state.lock().unwrap();
        assert_eq!(state.phase, Phase::Retry);
        assert_eq!(state.status, "2 identifiers");
        assert!(state.events.back().unwrap().ends_with("] 2 identifiers"));
    }

    #[test]
    fn percent_handles_empty_batch() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(5, 10), 50);
    }
}
