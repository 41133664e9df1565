//! Terminal dashboard: a presentation-only consumer of engine events.
//!
//! The engine never talks to the terminal. It publishes [`UiEvent`]s and
//! exposes the pause gate and the session cancel token; this module
//! renders the byte grid and dispatches the transfer keys. When stdout
//! is not a terminal, [`run_headless`] logs events instead.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::style::{Color, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::events::UiEvent;
use crate::pause::PauseGate;
use crate::progress::{PartProgress, ProgressBus};
use crate::util::{format_bytes, format_eta, format_speed};

const GRID_ROWS: usize = 8;
const CELL_FULL: &str = "█";
const CELL_EMPTY: &str = "░";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What the user asked for when leaving the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitMode {
    /// The transfer ended on its own (done or error).
    None,
    /// Cancel and wipe session state.
    Clean,
    /// Cancel but keep state for a later resume.
    Save,
}

/// Everything the dashboard reads from and feeds back into the engine.
pub struct Dashboard {
    pub filename: String,
    pub total_size: u64,
    pub progress: Arc<ProgressBus>,
    pub events: broadcast::Receiver<UiEvent>,
    pub pause: Arc<PauseGate>,
    pub cancel: CancellationToken,
}

#[derive(Default)]
struct TransferStats {
    speed: f64,
    eta_secs: Option<u64>,
    error: Option<String>,
    done: bool,
}

impl Dashboard {
    /// Run the full-screen dashboard until the transfer ends or the
    /// user quits. Blocking; call from a blocking task.
    pub fn run(mut self) -> io::Result<QuitMode> {
        let mut terminal = ratatui::init();
        let result = self.event_loop(&mut terminal);
        ratatui::restore();
        result
    }

    fn event_loop(&mut self, terminal: &mut ratatui::DefaultTerminal) -> io::Result<QuitMode> {
        let started = Instant::now();
        let mut stats = TransferStats::default();

        loop {
            self.drain_events(&mut stats);

            let received = self.progress.total_received();
            let snapshot = self.progress.snapshot();
            let paused = self.pause.is_paused();
            terminal.draw(|frame| {
                render(
                    frame,
                    &self.filename,
                    self.total_size,
                    received,
                    &snapshot,
                    &stats,
                    paused,
                    started.elapsed(),
                );
            })?;

            if stats.done {
                return Ok(QuitMode::None);
            }

            if !event::poll(POLL_INTERVAL)? {
                continue;
            }
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }

            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => {
                    self.cancel.cancel();
                    return Ok(QuitMode::Clean);
                }
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    self.cancel.cancel();
                    return Ok(QuitMode::Clean);
                }
                KeyCode::Char('s') => {
                    self.cancel.cancel();
                    return Ok(QuitMode::Save);
                }
                KeyCode::Char('p') => self.pause.pause(),
                KeyCode::Char('r') => self.pause.resume(),
                _ => {}
            }
        }
    }

    fn drain_events(&mut self, stats: &mut TransferStats) {
        loop {
            match self.events.try_recv() {
                Ok(UiEvent::Speed {
                    bytes_per_sec,
                    eta_secs,
                }) => {
                    stats.speed = bytes_per_sec;
                    stats.eta_secs = eta_secs;
                }
                Ok(UiEvent::Error(msg)) => stats.error = Some(msg),
                Ok(UiEvent::Done) => stats.done = true,
                Ok(UiEvent::Debug(msg)) => debug!("{msg}"),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => break,
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn render(
    frame: &mut Frame,
    filename: &str,
    total_size: u64,
    received: u64,
    snapshot: &[(usize, PartProgress)],
    stats: &TransferStats,
    paused: bool,
    elapsed: Duration,
) {
    let width = frame.area().width as usize;
    let cols = width.saturating_sub(4).max(10);
    let cells = grid_cells(snapshot, total_size, GRID_ROWS * cols);

    let mut lines = Vec::new();
    lines.push(Line::styled(
        format!(" Downloading: {filename} "),
        Style::default().fg(Color::Cyan).bold(),
    ));
    lines.push(Line::raw(""));

    for row in cells.chunks(cols) {
        let spans: Vec<Span> = row
            .iter()
            .map(|&filled| {
                if filled {
                    Span::styled(CELL_FULL, Style::default().fg(Color::Green))
                } else {
                    Span::styled(CELL_EMPTY, Style::default().fg(Color::DarkGray))
                }
            })
            .collect();
        lines.push(Line::from(spans));
    }
    lines.push(Line::raw(""));

    let percent = if total_size > 0 {
        received as f64 / total_size as f64 * 100.0
    } else {
        100.0
    };
    lines.push(Line::raw(format!(
        "Progress: {:.1}% ({} / {}) │ Speed: {} │ ETA: {} │ Elapsed: {}s",
        percent,
        format_bytes(received),
        format_bytes(total_size),
        format_speed(stats.speed),
        format_eta(stats.eta_secs),
        elapsed.as_secs(),
    )));
    lines.push(Line::raw(""));

    if let Some(err) = &stats.error {
        lines.push(Line::styled(
            format!("Error: {err}"),
            Style::default().fg(Color::Red),
        ));
        lines.push(Line::raw("Press 'q' to quit"));
    } else if stats.done {
        lines.push(Line::styled(
            "Download complete!",
            Style::default().fg(Color::Green).bold(),
        ));
    } else if paused {
        lines.push(Line::styled(
            "PAUSED",
            Style::default().fg(Color::Yellow).bold(),
        ));
        lines.push(Line::raw(
            "Press 'r' to resume │ 's' to save & quit │ 'q' to cancel",
        ));
    } else {
        lines.push(Line::raw(
            "Press 'p' to pause │ 's' to save & quit │ 'q' to cancel",
        ));
    }

    frame.render_widget(Paragraph::new(lines), frame.area());
}

/// Scale per-part byte counters onto a fixed grid of cells.
///
/// Each part owns a contiguous run of cells proportional to its range;
/// a cell lights up once the part's received bytes cover it.
fn grid_cells(parts: &[(usize, PartProgress)], total_size: u64, num_cells: usize) -> Vec<bool> {
    let mut cells = vec![false; num_cells];
    if total_size == 0 || num_cells == 0 {
        return cells;
    }

    for (_, wp) in parts {
        let span = wp.end - wp.start + 1;
        if span == 0 {
            continue;
        }

        let first = (wp.start * num_cells as u64 / total_size) as usize;
        let last = (wp.end * num_cells as u64 / total_size) as usize;
        let owned = last - first + 1;
        let lit = (wp.received.min(span) * owned as u64 / span) as usize;

        for cell in cells.iter_mut().skip(first).take(lit) {
            *cell = true;
        }
    }

    cells
}

/// Minimal non-TTY frontend: logs engine events; Ctrl+C cancels.
pub async fn run_headless(
    mut events: broadcast::Receiver<UiEvent>,
    cancel: CancellationToken,
) -> QuitMode {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, cancelling download");
                cancel.cancel();
                return QuitMode::Clean;
            }
            event = events.recv() => match event {
                Ok(UiEvent::Speed { bytes_per_sec, eta_secs }) => {
                    debug!(speed = %format_speed(bytes_per_sec), eta = %format_eta(eta_secs), "progress");
                }
                Ok(UiEvent::Debug(msg)) => debug!("{msg}"),
                Ok(UiEvent::Error(msg)) => {
                    error!("{msg}");
                    return QuitMode::None;
                }
                Ok(UiEvent::Done) => {
                    info!("download complete");
                    return QuitMode::None;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return QuitMode::None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(start: u64, end: u64, received: u64) -> (usize, PartProgress) {
        (0, PartProgress { start, end, received })
    }

    #[test]
    fn empty_download_lights_nothing() {
        let cells = grid_cells(&[part(0, 999, 0)], 1000, 10);
        assert!(cells.iter().all(|&c| !c));
    }

    #[test]
    fn complete_download_lights_everything() {
        let parts = vec![
            (0, PartProgress { start: 0, end: 499, received: 500 }),
            (1, PartProgress { start: 500, end: 999, received: 500 }),
        ];
        let cells = grid_cells(&parts, 1000, 20);
        assert!(cells.iter().all(|&c| c));
    }

    #[test]
    fn half_complete_part_lights_half_its_cells() {
        let cells = grid_cells(&[part(0, 999, 500)], 1000, 10);
        assert_eq!(cells.iter().filter(|&&c| c).count(), 5);
        // Fill proceeds from the part's start.
        assert!(cells[0] && cells[4]);
        assert!(!cells[5]);
    }

    #[test]
    fn parts_fill_their_own_region() {
        let parts = vec![
            (0, PartProgress { start: 0, end: 499, received: 0 }),
            (1, PartProgress { start: 500, end: 999, received: 500 }),
        ];
        let cells = grid_cells(&parts, 1000, 10);
        assert_eq!(cells, vec![false, false, false, false, false, true, true, true, true, true]);
    }

    #[test]
    fn zero_total_is_harmless() {
        assert!(grid_cells(&[], 0, 10).iter().all(|&c| !c));
    }
}
