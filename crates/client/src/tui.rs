use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use mlsp::grid::{CellCoord, CellState, GRID_SIZE};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::{Frame, Terminal};
use tokio::sync::{mpsc, Mutex};

use crate::render::{ClickEvent, RenderSink};
use crate::state::ClientState;

/// An in-memory render sink the TUI reads from directly, rather than a
/// push channel — the grid is small enough that a redraw just re-reads
/// the shared state under the lock each frame.
#[derive(Default)]
pub struct TuiRenderSink;

impl RenderSink for TuiRenderSink {
    fn on_grid_applied(&mut self, _grid: &mlsp::Grid) {}

    fn on_game_over(&mut self, winner: &str, scores: &std::collections::HashMap<String, u32>) {
        log::info!("game over, winner: {winner}, scoreboard: {scores:?}");
    }
}

/// Arrow keys move a cursor over the grid, Enter raises a [`ClickEvent`]
/// for the currently selected cell, `q` quits.
pub async fn run(
    state: Arc<Mutex<ClientState>>,
    clicks: mpsc::UnboundedSender<ClickEvent>,
) -> anyhow::Result<()> {
    enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let mut cursor = CellCoord::new(0, 0);

    let result = loop {
        let (grid_snapshot, player_id, game_over, winner) = {
            let state = state.lock().await;
            (
                state.grid.clone(),
                state.player_id.clone(),
                state.game_over,
                state.winner.clone(),
            )
        };

        if let Err(err) = terminal.draw(|frame| {
            draw(frame, &grid_snapshot, cursor, player_id.as_deref(), game_over, winner.as_deref())
        }) {
            break Err(err.into());
        }

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') => break Ok(()),
                    KeyCode::Up => cursor = CellCoord::new(cursor.row.saturating_sub(1), cursor.col),
                    KeyCode::Down => cursor = CellCoord::new((cursor.row + 1).min(GRID_SIZE - 1), cursor.col),
                    KeyCode::Left => cursor = CellCoord::new(cursor.row, cursor.col.saturating_sub(1)),
                    KeyCode::Right => cursor = CellCoord::new(cursor.row, (cursor.col + 1).min(GRID_SIZE - 1)),
                    KeyCode::Enter => {
                        let _ = clicks.send(ClickEvent { coord: cursor });
                    }
                    _ => {}
                }
            }
        }
    };

    disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;
    result
}

fn draw(
    frame: &mut Frame,
    grid: &mlsp::Grid,
    cursor: CellCoord,
    player_id: Option<&str>,
    game_over: bool,
    winner: Option<&str>,
) {
    let area = frame.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(GRID_SIZE as u16 + 2), Constraint::Length(3)])
        .split(area);

    let mut lines = Vec::new();
    for row in 0..GRID_SIZE {
        let mut spans = Vec::new();
        for col in 0..GRID_SIZE {
            let coord = CellCoord::new(row, col);
            let cell = grid.get(coord);
            let mut style = Style::default();
            if coord == cursor {
                style = style.bg(Color::White).fg(Color::Black);
            } else if cell.map(|c| c.state()) == Some(CellState::Acquired) {
                style = style.fg(Color::Green);
            } else {
                style = style.fg(Color::DarkGray);
            }
            let text = match cell.and_then(|c| c.owner()) {
                Some(owner) => format!("{:>2}", owner),
                None => " .".to_string(),
            };
            spans.push(Span::styled(text, style));
            spans.push(Span::raw(" "));
        }
        lines.push(Line::from(spans));
    }
    let title = match player_id {
        Some(id) => format!("grid (you are {id})"),
        None => "grid (connecting...)".to_string(),
    };
    let grid_widget = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(grid_widget, chunks[0]);

    let status = if game_over {
        match winner {
            Some(winner) => format!("game over — {winner} wins — press q to quit"),
            None => "game over — press q to quit".to_string(),
        }
    } else {
        "arrows to move, enter to claim, q to quit".to_string()
    };
    let status_widget = Paragraph::new(status).block(Block::default().borders(Borders::ALL));
    frame.render_widget(status_widget, chunks[1]);
}
