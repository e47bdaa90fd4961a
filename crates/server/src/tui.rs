use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use mlsp::grid::{CellState, GRID_SIZE};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph};
use ratatui::{Frame, Terminal};
use tokio::sync::{mpsc, Mutex};

use crate::events::ServerEvent;
use crate::state::ServerState;

/// Renders a live dashboard of the grid and a scrolling activity log.
/// Exits when the user presses `q`; a poll loop rather than a raw event
/// stream since crossterm's blocking reader doesn't play well inside a
/// single-threaded async task without its own blocking-task wrapper.
pub async fn run(
    state: Arc<Mutex<ServerState>>,
    mut events_rx: mpsc::UnboundedReceiver<ServerEvent>,
) -> anyhow::Result<()> {
    enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let mut log: Vec<String> = Vec::new();

    let result = loop {
        while let Ok(event) = events_rx.try_recv() {
            log.push(describe(&event));
            if log.len() > 200 {
                log.remove(0);
            }
        }

        let grid_snapshot = {
            let state = state.lock().await;
            state.grid.clone()
        };

        if let Err(err) = terminal.draw(|frame| draw(frame, &grid_snapshot, &log)) {
            break Err(err.into());
        }

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.code == KeyCode::Char('q') {
                    break Ok(());
                }
            }
        }
    };

    disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;
    result
}

fn describe(event: &ServerEvent) -> String {
    match event {
        ServerEvent::PlayerJoined { player_id, addr } => format!("player {player_id} joined from {addr}"),
        ServerEvent::PlayerActivated { player_id } => format!("player {player_id} active"),
        ServerEvent::CellAcquired(e) => {
            format!("player {} acquired ({}, {})", e.owner, e.cell[0], e.cell[1])
        }
        ServerEvent::GameOver { winner } => format!("game over, winner: {winner}"),
    }
}

fn draw(frame: &mut Frame, grid: &mlsp::Grid, log: &[String]) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(2 * GRID_SIZE as u16 + 3), Constraint::Min(20)])
        .split(frame.area());

    let mut lines = Vec::new();
    for row in 0..GRID_SIZE {
        let mut spans = Vec::new();
        for col in 0..GRID_SIZE {
            let coord = mlsp::CellCoord::new(row, col);
            let cell = grid.get(coord);
            let (text, style) = match cell.map(|c| c.state()) {
                Some(CellState::Acquired) => (
                    format!("{:>2}", cell.and_then(|c| c.owner()).unwrap_or("?")),
                    Style::default().fg(Color::Green),
                ),
                _ => (" .".to_string(), Style::default().fg(Color::DarkGray)),
            };
            spans.push(Span::styled(text, style));
            spans.push(Span::raw(" "));
        }
        lines.push(Line::from(spans));
    }
    let grid_widget = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("grid"));
    frame.render_widget(grid_widget, chunks[0]);

    let items: Vec<ListItem> = log.iter().rev().take(chunks[1].height as usize).map(|l| ListItem::new(l.clone())).collect();
    let log_widget = List::new(items).block(Block::default().borders(Borders::ALL).title("activity (q to quit)"));
    frame.render_widget(log_widget, chunks[1]);
}
