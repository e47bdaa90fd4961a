use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use mlsp::event::ReliableEventTable;
use mlsp::grid::{CellCoord, Grid};
use mlsp::session::SessionTable;
use mlsp::snapshot::SnapshotEngine;
use mlsp::Config;

use crate::events::ServerEvent;

/// Everything the four server tasks share, behind one coarse mutex —
/// the packet rate here (tens of clients, five-cell-square grid) never
/// makes fine-grained locking pay for its complexity.
pub struct ServerState {
    pub grid: Grid,
    pub sessions: SessionTable,
    pub snapshots: SnapshotEngine,
    pub events: ReliableEventTable,
    pub config: Config,
    pub game_over: bool,
    next_sequence: u32,
}

impl ServerState {
    pub fn new(config: Config) -> Self {
        Self {
            grid: Grid::new(),
            sessions: SessionTable::new(),
            snapshots: SnapshotEngine::new(),
            events: ReliableEventTable::new(),
            config,
            game_over: false,
            next_sequence: 0,
        }
    }

    pub fn next_sequence(&mut self) -> u32 {
        let seq = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        seq
    }

    /// Attempt to acquire `cell` for `owner` at `timestamp`. On success,
    /// enqueues a reliable ACQUIRE_EVENT and flags game-over once the
    /// grid fills. Returns the emitted event, if the claim was accepted.
    pub fn try_acquire(
        &mut self,
        coord: CellCoord,
        owner: &str,
        timestamp: u64,
    ) -> Option<ServerEvent> {
        let outcome = self.grid.try_acquire(coord, owner, timestamp).ok()?;
        if outcome != mlsp::grid::AcquireOutcome::Accepted {
            return None;
        }
        let event = self.events.enqueue([coord.row, coord.col], owner.to_string(), timestamp);
        if self.grid.is_full() {
            self.game_over = true;
        }
        Some(ServerEvent::CellAcquired(event))
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub fn active_addrs(state: &ServerState) -> Vec<SocketAddr> {
    state.sessions.active_sessions().map(|s| s.addr).collect()
}
