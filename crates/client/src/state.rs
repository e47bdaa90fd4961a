use std::collections::HashMap;
use std::time::Instant;

use mlsp::grid::Grid;
use mlsp::messages::Snapshot;
use mlsp::session::SessionState;
use mlsp::Config;

/// Chunks of a single in-flight (possibly multi-packet) snapshot,
/// collected until every index `0..total_chunks` has arrived.
#[derive(Debug, Default)]
struct ChunkAssembly {
    total_chunks: u32,
    chunks: HashMap<u32, Snapshot>,
}

/// A snapshot queued behind the render-delay buffer: jitter absorption
/// means applying it slightly later than it was received, not as soon
/// as the bytes land.
pub struct DelayedSnapshot {
    pub apply_at: Instant,
    pub snapshot_id: u32,
    pub snapshot: Snapshot,
}

pub struct ClientState {
    pub grid: Grid,
    pub player_id: Option<String>,
    pub handshake: SessionState,
    pub config: Config,
    pub last_heard: Instant,
    pub last_acked_snapshot: Option<u32>,
    /// Highest snapshot id queued for render so far (§4.7 step 3's
    /// `latest_applied`). Distinct from `last_acked_snapshot`, which only
    /// advances once the render-delay buffer actually drains it.
    pub latest_applied: Option<u32>,
    pub game_over: bool,
    pub winner: Option<String>,
    pub scoreboard: HashMap<String, u32>,
    in_flight: HashMap<u32, ChunkAssembly>,
    delay_queue: Vec<DelayedSnapshot>,
}

impl ClientState {
    pub fn new(config: Config) -> Self {
        Self {
            grid: Grid::new(),
            player_id: None,
            handshake: SessionState::None,
            config,
            last_heard: Instant::now(),
            last_acked_snapshot: None,
            latest_applied: None,
            game_over: false,
            winner: None,
            scoreboard: HashMap::new(),
            in_flight: HashMap::new(),
            delay_queue: Vec::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_heard = Instant::now();
    }

    pub fn is_watchdog_expired(&self) -> bool {
        self.last_heard.elapsed() > self.config.watchdog_timeout
    }

    /// Feed one received snapshot packet (a whole snapshot, or one chunk
    /// of one). Drops anything at or behind `latest_applied` outright —
    /// under UDP reordering a stale packet must never clobber a newer
    /// one already queued. Returns the reassembled snapshot once
    /// complete, queued for release after the render delay.
    pub fn ingest_snapshot(&mut self, snapshot_id: u32, snapshot: Snapshot) {
        if self.latest_applied.is_some_and(|latest| snapshot_id <= latest) {
            return;
        }

        let complete = match (snapshot.chunk_index, snapshot.total_chunks) {
            (Some(idx), Some(total)) => {
                let assembly = self.in_flight.entry(snapshot_id).or_insert_with(|| ChunkAssembly {
                    total_chunks: total,
                    chunks: HashMap::new(),
                });
                assembly.chunks.insert(idx, snapshot);
                if assembly.chunks.len() as u32 >= assembly.total_chunks {
                    let assembly = self.in_flight.remove(&snapshot_id).unwrap();
                    mlsp::snapshot::reassemble_chunks(&assembly.chunks, assembly.total_chunks)
                } else {
                    None
                }
            }
            _ => Some(snapshot),
        };

        if let Some(snapshot) = complete {
            self.latest_applied = Some(snapshot_id);
            self.delay_queue.push(DelayedSnapshot {
                apply_at: Instant::now() + self.config.render_delay,
                snapshot_id,
                snapshot,
            });
        }
    }

    /// Drain and apply every delayed snapshot whose time has come, in
    /// receive order, returning the highest snapshot id applied (for the
    /// cumulative SNAPSHOT_ACK) if anything was applied.
    pub fn drain_due(&mut self) -> Option<u32> {
        let now = Instant::now();
        let ready_count = self.delay_queue.iter().take_while(|d| d.apply_at <= now).count();
        if ready_count == 0 {
            return None;
        }
        let ready: Vec<_> = self.delay_queue.drain(..ready_count).collect();
        let mut highest = None;
        for DelayedSnapshot { snapshot_id, snapshot, .. } in ready {
            mlsp::snapshot::apply_snapshot(&mut self.grid, &snapshot);
            highest = Some(highest.map_or(snapshot_id, |h: u32| h.max(snapshot_id)));
        }
        if let Some(h) = highest {
            self.last_acked_snapshot = Some(self.last_acked_snapshot.map_or(h, |p| p.max(h)));
        }
        highest
    }

    pub fn has_pending_snapshots(&self) -> bool {
        !self.delay_queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn snapshot(chunk_index: Option<u32>, total_chunks: Option<u32>) -> Snapshot {
        Snapshot {
            is_full: true,
            grid: Map::new(),
            timestamp: 0,
            chunk_index,
            total_chunks,
        }
    }

    #[test]
    fn single_packet_snapshot_is_queued_immediately() {
        let mut state = ClientState::new(Config::default());
        state.ingest_snapshot(0, snapshot(None, None));
        assert!(state.has_pending_snapshots());
    }

    #[test]
    fn chunked_snapshot_only_queues_once_every_chunk_arrives() {
        let mut state = ClientState::new(Config::default());
        state.ingest_snapshot(1, snapshot(Some(0), Some(2)));
        assert!(!state.has_pending_snapshots());
        state.ingest_snapshot(1, snapshot(Some(1), Some(2)));
        assert!(state.has_pending_snapshots());
    }

    #[test]
    fn stale_snapshot_is_dropped_after_a_newer_one_already_queued() {
        let mut state = ClientState::new(Config::default());
        state.ingest_snapshot(5, snapshot(None, None));
        assert_eq!(state.latest_applied, Some(5));

        state.delay_queue.clear();
        state.ingest_snapshot(3, snapshot(None, None));
        assert!(
            !state.has_pending_snapshots(),
            "a snapshot id behind latest_applied must be dropped, not queued"
        );
        assert_eq!(state.latest_applied, Some(5));
    }

    #[test]
    fn duplicate_snapshot_id_is_dropped() {
        let mut state = ClientState::new(Config::default());
        state.ingest_snapshot(5, snapshot(None, None));
        state.delay_queue.clear();
        state.ingest_snapshot(5, snapshot(None, None));
        assert!(!state.has_pending_snapshots());
    }
}
