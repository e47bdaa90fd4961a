//! Delta-snapshot reliability layer: authoritative / baseline / sending
//! three-grid model, plus binary-recursive chunking for snapshots that
//! would otherwise exceed [`crate::protocol::MAX_PACKET_SIZE`].

use std::collections::HashMap;

use std::time::{SystemTime, UNIX_EPOCH};

use crate::grid::{Cell, CellCoord, Grid};
use crate::messages::{CellWire, Snapshot};
use crate::protocol::{HEADER_SIZE, MAX_PACKET_SIZE};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn cell_wire(cell: &Cell) -> CellWire {
    CellWire {
        state: cell.state(),
        owner: cell.owner().map(str::to_string),
        timestamp: cell.timestamp(),
    }
}

fn full_cells(grid: &Grid) -> HashMap<String, CellWire> {
    grid.iter()
        .map(|(coord, cell)| (coord.to_string(), cell_wire(cell)))
        .collect()
}

fn delta_cells(baseline: &Grid, current: &Grid) -> HashMap<String, CellWire> {
    current
        .iter()
        .filter_map(|(coord, cell)| {
            let unchanged = baseline.get(coord).is_some_and(|b| b == cell);
            (!unchanged).then(|| (coord.to_string(), cell_wire(cell)))
        })
        .collect()
}

/// Drives the authoritative/baseline/sending model on the server side.
///
/// - `baseline`: the grid state every active session is known to have
///   fully applied.
/// - `sending`: the grid state as of the most recently built snapshot,
///   i.e. what `baseline` will become once every active session acks
///   that snapshot's id.
#[derive(Debug)]
pub struct SnapshotEngine {
    baseline: Grid,
    sending: Grid,
    next_snapshot_id: u32,
    last_sent_id: Option<u32>,
}

impl Default for SnapshotEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotEngine {
    pub fn new() -> Self {
        Self {
            baseline: Grid::new(),
            sending: Grid::new(),
            next_snapshot_id: 0,
            last_sent_id: None,
        }
    }

    /// Build the next broadcast tick's snapshot. The very first call ever
    /// sends a full snapshot since there is no baseline to diff against;
    /// every subsequent call sends only what changed since `sending`
    /// last moved. `snapshot_id` always increments, even when the delta
    /// is empty, so NACKs can reference a stable timeline.
    pub fn build_tick(&mut self, authoritative: &Grid) -> (u32, Snapshot) {
        let snapshot_id = self.next_snapshot_id;
        self.next_snapshot_id += 1;

        let is_full = self.last_sent_id.is_none();
        let cells = if is_full {
            full_cells(authoritative)
        } else {
            delta_cells(&self.baseline, authoritative)
        };

        self.sending = authoritative.clone();
        self.last_sent_id = Some(snapshot_id);

        (
            snapshot_id,
            Snapshot {
                is_full,
                grid: cells,
                timestamp: now_ms(),
                chunk_index: None,
                total_chunks: None,
            },
        )
    }

    /// Force a full snapshot for a client that needs to catch up from
    /// scratch (late join, or a NACK the server chooses not to diff).
    /// Reuses the current tick id rather than minting a new one, since it
    /// describes the same authoritative instant.
    pub fn full_snapshot(&self, authoritative: &Grid) -> Snapshot {
        Snapshot {
            is_full: true,
            grid: full_cells(authoritative),
            timestamp: now_ms(),
            chunk_index: None,
            total_chunks: None,
        }
    }

    pub fn current_snapshot_id(&self) -> Option<u32> {
        self.last_sent_id
    }

    /// Advance `baseline` to `sending` once every active session has
    /// acked the most recently sent snapshot — the watermark the session
    /// table reports via
    /// [`crate::session::SessionTable::safe_ack_watermark`].
    pub fn try_advance_baseline(&mut self, safe_watermark: Option<u32>) {
        let (Some(watermark), Some(last_sent)) = (safe_watermark, self.last_sent_id) else {
            return;
        };
        if watermark >= last_sent {
            self.baseline = self.sending.clone();
        }
    }

    pub fn baseline(&self) -> &Grid {
        &self.baseline
    }
}

/// Split a snapshot's cell map across multiple packets, halving
/// recursively until every piece's encoded size clears the packet cap.
/// Single-cell pieces are emitted as-is even if they'd still overflow
/// (that would mean a single cell's JSON exceeds the packet cap, which
/// `debug_assert`s below rather than looping forever).
pub fn chunk_snapshot(snapshot: &Snapshot) -> Vec<Snapshot> {
    let mut entries: Vec<(String, CellWire)> = snapshot.grid.clone().into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let budget = MAX_PACKET_SIZE.saturating_sub(HEADER_SIZE);
    let pieces = split_entries(entries, snapshot.is_full, budget);
    let total = pieces.len() as u32;

    pieces
        .into_iter()
        .enumerate()
        .map(|(idx, cells)| Snapshot {
            is_full: snapshot.is_full,
            grid: cells,
            timestamp: snapshot.timestamp,
            chunk_index: (total > 1).then_some(idx as u32),
            total_chunks: (total > 1).then_some(total),
        })
        .collect()
}

fn split_entries(
    entries: Vec<(String, CellWire)>,
    is_full: bool,
    budget: usize,
) -> Vec<HashMap<String, CellWire>> {
    let cells: HashMap<String, CellWire> = entries.iter().cloned().collect();
    let probe = Snapshot {
        is_full,
        grid: cells.clone(),
        timestamp: 0,
        chunk_index: Some(0),
        total_chunks: Some(1),
    };
    let encoded_size = serde_json::to_vec(&probe).expect("snapshot serializes").len();

    if encoded_size <= budget || entries.len() <= 1 {
        debug_assert!(
            entries.len() <= 1 || encoded_size <= budget,
            "chunk of {} cells still exceeds the {}-byte budget",
            entries.len(),
            budget
        );
        return vec![cells];
    }

    let mid = entries.len() / 2;
    let mut left = entries;
    let right = left.split_off(mid);

    let mut result = split_entries(left, is_full, budget);
    result.extend(split_entries(right, is_full, budget));
    result
}

/// Reassemble chunks collected by the client into a single cell map.
/// Accepts them out of order; returns `None` until every chunk index
/// `0..total_chunks` has been seen.
pub fn reassemble_chunks(chunks: &HashMap<u32, Snapshot>, total_chunks: u32) -> Option<Snapshot> {
    let mut cells = HashMap::new();
    let mut is_full = false;
    let mut timestamp = 0;
    for idx in 0..total_chunks {
        let chunk = chunks.get(&idx)?;
        is_full = chunk.is_full;
        timestamp = chunk.timestamp;
        cells.extend(chunk.grid.clone());
    }
    Some(Snapshot {
        is_full,
        grid: cells,
        timestamp,
        chunk_index: None,
        total_chunks: None,
    })
}

/// Apply a (possibly partial, possibly full) snapshot's cells onto a live
/// grid **in place** — callers must never replace the grid container
/// wholesale, since external render-sink references are expected to stay
/// valid across an apply.
pub fn apply_snapshot(grid: &mut Grid, snapshot: &Snapshot) {
    if snapshot.is_full {
        for (coord, cell) in grid.iter_mut() {
            *cell = Cell::Unclaimed;
            let _ = coord;
        }
    }
    for (key, wire) in &snapshot.grid {
        let Some(coord) = parse_coord(key) else {
            continue;
        };
        if let Some(cell) = grid.get_mut(coord) {
            *cell = match wire.owner.as_ref() {
                Some(owner) => Cell::Acquired {
                    owner: owner.clone(),
                    timestamp: wire.timestamp,
                },
                None => Cell::Unclaimed,
            };
        }
    }
}

fn parse_coord(key: &str) -> Option<CellCoord> {
    let (row, col) = key.split_once(',')?;
    Some(CellCoord::new(row.parse().ok()?, col.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GRID_SIZE;

    #[test]
    fn first_tick_is_full_and_subsequent_ticks_are_deltas() {
        let mut engine = SnapshotEngine::new();
        let mut grid = Grid::new();

        let (id0, snap0) = engine.build_tick(&grid);
        assert_eq!(id0, 0);
        assert!(snap0.is_full);
        assert_eq!(snap0.grid.len(), (GRID_SIZE * GRID_SIZE) as usize);

        grid.try_acquire(CellCoord::new(0, 0), "1", 10).unwrap();
        let (id1, snap1) = engine.build_tick(&grid);
        assert_eq!(id1, 1);
        assert!(!snap1.is_full);
        assert_eq!(snap1.grid.len(), 1);
        assert!(snap1.grid.contains_key("0,0"));
    }

    #[test]
    fn snapshot_ids_are_monotonic() {
        let mut engine = SnapshotEngine::new();
        let grid = Grid::new();
        let mut prev = None;
        for _ in 0..10 {
            let (id, _) = engine.build_tick(&grid);
            if let Some(prev) = prev {
                assert!(id > prev);
            }
            prev = Some(id);
        }
    }

    #[test]
    fn baseline_only_advances_once_watermark_clears() {
        let mut engine = SnapshotEngine::new();
        let mut grid = Grid::new();
        engine.build_tick(&grid); // id 0, full
        grid.try_acquire(CellCoord::new(0, 0), "1", 5).unwrap();
        engine.build_tick(&grid); // id 1, delta

        engine.try_advance_baseline(Some(1)); // watermark 1 >= last_sent 1 => advances
        assert_eq!(
            engine.baseline().get(CellCoord::new(0, 0)).unwrap().owner(),
            Some("1")
        );
    }

    #[test]
    fn baseline_does_not_advance_when_nobody_has_acked() {
        let mut engine = SnapshotEngine::new();
        let mut grid = Grid::new();
        engine.build_tick(&grid);
        grid.try_acquire(CellCoord::new(0, 0), "1", 5).unwrap();
        engine.build_tick(&grid);
        engine.try_advance_baseline(None);
        assert!(engine
            .baseline()
            .iter()
            .all(|(_, c)| matches!(c, Cell::Unclaimed)));
    }

    #[test]
    fn chunking_produces_disjoint_union_covering_every_cell() {
        let mut grid = Grid::new();
        for row in 0..GRID_SIZE {
            for col in 0..GRID_SIZE {
                grid.try_acquire(CellCoord::new(row, col), "123456789", (row * GRID_SIZE + col) as u64)
                    .unwrap();
            }
        }
        let snapshot = Snapshot {
            is_full: true,
            grid: full_cells(&grid),
            timestamp: 0,
            chunk_index: None,
            total_chunks: None,
        };
        let chunks = chunk_snapshot(&snapshot);
        let mut seen = HashMap::new();
        for chunk in &chunks {
            for key in chunk.grid.keys() {
                assert!(seen.insert(key.clone(), ()).is_none(), "key {key} duplicated across chunks");
            }
        }
        assert_eq!(seen.len(), snapshot.grid.len());
    }

    #[test]
    fn reassembled_chunks_match_original_snapshot() {
        let mut grid = Grid::new();
        for row in 0..GRID_SIZE {
            for col in 0..GRID_SIZE {
                grid.try_acquire(CellCoord::new(row, col), "player-with-a-long-id", (row * GRID_SIZE + col) as u64)
                    .unwrap();
            }
        }
        let snapshot = Snapshot {
            is_full: true,
            grid: full_cells(&grid),
            timestamp: 0,
            chunk_index: None,
            total_chunks: None,
        };
        let chunks = chunk_snapshot(&snapshot);
        let total = chunks.len() as u32;
        let by_index: HashMap<u32, Snapshot> = chunks
            .into_iter()
            .map(|c| (c.chunk_index.unwrap_or(0), c))
            .collect();
        let reassembled = reassemble_chunks(&by_index, total).unwrap();
        assert_eq!(reassembled.grid.len(), snapshot.grid.len());
    }

    #[test]
    fn apply_full_snapshot_clears_cells_absent_from_payload() {
        let mut grid = Grid::new();
        grid.try_acquire(CellCoord::new(0, 0), "1", 1).unwrap();
        let empty_full = Snapshot {
            is_full: true,
            grid: HashMap::new(),
            timestamp: 0,
            chunk_index: None,
            total_chunks: None,
        };
        apply_snapshot(&mut grid, &empty_full);
        assert_eq!(grid.get(CellCoord::new(0, 0)).unwrap().owner(), None);
    }
}
