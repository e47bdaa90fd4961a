//! Authoritative grid-acquire state: the single source of truth the
//! server mutates and the thing every snapshot/event is a projection of.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Side length of the square grid. The original implementation hardcoded
/// 5; kept as a constant rather than a config knob since changing it
/// changes the game, not just its tuning.
pub const GRID_SIZE: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellState {
    Unclaimed,
    Acquired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Unclaimed,
    Acquired { owner: String, timestamp: u64 },
}

impl Cell {
    pub fn state(&self) -> CellState {
        match self {
            Cell::Unclaimed => CellState::Unclaimed,
            Cell::Acquired { .. } => CellState::Acquired,
        }
    }

    pub fn owner(&self) -> Option<&str> {
        match self {
            Cell::Unclaimed => None,
            Cell::Acquired { owner, .. } => Some(owner),
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Cell::Unclaimed => 0,
            Cell::Acquired { timestamp, .. } => *timestamp,
        }
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell::Unclaimed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellCoord {
    pub row: u32,
    pub col: u32,
}

impl CellCoord {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    pub fn in_bounds(self) -> bool {
        self.row < GRID_SIZE && self.col < GRID_SIZE
    }

    fn index(self) -> usize {
        (self.row * GRID_SIZE + self.col) as usize
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.row, self.col)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("cell ({row},{col}) is outside the {size}x{size} grid")]
    OutOfBounds { row: u32, col: u32, size: u32 },
}

/// Outcome of attempting an acquire; `Accepted` vs `Rejected` drives
/// whether the server needs to emit an [`crate::messages::AcquireEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct Grid {
    cells: Vec<Cell>,
}

impl Default for Grid {
    fn default() -> Self {
        Self::new()
    }
}

impl Grid {
    pub fn new() -> Self {
        Self {
            cells: vec![Cell::Unclaimed; (GRID_SIZE * GRID_SIZE) as usize],
        }
    }

    pub fn get(&self, coord: CellCoord) -> Option<&Cell> {
        if !coord.in_bounds() {
            return None;
        }
        self.cells.get(coord.index())
    }

    pub fn get_mut(&mut self, coord: CellCoord) -> Option<&mut Cell> {
        if !coord.in_bounds() {
            return None;
        }
        self.cells.get_mut(coord.index())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (CellCoord, &mut Cell)> {
        self.cells.iter_mut().enumerate().map(|(idx, cell)| {
            let idx = idx as u32;
            (CellCoord::new(idx / GRID_SIZE, idx % GRID_SIZE), cell)
        })
    }

    /// Apply the accept rule: a claim wins if the cell is unclaimed, or
    /// if the challenger's timestamp predates the current owner's —
    /// earlier client-side intent wins even when it arrives later over
    /// the network. Ties (equal timestamps) keep the incumbent.
    pub fn try_acquire(
        &mut self,
        coord: CellCoord,
        owner: &str,
        timestamp: u64,
    ) -> Result<AcquireOutcome, AcquireError> {
        if !coord.in_bounds() {
            return Err(AcquireError::OutOfBounds {
                row: coord.row,
                col: coord.col,
                size: GRID_SIZE,
            });
        }

        let idx = coord.index();
        let accept = match &self.cells[idx] {
            Cell::Unclaimed => true,
            Cell::Acquired {
                timestamp: current, ..
            } => timestamp < *current,
        };

        if accept {
            self.cells[idx] = Cell::Acquired {
                owner: owner.to_string(),
                timestamp,
            };
            Ok(AcquireOutcome::Accepted)
        } else {
            Ok(AcquireOutcome::Rejected)
        }
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|c| c.state() == CellState::Acquired)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CellCoord, &Cell)> {
        self.cells.iter().enumerate().map(|(idx, cell)| {
            let idx = idx as u32;
            (CellCoord::new(idx / GRID_SIZE, idx % GRID_SIZE), cell)
        })
    }

    /// Per-player acquired-cell counts, for scoreboards and winner
    /// resolution.
    pub fn scores(&self) -> std::collections::HashMap<String, u32> {
        let mut scores = std::collections::HashMap::new();
        for (_, cell) in self.iter() {
            if let Some(owner) = cell.owner() {
                *scores.entry(owner.to_string()).or_insert(0) += 1;
            }
        }
        scores
    }

    /// Winner once the grid is full: most cells, ties broken by the
    /// numerically lowest player id (fixes the original implementation's
    /// `max()` tie-break, which favored the lexicographically-last id).
    pub fn winner(&self) -> Option<String> {
        let scores = self.scores();
        scores
            .into_iter()
            .max_by(|(id_a, score_a), (id_b, score_b)| {
                score_a
                    .cmp(score_b)
                    .then_with(|| player_id_rank(id_b).cmp(&player_id_rank(id_a)))
            })
            .map(|(id, _)| id)
    }
}

/// Player ids are assigned as stringified increasing integers; parse back
/// to compare numerically rather than lexicographically ("10" < "9" as
/// strings but not as ids).
fn player_id_rank(id: &str) -> u64 {
    id.parse().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unclaimed_cell_accepts_any_claim() {
        let mut grid = Grid::new();
        let outcome = grid
            .try_acquire(CellCoord::new(0, 0), "p1", 100)
            .unwrap();
        assert_eq!(outcome, AcquireOutcome::Accepted);
        assert_eq!(grid.get(CellCoord::new(0, 0)).unwrap().owner(), Some("p1"));
    }

    #[test]
    fn earlier_timestamp_overrides_later_claim_even_arriving_second() {
        let mut grid = Grid::new();
        grid.try_acquire(CellCoord::new(1, 1), "p1", 200).unwrap();
        let outcome = grid
            .try_acquire(CellCoord::new(1, 1), "p2", 100)
            .unwrap();
        assert_eq!(outcome, AcquireOutcome::Accepted);
        assert_eq!(grid.get(CellCoord::new(1, 1)).unwrap().owner(), Some("p2"));
    }

    #[test]
    fn later_or_equal_timestamp_is_rejected() {
        let mut grid = Grid::new();
        grid.try_acquire(CellCoord::new(2, 2), "p1", 100).unwrap();
        assert_eq!(
            grid.try_acquire(CellCoord::new(2, 2), "p2", 150).unwrap(),
            AcquireOutcome::Rejected
        );
        assert_eq!(
            grid.try_acquire(CellCoord::new(2, 2), "p2", 100).unwrap(),
            AcquireOutcome::Rejected
        );
        assert_eq!(grid.get(CellCoord::new(2, 2)).unwrap().owner(), Some("p1"));
    }

    #[test]
    fn out_of_bounds_is_rejected_with_error() {
        let mut grid = Grid::new();
        assert!(grid
            .try_acquire(CellCoord::new(GRID_SIZE, 0), "p1", 1)
            .is_err());
    }

    #[test]
    fn winner_ties_broken_by_lowest_player_id() {
        let mut grid = Grid::new();
        // 25 cells: one goes to "1", the remaining 24 split evenly 12/12
        // between "2" and "3" so their scores genuinely tie.
        for (idx, (coord, _)) in Grid::new().iter().enumerate() {
            let owner = match idx {
                0 => "1",
                idx if idx % 2 == 0 => "2",
                _ => "3",
            };
            grid.try_acquire(coord, owner, idx as u64).unwrap();
        }

        assert!(grid.is_full());
        let scores = grid.scores();
        assert_eq!(scores.get("2"), scores.get("3"));
        assert_eq!(scores.get("2"), Some(&12));
        assert_eq!(grid.winner().as_deref(), Some("2"));
    }
}
