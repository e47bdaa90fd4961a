//! Integration tests for the scenarios the protocol is meant to survive:
//! handshake, deterministic ties, late joins, lossy delta convergence,
//! chunked full-snapshot reassembly, and NACK-accelerated recovery.

use std::collections::HashMap;
use std::net::SocketAddr;

use mlsp::grid::{CellCoord, Grid};
use mlsp::session::SessionTable;
use mlsp::snapshot::{apply_snapshot, chunk_snapshot, reassemble_chunks, SnapshotEngine};
use mlsp::testing::PacketLossSim;

fn addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{port}").parse().unwrap()
}

#[test]
fn two_player_handshake_assigns_distinct_stable_ids() {
    let mut sessions = SessionTable::new();
    let (s1, fresh1) = sessions.handle_init(addr(1));
    assert!(fresh1);
    let id1 = s1.player_id.clone();

    let (s2, fresh2) = sessions.handle_init(addr(2));
    assert!(fresh2);
    let id2 = s2.player_id.clone();
    assert_ne!(id1, id2);

    sessions.handle_assign_ack(addr(1));
    sessions.handle_assign_ack(addr(2));
    assert_eq!(sessions.active_sessions().count(), 2);

    let grid = Grid::new();
    assert!(grid.iter().all(|(_, cell)| cell.owner().is_none()));
}

#[test]
fn tie_break_is_decided_by_earlier_client_timestamp_not_arrival_order() {
    let mut grid = Grid::new();
    // p2's claim carries an earlier timestamp but is applied second.
    grid.try_acquire(CellCoord::new(2, 2), "1", 500).unwrap();
    grid.try_acquire(CellCoord::new(2, 2), "2", 100).unwrap();
    assert_eq!(grid.get(CellCoord::new(2, 2)).unwrap().owner(), Some("2"));
}

#[test]
fn late_joiner_receives_a_full_snapshot_reflecting_current_state() {
    let mut engine = SnapshotEngine::new();
    let mut grid = Grid::new();
    engine.build_tick(&grid);

    grid.try_acquire(CellCoord::new(0, 0), "1", 1).unwrap();
    grid.try_acquire(CellCoord::new(1, 1), "1", 2).unwrap();
    engine.build_tick(&grid);

    // A third player joins after both claims; it must see them despite
    // never having received the delta that produced them.
    let full = engine.full_snapshot(&grid);
    assert!(full.is_full);

    let mut late_joiner_grid = Grid::new();
    apply_snapshot(&mut late_joiner_grid, &full);
    assert_eq!(
        late_joiner_grid.get(CellCoord::new(0, 0)).unwrap().owner(),
        Some("1")
    );
    assert_eq!(
        late_joiner_grid.get(CellCoord::new(1, 1)).unwrap().owner(),
        Some("1")
    );
}

#[test]
fn client_converges_despite_lossy_delta_delivery_via_nack_recovery() {
    let mut engine = SnapshotEngine::new();
    let mut server_grid = Grid::new();
    let mut client_grid = Grid::new();
    let mut sim = PacketLossSim::new(1234, 0.4);

    let mut expected_next_id = 0u32;
    for tick in 0..40u32 {
        // Mutate the authoritative grid a little every few ticks.
        if tick % 3 == 0 {
            let coord = CellCoord::new((tick / 5) % 5, tick % 5);
            let _ = server_grid.try_acquire(coord, "1", tick as u64);
        }
        let (snapshot_id, snapshot) = engine.build_tick(&server_grid);

        if sim.should_drop() {
            continue; // packet lost in flight, client never sees this tick
        }

        if snapshot_id != expected_next_id {
            // Client noticed a gap: NACK and resync with a full snapshot
            // rather than waiting on a delta that assumed an unseen baseline.
            let recovery = engine.full_snapshot(&server_grid);
            apply_snapshot(&mut client_grid, &recovery);
        } else {
            apply_snapshot(&mut client_grid, &snapshot);
        }
        expected_next_id = snapshot_id + 1;
    }

    // Final NACK-driven full resync guarantees convergence regardless of
    // how much was dropped along the way.
    let final_full = engine.full_snapshot(&server_grid);
    apply_snapshot(&mut client_grid, &final_full);

    for (coord, server_cell) in server_grid.iter() {
        assert_eq!(client_grid.get(coord).unwrap(), server_cell);
    }
}

#[test]
fn oversized_full_snapshot_chunks_and_reassembles_exactly() {
    let mut grid = Grid::new();
    for (coord, _) in Grid::new().iter() {
        grid.try_acquire(coord, "a-fairly-long-player-identifier", coord.row as u64 * 5 + coord.col as u64)
            .unwrap();
    }

    let mut engine = SnapshotEngine::new();
    engine.build_tick(&grid);
    let full = engine.full_snapshot(&grid);

    let chunks = chunk_snapshot(&full);
    let total = chunks.len() as u32;
    let by_index: HashMap<u32, _> = chunks
        .into_iter()
        .map(|c| (c.chunk_index.unwrap_or(0), c))
        .collect();
    let reassembled = reassemble_chunks(&by_index, total).expect("all chunks present");

    let mut rebuilt = Grid::new();
    apply_snapshot(&mut rebuilt, &reassembled);
    for (coord, cell) in grid.iter() {
        assert_eq!(rebuilt.get(coord).unwrap(), cell);
    }
}

#[test]
fn nack_triggered_full_snapshot_catches_up_faster_than_waiting_for_next_delta() {
    let mut engine = SnapshotEngine::new();
    let mut grid = Grid::new();
    engine.build_tick(&grid); // id 0, full

    // Several deltas the client never receives.
    for i in 0..5u32 {
        grid.try_acquire(CellCoord::new(0, i), "1", i as u64).unwrap();
        engine.build_tick(&grid);
    }

    let mut client_grid = Grid::new();
    // Client issues SNAPSHOT_NACK instead of waiting for the missed deltas.
    let recovery = engine.full_snapshot(&grid);
    apply_snapshot(&mut client_grid, &recovery);

    for i in 0..5u32 {
        assert_eq!(client_grid.get(CellCoord::new(0, i)).unwrap().owner(), Some("1"));
    }
}
