use std::net::SocketAddr;

use mlsp::grid::CellCoord;
use mlsp::messages::{
    AssignId, GameOver as GameOverPayload, Message, Snapshot, SnapshotNack,
};
use mlsp::protocol::MessageType;
use mlsp::Packet;

use crate::events::ServerEvent;
use crate::state::{active_addrs, now_ms, ServerState};

pub struct Outgoing {
    pub to: SocketAddr,
    pub packet: Packet,
}

fn make(state: &mut ServerState, kind: MessageType, snapshot_id: u32, message: Message) -> Packet {
    Packet::new(kind, snapshot_id, state.next_sequence(), now_ms(), message)
}

/// Process one inbound packet, mutating `state` and returning whatever
/// needs to go back out over the wire plus notifications for the TUI.
pub fn dispatch(
    state: &mut ServerState,
    from: SocketAddr,
    packet: Packet,
) -> (Vec<Outgoing>, Vec<ServerEvent>) {
    let mut out = Vec::new();
    let mut events = Vec::new();

    match packet.message {
        Message::Init(_) => {
            let known = state.sessions.get(&from).is_some();
            if !known && state.sessions.len() >= state.config.max_clients {
                log::warn!("rejecting INIT from {from}: at max_clients ({})", state.config.max_clients);
                return (out, events);
            }
            let (session, fresh) = state.sessions.handle_init(from);
            let player_id = session.player_id.clone();
            if fresh {
                events.push(ServerEvent::PlayerJoined {
                    player_id: player_id.clone(),
                    addr: from,
                });
            }
            let reply = make(
                state,
                MessageType::AssignId,
                0,
                Message::AssignId(AssignId { id: player_id }),
            );
            out.push(Outgoing { to: from, packet: reply });
        }

        Message::AssignIdAck(_) => {
            state.sessions.handle_assign_ack(from);
            if let Some(session) = state.sessions.get(&from) {
                events.push(ServerEvent::PlayerActivated {
                    player_id: session.player_id.clone(),
                });
            }
            send_full_snapshot(state, from, &mut out);
        }

        Message::AcquireReq(req) => {
            // The payload carries the claimant's id directly; the server
            // is robust to unknown or not-yet-active player ids rather
            // than gating on session/handshake state.
            let coord = CellCoord::new(req.cell[0], req.cell[1]);
            if let Some(ServerEvent::CellAcquired(acquire_event)) =
                state.try_acquire(coord, &req.id, req.timestamp)
            {
                let recipients = active_addrs(state);
                for &addr in &recipients {
                    let packet = make(
                        state,
                        MessageType::AcquireEvent,
                        0,
                        Message::AcquireEvent(acquire_event.clone()),
                    );
                    out.push(Outgoing { to: addr, packet });
                }
                events.push(ServerEvent::CellAcquired(acquire_event));

                if state.game_over {
                    // One last delta snapshot so the winning mutation
                    // reaches every client through the normal snapshot
                    // channel too, not just the reliable-event one.
                    let (snapshot_id, snapshot) = state.snapshots.build_tick(&state.grid);
                    for chunk in mlsp::snapshot::chunk_snapshot(&snapshot) {
                        for &addr in &recipients {
                            let packet = make(state, MessageType::Snapshot, snapshot_id, Message::Snapshot(chunk.clone()));
                            out.push(Outgoing { to: addr, packet });
                        }
                    }

                    if let Some(winner) = state.grid.winner() {
                        let scoreboard = state.grid.scores();
                        for &addr in &recipients {
                            let packet = make(
                                state,
                                MessageType::GameOver,
                                0,
                                Message::GameOver(GameOverPayload {
                                    winner: winner.clone(),
                                    scoreboard: scoreboard.clone(),
                                }),
                            );
                            out.push(Outgoing { to: addr, packet });
                        }
                        events.push(ServerEvent::GameOver { winner });
                    }
                }
            }
        }

        Message::SnapshotAck(ack) => {
            state.sessions.record_snapshot_ack(&from, ack.snapshot_id);
        }

        Message::SnapshotNack(SnapshotNack { .. }) => {
            send_full_snapshot(state, from, &mut out);
        }

        Message::AcquireAck(ack) => {
            state.events.record_ack(from, ack.event_id);
        }

        // These are server-bound-only in name but client-originated in
        // direction; a well-behaved client never sends them.
        Message::Snapshot(_) | Message::AcquireEvent(_) | Message::GameOver(_) => {}
    }

    (out, events)
}

/// Chunk-aware immediate full snapshot push, used for late joiners and
/// NACK-driven recovery alike.
fn send_full_snapshot(state: &mut ServerState, to: SocketAddr, out: &mut Vec<Outgoing>) {
    let snapshot_id = state.snapshots.current_snapshot_id().unwrap_or(0);
    let full: Snapshot = state.snapshots.full_snapshot(&state.grid);
    for chunk in mlsp::snapshot::chunk_snapshot(&full) {
        let packet = make(state, MessageType::Snapshot, snapshot_id, Message::Snapshot(chunk));
        out.push(Outgoing { to, packet });
    }
}
