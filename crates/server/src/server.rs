use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use mlsp::protocol::MessageType;
use mlsp::{Config, Packet};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::events::ServerEvent;
use crate::handlers::{self, Outgoing};
use crate::state::{active_addrs, now_ms, ServerState};

/// Owns the socket and the shared, mutex-guarded game state, and spawns
/// the five concurrent tasks that drive the server: inbound dispatch,
/// periodic broadcast, ACQUIRE event retransmission, baseline
/// advancement, and ASSIGN_ID resend for sessions stuck awaiting ack.
pub struct GameServer {
    socket: Arc<UdpSocket>,
    state: Arc<Mutex<ServerState>>,
}

impl GameServer {
    pub async fn bind(addr: SocketAddr, config: Config) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("binding UDP socket on {addr}"))?;
        Ok(Self {
            socket: Arc::new(socket),
            state: Arc::new(Mutex::new(ServerState::new(config))),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn state_handle(&self) -> Arc<Mutex<ServerState>> {
        self.state.clone()
    }

    /// Spawn the five server tasks. `events_tx` receives a copy of every
    /// internally-raised [`ServerEvent`], e.g. for the TUI; pass `None`
    /// to run headless.
    pub fn spawn(&self, events_tx: Option<mpsc::UnboundedSender<ServerEvent>>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();
        handles.push(self.spawn_receiver(events_tx));
        handles.push(self.spawn_broadcaster());
        handles.push(self.spawn_event_retransmitter());
        handles.push(self.spawn_baseline_advancer());
        handles.push(self.spawn_assign_id_resender());
        handles
    }

    fn spawn_receiver(
        &self,
        events_tx: Option<mpsc::UnboundedSender<ServerEvent>>,
    ) -> tokio::task::JoinHandle<()> {
        let socket = self.socket.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            loop {
                let (len, from) = match socket.recv_from(&mut buf).await {
                    Ok(pair) => pair,
                    Err(err) => {
                        log::warn!("recv_from failed: {err}");
                        continue;
                    }
                };
                let packet = match Packet::decode(&buf[..len]) {
                    Ok(packet) => packet,
                    Err(err) => {
                        log::debug!("dropping malformed packet from {from}: {err}");
                        continue;
                    }
                };
                let (outgoing, raised) = {
                    let mut state = state.lock().await;
                    handlers::dispatch(&mut state, from, packet)
                };
                send_all(&socket, outgoing).await;
                if let Some(tx) = &events_tx {
                    for event in raised {
                        let _ = tx.send(event);
                    }
                }
            }
        })
    }

    fn spawn_broadcaster(&self) -> tokio::task::JoinHandle<()> {
        let socket = self.socket.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            let interval = {
                let state = state.lock().await;
                state.config.broadcast_interval
            };
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let outgoing = {
                    let mut state = state.lock().await;
                    if state.game_over {
                        continue;
                    }
                    let (snapshot_id, snapshot) = state.snapshots.build_tick(&state.grid);
                    let recipients = active_addrs(&state);
                    let mut outgoing = Vec::new();
                    for chunk in mlsp::snapshot::chunk_snapshot(&snapshot) {
                        for &addr in &recipients {
                            let seq = state.next_sequence();
                            let packet = Packet::new(
                                MessageType::Snapshot,
                                snapshot_id,
                                seq,
                                now_ms(),
                                mlsp::messages::Message::Snapshot(chunk.clone()),
                            );
                            outgoing.push(Outgoing { to: addr, packet });
                        }
                    }
                    outgoing
                };
                send_all(&socket, outgoing).await;
            }
        })
    }

    fn spawn_event_retransmitter(&self) -> tokio::task::JoinHandle<()> {
        let socket = self.socket.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            let interval = {
                let state = state.lock().await;
                state.config.event_retransmit_interval
            };
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let outgoing = {
                    let mut state = state.lock().await;
                    let recipients = active_addrs(&state);
                    let mut outgoing = Vec::new();
                    for &addr in &recipients {
                        let pending: Vec<_> = state.events.outstanding_for(&addr).cloned().collect();
                        for event in pending {
                            let seq = state.next_sequence();
                            let packet = Packet::new(
                                MessageType::AcquireEvent,
                                0,
                                seq,
                                now_ms(),
                                mlsp::messages::Message::AcquireEvent(event),
                            );
                            outgoing.push(Outgoing { to: addr, packet });
                        }
                    }
                    state.events.retire_fully_acked(&recipients);
                    outgoing
                };
                send_all(&socket, outgoing).await;
            }
        })
    }

    fn spawn_baseline_advancer(&self) -> tokio::task::JoinHandle<()> {
        let state = self.state.clone();
        tokio::spawn(async move {
            let interval = {
                let state = state.lock().await;
                state.config.broadcast_interval
            };
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let mut state = state.lock().await;
                let watermark = state.sessions.safe_ack_watermark();
                state.snapshots.try_advance_baseline(watermark);
            }
        })
    }

    /// Independently resends ASSIGN_ID to any session still waiting on
    /// ASSIGN_ID_ACK, in case the first reply was lost — the client's own
    /// INIT-resend loop would eventually recover this too, but this
    /// closes the gap without waiting on the client's timer.
    fn spawn_assign_id_resender(&self) -> tokio::task::JoinHandle<()> {
        let socket = self.socket.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            let interval = {
                let state = state.lock().await;
                state.config.assign_id_resend_interval
            };
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let outgoing = {
                    let mut state = state.lock().await;
                    let due = state.sessions.due_for_assign_id_resend(interval);
                    let mut outgoing = Vec::new();
                    for (addr, player_id) in due {
                        let seq = state.next_sequence();
                        let packet = Packet::new(
                            MessageType::AssignId,
                            0,
                            seq,
                            now_ms(),
                            mlsp::messages::Message::AssignId(mlsp::messages::AssignId { id: player_id }),
                        );
                        outgoing.push(Outgoing { to: addr, packet });
                    }
                    outgoing
                };
                send_all(&socket, outgoing).await;
            }
        })
    }
}

async fn send_all(socket: &UdpSocket, outgoing: Vec<Outgoing>) {
    for Outgoing { to, packet } in outgoing {
        let bytes = packet.encode();
        if let Err(err) = socket.send_to(&bytes, to).await {
            log::warn!("send_to {to} failed: {err}");
        }
    }
}
