use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use mlsp::grid::CellCoord;
use mlsp::messages::{
    AcquireAck, AcquireReq, AssignIdAck, GameOver, Init, Message, SnapshotAck, SnapshotNack,
};
use mlsp::protocol::MessageType;
use mlsp::session::SessionState;
use mlsp::{Config, Packet};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use crate::render::{ClickEvent, RenderSink};
use crate::state::ClientState;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub struct NetworkClient {
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    state: Arc<Mutex<ClientState>>,
    sequence: AtomicU32,
}

impl NetworkClient {
    pub async fn connect(bind: SocketAddr, server_addr: SocketAddr, config: Config) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(bind)
            .await
            .with_context(|| format!("binding client socket on {bind}"))?;
        Ok(Self {
            socket: Arc::new(socket),
            server_addr,
            state: Arc::new(Mutex::new(ClientState::new(config))),
            sequence: AtomicU32::new(0),
        })
    }

    pub fn state_handle(&self) -> Arc<Mutex<ClientState>> {
        self.state.clone()
    }

    fn next_sequence(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    async fn send(&self, kind: MessageType, snapshot_id: u32, message: Message) {
        let packet = Packet::new(kind, snapshot_id, self.next_sequence(), now_ms(), message);
        let bytes = packet.encode();
        if let Err(err) = self.socket.send_to(&bytes, self.server_addr).await {
            log::warn!("send to server failed: {err}");
        }
    }

    /// Spawn the client's four concurrent tasks: inbound receiver,
    /// render-delay drainer, watchdog, and INIT resender.
    pub fn spawn(
        self: Arc<Self>,
        render_sink: Arc<Mutex<dyn RenderSink>>,
        mut clicks: tokio::sync::mpsc::UnboundedReceiver<ClickEvent>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();
        handles.push(self.clone().spawn_receiver(render_sink.clone()));
        handles.push(self.clone().spawn_render_drainer(render_sink));
        handles.push(self.clone().spawn_watchdog());
        handles.push(self.clone().spawn_init_resender());

        let this = self.clone();
        handles.push(tokio::spawn(async move {
            while let Some(click) = clicks.recv().await {
                this.request_acquire(click.coord).await;
            }
        }));

        handles
    }

    pub async fn start_handshake(&self) {
        self.send(MessageType::Init, 0, Message::Init(Init {})).await;
    }

    pub async fn request_acquire(&self, coord: CellCoord) {
        let id = {
            let state = self.state.lock().await;
            state.player_id.clone().unwrap_or_default()
        };
        self.send(
            MessageType::AcquireReq,
            0,
            Message::AcquireReq(AcquireReq {
                id,
                cell: [coord.row, coord.col],
                timestamp: now_ms(),
            }),
        )
        .await;
    }

    fn spawn_receiver(self: Arc<Self>, render_sink: Arc<Mutex<dyn RenderSink>>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            loop {
                let len = match self.socket.recv(&mut buf).await {
                    Ok(len) => len,
                    Err(err) => {
                        log::warn!("recv failed: {err}");
                        continue;
                    }
                };
                let packet = match Packet::decode(&buf[..len]) {
                    Ok(packet) => packet,
                    Err(err) => {
                        log::debug!("dropping malformed packet: {err}");
                        continue;
                    }
                };
                self.handle_packet(packet, &render_sink).await;
            }
        })
    }

    async fn handle_packet(&self, packet: Packet, render_sink: &Arc<Mutex<dyn RenderSink>>) {
        let mut state = self.state.lock().await;
        state.touch();

        match packet.message {
            Message::AssignId(assign) => {
                state.player_id = Some(assign.id);
                state.handshake = SessionState::PendingAssignAck;
                drop(state);
                self.send(MessageType::AssignIdAck, 0, Message::AssignIdAck(AssignIdAck {}))
                    .await;
            }
            Message::Snapshot(snapshot) => {
                state.ingest_snapshot(packet.header.snapshot_id, snapshot);
                if state.handshake == SessionState::PendingAssignAck {
                    state.handshake = SessionState::Active;
                }
            }
            Message::AcquireEvent(event) => {
                // Applied immediately; this channel exists precisely so
                // acquisitions don't wait on the render-delay buffer.
                let coord = CellCoord::new(event.cell[0], event.cell[1]);
                let _ = state.grid.try_acquire(coord, &event.owner, event.timestamp);
                let event_id = event.event_id;
                drop(state);
                self.send(
                    MessageType::AcquireAck,
                    0,
                    Message::AcquireAck(AcquireAck { event_id }),
                )
                .await;
            }
            Message::GameOver(GameOver { winner, scoreboard }) => {
                state.game_over = true;
                state.winner = Some(winner.clone());
                state.scoreboard = scoreboard.clone();
                drop(state);
                let mut sink = render_sink.lock().await;
                sink.on_game_over(&winner, &scoreboard);
            }
            _ => {}
        }
    }

    fn spawn_render_drainer(self: Arc<Self>, render_sink: Arc<Mutex<dyn RenderSink>>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(10));
            loop {
                ticker.tick().await;
                let applied_id = {
                    let mut state = self.state.lock().await;
                    state.drain_due()
                };
                if let Some(snapshot_id) = applied_id {
                    {
                        let state = self.state.lock().await;
                        let mut sink = render_sink.lock().await;
                        sink.on_grid_applied(&state.grid);
                    }
                    self.send(
                        MessageType::SnapshotAck,
                        snapshot_id,
                        Message::SnapshotAck(SnapshotAck { snapshot_id }),
                    )
                    .await;
                }
            }
        })
    }

    fn spawn_watchdog(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(100));
            loop {
                ticker.tick().await;
                let (expired, last_snapshot) = {
                    let mut state = self.state.lock().await;
                    let expired = state.is_watchdog_expired();
                    if expired {
                        // Resets the clock so we nack at most once per
                        // timeout window rather than spamming it.
                        state.touch();
                    }
                    (expired, state.latest_applied)
                };
                if expired {
                    log::warn!("watchdog: no packets from server within timeout, sending SNAPSHOT_NACK");
                    self.send(
                        MessageType::SnapshotNack,
                        0,
                        Message::SnapshotNack(SnapshotNack { last_snapshot }),
                    )
                    .await;
                }
            }
        })
    }

    fn spawn_init_resender(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let interval = {
                let state = self.state.lock().await;
                state.config.init_resend_interval
            };
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let handshake = {
                    let state = self.state.lock().await;
                    state.handshake
                };
                if handshake == SessionState::None {
                    self.start_handshake().await;
                } else {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn watchdog_sends_snapshot_nack_after_silence() {
        let server_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server_socket.local_addr().unwrap();

        let mut config = Config::default();
        config.watchdog_timeout = Duration::from_millis(50);

        let client = Arc::new(
            NetworkClient::connect("127.0.0.1:0".parse().unwrap(), server_addr, config)
                .await
                .unwrap(),
        );
        let _watchdog = client.clone().spawn_watchdog();

        tokio::time::advance(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;

        let mut buf = [0u8; 2048];
        let (len, _) = server_socket.recv_from(&mut buf).await.unwrap();
        let packet = Packet::decode(&buf[..len]).unwrap();
        assert!(matches!(packet.message, Message::SnapshotNack(_)));
    }
}
