use std::net::SocketAddr;

use mlsp::messages::AcquireEvent;

/// Internal notifications the packet handlers raise for the TUI and for
/// logging — distinct from the wire [`AcquireEvent`], which this wraps.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    PlayerJoined { player_id: String, addr: SocketAddr },
    PlayerActivated { player_id: String },
    CellAcquired(AcquireEvent),
    GameOver { winner: String },
}
