//! Per-message JSON payload shapes and the dispatch enum that ties a
//! [`crate::protocol::MessageType`] wire id to the struct it carries.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::grid::CellState;
use crate::protocol::MessageType;

/// Client -> server. Empty; the handshake is identified purely by the
/// header's message type and the sender's UDP endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Init {}

/// Server -> client, first reply to [`Init`]. `id` is the canonical
/// identity the client must echo on every subsequent packet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignId {
    pub id: String,
}

/// Client -> server, acknowledges an [`AssignId`]. Carries no payload of
/// its own; the server matches it by sender endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignIdAck {}

/// Wire representation of a single grid cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellWire {
    pub state: CellState,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub owner: Option<String>,
    pub timestamp: u64,
}

/// Server -> client grid state, full or delta. `grid` keys are
/// `"row,col"` strings (JSON object keys must be strings; the original
/// implementation used the same convention).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub is_full: bool,
    pub grid: HashMap<String, CellWire>,
    /// Server emission time, milliseconds since the epoch.
    pub timestamp: u64,
    /// Set only when this snapshot was split into multiple packets.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub chunk_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total_chunks: Option<u32>,
}

/// Client -> server, cumulative ack: "I have applied every snapshot up to
/// and including this id."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotAck {
    pub snapshot_id: u32,
}

/// Client -> server, requests retransmission of snapshots starting at
/// `last_snapshot` (inclusive). `-1`-equivalent "nothing acked yet" is
/// represented as `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotNack {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_snapshot: Option<u32>,
}

/// Client -> server, requests the acquisition of a cell at the client's
/// own clock reading. `id` carries the claimant's player id directly —
/// the server trusts the payload rather than the sender's session, so a
/// late or re-sent request from a not-yet-active endpoint still lands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquireReq {
    pub id: String,
    pub cell: [u32; 2],
    pub timestamp: u64,
}

/// Server -> client, a reliably-delivered notification that a cell
/// changed owner. Distinct from [`Snapshot`] so clients can react to
/// acquisitions immediately rather than waiting for the next broadcast
/// tick; carries its own `event_id` for the exactly-one-ack ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquireEvent {
    pub event_id: u64,
    pub cell: [u32; 2],
    pub owner: String,
    pub timestamp: u64,
}

/// Client -> server, acks a specific [`AcquireEvent`] by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquireAck {
    pub event_id: u64,
}

/// Server -> client, terminal message once every cell is claimed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameOver {
    pub winner: String,
    pub scoreboard: HashMap<String, u32>,
}

/// Sum of every payload shape the protocol can carry, tagged by the wire
/// [`MessageType`] it corresponds to rather than by serde's own enum
/// tagging (the tag already lives in the packet header, not the JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Init(Init),
    AssignId(AssignId),
    AssignIdAck(AssignIdAck),
    Snapshot(Snapshot),
    SnapshotAck(SnapshotAck),
    SnapshotNack(SnapshotNack),
    AcquireReq(AcquireReq),
    AcquireEvent(AcquireEvent),
    AcquireAck(AcquireAck),
    GameOver(GameOver),
}

impl Message {
    pub fn kind(&self) -> MessageType {
        match self {
            Message::Init(_) => MessageType::Init,
            Message::AssignId(_) => MessageType::AssignId,
            Message::AssignIdAck(_) => MessageType::AssignIdAck,
            Message::Snapshot(_) => MessageType::Snapshot,
            Message::SnapshotAck(_) => MessageType::SnapshotAck,
            Message::SnapshotNack(_) => MessageType::SnapshotNack,
            Message::AcquireReq(_) => MessageType::AcquireReq,
            Message::AcquireEvent(_) => MessageType::AcquireEvent,
            Message::AcquireAck(_) => MessageType::AcquireAck,
            Message::GameOver(_) => MessageType::GameOver,
        }
    }

    /// Decode a JSON payload using the wire type as the discriminant,
    /// since the `#[serde(untagged)]` representation cannot disambiguate
    /// the near-empty handshake payloads on its own.
    pub fn from_json(kind: MessageType, bytes: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            MessageType::Init => Message::Init(serde_json::from_slice(bytes)?),
            MessageType::AssignId => Message::AssignId(serde_json::from_slice(bytes)?),
            MessageType::AssignIdAck => Message::AssignIdAck(serde_json::from_slice(bytes)?),
            MessageType::Snapshot => Message::Snapshot(serde_json::from_slice(bytes)?),
            MessageType::SnapshotAck => Message::SnapshotAck(serde_json::from_slice(bytes)?),
            MessageType::SnapshotNack => Message::SnapshotNack(serde_json::from_slice(bytes)?),
            MessageType::AcquireReq => Message::AcquireReq(serde_json::from_slice(bytes)?),
            MessageType::AcquireEvent => Message::AcquireEvent(serde_json::from_slice(bytes)?),
            MessageType::AcquireAck => Message::AcquireAck(serde_json::from_slice(bytes)?),
            MessageType::GameOver => Message::GameOver(serde_json::from_slice(bytes)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_key_roundtrips_through_snapshot() {
        let mut cells = HashMap::new();
        cells.insert(
            "2,3".to_string(),
            CellWire {
                state: CellState::Acquired,
                owner: Some("p1".to_string()),
                timestamp: 10,
            },
        );
        let snapshot = Snapshot {
            is_full: true,
            grid: cells,
            timestamp: 1_000,
            chunk_index: None,
            total_chunks: None,
        };
        let bytes = serde_json::to_vec(&snapshot).unwrap();
        let parsed: Snapshot = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.grid["2,3"].owner.as_deref(), Some("p1"));
    }

    #[test]
    fn unclaimed_cell_omits_owner() {
        let cell = CellWire {
            state: CellState::Unclaimed,
            owner: None,
            timestamp: 0,
        };
        let json = serde_json::to_string(&cell).unwrap();
        assert!(!json.contains("owner"));
    }
}
