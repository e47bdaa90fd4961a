//! Wire framing: fixed 28-byte header, CRC-32 checksum, JSON payload.
//!
//! Mirrors the canonical revision of the protocol (message ids 1..10, MLSP
//! header) rather than the earlier headerless pure-JSON revision — see
//! DESIGN.md for the open-question resolution.

use crate::messages::Message;

/// ASCII "MLSP".
pub const PROTOCOL_MAGIC: [u8; 4] = *b"MLSP";
pub const PROTOCOL_VERSION: u8 = 1;
pub const HEADER_SIZE: usize = 28;
pub const MAX_PACKET_SIZE: usize = 1200;
pub const DEFAULT_PORT: u16 = 40000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Init = 1,
    AssignId = 2,
    Snapshot = 3,
    AcquireReq = 4,
    SnapshotAck = 5,
    GameOver = 6,
    SnapshotNack = 7,
    AssignIdAck = 8,
    AcquireEvent = 9,
    AcquireAck = 10,
}

impl MessageType {
    fn from_wire(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::Init,
            2 => Self::AssignId,
            3 => Self::Snapshot,
            4 => Self::AcquireReq,
            5 => Self::SnapshotAck,
            6 => Self::GameOver,
            7 => Self::SnapshotNack,
            8 => Self::AssignIdAck,
            9 => Self::AcquireEvent,
            10 => Self::AcquireAck,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub message_type: MessageType,
    pub snapshot_id: u32,
    pub sequence: u32,
    pub server_timestamp_ms: u64,
    pub payload_len: u16,
    pub checksum: u32,
}

impl PacketHeader {
    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&PROTOCOL_MAGIC);
        buf[4] = PROTOCOL_VERSION;
        buf[5] = self.message_type as u8;
        buf[6..10].copy_from_slice(&self.snapshot_id.to_be_bytes());
        buf[10..14].copy_from_slice(&self.sequence.to_be_bytes());
        buf[14..22].copy_from_slice(&self.server_timestamp_ms.to_be_bytes());
        buf[22..24].copy_from_slice(&self.payload_len.to_be_bytes());
        buf[24..28].copy_from_slice(&self.checksum.to_be_bytes());
        buf
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("buffer shorter than header")]
    TooShort,
    #[error("unrecognized protocol identifier")]
    BadMagic,
    #[error("unsupported protocol version")]
    BadVersion,
    #[error("unrecognized message type")]
    BadMessageType,
    #[error("buffer shorter than header + payload_len")]
    TruncatedPayload,
    #[error("checksum mismatch")]
    BadChecksum,
    #[error("payload did not parse as JSON: {0}")]
    BadJson(#[source] serde_json::Error),
    #[error("packet of {size} bytes exceeds the {max}-byte cap")]
    Oversize { size: usize, max: usize },
}

#[derive(Debug, Clone)]
pub struct Packet {
    pub header: PacketHeader,
    pub message: Message,
}

impl Packet {
    pub fn new(
        message_type: MessageType,
        snapshot_id: u32,
        sequence: u32,
        server_timestamp_ms: u64,
        message: Message,
    ) -> Self {
        Self {
            header: PacketHeader {
                message_type,
                snapshot_id,
                sequence,
                server_timestamp_ms,
                payload_len: 0,
                checksum: 0,
            },
            message,
        }
    }

    /// Encode header + JSON payload, computing the CRC-32 over the zeroed-
    /// checksum header concatenated with the payload, then rewriting the
    /// checksum field. Refuses (panics) to emit a packet over the cap —
    /// per spec this is a programmer error, not a runtime condition to
    /// recover from; callers that might legitimately overflow (snapshots)
    /// must chunk first.
    pub fn encode(&self) -> Vec<u8> {
        let payload = serde_json::to_vec(&self.message).expect("message always serializes");
        assert!(
            payload.len() <= u16::MAX as usize,
            "payload length overflows u16"
        );

        let mut header = self.header;
        header.payload_len = payload.len() as u16;
        header.checksum = 0;

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.extend_from_slice(&header.encode());
        buf.extend_from_slice(&payload);

        let checksum = crc32fast::hash(&buf);
        buf[24..28].copy_from_slice(&checksum.to_be_bytes());

        assert!(
            buf.len() <= MAX_PACKET_SIZE,
            "outbound packet of {} bytes exceeds the {}-byte cap; chunk before encoding",
            buf.len(),
            MAX_PACKET_SIZE
        );

        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_SIZE {
            return Err(PacketError::TooShort);
        }
        if buf[0..4] != PROTOCOL_MAGIC {
            return Err(PacketError::BadMagic);
        }
        if buf[4] != PROTOCOL_VERSION {
            return Err(PacketError::BadVersion);
        }
        let message_type =
            MessageType::from_wire(buf[5]).ok_or(PacketError::BadMessageType)?;
        let snapshot_id = u32::from_be_bytes(buf[6..10].try_into().unwrap());
        let sequence = u32::from_be_bytes(buf[10..14].try_into().unwrap());
        let server_timestamp_ms = u64::from_be_bytes(buf[14..22].try_into().unwrap());
        let payload_len = u16::from_be_bytes(buf[22..24].try_into().unwrap());
        let checksum = u32::from_be_bytes(buf[24..28].try_into().unwrap());

        if buf.len() < HEADER_SIZE + payload_len as usize {
            return Err(PacketError::TruncatedPayload);
        }

        let mut zeroed = buf[..HEADER_SIZE + payload_len as usize].to_vec();
        zeroed[24..28].copy_from_slice(&0u32.to_be_bytes());
        if crc32fast::hash(&zeroed) != checksum {
            return Err(PacketError::BadChecksum);
        }

        let payload = &buf[HEADER_SIZE..HEADER_SIZE + payload_len as usize];
        let message = Message::from_json(message_type, payload).map_err(PacketError::BadJson)?;

        Ok(Self {
            header: PacketHeader {
                message_type,
                snapshot_id,
                sequence,
                server_timestamp_ms,
                payload_len,
                checksum,
            },
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{AcquireAck, Init, Message};

    #[test]
    fn roundtrip_is_identity() {
        let packet = Packet::new(MessageType::Init, 0, 7, 123_456, Message::Init(Init {}));
        let bytes = packet.encode();
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded.header.sequence, 7);
        assert_eq!(decoded.header.server_timestamp_ms, 123_456);
        assert!(matches!(decoded.message, Message::Init(_)));
    }

    #[test]
    fn bit_flip_fails_crc() {
        let packet = Packet::new(
            MessageType::AcquireAck,
            0,
            0,
            0,
            Message::AcquireAck(AcquireAck { event_id: 42 }),
        );
        let mut bytes = packet.encode();
        // Flip a bit in the payload region, away from length-derived header
        // bytes, so the corruption is only detectable via the checksum.
        let idx = bytes.len() - 1;
        bytes[idx] ^= 0x01;
        assert!(matches!(Packet::decode(&bytes), Err(PacketError::BadChecksum)));
    }

    #[test]
    fn short_buffer_rejected() {
        assert!(matches!(Packet::decode(&[0u8; 4]), Err(PacketError::TooShort)));
    }

    #[test]
    fn wrong_magic_rejected() {
        let packet = Packet::new(MessageType::Init, 0, 0, 0, Message::Init(Init {}));
        let mut bytes = packet.encode();
        bytes[0] = b'X';
        assert!(matches!(Packet::decode(&bytes), Err(PacketError::BadMagic)));
    }

    #[test]
    fn never_exceeds_cap_under_small_payload() {
        let packet = Packet::new(MessageType::Init, 0, 0, 0, Message::Init(Init {}));
        assert!(packet.encode().len() <= MAX_PACKET_SIZE);
    }
}
