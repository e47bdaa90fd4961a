//! Per-client session bookkeeping: handshake state machine and endpoint
//! -> player id allocation.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No INIT observed yet from this endpoint.
    None,
    /// ASSIGN_ID sent, waiting on ASSIGN_ID_ACK.
    PendingAssignAck,
    /// Handshake complete; eligible for broadcasts and acquire events.
    Active,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub player_id: String,
    pub addr: SocketAddr,
    pub state: SessionState,
    /// Highest snapshot id this client has cumulatively acked.
    pub last_acked_snapshot: Option<u32>,
    /// Last time an ASSIGN_ID was sent to this session, for the
    /// server-side resend task.
    last_assign_id_sent: Instant,
}

impl Session {
    fn new(player_id: String, addr: SocketAddr) -> Self {
        Self {
            player_id,
            addr,
            state: SessionState::PendingAssignAck,
            last_acked_snapshot: None,
            last_assign_id_sent: Instant::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }
}

/// Tracks every known client by UDP endpoint and hands out stable,
/// monotonically increasing player ids. Re-sending INIT from an already
/// known endpoint is idempotent: it returns the existing session rather
/// than allocating a new id, which lets clients safely retry a dropped
/// ASSIGN_ID.
#[derive(Debug, Default)]
pub struct SessionTable {
    by_addr: HashMap<SocketAddr, Session>,
    next_player_id: u64,
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            by_addr: HashMap::new(),
            next_player_id: 1,
        }
    }

    /// Handle an INIT from `addr`, returning the session (new or
    /// pre-existing) and whether this call allocated a fresh id.
    pub fn handle_init(&mut self, addr: SocketAddr) -> (&Session, bool) {
        if self.by_addr.contains_key(&addr) {
            return (self.by_addr.get(&addr).unwrap(), false);
        }
        let player_id = self.next_player_id.to_string();
        self.next_player_id += 1;
        let session = Session::new(player_id, addr);
        self.by_addr.insert(addr, session);
        (self.by_addr.get(&addr).unwrap(), true)
    }

    pub fn handle_assign_ack(&mut self, addr: SocketAddr) {
        if let Some(session) = self.by_addr.get_mut(&addr) {
            session.state = SessionState::Active;
        }
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&Session> {
        self.by_addr.get(addr)
    }

    pub fn get_mut(&mut self, addr: &SocketAddr) -> Option<&mut Session> {
        self.by_addr.get_mut(addr)
    }

    pub fn record_snapshot_ack(&mut self, addr: &SocketAddr, snapshot_id: u32) {
        if let Some(session) = self.by_addr.get_mut(addr) {
            session.last_acked_snapshot = Some(
                session
                    .last_acked_snapshot
                    .map_or(snapshot_id, |prev| prev.max(snapshot_id)),
            );
        }
    }

    pub fn active_sessions(&self) -> impl Iterator<Item = &Session> {
        self.by_addr.values().filter(|s| s.is_active())
    }

    /// Sessions still stuck in `PendingAssignAck` whose last ASSIGN_ID
    /// send is at least `interval` old. Resets each returned session's
    /// timer as a side effect, so a caller that doesn't actually send the
    /// resend will under-count next time — acceptable since this only
    /// drives a best-effort retransmit, not a correctness guarantee (the
    /// client's own INIT-resend loop is the fallback).
    pub fn due_for_assign_id_resend(&mut self, interval: Duration) -> Vec<(SocketAddr, String)> {
        let mut due = Vec::new();
        for session in self.by_addr.values_mut() {
            if session.state == SessionState::PendingAssignAck
                && session.last_assign_id_sent.elapsed() >= interval
            {
                session.last_assign_id_sent = Instant::now();
                due.push((session.addr, session.player_id.clone()));
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.by_addr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_addr.is_empty()
    }

    /// Lowest cumulative ack across every active session, the watermark
    /// below which the baseline grid can safely be advanced. `None` if
    /// there are no active sessions, or if any active session has not
    /// yet acked anything.
    pub fn safe_ack_watermark(&self) -> Option<u32> {
        let mut watermark: Option<u32> = None;
        for session in self.active_sessions() {
            let acked = session.last_acked_snapshot?;
            watermark = Some(watermark.map_or(acked, |w: u32| w.min(acked)));
        }
        watermark
    }
}
