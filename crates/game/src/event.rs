//! Reliable ACQUIRE event channel: a side band from the snapshot stream
//! so an acquisition reaches every client promptly and exactly-once, with
//! retransmission until every active session has acked it.

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::messages::AcquireEvent;

#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub event: AcquireEvent,
    pub acked_by: HashSet<SocketAddr>,
}

impl PendingEvent {
    pub fn is_acked_by(&self, addr: &SocketAddr) -> bool {
        self.acked_by.contains(addr)
    }
}

/// Ledger of in-flight acquire events awaiting acknowledgement from every
/// active session. Entries are dropped once every recipient present at
/// the time of insertion has acked, so a session that joins after an
/// event was broadcast never blocks its retirement.
#[derive(Debug, Default)]
pub struct ReliableEventTable {
    next_event_id: u64,
    pending: Vec<PendingEvent>,
}

impl ReliableEventTable {
    pub fn new() -> Self {
        Self {
            next_event_id: 0,
            pending: Vec::new(),
        }
    }

    pub fn enqueue(&mut self, cell: [u32; 2], owner: String, timestamp: u64) -> AcquireEvent {
        let event_id = self.next_event_id;
        self.next_event_id += 1;
        let event = AcquireEvent {
            event_id,
            cell,
            owner,
            timestamp,
        };
        self.pending.push(PendingEvent {
            event: event.clone(),
            acked_by: HashSet::new(),
        });
        event
    }

    pub fn record_ack(&mut self, addr: SocketAddr, event_id: u64) {
        if let Some(pending) = self.pending.iter_mut().find(|p| p.event.event_id == event_id) {
            pending.acked_by.insert(addr);
        }
    }

    /// Events still owed a retransmission to `addr` (i.e. `addr` has not
    /// acked them), in insertion order.
    pub fn outstanding_for(&self, addr: &SocketAddr) -> impl Iterator<Item = &AcquireEvent> {
        self.pending
            .iter()
            .filter(move |p| !p.is_acked_by(addr))
            .map(|p| &p.event)
    }

    /// Drop every event every address in `active` has acked. Called
    /// after each retransmit pass so the pending table doesn't grow
    /// without bound.
    pub fn retire_fully_acked(&mut self, active: &[SocketAddr]) {
        self.pending
            .retain(|p| active.iter().any(|addr| !p.is_acked_by(addr)));
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn event_stays_pending_until_every_active_session_acks() {
        let mut table = ReliableEventTable::new();
        let event = table.enqueue([0, 0], "1".to_string(), 10);
        let active = vec![addr(1), addr(2)];

        table.record_ack(addr(1), event.event_id);
        table.retire_fully_acked(&active);
        assert_eq!(table.pending_len(), 1);

        table.record_ack(addr(2), event.event_id);
        table.retire_fully_acked(&active);
        assert_eq!(table.pending_len(), 0);
    }

    #[test]
    fn outstanding_for_excludes_acked_recipients() {
        let mut table = ReliableEventTable::new();
        let event = table.enqueue([1, 1], "2".to_string(), 5);
        table.record_ack(addr(1), event.event_id);

        assert_eq!(table.outstanding_for(&addr(1)).count(), 0);
        assert_eq!(table.outstanding_for(&addr(2)).count(), 1);
    }

    #[test]
    fn each_enqueue_gets_a_distinct_increasing_id() {
        let mut table = ReliableEventTable::new();
        let e0 = table.enqueue([0, 0], "1".to_string(), 1);
        let e1 = table.enqueue([0, 1], "1".to_string(), 2);
        assert!(e1.event_id > e0.event_id);
    }
}
