//! Tunables shared between server and client binaries. Defaults mirror
//! the original implementation's constants module.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// How often the server builds and broadcasts a snapshot tick.
    pub broadcast_interval: Duration,
    /// How often the server retransmits un-acked ACQUIRE events.
    pub event_retransmit_interval: Duration,
    /// Client-side jitter-absorbing delay before an applied snapshot is
    /// handed to the render sink.
    pub render_delay: Duration,
    /// Client watchdog: if nothing has been heard from the server for
    /// this long, the connection is considered dead.
    pub watchdog_timeout: Duration,
    /// How often the client resends INIT while awaiting ASSIGN_ID.
    pub init_resend_interval: Duration,
    /// How often the server resends ASSIGN_ID to a session still stuck
    /// in `PendingAssignAck`.
    pub assign_id_resend_interval: Duration,
    /// Upper bound on concurrently tracked sessions; INIT from a new
    /// endpoint beyond this is rejected.
    pub max_clients: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broadcast_interval: Duration::from_millis(50),
            event_retransmit_interval: Duration::from_millis(100),
            render_delay: Duration::from_millis(60),
            watchdog_timeout: Duration::from_millis(500),
            init_resend_interval: Duration::from_millis(200),
            assign_id_resend_interval: Duration::from_millis(250),
            max_clients: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.broadcast_interval, Duration::from_millis(50));
        assert_eq!(config.render_delay, Duration::from_millis(60));
    }
}
