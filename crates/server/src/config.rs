use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use mlsp::DEFAULT_PORT;

/// Authoritative grid-acquire server.
#[derive(Debug, Parser)]
#[command(name = "mlsp-server", version, about)]
pub struct Cli {
    /// Address to bind the UDP socket to.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// UDP port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Snapshot broadcast interval, in milliseconds.
    #[arg(long, default_value_t = 50)]
    pub broadcast_interval_ms: u64,

    /// ACQUIRE event retransmit interval, in milliseconds.
    #[arg(long, default_value_t = 100)]
    pub event_retransmit_interval_ms: u64,

    /// ASSIGN_ID resend interval for sessions still awaiting ack, in
    /// milliseconds.
    #[arg(long, default_value_t = 250)]
    pub assign_id_resend_interval_ms: u64,

    /// Maximum number of concurrently tracked client sessions.
    #[arg(long, default_value_t = 64)]
    pub max_clients: usize,

    /// Disable the terminal dashboard and just log.
    #[arg(long)]
    pub no_tui: bool,
}

impl Cli {
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.bind, self.port).parse()
    }

    pub fn game_config(&self) -> mlsp::Config {
        let mut config = mlsp::Config::default();
        config.broadcast_interval = Duration::from_millis(self.broadcast_interval_ms);
        config.event_retransmit_interval = Duration::from_millis(self.event_retransmit_interval_ms);
        config.assign_id_resend_interval = Duration::from_millis(self.assign_id_resend_interval_ms);
        config.max_clients = self.max_clients;
        config
    }
}
