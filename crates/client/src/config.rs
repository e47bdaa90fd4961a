use clap::Parser;
use mlsp::DEFAULT_PORT;

/// Grid-acquire game client.
#[derive(Debug, Parser)]
#[command(name = "mlsp-client", version, about)]
pub struct Cli {
    /// Server address to connect to.
    #[arg(long, default_value = "127.0.0.1")]
    pub server: String,

    /// Server UDP port.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Local address to bind the client socket to.
    #[arg(long, default_value = "0.0.0.0:0")]
    pub bind: String,

    /// Render-delay jitter buffer, in milliseconds.
    #[arg(long, default_value_t = 60)]
    pub render_delay_ms: u64,

    /// Watchdog timeout, in milliseconds.
    #[arg(long, default_value_t = 500)]
    pub watchdog_timeout_ms: u64,

    /// Disable the terminal UI and run headless (for scripting/tests).
    #[arg(long)]
    pub no_tui: bool,
}

impl Cli {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    pub fn game_config(&self) -> mlsp::Config {
        let mut config = mlsp::Config::default();
        config.render_delay = std::time::Duration::from_millis(self.render_delay_ms);
        config.watchdog_timeout = std::time::Duration::from_millis(self.watchdog_timeout_ms);
        config
    }
}
