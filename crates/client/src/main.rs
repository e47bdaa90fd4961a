mod config;
mod net;
mod render;
mod state;
mod tui;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;

use config::Cli;
use net::NetworkClient;
use render::NullRenderSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let bind: std::net::SocketAddr = cli.bind.parse()?;
    let server_addr: std::net::SocketAddr = cli.server_addr().parse()?;

    let client = Arc::new(NetworkClient::connect(bind, server_addr, cli.game_config()).await?);
    client.start_handshake().await;

    let (clicks_tx, clicks_rx) = tokio::sync::mpsc::unbounded_channel();

    if cli.no_tui {
        let render_sink: Arc<Mutex<dyn render::RenderSink>> = Arc::new(Mutex::new(NullRenderSink));
        let handles = client.clone().spawn(render_sink, clicks_rx);
        drop(clicks_tx);
        for handle in handles {
            let _ = handle.await;
        }
    } else {
        let render_sink: Arc<Mutex<dyn render::RenderSink>> = Arc::new(Mutex::new(tui::TuiRenderSink));
        let handles = client.clone().spawn(render_sink, clicks_rx);
        let tui_result = tui::run(client.state_handle(), clicks_tx).await;
        for handle in handles {
            handle.abort();
        }
        tui_result?;
    }

    Ok(())
}
