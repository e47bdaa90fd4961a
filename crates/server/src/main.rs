mod config;
mod events;
mod handlers;
mod server;
mod state;
mod tui;

use clap::Parser;
use tokio::sync::mpsc;

use config::Cli;
use server::GameServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let bind_addr = cli.bind_addr()?;

    let server = GameServer::bind(bind_addr, cli.game_config()).await?;
    log::info!("listening on {}", server.local_addr()?);

    if cli.no_tui {
        let handles = server.spawn(None);
        futures_await_all(handles).await;
    } else {
        let (tx, rx) = mpsc::unbounded_channel();
        let handles = server.spawn(Some(tx));
        let tui_result = tui::run(server.state_handle(), rx).await;
        for handle in handles {
            handle.abort();
        }
        tui_result?;
    }

    Ok(())
}

async fn futures_await_all(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}
