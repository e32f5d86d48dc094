//! Crash relay: forwards change batches between the participants of each
//! document and initializes late joiners.
//!
//! ```text
//! crash-relay --bind 0.0.0.0:9090
//! crash-relay --config relay.toml
//! RUST_LOG=crash=debug crash-relay
//! ```

use std::path::PathBuf;

use clap::Parser;
use log::info;

use crash_collab::{RelayServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "crash-relay")]
#[command(about = "WebSocket relay for Crash collaborative sessions")]
struct Args {
    /// TOML file with `bind_addr`, `max_peers_per_room`, `broadcast_capacity`
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to listen on; overrides the config file
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,

    /// Broadcast buffer per document room; overrides the config file
    #[arg(long, value_name = "N")]
    capacity: Option<usize>,

    /// Maximum connections per document room; overrides the config file
    #[arg(long, value_name = "N")]
    max_peers: Option<usize>,
}

fn load_config(args: &Args) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("{}: {e}", path.display()))?;
            ServerConfig::from_toml_str(&raw)?
        }
        None => ServerConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.bind_addr = bind.clone();
    }
    if let Some(capacity) = args.capacity.filter(|&n| n > 0) {
        config.broadcast_capacity = capacity;
    }
    if let Some(max_peers) = args.max_peers.filter(|&n| n > 0) {
        config.max_peers_per_room = max_peers;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let config = load_config(&args)?;
    info!(
        "Starting crash-relay on {} (room capacity {}, {} peers max)",
        config.bind_addr, config.broadcast_capacity, config.max_peers_per_room
    );

    RelayServer::new(config).run().await?;
    Ok(())
}
