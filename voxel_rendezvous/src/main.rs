//! Rendezvous binary.
//!
//! Usage:
//!   cargo run -p voxel_rendezvous -- [--addr 127.0.0.1:3000]

use std::env;

use tracing::info;
use voxel_rendezvous::RendezvousServer;

fn parse_args() -> String {
    let mut addr = "127.0.0.1:3000".to_string();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                addr = args[i + 1].clone();
                i += 2;
            }
            _ => i += 1,
        }
    }
    addr
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let addr = parse_args();
    info!(%addr, "Starting rendezvous");
    RendezvousServer::bind(&addr).await?.run().await
}
