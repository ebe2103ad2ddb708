//! Peer binary.
//!
//! Usage:
//!   cargo run -p voxel_client --bin peer -- [--rendezvous 127.0.0.1:3000] [--room lobby]
//!       [--listen 127.0.0.1:0] [--seed N] [--config peer.json] [--load world.json]
//!
//! Joins a room through the rendezvous server and plays whichever role it is
//! given. With `--load` it skips the rendezvous and runs a detached host from
//! the snapshot.
//!
//! Console commands:
//!   status               - Show role, tick and players
//!   save <path>          - Snapshot the loaded world
//!   mine <x> <y>         - Mine a cell
//!   place <x> <y> <slot> - Place a block from a slot
//!   select <n>           - Hold slot n
//!   craft                - Collect the crafting result
//!   keys [left] [right] [jump] - Hold movement keys
//!   quit                 - Exit

use std::env;
use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;
use voxel_client::{Peer, RendezvousClient};
use voxel_shared::{config::PeerConfig, registry::Registry, snapshot::Snapshot};

fn parse_args() -> anyhow::Result<PeerConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let text = std::fs::read_to_string(&args[i + 1]).with_context(|| format!("read config {}", args[i + 1]))?;
            PeerConfig::from_json_str(&text).with_context(|| format!("parse config {}", args[i + 1]))?
        }
        _ => PeerConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--rendezvous" if i + 1 < args.len() => {
                cfg.rendezvous_addr = args[i + 1].clone();
                i += 2;
            }
            "--room" if i + 1 < args.len() => {
                cfg.room = args[i + 1].clone();
                i += 2;
            }
            "--listen" if i + 1 < args.len() => {
                cfg.listen_addr = args[i + 1].clone();
                i += 2;
            }
            "--seed" if i + 1 < args.len() => {
                cfg.seed = args[i + 1].parse().context("parse --seed")?;
                i += 2;
            }
            "--load" if i + 1 < args.len() => {
                cfg.snapshot_path = Some(args[i + 1].clone());
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    let registry = Arc::new(Registry::standard());

    let mut peer = match cfg.snapshot_path.clone() {
        Some(path) => {
            let snapshot = Snapshot::load(&path)?;
            info!(%path, seed = snapshot.seed, "Loading snapshot");
            Peer::<RendezvousClient>::detached(cfg, registry, &snapshot)
        }
        None => {
            info!(rendezvous = %cfg.rendezvous_addr, room = %cfg.room, "Starting peer");
            let signaling = RendezvousClient::connect(&cfg.rendezvous_addr).await?;
            Peer::join(cfg, registry, signaling).await?
        }
    };

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Peer {} running. Type 'status' for info, 'quit' to exit.", peer.me());
    println!();

    while !peer.quit_requested() {
        peer.step().await?;

        // Process console commands.
        while let Ok(line) = console_rx.try_recv() {
            for out in peer.exec_console(&line) {
                println!("{}", out);
            }
        }
    }

    Ok(())
}
