//! Helpers shared by the integration tests.
//!
//! Two harnesses:
//! - `LocalRoom`: a `HostSession` and `ClientSession`s joined by in-memory
//!   queues, pumped by hand. No sockets and no timers.
//! - `spawn_peer` / `step_until`: full `Peer` runtimes over a real rendezvous
//!   server and TCP links on ephemeral ports.

use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::bail;
use tokio::sync::mpsc;
use voxel_client::{ClientSession, Peer, RendezvousClient, Signaling};
use voxel_host::HostSession;
use voxel_shared::{
    config::{PeerConfig, SimConfig},
    entity::PeerId,
    net::NetMsg,
    registry::Registry,
};

/// Upper bound for any wait in a socket test.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(10);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Config with mobs off so entity state is predictable.
pub fn test_config(room: &str) -> PeerConfig {
    PeerConfig {
        room: room.to_string(),
        listen_addr: "127.0.0.1:0".to_string(),
        sim: SimConfig {
            initial_mobs: false,
            ..SimConfig::default()
        },
        ..PeerConfig::default()
    }
}

pub fn registry() -> Arc<Registry> {
    Arc::new(Registry::standard())
}

struct LocalClient {
    session: ClientSession,
    downlink: mpsc::UnboundedReceiver<NetMsg>,
    uplink: mpsc::UnboundedReceiver<NetMsg>,
}

/// A host and its clients over in-memory queues.
pub struct LocalRoom {
    pub host: HostSession,
    clients: Vec<LocalClient>,
}

impl LocalRoom {
    pub fn new(host_id: PeerId, cfg: &PeerConfig) -> Self {
        Self::with_host(HostSession::new(host_id, registry(), cfg))
    }

    pub fn with_host(host: HostSession) -> Self {
        Self {
            host,
            clients: Vec::new(),
        }
    }

    /// Connects a new client and delivers its initial chunk set and SYNC.
    pub fn join(&mut self, id: PeerId) {
        let (down_tx, downlink) = mpsc::unbounded_channel();
        let (up_tx, uplink) = mpsc::unbounded_channel();
        let mut session = ClientSession::new(id, self.host.me(), registry());
        session.attach(up_tx);
        self.host.attach_peer(id, down_tx);
        self.clients.push(LocalClient {
            session,
            downlink,
            uplink,
        });
        self.pump();
    }

    pub fn client(&self, id: PeerId) -> Option<&ClientSession> {
        self.clients.iter().map(|c| &c.session).find(|s| s.me() == id)
    }

    pub fn client_mut(&mut self, id: PeerId) -> Option<&mut ClientSession> {
        self.clients.iter_mut().map(|c| &mut c.session).find(|s| s.me() == id)
    }

    /// Moves queued messages both ways until nothing is left.
    pub fn pump(&mut self) {
        loop {
            let mut moved = false;
            for c in &mut self.clients {
                while let Ok(msg) = c.downlink.try_recv() {
                    c.session.apply(msg);
                    moved = true;
                }
                while let Ok(msg) = c.uplink.try_recv() {
                    self.host.handle_message(c.session.me(), msg);
                    moved = true;
                }
            }
            if !moved {
                break;
            }
        }
    }

    /// Runs host frames, pumping after each.
    pub fn frames(&mut self, n: usize) {
        for _ in 0..n {
            self.host.frame();
            self.pump();
        }
    }

    /// The host is gone: hands back the surviving client sessions.
    pub fn into_clients(self) -> Vec<ClientSession> {
        self.clients.into_iter().map(|c| c.session).collect()
    }
}

/// Connects to the rendezvous and joins `cfg.room`.
pub async fn spawn_peer(rendezvous: SocketAddr, cfg: PeerConfig) -> anyhow::Result<Peer<RendezvousClient>> {
    let signaling = RendezvousClient::connect(&rendezvous.to_string()).await?;
    Peer::join(cfg, registry(), signaling).await
}

/// Steps every peer in turn until `done` holds. Each step returns within a
/// frame period, so no peer starves.
pub async fn step_until<S, F>(peers: &mut [Peer<S>], what: &str, mut done: F) -> anyhow::Result<()>
where
    S: Signaling,
    F: FnMut(&[Peer<S>]) -> bool,
{
    let deadline = Instant::now() + STEP_TIMEOUT;
    while !done(peers) {
        if Instant::now() > deadline {
            bail!("timed out waiting for {what}");
        }
        for p in peers.iter_mut() {
            p.step().await?;
        }
    }
    Ok(())
}
