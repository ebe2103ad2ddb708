//! Rendezvous client.
//!
//! The runtime only needs three things from a signaling channel: join a room,
//! relay a payload to one member, and receive pushed events. `Signaling` is
//! that seam; `RendezvousClient` implements it over a TCP connection speaking
//! newline-delimited JSON.

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::{
    net::{tcp::OwnedWriteHalf, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use voxel_shared::{
    entity::PeerId,
    net::{FrameReader, FrameWriter},
    rendezvous::{RendezvousEvent, RendezvousRequest},
};

#[async_trait]
pub trait Signaling: Send {
    /// Identity assigned by the rendezvous.
    fn me(&self) -> PeerId;

    async fn join_room(&mut self, room: &str) -> anyhow::Result<()>;

    async fn signal(&mut self, target: PeerId, payload: serde_json::Value) -> anyhow::Result<()>;

    /// Next pushed event, `None` once the connection is gone. Cancel-safe.
    async fn next_event(&mut self) -> Option<RendezvousEvent>;
}

pub struct RendezvousClient {
    me: PeerId,
    writer: FrameWriter<OwnedWriteHalf>,
    events: mpsc::UnboundedReceiver<RendezvousEvent>,
    reader: JoinHandle<()>,
}

impl RendezvousClient {
    /// Connects and waits for the welcome carrying our id.
    pub async fn connect(addr: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connect to rendezvous at {addr}"))?;
        stream.set_nodelay(true).context("set nodelay")?;
        let (r, w) = stream.into_split();
        let mut frames = FrameReader::new(r);

        let me = match frames.recv::<RendezvousEvent>().await? {
            Some(RendezvousEvent::Welcome { user_id }) => user_id,
            Some(other) => bail!("expected welcome, got {other:?}"),
            None => bail!("rendezvous closed before welcome"),
        };
        info!(peer = %me, %addr, "Connected to rendezvous");

        let (tx, events) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            loop {
                match frames.recv::<RendezvousEvent>().await {
                    Ok(Some(ev)) => {
                        if tx.send(ev).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("Rendezvous closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Rendezvous read failed");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            me,
            writer: FrameWriter::new(w),
            events,
            reader,
        })
    }
}

#[async_trait]
impl Signaling for RendezvousClient {
    fn me(&self) -> PeerId {
        self.me
    }

    async fn join_room(&mut self, room: &str) -> anyhow::Result<()> {
        self.writer
            .send(&RendezvousRequest::JoinRoom {
                room_id: room.to_string(),
            })
            .await
            .context("send join-room")
    }

    async fn signal(&mut self, target: PeerId, payload: serde_json::Value) -> anyhow::Result<()> {
        self.writer
            .send(&RendezvousRequest::Signal { target, payload })
            .await
            .context("send signal")
    }

    async fn next_event(&mut self) -> Option<RendezvousEvent> {
        self.events.recv().await
    }
}

impl Drop for RendezvousClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
