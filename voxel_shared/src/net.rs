//! Data-channel protocol and transport.
//!
//! Every message is one UTF-8 JSON object with a `type` discriminator, written
//! as a single line. Links are TCP streams in a star around the host; each
//! side runs a reader task and a writer task and talks to the session through
//! unbounded channels, so sessions never await the network.
//!
//! A link opens with `HELLO{peerId}` from the connecting side so the host can
//! bind it to the rendezvous identity.

use std::{
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::{bail, Context};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::{
    entity::{EntityRef, KeyState, PeerId},
    registry::BlockId,
    sim::{Action, SyncState},
    world::ChunkKey,
};

/// Longest accepted line, in bytes.
pub const MAX_FRAME: usize = 4 * 1024 * 1024;

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one link instance. A peer that reconnects gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub u64);

impl LinkId {
    /// Next unused id.
    pub fn new_unique() -> Self {
        LinkId(NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Data-channel message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetMsg {
    /// First frame on a link, from the connecting peer.
    #[serde(rename_all = "camelCase")]
    Hello { peer_id: PeerId },

    // host -> all
    ChunkData { cx: i32, cy: i32, cells: Vec<BlockId> },
    Block { x: i32, y: i32, id: BlockId },
    Sync(SyncState),

    // client -> host
    Input(KeyState),
    Mine { x: i32, y: i32 },
    Place { x: i32, y: i32, slot: usize },
    Attack {
        #[serde(default)]
        target: Option<EntityRef>,
    },
    Select { slot: usize },
    CraftSet { cell: usize, slot: usize },
    CraftCollect,
    Discard { slot: usize },
    Eat { slot: usize },
}

impl NetMsg {
    /// CHUNK_DATA for one chunk.
    pub fn chunk_data(key: ChunkKey, cells: &[BlockId]) -> Self {
        NetMsg::ChunkData {
            cx: key.cx,
            cy: key.cy,
            cells: cells.to_vec(),
        }
    }

    /// The simulation action a client message requests, if any.
    pub fn to_action(&self) -> Option<Action> {
        let action = match *self {
            NetMsg::Mine { x, y } => Action::Mine { x, y },
            NetMsg::Place { x, y, slot } => Action::Place { x, y, slot },
            NetMsg::Attack { target } => Action::Attack { target },
            NetMsg::Select { slot } => Action::Select { slot },
            NetMsg::CraftSet { cell, slot } => Action::CraftSet { cell, slot },
            NetMsg::CraftCollect => Action::CraftCollect,
            NetMsg::Discard { slot } => Action::Discard { slot },
            NetMsg::Eat { slot } => Action::Eat { slot },
            _ => return None,
        };
        Some(action)
    }

    /// Wire form of an action.
    pub fn from_action(action: Action) -> Self {
        match action {
            Action::Mine { x, y } => NetMsg::Mine { x, y },
            Action::Place { x, y, slot } => NetMsg::Place { x, y, slot },
            Action::Attack { target } => NetMsg::Attack { target },
            Action::Select { slot } => NetMsg::Select { slot },
            Action::CraftSet { cell, slot } => NetMsg::CraftSet { cell, slot },
            Action::CraftCollect => NetMsg::CraftCollect,
            Action::Discard { slot } => NetMsg::Discard { slot },
            Action::Eat { slot } => NetMsg::Eat { slot },
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            NetMsg::Hello { .. } => "HELLO",
            NetMsg::ChunkData { .. } => "CHUNK_DATA",
            NetMsg::Block { .. } => "BLOCK",
            NetMsg::Sync(_) => "SYNC",
            NetMsg::Input(_) => "INPUT",
            NetMsg::Mine { .. } => "MINE",
            NetMsg::Place { .. } => "PLACE",
            NetMsg::Attack { .. } => "ATTACK",
            NetMsg::Select { .. } => "SELECT",
            NetMsg::CraftSet { .. } => "CRAFT_SET",
            NetMsg::CraftCollect => "CRAFT_COLLECT",
            NetMsg::Discard { .. } => "DISCARD",
            NetMsg::Eat { .. } => "EAT",
        }
    }
}

/// Serializes one frame, newline included.
pub fn encode_frame<T: Serialize>(msg: &T) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize frame")?;
    let mut buf = BytesMut::with_capacity(payload.len() + 1);
    buf.extend_from_slice(&payload);
    buf.put_u8(b'\n');
    Ok(buf.freeze())
}

/// Parses one frame, newline excluded.
pub fn decode_frame<T: DeserializeOwned>(line: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(line).context("deserialize frame")
}

/// Reads newline-delimited JSON frames.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    /// Bytes of `buf` already known to hold no newline.
    scanned: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Reader over `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(8 * 1024),
            scanned: 0,
        }
    }

    /// Next frame, or `None` on a clean end of stream.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<Option<T>> {
        loop {
            let newline = self.buf[self.scanned..].iter().position(|b| *b == b'\n');
            if let Some(pos) = newline.map(|i| self.scanned + i) {
                self.scanned = 0;
                let line = self.buf.split_to(pos + 1);
                let line = &line[..pos];
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return decode_frame(line).map(Some);
            }
            self.scanned = self.buf.len();
            if self.buf.len() > MAX_FRAME {
                bail!("frame exceeds {MAX_FRAME} bytes");
            }
            let n = self.inner.read_buf(&mut self.buf).await.context("read frame")?;
            if n == 0 {
                if self.buf.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                bail!("stream closed mid-frame");
            }
        }
    }
}

/// Writes newline-delimited JSON frames.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Writer over `inner`.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        let frame = encode_frame(msg)?;
        self.inner.write_all(&frame).await.context("write frame")?;
        self.inner.flush().await.context("flush frame")?;
        Ok(())
    }
}

/// What a link task reports to its session.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Message(PeerId, NetMsg),
    Closed { peer: PeerId, link: LinkId },
}

/// An established data channel before its tasks start.
#[derive(Debug)]
pub struct Link {
    peer: PeerId,
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
}

impl Link {
    /// Dials the host and introduces ourselves.
    pub async fn connect(addr: SocketAddr, me: PeerId, host: PeerId) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connect to host at {addr}"))?;
        stream.set_nodelay(true).context("set nodelay")?;
        let (r, w) = stream.into_split();
        let mut link = Self {
            peer: host,
            reader: FrameReader::new(r),
            writer: FrameWriter::new(w),
        };
        link.writer.send(&NetMsg::Hello { peer_id: me }).await?;
        Ok(link)
    }

    /// Waits for the HELLO on an accepted stream.
    pub async fn accept(stream: TcpStream) -> anyhow::Result<Self> {
        stream.set_nodelay(true).context("set nodelay")?;
        let (r, w) = stream.into_split();
        let mut reader = FrameReader::new(r);
        match reader.recv::<NetMsg>().await? {
            Some(NetMsg::Hello { peer_id }) => Ok(Self {
                peer: peer_id,
                reader,
                writer: FrameWriter::new(w),
            }),
            Some(other) => bail!("expected HELLO, got {}", other.kind()),
            None => bail!("closed before HELLO"),
        }
    }

    /// Peer on the other end.
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Starts the reader and writer tasks.
    pub fn spawn(self, events: mpsc::UnboundedSender<LinkEvent>) -> LinkHandle {
        let Self {
            peer,
            mut reader,
            mut writer,
        } = self;
        let id = LinkId::new_unique();
        let (tx, mut rx) = mpsc::unbounded_channel::<NetMsg>();

        let writer_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = writer.send(&msg).await {
                    debug!(peer = %peer, error = %e, "Link write failed");
                    break;
                }
            }
        });

        let reader_task = tokio::spawn(async move {
            loop {
                match reader.recv::<NetMsg>().await {
                    Ok(Some(msg)) => {
                        if events.send(LinkEvent::Message(peer, msg)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(peer = %peer, error = %e, "Link read failed");
                        break;
                    }
                }
            }
            info!(peer = %peer, "Link closed");
            let _ = events.send(LinkEvent::Closed { peer, link: id });
        });

        LinkHandle {
            id,
            peer,
            tx,
            reader: reader_task,
            writer: writer_task,
        }
    }
}

/// Running link. Dropping it stops both tasks.
#[derive(Debug)]
pub struct LinkHandle {
    id: LinkId,
    peer: PeerId,
    tx: mpsc::UnboundedSender<NetMsg>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl LinkHandle {
    /// This link's id.
    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Peer on the other end.
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Outbound queue of this link.
    pub fn sender(&self) -> mpsc::UnboundedSender<NetMsg> {
        self.tx.clone()
    }

    /// Queues a message. False once the link is closed.
    pub fn send(&self, msg: NetMsg) -> bool {
        self.tx.send(msg).is_ok()
    }
}

impl Drop for LinkHandle {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Accepts data-channel connections for a host.
pub struct LinkListener {
    listener: TcpListener,
}

impl LinkListener {
    pub async fn bind(addr: &str) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind data channel on {addr}"))?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(TcpStream, SocketAddr)> {
        self.listener.accept().await.context("accept data channel")
    }

    /// Bound address.
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_use_type_tag_and_camel_case() {
        let json = serde_json::to_string(&NetMsg::Hello { peer_id: PeerId(4) }).unwrap();
        assert_eq!(json, r#"{"type":"HELLO","peerId":4}"#);

        let json = serde_json::to_string(&NetMsg::Block {
            x: 10,
            y: 10,
            id: BlockId::DIRT,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"BLOCK","x":10,"y":10,"id":2}"#);

        let msg: NetMsg = serde_json::from_str(r#"{"type":"INPUT","left":true}"#).unwrap();
        assert_eq!(
            msg,
            NetMsg::Input(KeyState {
                left: true,
                ..KeyState::default()
            })
        );

        let msg: NetMsg = serde_json::from_str(r#"{"type":"CRAFT_COLLECT"}"#).unwrap();
        assert_eq!(msg.to_action(), Some(Action::CraftCollect));
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert!(decode_frame::<NetMsg>(br#"{"type":"TELEPORT","x":1}"#).is_err());
        assert!(decode_frame::<NetMsg>(br#"{"x":1}"#).is_err());
    }

    #[test]
    fn actions_map_both_ways() {
        let a = Action::Place { x: 1, y: 2, slot: 3 };
        assert_eq!(NetMsg::from_action(a).to_action(), Some(a));
        assert_eq!(NetMsg::Sync(SyncState::default()).to_action(), None);
    }

    #[test]
    fn sync_survives_the_tagged_envelope() {
        use std::sync::Arc;

        use crate::{config::SimConfig, registry::Registry, sim::Simulation};

        let mut sim = Simulation::new(Arc::new(Registry::standard()), 7, SimConfig::default());
        sim.spawn_player(PeerId(1));
        sim.spawn_player(PeerId(2));
        sim.tick();

        let msg = NetMsg::Sync(sim.sync_state());
        let frame = encode_frame(&msg).unwrap();
        let back: NetMsg = decode_frame(&frame[..frame.len() - 1]).unwrap();
        assert_eq!(back, msg);
    }

    #[tokio::test]
    async fn buffered_frames_and_blank_lines() -> anyhow::Result<()> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&encode_frame(&NetMsg::Select { slot: 1 })?);
        bytes.extend_from_slice(b"\n \n");
        bytes.extend_from_slice(&encode_frame(&NetMsg::CraftCollect)?);
        bytes.extend_from_slice(&encode_frame(&NetMsg::Discard { slot: 4 })?);

        let mut reader = FrameReader::new(&bytes[..]);
        assert_eq!(reader.recv::<NetMsg>().await?, Some(NetMsg::Select { slot: 1 }));
        assert_eq!(reader.recv::<NetMsg>().await?, Some(NetMsg::CraftCollect));
        assert_eq!(reader.recv::<NetMsg>().await?, Some(NetMsg::Discard { slot: 4 }));
        assert_eq!(reader.recv::<NetMsg>().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn frames_survive_split_writes() -> anyhow::Result<()> {
        let (client, server) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(server);
        let mut writer = FrameWriter::new(client);

        let sent = vec![
            NetMsg::Mine { x: 3, y: 5 },
            NetMsg::chunk_data(ChunkKey::new(0, 0), &[BlockId::STONE; 256]),
            NetMsg::Select { slot: 2 },
        ];
        let expect = sent.clone();
        let write = tokio::spawn(async move {
            for m in &sent {
                writer.send(m).await?;
            }
            anyhow::Ok(())
        });

        for m in expect {
            assert_eq!(reader.recv::<NetMsg>().await?, Some(m));
        }
        write.await??;
        assert_eq!(reader.recv::<NetMsg>().await?, None);
        Ok(())
    }
}
