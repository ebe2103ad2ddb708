//! TCP rendezvous server.
//!
//! One reader task and one writer task per connection feed a central loop
//! that owns `Rooms`. The central loop is the only place room state changes,
//! so pushes caused by one request go out in the order `Rooms` produced them.
//! A connection gets `welcome{userId}` first; closing it leaves its room.

use std::{collections::BTreeMap, io, net::SocketAddr};

use anyhow::Context;
use tokio::{
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use voxel_shared::{
    entity::PeerId,
    net::{FrameReader, FrameWriter},
    rendezvous::{RendezvousEvent, RendezvousRequest},
};

use crate::rooms::{Outbound, Rooms};

/// Events sent from connection tasks to the central loop.
enum InternalEvent {
    NewConnection { stream: TcpStream, addr: SocketAddr },
    Request { user: PeerId, request: RendezvousRequest },
    Disconnected { user: PeerId },
}

/// Handle to a server running on a background task. Dropping it stops the
/// server.
pub struct RendezvousHandle {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl RendezvousHandle {
    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for RendezvousHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct RendezvousServer {
    listener: TcpListener,
    rooms: Rooms,
    conns: BTreeMap<PeerId, mpsc::UnboundedSender<RendezvousEvent>>,
    next_user: u64,
}

impl RendezvousServer {
    pub async fn bind(addr: &str) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind rendezvous on {addr}"))?;
        Ok(Self {
            listener,
            rooms: Rooms::new(),
            conns: BTreeMap::new(),
            next_user: 1,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr().context("rendezvous local addr")
    }

    /// Binds and runs on a background task. Port 0 picks a free port.
    pub async fn spawn(addr: &str) -> anyhow::Result<RendezvousHandle> {
        let server = Self::bind(addr).await?;
        let addr = server.local_addr()?;
        let task = tokio::spawn(async move {
            if let Err(e) = server.run().await {
                warn!(error = %e, "Rendezvous stopped");
            }
        });
        Ok(RendezvousHandle { addr, task })
    }

    /// Main loop. A failed accept is logged and the loop carries on.
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!(addr = %self.local_addr()?, "Rendezvous listening");
        let (tx, mut rx) = mpsc::unbounded_channel::<InternalEvent>();

        loop {
            let event = tokio::select! {
                res = self.listener.accept() => match accepted(res) {
                    Some(ev) => ev,
                    None => continue,
                },
                Some(ev) = rx.recv() => ev,
            };
            self.handle_event(event, &tx);
        }
    }

    fn handle_event(&mut self, event: InternalEvent, tx: &mpsc::UnboundedSender<InternalEvent>) {
        match event {
            InternalEvent::NewConnection { stream, addr } => {
                let user = PeerId(self.next_user);
                self.next_user += 1;
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(error = %e, "set_nodelay failed");
                }
                let (r, w) = stream.into_split();
                let out = spawn_connection(user, r, w, tx.clone());
                let _ = out.send(RendezvousEvent::Welcome { user_id: user });
                self.conns.insert(user, out);
                info!(peer = %user, %addr, "Rendezvous connection");
            }
            InternalEvent::Request { user, request } => {
                let pushes = match request {
                    RendezvousRequest::JoinRoom { room_id } => self.rooms.join(user, &room_id),
                    RendezvousRequest::Signal { target, payload } => self.rooms.signal(user, target, payload),
                };
                self.deliver(pushes);
            }
            InternalEvent::Disconnected { user } => {
                if self.conns.remove(&user).is_some() {
                    info!(peer = %user, "Rendezvous connection closed");
                }
                let pushes = self.rooms.leave(user);
                self.deliver(pushes);
            }
        }
    }

    fn deliver(&self, pushes: Vec<Outbound>) {
        for Outbound { to, event } in pushes {
            match self.conns.get(&to) {
                Some(tx) => {
                    let _ = tx.send(event);
                }
                None => debug!(peer = %to, "Push for a closed connection"),
            }
        }
    }
}

/// Turns an accept result into an event. Errors only affect that attempt.
fn accepted(res: io::Result<(TcpStream, SocketAddr)>) -> Option<InternalEvent> {
    match res {
        Ok((stream, addr)) => Some(InternalEvent::NewConnection { stream, addr }),
        Err(e) => {
            warn!(error = %e, "Accept failed");
            None
        }
    }
}

fn spawn_connection(
    user: PeerId,
    r: OwnedReadHalf,
    w: OwnedWriteHalf,
    events: mpsc::UnboundedSender<InternalEvent>,
) -> mpsc::UnboundedSender<RendezvousEvent> {
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<RendezvousEvent>();

    tokio::spawn(async move {
        let mut writer = FrameWriter::new(w);
        while let Some(ev) = out_rx.recv().await {
            if let Err(e) = writer.send(&ev).await {
                debug!(peer = %user, error = %e, "Rendezvous write failed");
                break;
            }
        }
    });

    tokio::spawn(async move {
        let mut reader = FrameReader::new(r);
        loop {
            match reader.recv::<RendezvousRequest>().await {
                Ok(Some(request)) => {
                    if events.send(InternalEvent::Request { user, request }).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(peer = %user, error = %e, "Rendezvous read failed");
                    break;
                }
            }
        }
        let _ = events.send(InternalEvent::Disconnected { user });
    });

    out_tx
}
