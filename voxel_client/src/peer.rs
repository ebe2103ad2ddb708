//! Peer runtime.
//!
//! One process per player. The runtime joins a room through a `Signaling`
//! channel and lets the `Topology` state machine decide what it owns:
//! - `Unassigned`: nothing yet
//! - `Client`: a `ClientSession` and one link to the host
//! - `Host`: a `HostSession`, a listener, and one link per member
//!
//! A host tells each member where to dial with a signaled offer. On host
//! migration the promoted peer turns its replica into the authoritative world
//! and the rest re-dial it once its offer arrives.
//!
//! Everything is driven by `step`, which waits for the next rendezvous event,
//! link event, inbound connection, finished handshake, or frame tick and
//! handles it on the caller's task.

use std::{
    collections::{BTreeMap, BTreeSet},
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use tokio::{
    net::TcpStream,
    sync::mpsc,
    time::{self, Interval},
};
use tracing::{debug, info, warn};
use voxel_host::HostSession;
use voxel_shared::{
    config::PeerConfig,
    entity::{KeyState, PeerId, Player},
    net::{Link, LinkEvent, LinkHandle, LinkListener},
    registry::{BlockId, ItemId, Registry},
    rendezvous::{RendezvousEvent, SignalPayload},
    sim::Action,
    snapshot::{PlayerRecord, Snapshot},
    topology::{RoleState, Topology, Transition},
    world::WorldView,
};

use crate::{client::ClientSession, console::ConsoleCommand, input::MiningIntent, signaling::Signaling};

/// What this peer currently owns.
pub enum Authority {
    Unassigned,
    Client(ClientSession),
    Host(HostSession),
}

impl Authority {
    /// Cell value as this peer sees it.
    pub fn get_block(&self, x: i32, y: i32) -> BlockId {
        match self {
            Authority::Unassigned => BlockId::AIR,
            Authority::Client(c) => c.get_block(x, y),
            Authority::Host(h) => h.sim().world().get_block(x, y),
        }
    }

    /// Our player, from the simulation or the last SYNC.
    pub fn player(&self, me: PeerId) -> Option<&Player> {
        match self {
            Authority::Unassigned => None,
            Authority::Client(c) => c.player(),
            Authority::Host(h) => h.sim().player(me),
        }
    }

    /// Hands an action to whoever validates it. False if nobody can.
    pub fn submit(&mut self, action: Action) -> bool {
        match self {
            Authority::Unassigned => false,
            Authority::Client(c) => c.submit(action),
            Authority::Host(h) => {
                h.submit_local(action);
                true
            }
        }
    }
}

enum Handshake {
    Inbound(anyhow::Result<Link>),
    Outbound { host: PeerId, result: anyhow::Result<Link> },
}

enum Wake {
    Rendezvous(Option<RendezvousEvent>),
    Link(LinkEvent),
    Accepted(anyhow::Result<(TcpStream, SocketAddr)>),
    Handshake(Handshake),
    Frame,
}

async fn next_signal<S: Signaling>(signaling: &mut Option<S>) -> Option<RendezvousEvent> {
    match signaling {
        Some(s) => s.next_event().await,
        None => std::future::pending().await,
    }
}

async fn accept_on(listener: Option<&LinkListener>) -> anyhow::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(l) => l.accept().await,
        None => std::future::pending().await,
    }
}

pub struct Peer<S> {
    cfg: PeerConfig,
    registry: Arc<Registry>,
    signaling: Option<S>,
    topology: Topology,
    authority: Authority,
    listener: Option<LinkListener>,
    links: BTreeMap<PeerId, LinkHandle>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
    link_rx: mpsc::UnboundedReceiver<LinkEvent>,
    handshake_tx: mpsc::UnboundedSender<Handshake>,
    handshake_rx: mpsc::UnboundedReceiver<Handshake>,
    connecting: Option<PeerId>,
    members: BTreeSet<PeerId>,
    keys: KeyState,
    mining: MiningIntent,
    ticker: Interval,
    quit: bool,
}

impl<S: Signaling> Peer<S> {
    /// Joins `cfg.room`. The role arrives later as a rendezvous event.
    pub async fn join(cfg: PeerConfig, registry: Arc<Registry>, mut signaling: S) -> anyhow::Result<Self> {
        signaling.join_room(&cfg.room).await?;
        let me = signaling.me();
        info!(peer = %me, room = %cfg.room, "Joined room");
        Ok(Self::build(cfg, registry, Some(signaling), Topology::new(me), Authority::Unassigned))
    }

    /// Single-peer host resumed from a snapshot, outside any room. Must be
    /// called within a tokio runtime.
    pub fn detached(cfg: PeerConfig, registry: Arc<Registry>, snapshot: &Snapshot) -> Self {
        let me = PeerId(0);
        let host = HostSession::from_snapshot(me, snapshot, registry.clone(), &cfg);
        info!(chunks = snapshot.chunks.len(), "Resumed detached host from snapshot");
        Self::build(cfg, registry, None, Topology::detached(me), Authority::Host(host))
    }

    fn build(
        cfg: PeerConfig,
        registry: Arc<Registry>,
        signaling: Option<S>,
        topology: Topology,
        authority: Authority,
    ) -> Self {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let (handshake_tx, handshake_rx) = mpsc::unbounded_channel();
        let period = Duration::from_secs_f64(1.0 / f64::from(cfg.tick_hz.max(1)));
        Self {
            cfg,
            registry,
            signaling,
            topology,
            authority,
            listener: None,
            links: BTreeMap::new(),
            link_tx,
            link_rx,
            handshake_tx,
            handshake_rx,
            connecting: None,
            members: BTreeSet::new(),
            keys: KeyState::default(),
            mining: MiningIntent::default(),
            ticker: time::interval(period),
            quit: false,
        }
    }

    /// Identity assigned by the rendezvous.
    pub fn me(&self) -> PeerId {
        self.topology.me()
    }

    /// Current role state.
    pub fn role(&self) -> RoleState {
        self.topology.state()
    }

    /// Whether this peer runs the simulation.
    pub fn is_host(&self) -> bool {
        self.topology.is_host()
    }

    /// Host or client session, whichever is active.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// The host session, when hosting.
    pub fn host_session(&self) -> Option<&HostSession> {
        match &self.authority {
            Authority::Host(h) => Some(h),
            _ => None,
        }
    }

    /// Mutable host session, when hosting.
    pub fn host_session_mut(&mut self) -> Option<&mut HostSession> {
        match &mut self.authority {
            Authority::Host(h) => Some(h),
            _ => None,
        }
    }

    /// The client session, when a client.
    pub fn client_session(&self) -> Option<&ClientSession> {
        match &self.authority {
            Authority::Client(c) => Some(c),
            _ => None,
        }
    }

    /// Other room members announced by the rendezvous.
    pub fn members(&self) -> &BTreeSet<PeerId> {
        &self.members
    }

    /// Set by the `quit` console command.
    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    /// Cell value as this peer sees it.
    pub fn get_block(&self, x: i32, y: i32) -> BlockId {
        self.authority.get_block(x, y)
    }

    /// Held movement keys, applied every frame.
    pub fn set_keys(&mut self, keys: KeyState) {
        self.keys = keys;
    }

    /// Sends or applies an action. False when no session can take it.
    pub fn submit(&mut self, action: Action) -> bool {
        self.authority.submit(action)
    }

    /// Mines `(x, y)` over the following frames; one MINE goes out when done.
    pub fn start_mining(&mut self, x: i32, y: i32) {
        self.mining.start(x, y);
    }

    /// Whether a mining target is active.
    pub fn is_mining(&self) -> bool {
        self.mining.target().is_some()
    }

    /// Runs until `quit`.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        while !self.quit {
            self.step().await?;
        }
        Ok(())
    }

    /// Handles the next thing that happens.
    pub async fn step(&mut self) -> anyhow::Result<()> {
        let wake = tokio::select! {
            ev = next_signal(&mut self.signaling) => Wake::Rendezvous(ev),
            Some(ev) = self.link_rx.recv() => Wake::Link(ev),
            res = accept_on(self.listener.as_ref()) => Wake::Accepted(res),
            Some(hs) = self.handshake_rx.recv() => Wake::Handshake(hs),
            _ = self.ticker.tick() => Wake::Frame,
        };

        match wake {
            Wake::Rendezvous(Some(ev)) => self.on_rendezvous(ev).await?,
            Wake::Rendezvous(None) => {
                warn!(peer = %self.me(), "Rendezvous connection lost");
                self.signaling = None;
            }
            Wake::Link(ev) => self.on_link(ev),
            Wake::Accepted(Ok((stream, addr))) => {
                debug!(%addr, "Inbound data channel");
                let tx = self.handshake_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(Handshake::Inbound(Link::accept(stream).await));
                });
            }
            Wake::Accepted(Err(e)) => warn!(error = %e, "Accept failed"),
            Wake::Handshake(hs) => self.on_handshake(hs),
            Wake::Frame => self.frame(),
        }
        Ok(())
    }

    async fn on_rendezvous(&mut self, ev: RendezvousEvent) -> anyhow::Result<()> {
        let me = self.me();
        match ev {
            RendezvousEvent::Welcome { user_id } => debug!(peer = %user_id, "Duplicate welcome"),
            RendezvousEvent::RoleAssigned { role, host_id } => {
                let t = self.topology.on_role_assigned(role, host_id);
                self.apply_transition(t, None).await?;
            }
            RendezvousEvent::UserJoined { user_id } if user_id != me => {
                self.members.insert(user_id);
                if self.topology.is_host() {
                    self.offer(user_id).await;
                }
            }
            RendezvousEvent::UserJoined { .. } => {}
            RendezvousEvent::HostMigrated { new_host_id } => {
                let old = self.topology.host();
                let t = self.topology.on_host_migrated(new_host_id);
                self.apply_transition(t, old).await?;
            }
            RendezvousEvent::UserLeft { user_id } => {
                self.members.remove(&user_id);
                if let Authority::Host(host) = &mut self.authority {
                    self.links.remove(&user_id);
                    host.detach_peer(user_id);
                }
            }
            RendezvousEvent::Signal { sender, payload } => match SignalPayload::from_value(&payload) {
                Some(SignalPayload::Offer { addr }) => self.on_offer(sender, addr),
                None => debug!(peer = %sender, "Ignoring unknown signal payload"),
            },
        }
        Ok(())
    }

    async fn apply_transition(&mut self, t: Transition, old_host: Option<PeerId>) -> anyhow::Result<()> {
        let me = self.me();
        match t {
            Transition::BecameHost { migrated: false } => {
                self.authority = Authority::Host(HostSession::new(me, self.registry.clone(), &self.cfg));
                self.listen().await?;
            }
            Transition::BecameHost { migrated: true } => {
                let (view, last_sync) = match std::mem::replace(&mut self.authority, Authority::Unassigned) {
                    Authority::Client(c) => c.into_parts(),
                    _ => (WorldView::new(), None),
                };
                self.links.clear();
                if let Some(old) = old_host {
                    self.members.remove(&old);
                }
                let host = HostSession::promote(me, view, last_sync, old_host, self.registry.clone(), &self.cfg);
                self.authority = Authority::Host(host);
                self.listen().await?;
            }
            Transition::BecameClient { host } => {
                self.authority = Authority::Client(ClientSession::new(me, host, self.registry.clone()));
            }
            Transition::Repoint { host } => {
                self.links.clear();
                self.connecting = None;
                if let Some(old) = old_host {
                    self.members.remove(&old);
                }
                if let Authority::Client(c) = &mut self.authority {
                    c.repoint(host);
                }
            }
            Transition::Ignored => {}
        }
        Ok(())
    }

    async fn listen(&mut self) -> anyhow::Result<()> {
        if self.listener.is_none() {
            let listener = LinkListener::bind(&self.cfg.listen_addr).await?;
            info!(peer = %self.me(), addr = %listener.local_addr()?, "Accepting data channels");
            self.listener = Some(listener);
        }
        Ok(())
    }

    /// Signals our listener address to `target`. A failed relay write only
    /// costs that peer its offer.
    async fn offer(&mut self, target: PeerId) {
        let Some(listener) = &self.listener else {
            return;
        };
        let mut addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                warn!(peer = %target, error = %e, "No listener address to offer");
                return;
            }
        };
        if addr.ip().is_unspecified() {
            addr.set_ip(Ipv4Addr::LOCALHOST.into());
        }
        if let Some(signaling) = &mut self.signaling {
            debug!(peer = %target, %addr, "Offering data channel");
            if let Err(e) = signaling.signal(target, SignalPayload::Offer { addr }.to_value()).await {
                warn!(peer = %target, error = %e, "Offer not sent");
            }
        }
    }

    fn on_offer(&mut self, sender: PeerId, addr: SocketAddr) {
        let Authority::Client(c) = &self.authority else {
            debug!(peer = %sender, "Offer while not a client");
            return;
        };
        if c.host() != sender || c.is_linked() || self.connecting == Some(sender) {
            debug!(peer = %sender, "Ignoring offer");
            return;
        }
        self.connecting = Some(sender);
        let me = self.me();
        let tx = self.handshake_tx.clone();
        tokio::spawn(async move {
            let result = Link::connect(addr, me, sender).await;
            let _ = tx.send(Handshake::Outbound { host: sender, result });
        });
    }

    fn on_handshake(&mut self, hs: Handshake) {
        match hs {
            Handshake::Inbound(Ok(link)) => {
                let Authority::Host(host) = &mut self.authority else {
                    debug!(peer = %link.peer(), "Inbound link while not host");
                    return;
                };
                let id = link.peer();
                if id == host.me() {
                    return;
                }
                let handle = link.spawn(self.link_tx.clone());
                host.attach_peer(id, handle.sender());
                self.members.insert(id);
                self.links.insert(id, handle);
            }
            Handshake::Inbound(Err(e)) => warn!(error = %e, "Inbound handshake failed"),
            Handshake::Outbound { host, result } => {
                if self.connecting == Some(host) {
                    self.connecting = None;
                }
                let link = match result {
                    Ok(link) => link,
                    Err(e) => {
                        warn!(host = %host, error = %e, "Could not reach host");
                        return;
                    }
                };
                match &mut self.authority {
                    Authority::Client(c) if c.host() == host => {
                        let handle = link.spawn(self.link_tx.clone());
                        c.attach(handle.sender());
                        self.links.insert(host, handle);
                    }
                    _ => debug!(host = %host, "Dropping stale link"),
                }
            }
        }
    }

    fn on_link(&mut self, ev: LinkEvent) {
        match ev {
            LinkEvent::Message(from, msg) => match &mut self.authority {
                Authority::Host(host) => host.handle_message(from, msg),
                Authority::Client(c) if c.host() == from => c.apply(msg),
                _ => debug!(peer = %from, kind = msg.kind(), "Message from a stale link"),
            },
            LinkEvent::Closed { peer, link } => {
                if self.links.get(&peer).map(LinkHandle::id) != Some(link) {
                    return;
                }
                self.links.remove(&peer);
                match &mut self.authority {
                    Authority::Host(host) => host.detach_peer(peer),
                    Authority::Client(c) => c.detach(),
                    Authority::Unassigned => {}
                }
            }
        }
    }

    fn frame(&mut self) {
        let me = self.me();
        if let Some((x, y)) = self.mining.target() {
            let block = self.authority.get_block(x, y);
            let held = self.authority.player(me).map(Player::held_item).unwrap_or(ItemId::NONE);
            if let Some(action) = self.mining.tick(&self.registry, block, held) {
                self.authority.submit(action);
            }
        }

        match &mut self.authority {
            Authority::Host(host) => {
                host.set_local_input(self.keys);
                host.frame();
            }
            Authority::Client(c) => {
                c.send_input(self.keys);
            }
            Authority::Unassigned => {}
        }
    }

    /// Snapshot of what this peer holds: the authoritative world on a host,
    /// the replica on a client.
    pub fn snapshot(&self) -> Option<Snapshot> {
        match &self.authority {
            Authority::Unassigned => None,
            Authority::Host(h) => Some(h.snapshot()),
            Authority::Client(c) => {
                let player = c.player().map(|p| PlayerRecord {
                    position: p.body.pos,
                    inventory: p.inventory.clone(),
                });
                Some(Snapshot::from_store(self.cfg.seed, c.view().store(), player))
            }
        }
    }

    /// Lines for the `status` console command.
    pub fn status(&self) -> Vec<String> {
        let mut out = match &self.authority {
            Authority::Unassigned => vec![format!("Role: UNASSIGNED ({})", self.me())],
            Authority::Client(c) => c.status(),
            Authority::Host(h) => h.status(),
        };
        out.push(format!("Room: {} members={}", self.cfg.room, self.members.len()));
        if let Some((x, y)) = self.mining.target() {
            let block = self.get_block(x, y);
            out.push(format!(
                "Mining ({x}, {y}): {:.0}%",
                self.mining.fraction(&self.registry, block) * 100.0
            ));
        }
        out
    }

    /// Runs one console line and returns what to print.
    pub fn exec_console(&mut self, line: &str) -> Vec<String> {
        let cmd = match ConsoleCommand::parse(line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => return Vec::new(),
            Err(msg) => return vec![msg],
        };

        match cmd {
            ConsoleCommand::Status => self.status(),
            ConsoleCommand::Save(path) => match self.snapshot() {
                Some(snap) => match snap.save(&path) {
                    Ok(()) => vec![format!("Saved {} chunks to {path}", snap.chunks.len())],
                    Err(e) => vec![format!("Save failed: {e:#}")],
                },
                None => vec!["Nothing to save yet".to_string()],
            },
            ConsoleCommand::Mine { x, y } => {
                self.start_mining(x, y);
                vec![format!("Mining ({x}, {y})")]
            }
            ConsoleCommand::Place { x, y, slot } => self.submit_console(Action::Place { x, y, slot }),
            ConsoleCommand::Select(slot) => self.submit_console(Action::Select { slot }),
            ConsoleCommand::Craft => self.submit_console(Action::CraftCollect),
            ConsoleCommand::CraftSet { cell, slot } => self.submit_console(Action::CraftSet { cell, slot }),
            ConsoleCommand::Attack => self.submit_console(Action::Attack { target: None }),
            ConsoleCommand::Discard(slot) => self.submit_console(Action::Discard { slot }),
            ConsoleCommand::Eat(slot) => self.submit_console(Action::Eat { slot }),
            ConsoleCommand::Keys(keys) => {
                self.keys = keys;
                Vec::new()
            }
            ConsoleCommand::Quit => {
                self.quit = true;
                vec!["Bye".to_string()]
            }
        }
    }

    fn submit_console(&mut self, action: Action) -> Vec<String> {
        if self.submit(action) {
            Vec::new()
        } else {
            vec!["Not connected to a host".to_string()]
        }
    }
}
