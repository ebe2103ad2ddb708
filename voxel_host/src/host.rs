//! Host session.
//!
//! The authoritative side of a room: one `Simulation`, one outbound queue per
//! connected peer, and the replication rules:
//! - CHUNK_DATA once per newly generated chunk, and the relevant chunk set to
//!   a peer when it attaches
//! - BLOCK right after any single-cell mutation
//! - SYNC (full entity state) every `sync_every` frames
//!
//! Everything runs on the caller's task. Inbound actions apply immediately;
//! their world effects are broadcast before the call returns.
//!
//! Determinism notes:
//! - Peers are iterated in id order.
//! - Nothing reads the wall clock.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use tokio::sync::mpsc;
use tracing::{debug, info};
use voxel_shared::{
    config::PeerConfig,
    entity::{KeyState, PeerId},
    net::NetMsg,
    registry::Registry,
    sim::{Action, SimEvent, Simulation, SyncState},
    snapshot::Snapshot,
    world::{ChunkKey, WorldEvent, WorldView},
    worldgen::TerrainGenerator,
};

pub struct HostSession {
    me: PeerId,
    sim: Simulation,
    peers: BTreeMap<PeerId, mpsc::UnboundedSender<NetMsg>>,
    sync_every: u64,
    frames: u64,
}

impl HostSession {
    /// Fresh world for a newly assigned host.
    pub fn new(me: PeerId, registry: Arc<Registry>, cfg: &PeerConfig) -> Self {
        let sim = Simulation::new(registry, cfg.seed, cfg.sim.clone());
        Self::from_sim(me, sim, cfg)
    }

    /// Takes over from a departed host. Chunks already held are kept; the
    /// rest regenerate on demand. Entities resume from the last SYNC, minus
    /// the old host's player.
    pub fn promote(
        me: PeerId,
        view: WorldView,
        last_sync: Option<SyncState>,
        old_host: Option<PeerId>,
        registry: Arc<Registry>,
        cfg: &PeerConfig,
    ) -> Self {
        let held = view.store().len();
        let world = view.into_authoritative(registry, TerrainGenerator::new(cfg.seed));
        let mut sim = Simulation::from_sync(world, last_sync.unwrap_or_default(), cfg.sim.clone());
        if let Some(old) = old_host {
            sim.remove_player(old);
        }
        info!(peer = %me, held, "Promoted to host");
        Self::from_sim(me, sim, cfg)
    }

    /// Detached host resumed from a snapshot.
    pub fn from_snapshot(me: PeerId, snapshot: &Snapshot, registry: Arc<Registry>, cfg: &PeerConfig) -> Self {
        let sim = snapshot.restore(registry, cfg.sim.clone(), me);
        Self::from_sim(me, sim, cfg)
    }

    /// Wraps an existing simulation, spawning the host's own player.
    pub fn from_sim(me: PeerId, mut sim: Simulation, cfg: &PeerConfig) -> Self {
        sim.spawn_player(me);
        // Chunks generated so far were never sent to anyone; attach sends them.
        sim.drain_world_events();
        Self {
            me,
            sim,
            peers: BTreeMap::new(),
            sync_every: u64::from(cfg.sync_every()),
            frames: 0,
        }
    }

    /// The hosting peer.
    pub fn me(&self) -> PeerId {
        self.me
    }

    /// The authoritative simulation.
    pub fn sim(&self) -> &Simulation {
        &self.sim
    }

    /// Mutable simulation. Call `frame` or an action afterwards to replicate changes.
    pub fn sim_mut(&mut self) -> &mut Simulation {
        &mut self.sim
    }

    /// Attached peers in id order.
    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.keys().copied().collect()
    }

    /// Frames run so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Registers a connected peer, spawns its player, and pushes the chunks
    /// around every player followed by a SYNC.
    pub fn attach_peer(&mut self, id: PeerId, tx: mpsc::UnboundedSender<NetMsg>) {
        if id == self.me {
            return;
        }
        self.sim.spawn_player(id);
        self.flush();

        let radius = self.sim.config().chunk_radius;
        let mut keys = BTreeSet::new();
        for p in self.sim.players().values() {
            let c = p.body.center();
            let center = ChunkKey::containing(c.x.floor() as i32, c.y.floor() as i32);
            keys.extend(center.around(radius));
        }

        let store = self.sim.world().store();
        let mut sent = 0usize;
        for key in keys {
            if let Some(chunk) = store.get(key) {
                let _ = tx.send(NetMsg::chunk_data(key, chunk.cells()));
                sent += 1;
            }
        }
        let _ = tx.send(NetMsg::Sync(self.sim.sync_state()));

        info!(peer = %id, chunks = sent, "Peer attached");
        self.peers.insert(id, tx);
    }

    /// Forgets a peer and removes its player.
    pub fn detach_peer(&mut self, id: PeerId) {
        if self.peers.remove(&id).is_some() {
            info!(peer = %id, "Peer detached");
        }
        self.sim.remove_player(id);
    }

    /// Applies one inbound message from a connected peer.
    pub fn handle_message(&mut self, from: PeerId, msg: NetMsg) {
        match msg {
            NetMsg::Input(keys) => self.sim.set_input(from, keys),
            NetMsg::Hello { .. } | NetMsg::ChunkData { .. } | NetMsg::Block { .. } | NetMsg::Sync(_) => {
                debug!(peer = %from, kind = msg.kind(), "Ignoring host-bound message");
            }
            other => {
                if let Some(action) = other.to_action() {
                    self.apply(from, action);
                }
            }
        }
    }

    /// Applies an action from the host's own player.
    pub fn submit_local(&mut self, action: Action) {
        self.apply(self.me, action);
    }

    /// Held keys of the host's own player.
    pub fn set_local_input(&mut self, keys: KeyState) {
        self.sim.set_input(self.me, keys);
    }

    fn apply(&mut self, actor: PeerId, action: Action) {
        if let Err(reason) = self.sim.apply_action(actor, action) {
            debug!(peer = %actor, ?action, %reason, "Action dropped");
        }
        self.flush();
    }

    /// One fixed step: simulate, replicate world changes, and SYNC on cadence.
    pub fn frame(&mut self) {
        self.sim.tick();
        self.flush();
        self.frames += 1;
        if self.frames % self.sync_every == 0 {
            self.broadcast(NetMsg::Sync(self.sim.sync_state()));
        }
    }

    fn flush(&mut self) {
        for ev in self.sim.drain_world_events() {
            let msg = match ev {
                WorldEvent::BlockChanged { x, y, id } => NetMsg::Block { x, y, id },
                WorldEvent::ChunkGenerated(key) => match self.sim.world().store().get(key) {
                    Some(chunk) => NetMsg::chunk_data(key, chunk.cells()),
                    None => continue,
                },
            };
            self.broadcast(msg);
        }
        for ev in self.sim.drain_sim_events() {
            match ev {
                SimEvent::PlayerRespawned(id) => info!(peer = %id, "Player respawned"),
                SimEvent::MobKilled(id) => debug!(mob = id.0, "Mob killed"),
                other => debug!(event = ?other, "Sim event"),
            }
        }
    }

    fn broadcast(&self, msg: NetMsg) {
        for (id, tx) in &self.peers {
            if tx.send(msg.clone()).is_err() {
                debug!(peer = %id, kind = msg.kind(), "Peer queue closed");
            }
        }
    }

    /// Snapshot of the loaded world and the host's player.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.sim, self.me)
    }

    /// Lines for the `status` console command.
    pub fn status(&self) -> Vec<String> {
        let mut out = vec![
            format!("Role: HOST ({})", self.me),
            format!("Tick: {}", self.sim.clock()),
            format!("Chunks: {}", self.sim.world().store().len()),
            format!("Peers: {}", self.peers.len()),
        ];
        for p in self.sim.players().values() {
            out.push(format!(
                "  {}: pos=({:.2}, {:.2}) hp={} slot={}",
                p.id, p.body.pos.x, p.body.pos.y, p.health, p.selected
            ));
        }
        out.push(format!("Drops: {} Mobs: {}", self.sim.drops().len(), self.sim.mobs().len()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxel_shared::{
        config::SimConfig,
        inventory::Slot,
        math::Vec2,
        registry::{BlockId, ItemId},
        world::CHUNK_CELLS,
    };

    fn cfg() -> PeerConfig {
        PeerConfig {
            sim: SimConfig {
                initial_mobs: false,
                ..SimConfig::default()
            },
            ..PeerConfig::default()
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<NetMsg>) -> Vec<NetMsg> {
        let mut out = Vec::new();
        while let Ok(m) = rx.try_recv() {
            out.push(m);
        }
        out
    }

    #[test]
    fn attach_sends_chunks_then_sync() {
        let mut host = HostSession::new(PeerId(1), Arc::new(Registry::standard()), &cfg());
        let (tx, mut rx) = mpsc::unbounded_channel();
        host.attach_peer(PeerId(2), tx);

        let msgs = drain(&mut rx);
        assert!(msgs.len() > 1);
        assert!(matches!(msgs.last(), Some(NetMsg::Sync(s)) if s.players.len() == 2));
        let chunks = msgs
            .iter()
            .filter(|m| matches!(m, NetMsg::ChunkData { cells, .. } if cells.len() == CHUNK_CELLS))
            .count();
        assert_eq!(chunks, msgs.len() - 1);
    }

    #[test]
    fn peer_place_is_broadcast_as_block() {
        let mut host = HostSession::new(PeerId(1), Arc::new(Registry::standard()), &cfg());
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let (tx3, mut rx3) = mpsc::unbounded_channel();
        host.attach_peer(PeerId(2), tx2);
        host.attach_peer(PeerId(3), tx3);
        drain(&mut rx2);
        drain(&mut rx3);

        host.sim_mut().world_mut().set_block(10, 10, BlockId::AIR);
        host.sim_mut().drain_world_events();
        let dirt = ItemId::from_block(BlockId::DIRT);
        host.sim_mut()
            .player_mut(PeerId(2))
            .unwrap()
            .inventory
            .set(0, Slot::new(dirt, 1));

        host.handle_message(PeerId(2), NetMsg::Place { x: 10, y: 10, slot: 0 });

        let expect = NetMsg::Block {
            x: 10,
            y: 10,
            id: BlockId::DIRT,
        };
        assert_eq!(drain(&mut rx2), vec![expect.clone()]);
        assert_eq!(drain(&mut rx3), vec![expect]);
    }

    #[test]
    fn chunks_generated_mid_session_reach_attached_peers() {
        let mut host = HostSession::new(PeerId(1), Arc::new(Registry::standard()), &cfg());
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let (tx3, mut rx3) = mpsc::unbounded_channel();
        host.attach_peer(PeerId(2), tx2);
        host.attach_peer(PeerId(3), tx3);
        drain(&mut rx2);
        drain(&mut rx3);

        let far = ChunkKey::containing(500, 10);
        assert!(!host.sim().world().store().contains(far));
        host.sim_mut()
            .player_mut(PeerId(2))
            .unwrap()
            .body
            .reset(Vec2::new(500.0, 10.0));
        host.frame();

        let cells = host.sim().world().store().get(far).unwrap().cells().to_vec();
        let expect = NetMsg::ChunkData {
            cx: far.cx,
            cy: far.cy,
            cells,
        };
        assert!(drain(&mut rx2).contains(&expect));
        assert!(drain(&mut rx3).contains(&expect));
    }

    #[test]
    fn sync_follows_cadence() {
        let mut host = HostSession::new(PeerId(1), Arc::new(Registry::standard()), &cfg());
        let (tx, mut rx) = mpsc::unbounded_channel();
        host.attach_peer(PeerId(2), tx);
        drain(&mut rx);

        for _ in 0..6 {
            host.frame();
        }
        let syncs = drain(&mut rx).into_iter().filter(|m| matches!(m, NetMsg::Sync(_))).count();
        assert_eq!(syncs, 2);
    }

    #[test]
    fn detach_removes_player() {
        let mut host = HostSession::new(PeerId(1), Arc::new(Registry::standard()), &cfg());
        let (tx, _rx) = mpsc::unbounded_channel();
        host.attach_peer(PeerId(2), tx);
        host.detach_peer(PeerId(2));
        assert!(host.sim().player(PeerId(2)).is_none());
        assert!(host.peer_ids().is_empty());
    }

    #[test]
    fn promotion_keeps_held_chunks_and_drops_old_host() {
        let mut view = WorldView::new();
        view.apply_chunk(ChunkKey::new(0, 0), &[BlockId::BRICK; CHUNK_CELLS]);
        let mut sync = SyncState::default();
        let mut old = Simulation::new(Arc::new(Registry::standard()), 1, SimConfig::default());
        old.spawn_player(PeerId(1));
        old.spawn_player(PeerId(2));
        sync.players = old.sync_state().players;

        let host = HostSession::promote(
            PeerId(2),
            view,
            Some(sync),
            Some(PeerId(1)),
            Arc::new(Registry::standard()),
            &cfg(),
        );
        assert_eq!(host.sim().world().get_block(3, 3), BlockId::BRICK);
        assert!(host.sim().player(PeerId(1)).is_none());
        assert!(host.sim().player(PeerId(2)).is_some());
    }
}
