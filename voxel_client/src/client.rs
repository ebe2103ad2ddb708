//! Client session.
//!
//! A non-host peer keeps a read-only replica: the chunks and cell edits the
//! host pushed, plus the last SYNC it received. Nothing here simulates; local
//! actions become messages on the link to the host.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};
use voxel_shared::{
    entity::{KeyState, PeerId, Player},
    net::NetMsg,
    registry::{BlockId, ItemId, Registry},
    sim::{Action, SyncState},
    world::{ChunkKey, WorldView},
};

pub struct ClientSession {
    me: PeerId,
    host: PeerId,
    registry: Arc<Registry>,
    view: WorldView,
    last_sync: Option<SyncState>,
    uplink: Option<mpsc::UnboundedSender<NetMsg>>,
    last_keys: Option<KeyState>,
    syncs: u64,
}

impl ClientSession {
    /// Session for `me`, expecting data from `host`. Starts unlinked.
    pub fn new(me: PeerId, host: PeerId, registry: Arc<Registry>) -> Self {
        Self {
            me,
            host,
            registry,
            view: WorldView::new(),
            last_sync: None,
            uplink: None,
            last_keys: None,
            syncs: 0,
        }
    }

    /// This peer's id.
    pub fn me(&self) -> PeerId {
        self.me
    }

    /// The host this session replicates from.
    pub fn host(&self) -> PeerId {
        self.host
    }

    /// Static tables used to interpret the replica.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The replicated chunks.
    pub fn view(&self) -> &WorldView {
        &self.view
    }

    /// Most recent SYNC, if any arrived yet.
    pub fn last_sync(&self) -> Option<&SyncState> {
        self.last_sync.as_ref()
    }

    /// Whether an uplink to the host is attached and open.
    pub fn is_linked(&self) -> bool {
        self.uplink.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Replicated cell value, Air when the chunk was never received.
    pub fn get_block(&self, x: i32, y: i32) -> BlockId {
        self.view.get_block(x, y)
    }

    /// Our own player as of the last SYNC.
    pub fn player(&self) -> Option<&Player> {
        self.last_sync.as_ref()?.players.iter().find(|p| p.id == self.me)
    }

    /// Item in our selected slot as of the last SYNC.
    pub fn held_item(&self) -> ItemId {
        self.player().map(Player::held_item).unwrap_or(ItemId::NONE)
    }

    /// Link to the host is up.
    pub fn attach(&mut self, uplink: mpsc::UnboundedSender<NetMsg>) {
        info!(host = %self.host, "Linked to host");
        self.uplink = Some(uplink);
        self.last_keys = None;
    }

    /// Link to the host is gone; the replica stays until a new host takes over.
    pub fn detach(&mut self) {
        if self.uplink.take().is_some() {
            info!(host = %self.host, "Lost link to host");
        }
    }

    /// A surviving peer became host; wait for its offer.
    pub fn repoint(&mut self, host: PeerId) {
        self.detach();
        self.host = host;
    }

    /// Applies one message from the host.
    pub fn apply(&mut self, msg: NetMsg) {
        match msg {
            NetMsg::ChunkData { cx, cy, cells } => {
                if !self.view.apply_chunk(ChunkKey::new(cx, cy), &cells) {
                    debug!(cx, cy, len = cells.len(), "Dropping malformed CHUNK_DATA");
                }
            }
            NetMsg::Block { x, y, id } => {
                if !self.view.apply_block(x, y, id) {
                    debug!(x, y, "BLOCK for a chunk we do not hold");
                }
            }
            NetMsg::Sync(state) => {
                self.syncs += 1;
                self.last_sync = Some(state);
            }
            other => debug!(kind = other.kind(), "Ignoring client-bound message"),
        }
    }

    /// Sends an action to the host. False if there is no link.
    pub fn submit(&self, action: Action) -> bool {
        self.send(NetMsg::from_action(action))
    }

    /// Sends the held keys when they changed since the last send.
    pub fn send_input(&mut self, keys: KeyState) -> bool {
        if self.last_keys == Some(keys) {
            return false;
        }
        let sent = self.send(NetMsg::Input(keys));
        if sent {
            self.last_keys = Some(keys);
        }
        sent
    }

    fn send(&self, msg: NetMsg) -> bool {
        match &self.uplink {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }

    /// Everything a promotion needs from the replica.
    pub fn into_parts(self) -> (WorldView, Option<SyncState>) {
        (self.view, self.last_sync)
    }

    /// Lines for the `status` console command.
    pub fn status(&self) -> Vec<String> {
        let mut out = vec![
            format!("Role: CLIENT ({})", self.me),
            format!("Host: {} linked={}", self.host, self.is_linked()),
            format!("Chunks: {}", self.view.store().len()),
            format!("Syncs received: {}", self.syncs),
        ];
        if let Some(state) = &self.last_sync {
            for p in &state.players {
                out.push(format!(
                    "  {}: pos=({:.2}, {:.2}) hp={} slot={}",
                    p.id, p.body.pos.x, p.body.pos.y, p.health, p.selected
                ));
            }
            out.push(format!("Drops: {} Mobs: {}", state.drops.len(), state.mobs.len()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxel_shared::world::CHUNK_CELLS;

    fn session() -> ClientSession {
        ClientSession::new(PeerId(2), PeerId(1), Arc::new(Registry::standard()))
    }

    #[test]
    fn chunk_then_block_updates_view() {
        let mut c = session();
        c.apply(NetMsg::ChunkData {
            cx: 0,
            cy: 0,
            cells: vec![BlockId::STONE; CHUNK_CELLS],
        });
        assert_eq!(c.get_block(4, 4), BlockId::STONE);

        c.apply(NetMsg::Block {
            x: 4,
            y: 4,
            id: BlockId::AIR,
        });
        assert_eq!(c.get_block(4, 4), BlockId::AIR);
    }

    #[test]
    fn block_before_chunk_is_ignored() {
        let mut c = session();
        c.apply(NetMsg::Block {
            x: 4,
            y: 4,
            id: BlockId::STONE,
        });
        assert_eq!(c.get_block(4, 4), BlockId::AIR);
        assert_eq!(c.view().store().len(), 0);
    }

    #[test]
    fn sync_replaces_state() {
        let mut c = session();
        let mut first = SyncState::default();
        first.players.push(Player::new(PeerId(2), Default::default()));
        c.apply(NetMsg::Sync(first));
        assert!(c.player().is_some());

        c.apply(NetMsg::Sync(SyncState::default()));
        assert!(c.player().is_none());
    }

    #[test]
    fn submit_needs_a_link() {
        let mut c = session();
        assert!(!c.submit(Action::Mine { x: 1, y: 2 }));

        let (tx, mut rx) = mpsc::unbounded_channel();
        c.attach(tx);
        assert!(c.submit(Action::Mine { x: 1, y: 2 }));
        assert_eq!(rx.try_recv().ok(), Some(NetMsg::Mine { x: 1, y: 2 }));
    }

    #[test]
    fn unchanged_keys_are_not_resent() {
        let mut c = session();
        let (tx, mut rx) = mpsc::unbounded_channel();
        c.attach(tx);
        let keys = KeyState {
            right: true,
            ..KeyState::default()
        };
        assert!(c.send_input(keys));
        assert!(!c.send_input(keys));
        assert_eq!(rx.try_recv().ok(), Some(NetMsg::Input(keys)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn repoint_keeps_replica() {
        let mut c = session();
        c.apply(NetMsg::ChunkData {
            cx: 0,
            cy: 0,
            cells: vec![BlockId::DIRT; CHUNK_CELLS],
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        c.attach(tx);
        c.repoint(PeerId(3));
        assert!(!c.is_linked());
        assert_eq!(c.host(), PeerId(3));
        let (view, _) = c.into_parts();
        assert_eq!(view.get_block(0, 0), BlockId::DIRT);
    }
}
