//! Simulation engine.
//!
//! Only a host owns a `Simulation`. It holds the authoritative `World`, every
//! entity, and applies both per-tick physics and discrete player actions.
//! Nothing here touches the network: the owning session drains the journaled
//! world mutations after each call and replicates them.
//!
//! Tick order:
//! 1. load chunks around every player
//! 2. turn held keys into velocity
//! 3. mob AI
//! 4. physics for players, mobs, drops
//! 5. drop lifetime and pickup
//! 6. move world journal onto the event bus

use std::{collections::BTreeMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::{SimConfig, Strictness},
    crafting::GRID_CELLS,
    entity::{Drop, DropId, EntityRef, KeyState, Mob, MobId, MobKind, PeerId, Player, DROP_SIZE},
    event::EventBus,
    inventory::{Slot, INVENTORY_SLOTS},
    math::Vec2,
    physics::{step_body, Body, StepOutcome},
    registry::{BlockId, ItemId, Registry},
    world::{ChunkKey, World, WorldEvent},
    worldgen::TerrainGenerator,
};

/// Discrete request from a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Mine { x: i32, y: i32 },
    Place { x: i32, y: i32, slot: usize },
    /// `None` hits the nearest entity in reach.
    Attack { target: Option<EntityRef> },
    Select { slot: usize },
    /// Swaps an inventory slot with a crafting grid cell.
    CraftSet { cell: usize, slot: usize },
    CraftCollect,
    Discard { slot: usize },
    /// Consumes one unit of food from a slot.
    Eat { slot: usize },
}

/// Why an action had no effect. Logged by the host, never sent back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    UnknownActor,
    OutOfRange,
    NothingThere,
    Unbreakable,
    WrongTool,
    TargetOccupied,
    ChunkNotLoaded,
    BadSlot,
    EmptySlot,
    NotPlaceable,
    NoTarget,
    NoRecipe,
    NotFood,
    FullHealth,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rejection::UnknownActor => "unknown actor",
            Rejection::OutOfRange => "out of range",
            Rejection::NothingThere => "nothing to mine",
            Rejection::Unbreakable => "unbreakable",
            Rejection::WrongTool => "wrong tool",
            Rejection::TargetOccupied => "target occupied",
            Rejection::ChunkNotLoaded => "chunk not loaded",
            Rejection::BadSlot => "bad slot",
            Rejection::EmptySlot => "empty slot",
            Rejection::NotPlaceable => "not placeable",
            Rejection::NoTarget => "no target",
            Rejection::NoRecipe => "no recipe",
            Rejection::NotFood => "not food",
            Rejection::FullHealth => "already at full health",
        };
        f.write_str(s)
    }
}

/// Gameplay outcomes, for logging and tests.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    BlockBroken { actor: PeerId, x: i32, y: i32, block: BlockId },
    BlockPlaced { actor: PeerId, x: i32, y: i32, block: BlockId },
    PickedUp { player: PeerId, item: ItemId, count: u32 },
    Crafted { player: PeerId, output: Slot },
    Ate { player: PeerId, item: ItemId, health: i32 },
    PlayerRespawned(PeerId),
    MobKilled(MobId),
}

/// Full entity state carried by SYNC. Players are ordered by id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub players: Vec<Player>,
    pub drops: Vec<Drop>,
    #[serde(default)]
    pub mobs: Vec<Mob>,
    #[serde(default)]
    pub clock: u64,
}

pub struct Simulation {
    registry: Arc<Registry>,
    world: World,
    cfg: SimConfig,
    players: BTreeMap<PeerId, Player>,
    drops: Vec<Drop>,
    mobs: Vec<Mob>,
    next_drop: u64,
    next_mob: u64,
    clock: u64,
    events: EventBus,
}

fn sign(v: f32) -> f32 {
    if v < 0.0 {
        -1.0
    } else {
        1.0
    }
}

fn manhattan(a: Vec2, b: Vec2) -> f32 {
    (a.x - b.x).abs() + (a.y - b.y).abs()
}

impl Simulation {
    /// Fresh host world.
    pub fn new(registry: Arc<Registry>, seed: u64, cfg: SimConfig) -> Self {
        let world = World::new(registry, TerrainGenerator::new(seed));
        let mut sim = Self::from_world(world, cfg);
        if sim.cfg.initial_mobs {
            let spawn = sim.cfg.spawn_point;
            sim.spawn_mob(MobKind::Zombie, spawn + Vec2::new(6.0, 0.0));
            sim.spawn_mob(MobKind::Pig, spawn + Vec2::new(-6.0, 0.0));
        }
        sim
    }

    /// Wraps an existing world with no entities.
    pub fn from_world(world: World, cfg: SimConfig) -> Self {
        Self::from_sync(world, SyncState::default(), cfg)
    }

    /// Resumes from the last replicated entity state. Used on promotion.
    pub fn from_sync(world: World, state: SyncState, cfg: SimConfig) -> Self {
        let registry = world.shared_registry();
        let next_drop = state.drops.iter().map(|d| d.id.0 + 1).max().unwrap_or(1);
        let next_mob = state.mobs.iter().map(|m| m.id.0 + 1).max().unwrap_or(1);
        Self {
            registry,
            world,
            cfg,
            players: state.players.into_iter().map(|p| (p.id, p)).collect(),
            drops: state.drops,
            mobs: state.mobs,
            next_drop,
            next_mob,
            clock: state.clock,
            events: EventBus::new(),
        }
    }

    /// Static tables.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Rules and constants.
    pub fn config(&self) -> &SimConfig {
        &self.cfg
    }

    /// Authoritative world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable world. Mutations are journaled.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Ticks since the world started.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Players by id.
    pub fn players(&self) -> &BTreeMap<PeerId, Player> {
        &self.players
    }

    pub fn player(&self, id: PeerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: PeerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn drops(&self) -> &[Drop] {
        &self.drops
    }

    pub fn mobs(&self) -> &[Mob] {
        &self.mobs
    }

    /// Adds a player at the spawn point with the starter kit. Returns the
    /// existing player if already present.
    pub fn spawn_player(&mut self, id: PeerId) -> &Player {
        if !self.players.contains_key(&id) {
            let mut player = Player::new(id, self.cfg.spawn_point);
            player.inventory.set(0, Slot::new(ItemId::WOOD_PICK, 1));
            self.load_around(player.body.center());
            info!(peer = %id, "Player spawned");
            self.players.insert(id, player);
        }
        &self.players[&id]
    }

    /// Inserts a player as-is (snapshot restore).
    pub fn insert_player(&mut self, player: Player) {
        self.load_around(player.body.center());
        self.players.insert(player.id, player);
    }

    /// Removes a player, e.g. on disconnect.
    pub fn remove_player(&mut self, id: PeerId) -> Option<Player> {
        let removed = self.players.remove(&id);
        if removed.is_some() {
            info!(peer = %id, "Player removed");
        }
        removed
    }

    /// Replaces a player's held keys.
    pub fn set_input(&mut self, id: PeerId, keys: KeyState) {
        if let Some(p) = self.players.get_mut(&id) {
            p.input = keys;
        }
    }

    /// Adds a mob at `pos`.
    pub fn spawn_mob(&mut self, kind: MobKind, pos: Vec2) -> MobId {
        let id = MobId(self.next_mob);
        self.next_mob += 1;
        self.mobs.push(Mob::new(id, kind, pos));
        id
    }

    /// Spawns a drop centered on `center`.
    pub fn spawn_drop(&mut self, center: Vec2, item: ItemId, count: u32, vel: Vec2, pickup_delay: u32) -> DropId {
        let id = DropId(self.next_drop);
        self.next_drop += 1;
        let mut body = Body::new(center - DROP_SIZE * 0.5, DROP_SIZE);
        body.vel = vel;
        self.drops.push(Drop {
            id,
            body,
            item,
            count,
            ttl: self.cfg.drop_lifetime_ticks,
            pickup_delay,
        });
        id
    }

    fn load_around(&mut self, center: Vec2) {
        let key = ChunkKey::containing(center.x.floor() as i32, center.y.floor() as i32);
        let created = self.world.ensure_loaded(key, self.cfg.chunk_radius);
        if created > 0 {
            debug!(cx = key.cx, cy = key.cy, created, "Generated chunks");
        }
    }

    /// Advances one fixed step.
    pub fn tick(&mut self) {
        self.clock += 1;

        let centers: Vec<Vec2> = self.players.values().map(|p| p.body.center()).collect();
        for c in centers {
            self.load_around(c);
        }

        self.apply_inputs();
        self.mob_ai();
        self.step_physics();
        self.update_drops();

        let journal = self.world.drain_journal();
        self.events.extend(journal);
    }

    fn apply_inputs(&mut self) {
        let cfg = &self.cfg;
        for p in self.players.values_mut() {
            let keys = p.input;
            match (keys.left, keys.right) {
                (true, false) => p.body.vel.x = -cfg.move_speed,
                (false, true) => p.body.vel.x = cfg.move_speed,
                _ => {}
            }
            if keys.jump && p.body.grounded {
                p.body.vel.y = -cfg.jump_speed;
            }
        }
    }

    fn mob_ai(&mut self) {
        let Self {
            mobs,
            players,
            world,
            cfg,
            clock,
            events,
            ..
        } = self;

        for mob in mobs.iter_mut() {
            mob.attack_cooldown = mob.attack_cooldown.saturating_sub(1);
            let center = mob.body.center();

            let dir = if mob.kind.hostile() {
                let nearest = players
                    .values()
                    .map(|p| (p.id, manhattan(p.body.center(), center)))
                    .min_by(|a, b| a.1.total_cmp(&b.1));
                match nearest {
                    Some((target, dist)) if dist < cfg.mob_aggro_range => {
                        let Some(player) = players.get_mut(&target) else {
                            continue;
                        };
                        let pc = player.body.center();
                        if dist < cfg.mob_attack_range && mob.attack_cooldown == 0 {
                            mob.attack_cooldown = cfg.mob_attack_cooldown;
                            player.health -= cfg.mob_attack_damage;
                            let away = sign(pc.x - center.x);
                            player.body.vel = Vec2::new(away * cfg.mob_knockback.x, cfg.mob_knockback.y);
                            if player.health <= 0 {
                                player.respawn(cfg.spawn_point);
                                events.push(SimEvent::PlayerRespawned(player.id));
                            }
                        }
                        if (pc.x - center.x).abs() > 0.25 {
                            sign(pc.x - center.x)
                        } else {
                            0.0
                        }
                    }
                    _ => 0.0,
                }
            } else {
                mob.heading = ((*clock / 120 + mob.id.0) % 3) as i8 - 1;
                f32::from(mob.heading) * 0.5
            };

            if dir != 0.0 {
                mob.body.vel.x = dir * cfg.mob_walk_speed;
                let aabb = mob.body.aabb();
                let front = if dir > 0.0 { aabb.max.x + 0.1 } else { aabb.min.x - 0.1 };
                let row = (aabb.max.y - 0.5).floor() as i32;
                if mob.body.grounded && world.is_solid(front.floor() as i32, row) {
                    mob.body.vel.y = -cfg.mob_jump_speed;
                }
            }
        }
    }

    fn step_physics(&mut self) {
        let phys = self.cfg.physics;
        let spawn = self.cfg.spawn_point;

        for p in self.players.values_mut() {
            if step_body(&mut p.body, &phys, &self.world) == StepOutcome::FellOut {
                debug!(peer = %p.id, "Player fell out of the world");
                p.body.reset(spawn);
            }
        }

        for m in &mut self.mobs {
            if step_body(&mut m.body, &phys, &self.world) == StepOutcome::FellOut {
                debug!(mob = m.id.0, "Mob fell out of the world");
                m.body.reset(spawn);
            }
        }
        for d in &mut self.drops {
            if step_body(&mut d.body, &phys, &self.world) == StepOutcome::FellOut {
                d.body.reset(spawn);
            }
        }
    }

    fn update_drops(&mut self) {
        let radius_sq = self.cfg.pickup_radius * self.cfg.pickup_radius;
        let mut kept = Vec::with_capacity(self.drops.len());

        for mut drop in self.drops.drain(..) {
            drop.ttl = drop.ttl.saturating_sub(1);
            if drop.ttl == 0 {
                continue;
            }
            if drop.pickup_delay > 0 {
                drop.pickup_delay -= 1;
                kept.push(drop);
                continue;
            }

            let c = drop.body.center();
            let picker = self
                .players
                .values_mut()
                .find(|p| p.body.center().distance_sq(c) <= radius_sq);
            if let Some(p) = picker {
                let left = p.inventory.add(drop.item, drop.count, &self.registry.items);
                if left < drop.count {
                    self.events.push(SimEvent::PickedUp {
                        player: p.id,
                        item: drop.item,
                        count: drop.count - left,
                    });
                }
                if left == 0 {
                    continue;
                }
                drop.count = left;
            }
            kept.push(drop);
        }

        self.drops = kept;
    }

    /// Validates and applies one action. Effects on the world are journaled
    /// and surface through `drain_world_events`.
    pub fn apply_action(&mut self, actor: PeerId, action: Action) -> Result<(), Rejection> {
        let player = self.players.get(&actor).ok_or(Rejection::UnknownActor)?;
        let center = player.body.center();
        let held = player.held_item();

        match action {
            Action::Mine { x, y } => {
                let block = self.world.get_block(x, y);
                let def = self.registry.blocks.get(block);
                if block.is_air() {
                    return Err(Rejection::NothingThere);
                }
                if def.unbreakable {
                    return Err(Rejection::Unbreakable);
                }
                if self.cfg.strictness != Strictness::Trusting && !self.in_reach(center, x, y) {
                    return Err(Rejection::OutOfRange);
                }
                if self.cfg.strictness == Strictness::Strict {
                    let (category, _) = self.registry.items.tool(held);
                    if def.required_tool.is_some() && def.required_tool != category {
                        return Err(Rejection::WrongTool);
                    }
                }

                let item = self.registry.blocks.drop_item(block);
                self.world.set_block(x, y, BlockId::AIR);
                self.spawn_drop(Vec2::new(x as f32 + 0.5, y as f32 + 0.5), item, 1, Vec2::ZERO, 0);
                self.events.push(SimEvent::BlockBroken { actor, x, y, block });
                Ok(())
            }

            Action::Place { x, y, slot } => {
                let stack = *player.inventory.slot(slot).ok_or(Rejection::BadSlot)?;
                if stack.is_empty() {
                    return Err(Rejection::EmptySlot);
                }
                let block = self
                    .registry
                    .items
                    .placeable(stack.item_id)
                    .ok_or(Rejection::NotPlaceable)?;
                if self.world.is_solid(x, y) {
                    return Err(Rejection::TargetOccupied);
                }
                if !self.world.store().contains(ChunkKey::containing(x, y)) {
                    return Err(Rejection::ChunkNotLoaded);
                }
                if self.cfg.strictness == Strictness::Strict && !self.in_reach(center, x, y) {
                    return Err(Rejection::OutOfRange);
                }

                if let Some(s) = self.players.get_mut(&actor).and_then(|p| p.inventory.slot_mut(slot)) {
                    s.take_one();
                }
                self.world.set_block(x, y, block);
                self.events.push(SimEvent::BlockPlaced { actor, x, y, block });
                Ok(())
            }

            Action::Attack { target } => {
                let target = match target {
                    Some(t) => t,
                    None => self.nearest_target(actor, center).ok_or(Rejection::NoTarget)?,
                };
                let damage = self.registry.items.weapon_damage(held);
                self.hit(actor, center, target, damage)
            }

            Action::Select { slot } => {
                if slot >= INVENTORY_SLOTS {
                    return Err(Rejection::BadSlot);
                }
                if let Some(p) = self.players.get_mut(&actor) {
                    p.selected = slot;
                }
                Ok(())
            }

            Action::CraftSet { cell, slot } => {
                if cell >= GRID_CELLS || slot >= INVENTORY_SLOTS {
                    return Err(Rejection::BadSlot);
                }
                if let Some(p) = self.players.get_mut(&actor) {
                    let held = p.inventory.slot(slot).copied().unwrap_or_default();
                    p.inventory.set(slot, p.craft[cell]);
                    p.craft[cell] = held;
                }
                Ok(())
            }

            Action::CraftCollect => {
                let recipes = &self.registry.recipes;
                let Some(p) = self.players.get_mut(&actor) else {
                    return Err(Rejection::UnknownActor);
                };
                let output = recipes.collect(&mut p.craft).ok_or(Rejection::NoRecipe)?;
                let left = p.inventory.add(output.item_id, output.count, &self.registry.items);
                self.events.push(SimEvent::Crafted { player: actor, output });
                if left > 0 {
                    let delay = self.cfg.pickup_delay_ticks;
                    self.spawn_drop(center, output.item_id, left, Vec2::ZERO, delay);
                }
                Ok(())
            }

            Action::Discard { slot } => {
                let taken = self
                    .players
                    .get_mut(&actor)
                    .and_then(|p| p.inventory.slot_mut(slot))
                    .ok_or(Rejection::BadSlot)?
                    .take_all();
                if taken.is_empty() {
                    return Err(Rejection::EmptySlot);
                }
                let delay = self.cfg.pickup_delay_ticks;
                self.spawn_drop(center, taken.item_id, taken.count, Vec2::new(0.0, -0.1), delay);
                Ok(())
            }

            Action::Eat { slot } => {
                let stack = *player.inventory.slot(slot).ok_or(Rejection::BadSlot)?;
                if stack.is_empty() {
                    return Err(Rejection::EmptySlot);
                }
                let heal = self.registry.items.heal(stack.item_id).ok_or(Rejection::NotFood)?;
                if player.health >= player.max_health {
                    return Err(Rejection::FullHealth);
                }
                let Some(p) = self.players.get_mut(&actor) else {
                    return Err(Rejection::UnknownActor);
                };
                if let Some(s) = p.inventory.slot_mut(slot) {
                    s.take_one();
                }
                p.health = (p.health + heal).min(p.max_health);
                let health = p.health;
                self.events.push(SimEvent::Ate {
                    player: actor,
                    item: stack.item_id,
                    health,
                });
                Ok(())
            }
        }
    }

    fn in_reach(&self, from: Vec2, x: i32, y: i32) -> bool {
        let cell = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
        let r = self.cfg.interaction_range;
        from.distance_sq(cell) <= r * r
    }

    fn within_attack(&self, a: Vec2, b: Vec2) -> bool {
        let r = self.cfg.attack_range;
        (a.x - b.x).abs() < r && (a.y - b.y).abs() < r
    }

    /// Closest mob, then closest other player, within reach.
    fn nearest_target(&self, actor: PeerId, from: Vec2) -> Option<EntityRef> {
        let mob = self
            .mobs
            .iter()
            .filter(|m| self.within_attack(from, m.body.center()))
            .min_by(|a, b| {
                a.body
                    .center()
                    .distance_sq(from)
                    .total_cmp(&b.body.center().distance_sq(from))
            })
            .map(|m| EntityRef::Mob(m.id));
        mob.or_else(|| {
            self.players
                .values()
                .filter(|p| p.id != actor && self.within_attack(from, p.body.center()))
                .min_by(|a, b| {
                    a.body
                        .center()
                        .distance_sq(from)
                        .total_cmp(&b.body.center().distance_sq(from))
                })
                .map(|p| EntityRef::Player(p.id))
        })
    }

    fn hit(&mut self, actor: PeerId, from: Vec2, target: EntityRef, damage: i32) -> Result<(), Rejection> {
        let kb = self.cfg.knockback;
        match target {
            EntityRef::Player(id) if id == actor => Err(Rejection::NoTarget),
            EntityRef::Player(id) => {
                let spawn = self.cfg.spawn_point;
                let to = self.players.get(&id).ok_or(Rejection::NoTarget)?.body.center();
                if !self.within_attack(from, to) {
                    return Err(Rejection::OutOfRange);
                }
                let p = self.players.get_mut(&id).ok_or(Rejection::NoTarget)?;
                p.health -= damage;
                p.body.vel = Vec2::new(sign(to.x - from.x) * kb.x, kb.y);
                if p.health <= 0 {
                    p.respawn(spawn);
                    self.events.push(SimEvent::PlayerRespawned(id));
                }
                Ok(())
            }
            EntityRef::Mob(id) => {
                let idx = self
                    .mobs
                    .iter()
                    .position(|m| m.id == id)
                    .ok_or(Rejection::NoTarget)?;
                let to = self.mobs[idx].body.center();
                if !self.within_attack(from, to) {
                    return Err(Rejection::OutOfRange);
                }
                let mob = &mut self.mobs[idx];
                mob.health -= damage;
                mob.body.vel = Vec2::new(sign(to.x - from.x) * kb.x, kb.y);
                if mob.health <= 0 {
                    self.mobs.remove(idx);
                    self.events.push(SimEvent::MobKilled(id));
                }
                Ok(())
            }
        }
    }

    /// Current entity state for SYNC.
    pub fn sync_state(&self) -> SyncState {
        SyncState {
            players: self.players.values().cloned().collect(),
            drops: self.drops.clone(),
            mobs: self.mobs.clone(),
            clock: self.clock,
        }
    }

    /// World mutations since the last call, in order. Includes mutations
    /// made by actions between ticks.
    pub fn drain_world_events(&mut self) -> Vec<WorldEvent> {
        let journal = self.world.drain_journal();
        self.events.extend(journal);
        self.events.drain::<WorldEvent>()
    }

    /// Gameplay events since the last call.
    pub fn drain_sim_events(&mut self) -> Vec<SimEvent> {
        self.events.drain::<SimEvent>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> SimConfig {
        SimConfig {
            initial_mobs: false,
            ..SimConfig::default()
        }
    }

    fn sim_with(cfg: SimConfig) -> (Simulation, PeerId) {
        let mut sim = Simulation::new(Arc::new(Registry::standard()), 1234, cfg);
        let me = PeerId(1);
        sim.spawn_player(me);
        (sim, me)
    }

    fn teleport(sim: &mut Simulation, id: PeerId, x: f32, y: f32) {
        sim.player_mut(id).unwrap().body.reset(Vec2::new(x, y));
    }

    #[test]
    fn mining_stone_spawns_cobble_drop() {
        let (mut sim, me) = sim_with(quiet());
        sim.world_mut().get_or_create_chunk(ChunkKey::new(0, 0));
        sim.world_mut().set_block(3, 5, BlockId::STONE);
        sim.player_mut(me).unwrap().inventory.set(0, Slot::new(ItemId::DIAMOND_PICK, 1));
        teleport(&mut sim, me, 5.0, 4.0);
        sim.drain_world_events();

        assert_eq!(sim.apply_action(me, Action::Mine { x: 3, y: 5 }), Ok(()));

        assert_eq!(sim.world().get_block(3, 5), BlockId::AIR);
        assert_eq!(sim.drops().len(), 1);
        let drop = &sim.drops()[0];
        assert_eq!(drop.item, ItemId::from_block(BlockId::COBBLE));
        assert_eq!(drop.body.center(), Vec2::new(3.5, 5.5));
        assert_eq!(
            sim.drain_world_events(),
            vec![WorldEvent::BlockChanged { x: 3, y: 5, id: BlockId::AIR }]
        );
    }

    #[test]
    fn unbreakable_block_is_untouched() {
        let cfg = SimConfig {
            strictness: Strictness::Trusting,
            ..quiet()
        };
        let (mut sim, me) = sim_with(cfg);
        let key = ChunkKey::containing(32, 63);
        sim.world_mut().get_or_create_chunk(key);
        assert_eq!(sim.world().get_block(32, 63), BlockId::BEDROCK);
        sim.drain_world_events();

        assert_eq!(sim.apply_action(me, Action::Mine { x: 32, y: 63 }), Err(Rejection::Unbreakable));
        assert_eq!(sim.world().get_block(32, 63), BlockId::BEDROCK);
        assert!(sim.drain_world_events().is_empty());
        assert!(sim.drops().is_empty());
    }

    #[test]
    fn out_of_range_mine_is_dropped() {
        let (mut sim, me) = sim_with(quiet());
        sim.world_mut().get_or_create_chunk(ChunkKey::new(0, 0));
        sim.world_mut().set_block(3, 5, BlockId::DIRT);
        teleport(&mut sim, me, 30.0, 5.0);
        assert_eq!(sim.apply_action(me, Action::Mine { x: 3, y: 5 }), Err(Rejection::OutOfRange));
        assert_eq!(sim.world().get_block(3, 5), BlockId::DIRT);
    }

    #[test]
    fn strict_mode_requires_matching_tool() {
        let cfg = SimConfig {
            strictness: Strictness::Strict,
            ..quiet()
        };
        let (mut sim, me) = sim_with(cfg);
        sim.world_mut().get_or_create_chunk(ChunkKey::new(0, 0));
        sim.world_mut().set_block(3, 5, BlockId::STONE);
        teleport(&mut sim, me, 4.0, 4.0);
        sim.player_mut(me).unwrap().inventory.set(0, Slot::new(ItemId::WOOD_AXE, 1));
        assert_eq!(sim.apply_action(me, Action::Mine { x: 3, y: 5 }), Err(Rejection::WrongTool));
        sim.player_mut(me).unwrap().inventory.set(0, Slot::new(ItemId::WOOD_PICK, 1));
        assert_eq!(sim.apply_action(me, Action::Mine { x: 3, y: 5 }), Ok(()));
    }

    #[test]
    fn place_on_solid_cell_changes_nothing() {
        let (mut sim, me) = sim_with(quiet());
        sim.world_mut().get_or_create_chunk(ChunkKey::new(0, 0));
        sim.world_mut().set_block(10, 10, BlockId::STONE);
        let dirt = ItemId::from_block(BlockId::DIRT);
        sim.player_mut(me).unwrap().inventory.set(1, Slot::new(dirt, 5));
        let inv_before = sim.player(me).unwrap().inventory.clone();
        sim.drain_world_events();

        assert_eq!(
            sim.apply_action(me, Action::Place { x: 10, y: 10, slot: 1 }),
            Err(Rejection::TargetOccupied)
        );
        assert_eq!(sim.world().get_block(10, 10), BlockId::STONE);
        assert_eq!(sim.player(me).unwrap().inventory, inv_before);
        assert!(sim.drain_world_events().is_empty());
    }

    #[test]
    fn place_consumes_one_unit_and_clears_empty_slot() {
        let (mut sim, me) = sim_with(quiet());
        sim.world_mut().get_or_create_chunk(ChunkKey::new(0, 0));
        sim.world_mut().set_block(10, 10, BlockId::AIR);
        let brick = ItemId::from_block(BlockId::BRICK);
        sim.player_mut(me).unwrap().inventory.set(0, Slot::new(brick, 1));

        assert_eq!(sim.apply_action(me, Action::Place { x: 10, y: 10, slot: 0 }), Ok(()));
        assert_eq!(sim.world().get_block(10, 10), BlockId::BRICK);
        assert_eq!(sim.player(me).unwrap().inventory.slot(0), Some(&Slot::EMPTY));
    }

    #[test]
    fn place_into_unloaded_chunk_keeps_inventory() {
        let (mut sim, me) = sim_with(quiet());
        let brick = ItemId::from_block(BlockId::BRICK);
        sim.player_mut(me).unwrap().inventory.set(0, Slot::new(brick, 1));
        assert_eq!(
            sim.apply_action(me, Action::Place { x: 5000, y: 10, slot: 0 }),
            Err(Rejection::ChunkNotLoaded)
        );
        assert_eq!(sim.player(me).unwrap().inventory.count_of(brick), 1);
    }

    #[test]
    fn replaying_actions_reproduces_layout() {
        let script = [
            Action::Mine { x: 32, y: 33 },
            Action::Mine { x: 33, y: 33 },
            Action::Place { x: 32, y: 20, slot: 1 },
            Action::Place { x: 33, y: 20, slot: 1 },
            Action::Mine { x: 32, y: 34 },
        ];

        let run = || {
            let cfg = SimConfig {
                strictness: Strictness::Trusting,
                ..quiet()
            };
            let (mut sim, me) = sim_with(cfg);
            sim.player_mut(me)
                .unwrap()
                .inventory
                .set(1, Slot::new(ItemId::from_block(BlockId::GLASS), 10));
            for a in script {
                let _ = sim.apply_action(me, a);
            }
            let mut cells = Vec::new();
            for y in 16..48 {
                for x in 16..48 {
                    cells.push(sim.world().get_block(x, y));
                }
            }
            cells
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn resting_player_stays_put() {
        let (mut sim, me) = sim_with(quiet());
        for _ in 0..600 {
            sim.tick();
            if sim.player(me).unwrap().body.grounded {
                break;
            }
        }
        assert!(sim.player(me).unwrap().body.grounded);
        let before = sim.player(me).unwrap().body.pos;
        sim.tick();
        assert_eq!(sim.player(me).unwrap().body.pos, before);
    }

    #[test]
    fn jump_needs_ground() {
        let (mut sim, me) = sim_with(quiet());
        sim.set_input(me, KeyState { jump: true, ..KeyState::default() });
        sim.tick();
        assert!(sim.player(me).unwrap().body.vel.y >= 0.0);
    }

    #[test]
    fn crafting_collect_grants_output() {
        let (mut sim, me) = sim_with(quiet());
        let planks = ItemId::from_block(BlockId::PLANKS);
        {
            let p = sim.player_mut(me).unwrap();
            for (i, cell) in [0, 1, 3, 4].into_iter().enumerate() {
                p.inventory.set(i + 1, Slot::new(planks, 1));
                p.craft[cell] = Slot::EMPTY;
            }
        }
        for (i, cell) in [0, 1, 3, 4].into_iter().enumerate() {
            assert_eq!(sim.apply_action(me, Action::CraftSet { cell, slot: i + 1 }), Ok(()));
        }
        assert_eq!(sim.apply_action(me, Action::CraftCollect), Ok(()));

        let p = sim.player(me).unwrap();
        assert_eq!(p.inventory.count_of(ItemId::from_block(BlockId::CRAFT_TABLE)), 1);
        assert!(p.craft.iter().all(Slot::is_empty));
        assert_eq!(sim.apply_action(me, Action::CraftCollect), Err(Rejection::NoRecipe));
    }

    #[test]
    fn attack_kills_mob_and_respawns_player() {
        let (mut sim, me) = sim_with(quiet());
        let other = PeerId(2);
        sim.spawn_player(other);
        let mob = sim.spawn_mob(MobKind::Pig, Vec2::new(33.0, 10.0));
        sim.player_mut(me).unwrap().inventory.set(0, Slot::new(ItemId::DIAMOND_SWORD, 1));
        teleport(&mut sim, me, 32.0, 9.5);

        assert_eq!(sim.apply_action(me, Action::Attack { target: None }), Ok(()));
        assert_eq!(sim.apply_action(me, Action::Attack { target: Some(EntityRef::Mob(mob)) }), Ok(()));
        assert!(sim.mobs().is_empty());
        assert!(sim.drain_sim_events().contains(&SimEvent::MobKilled(mob)));

        sim.player_mut(other).unwrap().health = 3;
        teleport(&mut sim, other, 33.0, 9.5);
        assert_eq!(
            sim.apply_action(me, Action::Attack { target: Some(EntityRef::Player(other)) }),
            Ok(())
        );
        assert_eq!(sim.player(other).unwrap().health, 20);
        assert_eq!(sim.player(other).unwrap().body.pos, sim.config().spawn_point);
    }

    #[test]
    fn discarded_stack_is_picked_up_after_delay() {
        let (mut sim, me) = sim_with(quiet());
        let dirt = ItemId::from_block(BlockId::DIRT);
        sim.player_mut(me).unwrap().inventory.set(2, Slot::new(dirt, 7));
        assert_eq!(sim.apply_action(me, Action::Discard { slot: 2 }), Ok(()));
        assert_eq!(sim.player(me).unwrap().inventory.count_of(dirt), 0);
        assert_eq!(sim.drops().len(), 1);

        for _ in 0..600 {
            sim.tick();
            if sim.drops().is_empty() {
                break;
            }
        }
        assert!(sim.drops().is_empty());
        assert_eq!(sim.player(me).unwrap().inventory.count_of(dirt), 7);
    }

    #[test]
    fn player_below_void_depth_respawns_at_rest() {
        let (mut sim, me) = sim_with(quiet());
        let depth = sim.config().physics.void_depth;
        teleport(&mut sim, me, 32.0, depth + 2.0);
        sim.player_mut(me).unwrap().body.vel = Vec2::new(0.1, 0.3);

        sim.tick();

        let body = sim.player(me).unwrap().body;
        assert_eq!(body.pos, sim.config().spawn_point);
        assert_eq!(body.vel, Vec2::ZERO);
    }

    #[test]
    fn mob_falling_through_unloaded_terrain_comes_back() {
        let (mut sim, _) = sim_with(quiet());
        let pig = sim.spawn_mob(MobKind::Pig, Vec2::new(5000.0, 10.0));

        let mut respawned = false;
        for _ in 0..400 {
            sim.tick();
            let mob = sim.mobs().iter().find(|m| m.id == pig).unwrap();
            if (mob.body.pos.x - sim.config().spawn_point.x).abs() < 1.0 {
                respawned = true;
                break;
            }
        }
        assert!(respawned);
        assert_eq!(sim.mobs().len(), 1);
    }

    #[test]
    fn drop_below_void_depth_is_kept() {
        let (mut sim, _) = sim_with(quiet());
        let depth = sim.config().physics.void_depth;
        let id = sim.spawn_drop(Vec2::new(-3000.0, depth + 2.0), ItemId::STICK, 1, Vec2::ZERO, 20);
        sim.tick();
        let drop = sim.drops().iter().find(|d| d.id == id).unwrap();
        assert_eq!(drop.body.pos, sim.config().spawn_point);
    }

    #[test]
    fn unclaimed_drop_expires_after_lifetime() {
        let cfg = SimConfig {
            drop_lifetime_ticks: 5,
            ..quiet()
        };
        let (mut sim, _) = sim_with(cfg);
        sim.spawn_drop(Vec2::new(0.5, 0.5), ItemId::STICK, 1, Vec2::ZERO, 0);

        for _ in 0..4 {
            sim.tick();
        }
        assert_eq!(sim.drops().len(), 1);
        sim.tick();
        assert!(sim.drops().is_empty());
    }

    #[test]
    fn eating_food_heals_up_to_max() {
        let (mut sim, me) = sim_with(quiet());
        sim.player_mut(me).unwrap().inventory.set(3, Slot::new(ItemId::APPLE, 2));
        assert_eq!(sim.apply_action(me, Action::Eat { slot: 3 }), Err(Rejection::FullHealth));
        assert_eq!(sim.apply_action(me, Action::Eat { slot: 0 }), Err(Rejection::NotFood));

        sim.player_mut(me).unwrap().health = 19;
        assert_eq!(sim.apply_action(me, Action::Eat { slot: 3 }), Ok(()));
        let p = sim.player(me).unwrap();
        assert_eq!(p.health, 20);
        assert_eq!(p.inventory.count_of(ItemId::APPLE), 1);
        assert!(sim
            .drain_sim_events()
            .contains(&SimEvent::Ate { player: me, item: ItemId::APPLE, health: 20 }));
    }

    #[test]
    fn sync_state_round_trips_as_json() {
        let (sim, me) = sim_with(SimConfig::default());
        let state = sim.sync_state();
        let json = serde_json::to_string(&state).unwrap();
        let back: SyncState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.players[0].id, me);
        assert_eq!(back.mobs.len(), 2);
    }
}
