//! Body integration and grid collision.
//!
//! One step per tick, in this order: gravity into vertical velocity (clamped to
//! terminal), move along x and resolve, move along y and resolve, then decay
//! horizontal velocity. Each axis resolves against the first solid cell found
//! scanning the moved box top to bottom, left to right. Resolving x before y
//! can catch a body on a corner; that is accepted behavior.

use serde::{Deserialize, Serialize};

use crate::{
    math::{Aabb, Vec2},
    world::World,
};

/// Physics parameters, in blocks and ticks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub gravity: f32,
    pub terminal_velocity: f32,
    /// Horizontal velocity multiplier applied after each step.
    pub horizontal_decay: f32,
    /// Horizontal speeds below this snap to zero.
    pub stop_threshold: f32,
    /// Gap kept between a resolved body and the cell it hit.
    pub skin: f32,
    /// Bodies below this row have fallen out of the world.
    pub void_depth: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 0.015625,
            terminal_velocity: 0.3125,
            horizontal_decay: 0.8,
            stop_threshold: 0.1 / 32.0,
            skin: 0.003125,
            void_depth: 64.0,
        }
    }
}

/// Anything bodies collide against.
pub trait SolidMap {
    fn is_solid(&self, gx: i32, gy: i32) -> bool;
}

impl SolidMap for World {
    fn is_solid(&self, gx: i32, gy: i32) -> bool {
        World::is_solid(self, gx, gy)
    }
}

/// A moving box. `pos` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    pub pos: Vec2,
    pub vel: Vec2,
    pub size: Vec2,
    pub grounded: bool,
}

impl Body {
    /// Body at rest.
    pub fn new(pos: Vec2, size: Vec2) -> Self {
        Self {
            pos,
            vel: Vec2::ZERO,
            size,
            grounded: false,
        }
    }

    /// Current bounding box.
    pub fn aabb(&self) -> Aabb {
        Aabb::from_pos_size(self.pos, self.size)
    }

    pub fn center(&self) -> Vec2 {
        self.aabb().center()
    }

    /// Puts the body back at `pos` at rest.
    pub fn reset(&mut self, pos: Vec2) {
        self.pos = pos;
        self.vel = Vec2::ZERO;
        self.grounded = false;
    }
}

/// What happened during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Settled,
    /// The body passed `void_depth`; the caller respawns or removes it.
    FellOut,
}

/// First solid cell overlapped by `body`, scanning rows top to bottom.
fn first_hit(body: &Body, map: &impl SolidMap) -> Option<(i32, i32)> {
    let ((x0, x1), (y0, y1)) = body.aabb().cell_span();
    (y0..=y1).find_map(|gy| (x0..=x1).find(|&gx| map.is_solid(gx, gy)).map(|gx| (gx, gy)))
}

/// Advances a body by one tick.
pub fn step_body(body: &mut Body, cfg: &PhysicsConfig, map: &impl SolidMap) -> StepOutcome {
    body.vel.y = (body.vel.y + cfg.gravity).min(cfg.terminal_velocity);

    body.pos.x += body.vel.x;
    if let Some((gx, _)) = first_hit(body, map) {
        if body.vel.x > 0.0 {
            body.pos.x = gx as f32 - body.size.x - cfg.skin;
        } else if body.vel.x < 0.0 {
            body.pos.x = gx as f32 + 1.0;
        }
        body.vel.x = 0.0;
    }

    body.pos.y += body.vel.y;
    match first_hit(body, map) {
        Some((_, gy)) => {
            if body.vel.y >= 0.0 {
                body.pos.y = gy as f32 - body.size.y - cfg.skin;
                body.grounded = true;
            } else {
                body.pos.y = gy as f32 + 1.0;
            }
            body.vel.y = 0.0;
        }
        None => body.grounded = false,
    }

    body.vel.x *= cfg.horizontal_decay;
    if body.vel.x.abs() < cfg.stop_threshold {
        body.vel.x = 0.0;
    }

    if body.pos.y > cfg.void_depth {
        StepOutcome::FellOut
    } else {
        StepOutcome::Settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Solid floor at row 10 plus a wall column at x = 8.
    struct Floor;

    impl SolidMap for Floor {
        fn is_solid(&self, gx: i32, gy: i32) -> bool {
            gy >= 10 || gx == 8
        }
    }

    struct Open;

    impl SolidMap for Open {
        fn is_solid(&self, _: i32, _: i32) -> bool {
            false
        }
    }

    fn player(x: f32, y: f32) -> Body {
        Body::new(Vec2::new(x, y), Vec2::new(0.875, 1.75))
    }

    fn settle(body: &mut Body, cfg: &PhysicsConfig) {
        for _ in 0..200 {
            step_body(body, cfg, &Floor);
            if body.grounded {
                return;
            }
        }
        panic!("body never landed");
    }

    #[test]
    fn falling_body_lands_on_floor() {
        let cfg = PhysicsConfig::default();
        let mut b = player(2.0, 2.0);
        settle(&mut b, &cfg);
        assert!(b.grounded);
        assert_eq!(b.vel.y, 0.0);
        assert!(b.pos.y + b.size.y <= 10.0);
        assert!(b.pos.y + b.size.y > 9.99);
    }

    #[test]
    fn resting_body_does_not_move() {
        let cfg = PhysicsConfig::default();
        let mut b = player(2.0, 2.0);
        settle(&mut b, &cfg);
        let before = b.pos;
        assert_eq!(step_body(&mut b, &cfg, &Floor), StepOutcome::Settled);
        assert_eq!(b.pos, before);
        assert!(b.grounded);
    }

    #[test]
    fn wall_stops_horizontal_motion() {
        let cfg = PhysicsConfig::default();
        let mut b = player(6.5, 2.0);
        settle(&mut b, &cfg);
        for _ in 0..20 {
            b.vel.x = 0.125;
            step_body(&mut b, &cfg, &Floor);
        }
        assert!(b.pos.x + b.size.x < 8.0);
        assert!(b.pos.x + b.size.x > 7.9);
    }

    #[test]
    fn fall_speed_is_capped() {
        let cfg = PhysicsConfig::default();
        let mut b = player(0.0, 0.0);
        for _ in 0..100 {
            step_body(&mut b, &cfg, &Open);
        }
        assert_eq!(b.vel.y, cfg.terminal_velocity);
    }

    #[test]
    fn body_past_void_depth_falls_out() {
        let cfg = PhysicsConfig::default();
        let mut b = player(20.0, 80.0);
        assert_eq!(step_body(&mut b, &cfg, &Open), StepOutcome::FellOut);
    }

    #[test]
    fn small_horizontal_speed_snaps_to_zero() {
        let cfg = PhysicsConfig::default();
        let mut b = player(2.0, 2.0);
        settle(&mut b, &cfg);
        b.vel.x = 0.003;
        step_body(&mut b, &cfg, &Floor);
        assert_eq!(b.vel.x, 0.0);
    }
}
