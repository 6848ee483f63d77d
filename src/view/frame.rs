//! Render frames
//!
//! Float copies of an authoritative snapshot, ready for drawing. A frame is
//! built from one snapshot only; nothing in it is simulated locally except
//! the view's own avatar position.

use serde::Serialize;
use tracing::{debug, info};

use crate::core::fixed::to_float;
use crate::game::events::GameOverSummary;
use crate::game::state::{EnemyKind, GameState};
use crate::game::upgrade::UpgradeKind;

/// An enemy as drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnemySprite {
    /// Enemy id
    pub id: u32,
    /// Behaviour kind
    pub kind: EnemyKind,
    /// Position (px)
    pub position: (f32, f32),
    /// Remaining health in [0, 1]
    pub health_fraction: f32,
}

/// A projectile as drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProjectileSprite {
    /// Bullet id
    pub id: u32,
    /// Position (px)
    pub position: (f32, f32),
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderFrame {
    /// Restart counter of the source snapshot
    pub epoch: u32,
    /// Tick of the source snapshot
    pub tick: u32,
    /// Seconds survived
    pub game_time: u32,
    /// Player level
    pub level: u32,
    /// Experience toward the next level
    pub experience: u32,
    /// Experience needed for the next level
    pub experience_to_next: u32,
    /// Player health
    pub health: u32,
    /// Player max health
    pub max_health: u32,
    /// Enemies killed
    pub kill_count: u32,
    /// Game running
    pub game_active: bool,
    /// Level-up choices waiting for the player
    pub upgrade_offer: Vec<UpgradeKind>,
    /// Where to draw the avatar
    pub player: (f32, f32),
    /// Where the Model says the avatar is
    pub authoritative_player: (f32, f32),
    /// Enemies
    pub enemies: Vec<EnemySprite>,
    /// Player bullets
    pub bullets: Vec<ProjectileSprite>,
    /// Enemy bullets
    pub enemy_bullets: Vec<ProjectileSprite>,
}

impl RenderFrame {
    /// Build a frame from a snapshot, drawing the avatar at `player`.
    pub fn from_state(state: &GameState, player: (f32, f32)) -> Self {
        Self {
            epoch: state.epoch,
            tick: state.tick,
            game_time: state.game_time,
            level: state.level,
            experience: state.experience,
            experience_to_next: state.experience_to_next,
            health: state.health,
            max_health: state.max_health,
            kill_count: state.kill_count,
            game_active: state.game_active,
            upgrade_offer: state.upgrade_offer.clone(),
            player,
            authoritative_player: state.player_position.to_floats(),
            enemies: state
                .enemies
                .iter()
                .map(|e| EnemySprite {
                    id: e.id,
                    kind: e.kind,
                    position: e.position.to_floats(),
                    health_fraction: if e.max_health > 0 {
                        (e.health.max(0) as f32 / e.max_health as f32).min(1.0)
                    } else {
                        0.0
                    },
                })
                .collect(),
            bullets: state
                .bullets
                .iter()
                .map(|b| ProjectileSprite { id: b.id, position: b.position.to_floats() })
                .collect(),
            enemy_bullets: state
                .enemy_bullets
                .iter()
                .map(|b| ProjectileSprite { id: b.id, position: b.position.to_floats() })
                .collect(),
        }
    }

    /// Player speed helper for prediction (px/s).
    pub fn player_speed(state: &GameState) -> f32 {
        to_float(state.player_speed)
    }
}

/// Draws frames. Only the latest snapshot is ever handed over.
pub trait Renderer {
    /// Draw a frame.
    fn render(&mut self, frame: &RenderFrame);

    /// The game ended.
    fn game_over(&mut self, _summary: &GameOverSummary) {}

    /// The player levelled up.
    fn level_up(&mut self, _level: u32) {}
}

/// Renderer that writes frames to the log. Used by headless runs.
#[derive(Debug, Default)]
pub struct TraceRenderer {
    frames: u64,
}

impl TraceRenderer {
    /// Frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Renderer for TraceRenderer {
    fn render(&mut self, frame: &RenderFrame) {
        self.frames += 1;
        // About once a second at 60 Hz
        if self.frames % 60 == 1 {
            info!(
                tick = frame.tick,
                level = frame.level,
                health = frame.health,
                enemies = frame.enemies.len(),
                kills = frame.kill_count,
                "Frame"
            );
        } else {
            debug!(tick = frame.tick, "Frame");
        }
    }

    fn game_over(&mut self, summary: &GameOverSummary) {
        info!(level = summary.level, kills = summary.kill_count, time = summary.game_time, "Game over");
    }

    fn level_up(&mut self, level: u32) {
        info!(level, "Level up");
    }
}
