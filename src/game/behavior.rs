//! Enemy Behaviour
//!
//! Per-tick enemy logic, dispatched on [`EnemyKind`]. Every kind chases
//! the player along a heading recomputed from scratch each tick; shooters
//! and bosses additionally fire enemy bullets on cooldowns.

use crate::core::fixed::{
    fixed_mul, FIXED_ONE, TICK_DURATION, TICK_PERIOD_MS,
    SHOOTER_RANGE, SHOOTER_BULLET_SPEED, BOSS_VOLLEY_SPEED, BOSS_BURST_SPEED,
    COS_FAN_STEP, SIN_FAN_STEP, COS_BURST_STEP, SIN_BURST_STEP,
};
use crate::core::rng::DeterministicRng;
use crate::core::vec2::FixedVec2;
use crate::game::spawn::shooter_interval_ms;
use crate::game::state::{Enemy, EnemyKind, GameState};
use crate::game::tick::GameConfig;

/// Bullets in a boss fan volley.
pub const BOSS_FAN_SIZE: i32 = 5;

/// Bullets in a boss circular burst.
pub const BOSS_BURST_SIZE: usize = 24;

/// An enemy bullet about to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shot {
    /// Origin
    pub position: FixedVec2,
    /// Velocity (px/s)
    pub velocity: FixedVec2,
}

/// Move every enemy one tick toward the player and fire anything due.
pub fn advance_enemies(state: &mut GameState, config: &GameConfig) {
    let player = state.player_position;
    let level = state.level;
    let mut shots = Vec::new();

    for enemy in state.enemies.iter_mut() {
        let step = fixed_mul(enemy.speed, TICK_DURATION);
        enemy.position = enemy.position.advance_toward(player, step);

        match enemy.kind {
            EnemyKind::Basic => {}
            EnemyKind::Shooter => shooter_fire(enemy, player, level, &mut shots),
            EnemyKind::Boss => boss_fire(enemy, player, config, &mut state.rng, &mut shots),
        }
    }

    // An enemy sitting exactly on the player has no heading to fire along.
    for shot in shots.into_iter().filter(|shot| shot.velocity != FixedVec2::ZERO) {
        state.fire_enemy_bullet(shot.position, shot.velocity, config.enemy_bullet_damage);
    }
}

fn shooter_fire(enemy: &mut Enemy, player: FixedVec2, level: u32, shots: &mut Vec<Shot>) {
    enemy.fire_cooldown_ms = enemy.fire_cooldown_ms.saturating_sub(TICK_PERIOD_MS);
    if enemy.fire_cooldown_ms > 0 {
        return;
    }
    if enemy.position.distance_squared(player) > (SHOOTER_RANGE as i64).pow(2) {
        return;
    }

    let direction = enemy.position.direction_to(player);
    shots.push(Shot {
        position: enemy.position,
        velocity: direction.scale(SHOOTER_BULLET_SPEED),
    });
    enemy.fire_cooldown_ms = shooter_interval_ms(level);
}

fn boss_fire(
    enemy: &mut Enemy,
    player: FixedVec2,
    config: &GameConfig,
    rng: &mut DeterministicRng,
    shots: &mut Vec<Shot>,
) {
    enemy.fire_cooldown_ms = enemy.fire_cooldown_ms.saturating_sub(TICK_PERIOD_MS);
    if enemy.fire_cooldown_ms == 0 {
        let aim = enemy.position.direction_to(player);
        for direction in fan_directions(aim) {
            shots.push(Shot {
                position: enemy.position,
                velocity: direction.scale(BOSS_VOLLEY_SPEED),
            });
        }
        enemy.fire_cooldown_ms = config.boss_volley_interval_ms;
    }

    enemy.burst_cooldown_ms = enemy.burst_cooldown_ms.saturating_sub(TICK_PERIOD_MS);
    if enemy.burst_cooldown_ms == 0 {
        enemy.burst_cooldown_ms = config.boss_burst_interval_ms;
        if rng.next_bool(config.boss_burst_chance) {
            for direction in burst_directions() {
                shots.push(Shot {
                    position: enemy.position,
                    velocity: direction.scale(BOSS_BURST_SPEED),
                });
            }
        }
    }
}

/// Five headings centred on `aim`, 0.15 rad apart.
pub fn fan_directions(aim: FixedVec2) -> Vec<FixedVec2> {
    let half = BOSS_FAN_SIZE / 2;
    (-half..=half)
        .map(|offset| {
            let sin = if offset < 0 { -SIN_FAN_STEP } else { SIN_FAN_STEP };
            (0..offset.abs()).fold(aim, |dir, _| dir.rotate(COS_FAN_STEP, sin))
        })
        .collect()
}

/// Evenly spaced headings around the full circle.
pub fn burst_directions() -> Vec<FixedVec2> {
    let mut dir = FixedVec2::new(FIXED_ONE, 0);
    let mut out = Vec::with_capacity(BOSS_BURST_SIZE);
    for _ in 0..BOSS_BURST_SIZE {
        out.push(dir);
        dir = dir.rotate(COS_BURST_STEP, SIN_BURST_STEP);
    }
    out
}
