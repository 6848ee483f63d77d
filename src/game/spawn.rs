//! Enemy Spawning
//!
//! Level-scaled enemy stats and the edge spawn policy. All randomness is
//! drawn from the state's seeded RNG.

use crate::core::fixed::{
    Fixed, FIXED_ONE,
    ARENA_WIDTH, ARENA_HEIGHT, SPAWN_OFFSET, TICK_PERIOD_MS,
    ENEMY_BASE_SPEED, ENEMY_SPEED_PER_LEVEL, BOSS_SPEED,
};
use crate::core::rng::DeterministicRng;
use crate::core::vec2::FixedVec2;
use crate::game::events::GameEvent;
use crate::game::state::{Enemy, EnemyKind, GameState};
use crate::game::tick::GameConfig;

/// Spawn interval for a level, in ms.
pub fn spawn_interval_ms(level: u32, config: &GameConfig) -> u32 {
    let reduction = level.saturating_sub(1).saturating_mul(config.spawn_interval_step_ms);
    config
        .base_spawn_interval_ms
        .saturating_sub(reduction)
        .max(config.min_spawn_interval_ms)
}

/// Regular spawns pause while this many enemies are alive.
pub fn max_enemies(level: u32) -> usize {
    (20 + level as usize * 2).min(40)
}

/// Shooter fire interval for a level, in ms.
pub fn shooter_interval_ms(level: u32) -> u32 {
    1500u32
        .saturating_sub(level.saturating_sub(1).saturating_mul(100))
        .max(800)
}

/// Random point just outside a random arena edge.
pub fn edge_spawn_point(rng: &mut DeterministicRng) -> FixedVec2 {
    match rng.next_int(4) {
        // Top
        0 => FixedVec2::new(rng.next_fixed(ARENA_WIDTH), -SPAWN_OFFSET),
        // Right
        1 => FixedVec2::new(ARENA_WIDTH + SPAWN_OFFSET, rng.next_fixed(ARENA_HEIGHT)),
        // Bottom
        2 => FixedVec2::new(rng.next_fixed(ARENA_WIDTH), ARENA_HEIGHT + SPAWN_OFFSET),
        // Left
        _ => FixedVec2::new(-SPAWN_OFFSET, rng.next_fixed(ARENA_HEIGHT)),
    }
}

/// Build an enemy of `kind` scaled to `level`.
pub fn make_enemy(id: u32, kind: EnemyKind, position: FixedVec2, level: u32, config: &GameConfig) -> Enemy {
    let tier = i32::try_from(level.saturating_sub(1)).unwrap_or(i32::MAX);
    match kind {
        EnemyKind::Basic | EnemyKind::Shooter => {
            let health = 25i32.saturating_add(tier.saturating_mul(10));
            Enemy {
                id,
                kind,
                position,
                health,
                max_health: health,
                speed: ENEMY_BASE_SPEED.saturating_add(tier.saturating_mul(ENEMY_SPEED_PER_LEVEL)),
                contact_damage: config.contact_damage,
                fire_cooldown_ms: if kind == EnemyKind::Shooter { shooter_interval_ms(level) } else { 0 },
                burst_cooldown_ms: 0,
            }
        }
        EnemyKind::Boss => {
            let rank = i32::try_from(level).unwrap_or(i32::MAX);
            let health = 2000i32.saturating_add(rank.saturating_mul(1000));
            Enemy {
                id,
                kind,
                position,
                health,
                max_health: health,
                speed: BOSS_SPEED,
                contact_damage: 50u32.saturating_add(level.saturating_mul(10)),
                fire_cooldown_ms: config.boss_volley_interval_ms,
                burst_cooldown_ms: config.boss_burst_interval_ms,
            }
        }
    }
}

/// Pick the kind for a regular spawn.
fn roll_kind(rng: &mut DeterministicRng, level: u32, shooter_chance: Fixed) -> EnemyKind {
    if level >= 2 && rng.next_bool(shooter_chance) {
        EnemyKind::Shooter
    } else {
        EnemyKind::Basic
    }
}

/// Spawn one enemy of `kind` on a random edge.
pub fn spawn_enemy(state: &mut GameState, kind: EnemyKind, config: &GameConfig) -> u32 {
    let position = edge_spawn_point(&mut state.rng);
    let id = state.allocate_enemy_id();
    let enemy = make_enemy(id, kind, position, state.level, config);
    state.enemies.push(enemy);
    state.push_event(GameEvent::enemy_spawned(state.tick, id, kind, position));
    id
}

/// Advance the spawn accumulator and spawn when it fills.
pub fn maybe_spawn_enemy(state: &mut GameState, config: &GameConfig) {
    state.spawn_timer_ms += TICK_PERIOD_MS;
    if state.spawn_timer_ms < spawn_interval_ms(state.level, config) {
        return;
    }
    state.spawn_timer_ms = 0;

    if state.enemies.len() >= max_enemies(state.level) {
        return;
    }

    let kind = roll_kind(&mut state.rng, state.level, config.shooter_chance);
    spawn_enemy(state, kind, config);
}

/// Default shooter probability: 25%.
pub const SHOOTER_CHANCE: Fixed = FIXED_ONE / 4;

/// Default boss burst probability: 25%.
pub const BOSS_BURST_CHANCE: Fixed = FIXED_ONE / 4;
