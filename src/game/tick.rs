//! Authoritative Simulation Tick
//!
//! One fixed-step advance of a game. Everything here is deterministic:
//! fixed-point math, `BTreeMap` sender order, and the state's own RNG.
//! Given the same state, inputs and config, a tick always produces the
//! same next state and the same events.

use std::collections::BTreeMap;

use crate::core::fixed::{
    Fixed, fixed_mul,
    TICK_DURATION, TICK_PERIOD_MS,
    ARENA_WIDTH, ARENA_HEIGHT, ENEMY_CULL_MARGIN, BULLET_CULL_MARGIN,
    BULLET_SPEED, BULLET_HIT_RADIUS, CONTACT_RADIUS, ENEMY_BULLET_HIT_RADIUS,
    PLAYER_SPEED_PER_LEVEL, HALF_SHOT_SPREAD, small_angle_cos_sin,
};
use crate::core::vec2::FixedVec2;
use crate::game::behavior::advance_enemies;
use crate::game::collision::{
    first_enemy_hit, enemies_touching, enemy_bullets_hitting, remove_indices,
};
use crate::game::events::{GameEvent, GameOverSummary, HitSource};
use crate::game::input::{TickInput, ValidationConfig};
use crate::game::spawn::{maybe_spawn_enemy, spawn_enemy, SHOOTER_CHANCE, BOSS_BURST_CHANCE};
use crate::game::state::{Enemy, EnemyKind, GameState, ViewId};
use crate::game::upgrade::offer_upgrades;

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick, in the order they happened
    pub events: Vec<GameEvent>,
    /// False when the game was inactive and nothing was simulated
    pub simulated: bool,
    /// Set on the single tick where health reached zero
    pub game_over: Option<GameOverSummary>,
}

/// Balance and validation tunables.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Input validation limits
    pub validation: ValidationConfig,
    /// Player bullet damage
    pub bullet_damage: i32,
    /// Regular enemy contact damage
    pub contact_damage: u32,
    /// Enemy bullet damage
    pub enemy_bullet_damage: u32,
    /// Experience per kill
    pub experience_per_kill: u32,
    /// Experience requirement growth per level, percent
    pub experience_growth_percent: u32,
    /// Max health gained per level
    pub level_up_health_bonus: u32,
    /// Speed gained per level (px/s)
    pub level_up_speed_bonus: Fixed,
    /// Spawn interval at level 1 (ms)
    pub base_spawn_interval_ms: u32,
    /// Spawn interval floor (ms)
    pub min_spawn_interval_ms: u32,
    /// Spawn interval reduction per level (ms)
    pub spawn_interval_step_ms: u32,
    /// Player bullet lifetime (ms)
    pub bullet_lifetime_ms: u32,
    /// Chance a regular spawn from level 2 on is a shooter
    pub shooter_chance: Fixed,
    /// A boss joins on every level that is a multiple of this
    pub boss_level_interval: u32,
    /// Boss fan volley interval (ms)
    pub boss_volley_interval_ms: u32,
    /// Boss burst roll interval (ms)
    pub boss_burst_interval_ms: u32,
    /// Chance a boss burst roll fires
    pub boss_burst_chance: Fixed,
    /// Queued commands kept per sender; the rest are dropped
    pub max_pending_per_view: usize,
    /// Finished games whose input logs are kept for audit
    pub retained_epochs: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            validation: ValidationConfig::default(),
            bullet_damage: 25,
            contact_damage: 10,
            enemy_bullet_damage: 15,
            experience_per_kill: 10,
            experience_growth_percent: 120,
            level_up_health_bonus: 20,
            level_up_speed_bonus: PLAYER_SPEED_PER_LEVEL,
            base_spawn_interval_ms: 667,
            min_spawn_interval_ms: 250,
            spawn_interval_step_ms: 25,
            bullet_lifetime_ms: 3000,
            shooter_chance: SHOOTER_CHANCE,
            boss_level_interval: 5,
            boss_volley_interval_ms: 1000,
            boss_burst_interval_ms: 3000,
            boss_burst_chance: BOSS_BURST_CHANCE,
            max_pending_per_view: 32,
            retained_epochs: 8,
        }
    }
}

/// Run one simulation tick.
///
/// # Arguments
///
/// * `state` - The game state (will be mutated)
/// * `inputs` - Each sender's commands for this tick (BTreeMap for deterministic order!)
/// * `config` - Game configuration
///
/// An inactive game, or one paused on an upgrade offer, is left untouched.
pub fn tick(
    state: &mut GameState,
    inputs: &BTreeMap<ViewId, TickInput>,
    config: &GameConfig,
) -> TickResult {
    let mut result = TickResult::default();

    if !state.game_active || state.awaiting_upgrade() {
        return result;
    }
    result.simulated = true;

    // 0. Advance clock
    state.tick += 1;
    state.game_time = (state.tick as u64 * TICK_PERIOD_MS as u64 / 1000) as u32;

    // 1. Apply queued player inputs
    apply_inputs(state, inputs);

    // 2. Enemies chase (and shoot)
    advance_enemies(state, config);

    // 3. Bullets travel
    advance_bullets(state);

    // 4. Cull off-arena and expired entities
    cull_entities(state, config);

    // 5. Spawn
    maybe_spawn_enemy(state, config);

    // 6. Player bullets vs enemies
    resolve_bullet_hits(state, config);

    // 7. Enemies and enemy bullets vs player
    resolve_contacts(state);
    resolve_enemy_bullet_hits(state);

    // 8. Terminal condition
    check_game_over(state, &mut result);

    result.events = state.take_events();
    result
}

/// Apply each sender's move and shot, in ascending sender order.
fn apply_inputs(state: &mut GameState, inputs: &BTreeMap<ViewId, TickInput>) {
    for input in inputs.values() {
        if let Some(direction) = input.move_direction {
            move_player(state, direction);
        }
        if input.shoot {
            shoot_nearest(state);
        }
    }
}

/// Displace the player along `direction` for one tick, clamped to the arena.
pub fn move_player(state: &mut GameState, direction: FixedVec2) {
    let step = fixed_mul(state.player_speed, TICK_DURATION);
    let displacement = direction.scale(step);
    let next = (state.player_position + displacement).clamp_to_arena();
    if next != state.player_position {
        state.player_position = next;
        state.push_event(GameEvent::player_moved(state.tick, next));
    }
}

/// Fire at the nearest enemy's current position. No enemy, no bullet.
///
/// With more than one bullet per shot, the aim lines fan out evenly over
/// π/6 around the direct line, in order from clockwise to counter-clockwise.
pub fn shoot_nearest(state: &mut GameState) {
    let Some(index) = state.nearest_enemy(state.player_position) else {
        return;
    };
    let origin = state.player_position;
    let aim = state.enemies[index].position - origin;

    let count = state.bullet_count.max(1);
    for i in 0..count {
        let target = if count == 1 {
            origin + aim
        } else {
            let (cos, sin) = small_angle_cos_sin(spread_angle(i, count));
            origin + aim.rotate(cos, sin)
        };
        let bullet = state.fire_bullet(target, BULLET_SPEED);
        state.push_event(GameEvent::bullet_fired(state.tick, bullet));
    }
}

/// Angle of bullet `i` of `count` (count >= 2), spanning ±π/12.
fn spread_angle(i: u32, count: u32) -> Fixed {
    let offset = 2 * i64::from(i) - i64::from(count - 1);
    (offset * i64::from(HALF_SHOT_SPREAD) / i64::from(count - 1)) as Fixed
}

fn advance_bullets(state: &mut GameState) {
    for bullet in state.bullets.iter_mut() {
        let step = fixed_mul(bullet.speed, TICK_DURATION);
        bullet.position = bullet.position.approach(bullet.target, step);
        bullet.age_ms = bullet.age_ms.saturating_add(TICK_PERIOD_MS);
    }

    for bullet in state.enemy_bullets.iter_mut() {
        bullet.position = bullet.position + bullet.velocity.scale(TICK_DURATION);
    }
}

fn cull_entities(state: &mut GameState, config: &GameConfig) {
    state
        .enemies
        .retain(|e| !e.position.outside(ARENA_WIDTH, ARENA_HEIGHT, ENEMY_CULL_MARGIN));

    let lifetime = config.bullet_lifetime_ms;
    state.bullets.retain(|b| {
        b.age_ms < lifetime && !b.position.outside(ARENA_WIDTH, ARENA_HEIGHT, BULLET_CULL_MARGIN)
    });

    state
        .enemy_bullets
        .retain(|b| !b.position.outside(ARENA_WIDTH, ARENA_HEIGHT, BULLET_CULL_MARGIN));
}

/// Each bullet hits at most the first enemy it overlaps.
fn resolve_bullet_hits(state: &mut GameState, config: &GameConfig) {
    let mut i = 0;
    while i < state.bullets.len() {
        let point = state.bullets[i].position;
        let Some(j) = first_enemy_hit(point, &state.enemies, BULLET_HIT_RADIUS) else {
            i += 1;
            continue;
        };

        state.bullets.remove(i);
        state.enemies[j].health -= config.bullet_damage;
        if state.enemies[j].health <= 0 {
            let enemy = state.enemies.remove(j);
            award_kill(state, &enemy, config);
        }
    }
}

fn award_kill(state: &mut GameState, enemy: &Enemy, config: &GameConfig) {
    state.kill_count += 1;
    state.push_event(GameEvent::enemy_killed(state.tick, enemy.id, enemy.kind, state.kill_count));

    state.experience += config.experience_per_kill;
    if state.experience >= state.experience_to_next {
        level_up(state, config);
    }
}

/// Apply one level-up. Experience resets, so the triplet invariant holds on return.
pub fn level_up(state: &mut GameState, config: &GameConfig) {
    state.level += 1;
    state.experience = 0;
    state.experience_to_next = state.experience_to_next * config.experience_growth_percent / 100;
    state.max_health += config.level_up_health_bonus;
    state.health = state.max_health;
    state.player_speed += config.level_up_speed_bonus;

    state.push_event(GameEvent::level_up(
        state.tick,
        state.level,
        state.player_speed,
        state.max_health,
    ));

    if config.boss_level_interval > 0 && state.level % config.boss_level_interval == 0 {
        spawn_enemy(state, EnemyKind::Boss, config);
    }

    offer_upgrades(state);
}

/// Touching enemies deal their damage once and are removed.
fn resolve_contacts(state: &mut GameState) {
    let touching = enemies_touching(state.player_position, &state.enemies, CONTACT_RADIUS);
    for enemy in remove_indices(&mut state.enemies, &touching) {
        let dealt = state.damage_player(enemy.contact_damage);
        state.push_event(GameEvent::player_hit(
            state.tick,
            HitSource::Contact,
            dealt,
            state.health,
        ));
    }
}

fn resolve_enemy_bullet_hits(state: &mut GameState) {
    let hits = enemy_bullets_hitting(state.player_position, &state.enemy_bullets, ENEMY_BULLET_HIT_RADIUS);
    for bullet in remove_indices(&mut state.enemy_bullets, &hits) {
        let dealt = state.damage_player(bullet.damage);
        state.push_event(GameEvent::player_hit(
            state.tick,
            HitSource::EnemyBullet,
            dealt,
            state.health,
        ));
    }
}

fn check_game_over(state: &mut GameState, result: &mut TickResult) {
    if state.health > 0 {
        return;
    }
    state.game_active = false;
    let summary = state.summary();
    state.push_event(GameEvent::game_over(state.tick, summary));
    result.game_over = Some(summary);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::{px, FIXED_ONE};
    use crate::game::events::GameEventData;
    use crate::game::input::{check_direction, Direction};
    use crate::game::state::{basic_enemy_at, Bullet};
    use crate::game::upgrade::choose_upgrade;
    use proptest::prelude::*;

    fn active_state(seed: u64) -> GameState {
        let mut state = GameState::new(seed);
        state.game_active = true;
        state.started = true;
        state
    }

    fn one(view: u8, input: TickInput) -> BTreeMap<ViewId, TickInput> {
        let mut inputs = BTreeMap::new();
        inputs.insert(ViewId::new([view; 16]), input);
        inputs
    }

    fn no_inputs() -> BTreeMap<ViewId, TickInput> {
        BTreeMap::new()
    }

    #[test]
    fn test_inactive_tick_is_noop() {
        let mut state = GameState::new(1);
        let before = state.compute_hash();
        let result = tick(&mut state, &one(1, TickInput { move_direction: Some(FixedVec2::new(FIXED_ONE, 0)), shoot: true }), &GameConfig::default());
        assert!(!result.simulated);
        assert!(result.events.is_empty());
        assert_eq!(before, state.compute_hash());
    }

    #[test]
    fn test_game_time_from_ticks() {
        let mut state = active_state(1);
        let config = GameConfig::default();
        for _ in 0..125 {
            tick(&mut state, &no_inputs(), &config);
        }
        assert_eq!(state.tick, 125);
        assert_eq!(state.game_time, 2);
    }

    #[test]
    fn test_move_right() {
        let mut state = active_state(1);
        let input = TickInput { move_direction: Some(FixedVec2::new(FIXED_ONE, 0)), shoot: false };
        tick(&mut state, &one(1, input), &GameConfig::default());
        assert_eq!(state.player_position.x, px(400) + 200 * 1092);
        assert_eq!(state.player_position.y, px(300));
    }

    #[test]
    fn test_move_clamped_to_bounds() {
        let mut state = active_state(1);
        state.player_position = FixedVec2::from_ints(783, 17);
        let input = TickInput { move_direction: Some(FixedVec2::new(FIXED_ONE, -FIXED_ONE)), shoot: false };
        tick(&mut state, &one(1, input), &GameConfig::default());
        assert_eq!(state.player_position, FixedVec2::from_ints(784, 16));
    }

    #[test]
    fn test_shoot_without_enemies_creates_no_bullet() {
        let mut state = active_state(1);
        let result = tick(&mut state, &one(1, TickInput { move_direction: None, shoot: true }), &GameConfig::default());
        assert!(state.bullets.is_empty());
        assert!(!result.events.iter().any(|e| matches!(e.data, GameEventData::BulletFired { .. })));
    }

    #[test]
    fn test_shoot_targets_position_at_fire_time() {
        let mut state = active_state(1);
        state.enemies.push(basic_enemy_at(0, 700, 300));
        state.enemies.push(basic_enemy_at(1, 600, 300));
        tick(&mut state, &one(1, TickInput { move_direction: None, shoot: true }), &GameConfig::default());

        assert_eq!(state.bullets.len(), 1);
        let bullet = state.bullets[0];
        assert_eq!(bullet.target, FixedVec2::from_ints(600, 300));
        // The enemy has already moved on; the bullet does not follow.
        assert_ne!(state.enemies[1].position, bullet.target);
    }

    #[test]
    fn test_enemy_chases_aligned() {
        let mut state = active_state(1);
        state.player_position = FixedVec2::from_ints(500, 300);
        state.enemies.push(basic_enemy_at(0, 500, 0));
        tick(&mut state, &no_inputs(), &GameConfig::default());

        let enemy = &state.enemies[0];
        assert!(enemy.position.y > 0);
        assert_eq!(enemy.position.x, px(500));
    }

    #[test]
    fn test_contact_damage_is_single_use() {
        let mut state = active_state(1);
        state.enemies.push(basic_enemy_at(0, 410, 300));
        let result = tick(&mut state, &no_inputs(), &GameConfig::default());

        assert_eq!(state.health, 90);
        assert!(state.enemies.is_empty());
        assert!(result.events.iter().any(|e| matches!(
            e.data,
            GameEventData::PlayerHit { source: HitSource::Contact, damage: 10, health: 90 }
        )));
    }

    #[test]
    fn test_bullet_hit_kills_and_levels_up() {
        let mut state = active_state(1);
        state.experience = 90;
        state.health = 40;
        state.enemies.push(basic_enemy_at(0, 600, 300));
        state.bullets.push(Bullet {
            id: 0,
            position: FixedVec2::from_ints(600, 300),
            target: FixedVec2::from_ints(600, 300),
            speed: BULLET_SPEED,
            age_ms: 0,
        });

        let result = tick(&mut state, &no_inputs(), &GameConfig::default());

        assert!(state.bullets.is_empty());
        assert!(state.enemies.is_empty());
        assert_eq!(state.kill_count, 1);
        assert_eq!(state.level, 2);
        assert_eq!(state.experience, 0);
        assert_eq!(state.experience_to_next, 120);
        assert_eq!(state.max_health, 120);
        assert_eq!(state.health, state.max_health);
        assert_eq!(state.player_speed, px(225));
        assert!(result.events.iter().any(|e| matches!(e.data, GameEventData::LevelUp { level: 2, .. })));
        assert_eq!(state.upgrade_offer.len(), 3);
    }

    #[test]
    fn test_upgrade_offer_pauses_until_chosen() {
        let config = GameConfig::default();
        let mut state = active_state(1);
        level_up(&mut state, &config);
        let offered = state.upgrade_offer[0];

        let before = state.compute_hash();
        let right = TickInput { move_direction: Some(FixedVec2::new(FIXED_ONE, 0)), shoot: false };
        let result = tick(&mut state, &one(1, right), &config);
        assert!(!result.simulated);
        assert_eq!(before, state.compute_hash());

        assert!(choose_upgrade(&mut state, 2, offered));
        assert!(tick(&mut state, &one(1, right), &config).simulated);
        assert_eq!(state.tick, 1);
    }

    #[test]
    fn test_extra_bullets_fan_around_the_aim() {
        let mut state = active_state(1);
        state.bullet_count = 3;
        state.enemies.push(basic_enemy_at(0, 600, 300));
        tick(&mut state, &one(1, TickInput { move_direction: None, shoot: true }), &GameConfig::default());

        assert_eq!(state.bullets.len(), 3);
        let [low, mid, high] = [state.bullets[0].target, state.bullets[1].target, state.bullets[2].target];
        assert_eq!(mid, FixedVec2::from_ints(600, 300));
        // ±15° off a 200px horizontal aim
        assert!(low.y < px(300) && high.y > px(300));
        assert!((low.y - px(300)).abs() > px(50) && (low.y - px(300)).abs() < px(53));
        assert!((low.y + high.y - px(600)).abs() < px(1));
    }

    #[test]
    fn test_defense_reduces_contact_damage() {
        let mut state = active_state(1);
        state.defense = 2;
        state.enemies.push(basic_enemy_at(0, 410, 300));
        let result = tick(&mut state, &no_inputs(), &GameConfig::default());

        assert_eq!(state.health, 92);
        assert!(result.events.iter().any(|e| matches!(
            e.data,
            GameEventData::PlayerHit { source: HitSource::Contact, damage: 8, health: 92 }
        )));
    }

    #[test]
    fn test_one_bullet_hits_one_enemy() {
        let mut state = active_state(1);
        state.enemies.push(basic_enemy_at(0, 600, 300));
        state.enemies.push(basic_enemy_at(1, 602, 300));
        state.bullets.push(Bullet {
            id: 0,
            position: FixedVec2::from_ints(601, 300),
            target: FixedVec2::from_ints(601, 300),
            speed: BULLET_SPEED,
            age_ms: 0,
        });

        tick(&mut state, &no_inputs(), &GameConfig::default());
        assert_eq!(state.kill_count, 1);
        assert_eq!(state.enemies.len(), 1);
        assert_eq!(state.enemies[0].id, 1);
    }

    #[test]
    fn test_experience_growth_floors() {
        let mut state = active_state(1);
        let config = GameConfig::default();
        for _ in 0..3 {
            level_up(&mut state, &config);
        }
        // 100 -> 120 -> 144 -> 172
        assert_eq!(state.experience_to_next, 172);
        assert_eq!(state.level, 4);
    }

    #[test]
    fn test_boss_joins_on_fifth_level() {
        let mut state = active_state(1);
        let config = GameConfig::default();
        for _ in 0..4 {
            level_up(&mut state, &config);
        }
        assert_eq!(state.level, 5);
        assert_eq!(state.boss_count(), 1);
    }

    #[test]
    fn test_bullet_expires() {
        let mut state = active_state(1);
        state.bullets.push(Bullet {
            id: 0,
            position: FixedVec2::from_ints(100, 100),
            target: FixedVec2::from_ints(100, 100),
            speed: BULLET_SPEED,
            age_ms: 2990,
        });
        tick(&mut state, &no_inputs(), &GameConfig::default());
        assert!(state.bullets.is_empty());
    }

    #[test]
    fn test_offscreen_enemy_culled() {
        let mut state = active_state(1);
        state.enemies.push(basic_enemy_at(0, -150, 300));
        tick(&mut state, &no_inputs(), &GameConfig::default());
        assert!(state.enemies.is_empty());
    }

    #[test]
    fn test_game_over_fires_once() {
        let mut state = active_state(1);
        state.kill_count = 4;
        let config = GameConfig::default();
        let mut game_overs = Vec::new();

        for n in 0..50u32 {
            if state.game_active {
                state.enemies.push(basic_enemy_at(1000 + n, 405, 300));
            }
            let result = tick(&mut state, &no_inputs(), &config);
            game_overs.extend(result.events.into_iter().filter(|e| e.is_game_over()));
        }

        assert!(!state.game_active);
        assert_eq!(state.health, 0);
        assert_eq!(game_overs.len(), 1);
        assert_eq!(
            game_overs[0].data,
            GameEventData::GameOver(GameOverSummary { kill_count: 4, game_time: 0, level: 1 })
        );
    }

    #[test]
    fn test_tick_determinism() {
        let config = GameConfig::default();
        let mut a = active_state(12345);
        let mut b = active_state(12345);

        for t in 0..600u32 {
            let input = TickInput {
                move_direction: Some(if t % 120 < 60 { FixedVec2::new(FIXED_ONE, 0) } else { FixedVec2::new(-FIXED_ONE, 0) }),
                shoot: t % 10 == 0,
            };
            tick(&mut a, &one(1, input), &config);
            tick(&mut b, &one(1, input), &config);
        }

        assert_eq!(a.compute_hash(), b.compute_hash());
        assert!(a.next_enemy_id > 0, "enemies should have spawned");
    }

    fn tick_input(x: i8, y: i8, shoot: bool) -> TickInput {
        let direction = Direction::new(x as f64, y as f64).normalized();
        TickInput {
            move_direction: check_direction(direction, 1e-3).ok(),
            shoot,
        }
    }

    proptest! {
        #[test]
        fn prop_bounds_and_progression_hold(
            seed in any::<u64>(),
            steps in prop::collection::vec((any::<i8>(), any::<i8>(), any::<bool>()), 1..400),
        ) {
            let config = GameConfig::default();
            let mut state = active_state(seed);
            let mut level = state.level;

            for (x, y, shoot) in steps {
                tick(&mut state, &one(1, tick_input(x, y, shoot)), &config);

                prop_assert!(state.health <= state.max_health);
                prop_assert!(state.player_position.is_in_arena());
                prop_assert!(state.experience < state.experience_to_next);
                prop_assert!(state.level >= level);
                level = state.level;
            }
        }
    }
}
