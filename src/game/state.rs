//! Game State Definitions
//!
//! The canonical state owned by the Model. Collections are `Vec`s kept in
//! insertion order; ids come from monotonic counters and are never reused,
//! not even across restarts.

use serde::{Serialize, Deserialize};

use crate::core::fixed::{
    Fixed, px,
    PLAYER_BASE_SPEED, PLAYER_START_X, PLAYER_START_Y,
};
use crate::core::vec2::FixedVec2;
use crate::core::rng::DeterministicRng;
use crate::core::hash::{HashDomain, StateField, StateHash, StateHasher};
use crate::game::events::{GameEvent, GameOverSummary};
use crate::game::upgrade::UpgradeKind;

/// Starting health and max health
pub const STARTING_HEALTH: u32 = 100;

/// Experience needed for the first level-up
pub const STARTING_EXPERIENCE_TO_NEXT: u32 = 100;

// =============================================================================
// VIEW ID
// =============================================================================

/// Unique view identifier (UUID as bytes).
///
/// Implements Ord so pending inputs can be applied in a fixed sender order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Default)]
pub struct ViewId(pub [u8; 16]);

impl ViewId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Fresh random id.
    pub fn generate() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Short hex prefix for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

// =============================================================================
// ENTITIES
// =============================================================================

/// Enemy behaviour tag. Tick and collision logic dispatch on this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EnemyKind {
    /// Chases the player
    Basic = 0,
    /// Chases and fires single aimed shots in range
    Shooter = 1,
    /// Slow, tough, fires fans and bursts
    Boss = 2,
}

/// An enemy in the arena.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enemy {
    /// Session-unique id
    pub id: u32,
    /// Behaviour
    pub kind: EnemyKind,
    /// Position
    pub position: FixedVec2,
    /// Current health; the enemy is removed as soon as this drops to zero or below
    pub health: i32,
    /// Health at spawn
    pub max_health: i32,
    /// Chase speed (px/s)
    pub speed: Fixed,
    /// Damage dealt on contact
    pub contact_damage: u32,
    /// Ms until the next aimed shot (shooter, boss)
    pub fire_cooldown_ms: u32,
    /// Ms until the next burst roll (boss)
    pub burst_cooldown_ms: u32,
}

/// A player bullet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bullet {
    /// Session-unique id
    pub id: u32,
    /// Position
    pub position: FixedVec2,
    /// Where the target enemy stood when this was fired
    pub target: FixedVec2,
    /// Speed (px/s)
    pub speed: Fixed,
    /// Ms since fired
    pub age_ms: u32,
}

/// A bullet fired by an enemy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnemyBullet {
    /// Session-unique id (shares the bullet counter)
    pub id: u32,
    /// Position
    pub position: FixedVec2,
    /// Velocity (px/s per axis)
    pub velocity: FixedVec2,
    /// Damage dealt on hit
    pub damage: u32,
}

// =============================================================================
// GAME STATE
// =============================================================================

/// Complete state of one game.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameState {
    /// Number of restarts before this game
    pub epoch: u32,

    /// Active ticks simulated in this game
    pub tick: u32,

    /// Whole seconds of game time, derived from `tick`
    pub game_time: u32,

    /// Player level (starts at 1)
    pub level: u32,

    /// Experience toward the next level; always below `experience_to_next`
    pub experience: u32,

    /// Experience needed to level up
    pub experience_to_next: u32,

    /// Player health, never above `max_health`
    pub health: u32,

    /// Player max health
    pub max_health: u32,

    /// Player speed (px/s)
    pub player_speed: Fixed,

    /// Player position, always inside the walkable area
    pub player_position: FixedVec2,

    /// Enemies killed
    pub kill_count: u32,

    /// Bullets per shot, spread over π/6
    pub bullet_count: u32,

    /// Damage shaved off each hit on the player
    pub defense: u32,

    /// Upgrades offered at the last level-up; the game is paused while set
    pub upgrade_offer: Vec<UpgradeKind>,

    /// Enemies in spawn order
    pub enemies: Vec<Enemy>,

    /// Player bullets in fire order
    pub bullets: Vec<Bullet>,

    /// Enemy bullets in fire order
    pub enemy_bullets: Vec<EnemyBullet>,

    /// False before start and after game over
    pub game_active: bool,

    /// Set once the first start/restart has been applied
    pub started: bool,

    /// RNG seed. Never sent to views.
    #[serde(skip)]
    pub rng_seed: u64,

    /// Deterministic RNG state
    #[serde(skip)]
    pub rng: DeterministicRng,

    /// Spawn accumulator (ms)
    pub spawn_timer_ms: u32,

    /// Next enemy id (monotonic counter)
    pub next_enemy_id: u32,

    /// Next bullet id (monotonic counter)
    pub next_bullet_id: u32,

    /// Events generated this tick (cleared each tick)
    #[serde(skip)]
    pub pending_events: Vec<GameEvent>,
}

impl GameState {
    /// Create a fresh, inactive game.
    pub fn new(rng_seed: u64) -> Self {
        Self {
            epoch: 0,
            tick: 0,
            game_time: 0,
            level: 1,
            experience: 0,
            experience_to_next: STARTING_EXPERIENCE_TO_NEXT,
            health: STARTING_HEALTH,
            max_health: STARTING_HEALTH,
            player_speed: PLAYER_BASE_SPEED,
            player_position: FixedVec2::new(PLAYER_START_X, PLAYER_START_Y),
            kill_count: 0,
            bullet_count: 1,
            defense: 0,
            upgrade_offer: Vec::new(),
            enemies: Vec::new(),
            bullets: Vec::new(),
            enemy_bullets: Vec::new(),
            game_active: false,
            started: false,
            rng_seed,
            rng: DeterministicRng::new(rng_seed),
            spawn_timer_ms: 0,
            next_enemy_id: 0,
            next_bullet_id: 0,
            pending_events: Vec::new(),
        }
    }

    /// Build the replacement state for a restart.
    ///
    /// Everything resets except the id counters, so ids stay unique for
    /// the whole session.
    pub fn restarted(&self, rng_seed: u64) -> Self {
        let mut next = Self::new(rng_seed);
        next.epoch = self.epoch + 1;
        next.next_enemy_id = self.next_enemy_id;
        next.next_bullet_id = self.next_bullet_id;
        next.started = true;
        next.game_active = true;
        next
    }

    /// Allocate an enemy id.
    pub fn allocate_enemy_id(&mut self) -> u32 {
        let id = self.next_enemy_id;
        self.next_enemy_id += 1;
        id
    }

    /// Allocate a bullet id (player and enemy bullets share the counter).
    pub fn allocate_bullet_id(&mut self) -> u32 {
        let id = self.next_bullet_id;
        self.next_bullet_id += 1;
        id
    }

    /// Fire a player bullet from the current position toward `target`.
    pub fn fire_bullet(&mut self, target: FixedVec2, speed: Fixed) -> Bullet {
        let bullet = Bullet {
            id: self.allocate_bullet_id(),
            position: self.player_position,
            target,
            speed,
            age_ms: 0,
        };
        self.bullets.push(bullet);
        bullet
    }

    /// Fire an enemy bullet.
    pub fn fire_enemy_bullet(&mut self, position: FixedVec2, velocity: FixedVec2, damage: u32) {
        let bullet = EnemyBullet {
            id: self.allocate_bullet_id(),
            position,
            velocity,
            damage,
        };
        self.enemy_bullets.push(bullet);
    }

    /// Apply a hit to the player, flooring health at zero.
    ///
    /// Defense reduces each hit but never below 1. Returns the damage dealt.
    pub fn damage_player(&mut self, damage: u32) -> u32 {
        let dealt = if damage == 0 { 0 } else { damage.saturating_sub(self.defense).max(1) };
        self.health = self.health.saturating_sub(dealt);
        dealt
    }

    /// True while a level-up offer is waiting for the player's choice.
    pub fn awaiting_upgrade(&self) -> bool {
        !self.upgrade_offer.is_empty()
    }

    /// Index of the nearest enemy; ties go to the earliest in spawn order.
    pub fn nearest_enemy(&self, from: FixedVec2) -> Option<usize> {
        let mut best: Option<(usize, i64)> = None;
        for (index, enemy) in self.enemies.iter().enumerate() {
            let d = from.distance_squared(enemy.position);
            match best {
                Some((_, best_d)) if d >= best_d => {}
                _ => best = Some((index, d)),
            }
        }
        best.map(|(index, _)| index)
    }

    /// Summary for the game-over broadcast.
    pub fn summary(&self) -> GameOverSummary {
        GameOverSummary {
            kill_count: self.kill_count,
            game_time: self.game_time,
            level: self.level,
        }
    }

    /// Number of boss enemies alive.
    pub fn boss_count(&self) -> usize {
        self.enemies.iter().filter(|e| e.kind == EnemyKind::Boss).count()
    }

    /// Compute hash of current state for verification.
    pub fn compute_hash(&self) -> StateHash {
        let [s0, s1] = self.rng.words();
        let mut hasher = StateHasher::new(HashDomain::GameState);
        hasher
            .put(&self.epoch)
            .put(&self.tick)
            .put(&self.rng_seed)
            .put(&s0)
            .put(&s1)
            .put(&self.level)
            .put(&self.experience)
            .put(&self.experience_to_next)
            .put(&self.health)
            .put(&self.max_health)
            .put(&self.player_speed)
            .put(&self.player_position)
            .put(&self.kill_count)
            .put(&self.bullet_count)
            .put(&self.defense)
            .put(&self.upgrade_offer)
            .put(&self.game_active)
            .put(&self.spawn_timer_ms)
            .put(&self.next_enemy_id)
            .put(&self.next_bullet_id)
            .put(&self.enemies)
            .put(&self.bullets)
            .put(&self.enemy_bullets);
        hasher.finalize()
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Push a game event.
    pub fn push_event(&mut self, event: GameEvent) {
        self.pending_events.push(event);
    }
}

impl StateField for Enemy {
    fn feed(&self, hasher: &mut StateHasher) {
        hasher
            .put(&self.id)
            .put(&(self.kind as u8))
            .put(&self.position)
            .put(&self.health)
            .put(&self.max_health)
            .put(&self.speed)
            .put(&self.contact_damage)
            .put(&self.fire_cooldown_ms)
            .put(&self.burst_cooldown_ms);
    }
}

impl StateField for Bullet {
    fn feed(&self, hasher: &mut StateHasher) {
        hasher
            .put(&self.id)
            .put(&self.position)
            .put(&self.target)
            .put(&self.speed)
            .put(&self.age_ms);
    }
}

impl StateField for EnemyBullet {
    fn feed(&self, hasher: &mut StateHasher) {
        hasher
            .put(&self.id)
            .put(&self.position)
            .put(&self.velocity)
            .put(&self.damage);
    }
}

/// Convenience for tests and tools: a basic enemy at a pixel position.
pub fn basic_enemy_at(id: u32, x: i32, y: i32) -> Enemy {
    Enemy {
        id,
        kind: EnemyKind::Basic,
        position: FixedVec2::from_ints(x, y),
        health: 25,
        max_health: 25,
        speed: px(50),
        contact_damage: 10,
        fire_cooldown_ms: 0,
        burst_cooldown_ms: 0,
    }
}

// =============================================================================
// TESTS
// =============================================================================
