//! Game Events
//!
//! Events generated during a tick. The Model turns the ones views care
//! about into channel messages; the rest exist for logs and replay audits.

use serde::{Serialize, Deserialize};

use crate::core::fixed::Fixed;
use crate::core::vec2::FixedVec2;
use crate::game::state::{Bullet, EnemyKind};

/// Final numbers of a finished game, as forwarded to the score ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOverSummary {
    /// Enemies killed
    pub kill_count: u32,
    /// Seconds survived
    pub game_time: u32,
    /// Level reached
    pub level: u32,
}

/// What hurt the player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitSource {
    /// Touched by an enemy
    Contact,
    /// Struck by an enemy bullet
    EnemyBullet,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameEventData {
    /// First game of the session began
    GameStarted,

    /// State was replaced by a fresh game
    GameRestarted {
        epoch: u32,
    },

    /// Player position changed this tick
    PlayerMoved {
        position: FixedVec2,
    },

    /// Player fired
    BulletFired {
        bullet: Bullet,
    },

    /// Enemy entered the arena
    EnemySpawned {
        enemy_id: u32,
        kind: EnemyKind,
        position: FixedVec2,
    },

    /// Enemy died to a player bullet
    EnemyKilled {
        enemy_id: u32,
        kind: EnemyKind,
        kill_count: u32,
    },

    /// Player lost health
    PlayerHit {
        source: HitSource,
        damage: u32,
        health: u32,
    },

    /// Player levelled up
    LevelUp {
        level: u32,
        speed: Fixed,
        max_health: u32,
    },

    /// Health reached zero
    GameOver(GameOverSummary),
}

/// A game event stamped with the tick it happened on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick when event occurred
    pub tick: u32,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(tick: u32, data: GameEventData) -> Self {
        Self { tick, data }
    }

    /// Create a player moved event.
    pub fn player_moved(tick: u32, position: FixedVec2) -> Self {
        Self::new(tick, GameEventData::PlayerMoved { position })
    }

    /// Create a bullet fired event.
    pub fn bullet_fired(tick: u32, bullet: Bullet) -> Self {
        Self::new(tick, GameEventData::BulletFired { bullet })
    }

    /// Create an enemy spawned event.
    pub fn enemy_spawned(tick: u32, enemy_id: u32, kind: EnemyKind, position: FixedVec2) -> Self {
        Self::new(tick, GameEventData::EnemySpawned { enemy_id, kind, position })
    }

    /// Create an enemy killed event.
    pub fn enemy_killed(tick: u32, enemy_id: u32, kind: EnemyKind, kill_count: u32) -> Self {
        Self::new(tick, GameEventData::EnemyKilled { enemy_id, kind, kill_count })
    }

    /// Create a player hit event.
    pub fn player_hit(tick: u32, source: HitSource, damage: u32, health: u32) -> Self {
        Self::new(tick, GameEventData::PlayerHit { source, damage, health })
    }

    /// Create a level up event.
    pub fn level_up(tick: u32, level: u32, speed: Fixed, max_health: u32) -> Self {
        Self::new(tick, GameEventData::LevelUp { level, speed, max_health })
    }

    /// Create a game over event.
    pub fn game_over(tick: u32, summary: GameOverSummary) -> Self {
        Self::new(tick, GameEventData::GameOver(summary))
    }

    /// True for the terminal event.
    pub fn is_game_over(&self) -> bool {
        matches!(self.data, GameEventData::GameOver(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_stamp_tick() {
        let e = GameEvent::level_up(42, 2, 225 << 16, 120);
        assert_eq!(e.tick, 42);
        assert!(matches!(e.data, GameEventData::LevelUp { level: 2, max_health: 120, .. }));
    }

    #[test]
    fn test_game_over_detection() {
        let summary = GameOverSummary { kill_count: 3, game_time: 12, level: 1 };
        assert!(GameEvent::game_over(9, summary).is_game_over());
        assert!(!GameEvent::player_hit(9, HitSource::Contact, 10, 0).is_game_over());
    }

    #[test]
    fn test_summary_serializes_flat() {
        let summary = GameOverSummary { kill_count: 3, game_time: 12, level: 1 };
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["kill_count"], 3);
        assert_eq!(json["game_time"], 12);
        assert_eq!(json["level"], 1);
    }
}
