//! Level-up Upgrades
//!
//! A level-up pauses the game and offers three of the four upgrades, drawn
//! from the game's RNG. The game resumes once the player picks one of the
//! offered upgrades for that level. A choice that was not offered, or that
//! names a stale level, changes nothing.

use serde::{Serialize, Deserialize};

use crate::core::fixed::{Fixed, px};
use crate::core::hash::{StateField, StateHasher};
use crate::game::state::GameState;

/// Upgrades offered per level-up
pub const OFFER_SIZE: usize = 3;

/// Speed granted by [`UpgradeKind::Speed`]: 30 px/s
pub const UPGRADE_SPEED_BONUS: Fixed = px(30);

/// Defense granted by [`UpgradeKind::Defense`]
pub const UPGRADE_DEFENSE_BONUS: u32 = 2;

/// One level-up upgrade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum UpgradeKind {
    /// One more bullet per shot
    Bullets = 0,
    /// +30 px/s
    Speed = 1,
    /// Restore half of max health
    Heal = 2,
    /// Each hit deals 2 less damage
    Defense = 3,
}

impl UpgradeKind {
    /// Every upgrade, in draw order before shuffling.
    pub const ALL: [UpgradeKind; 4] = [
        UpgradeKind::Bullets,
        UpgradeKind::Speed,
        UpgradeKind::Heal,
        UpgradeKind::Defense,
    ];
}

impl StateField for UpgradeKind {
    fn feed(&self, hasher: &mut StateHasher) {
        hasher.put(&(*self as u8));
    }
}

/// Draw a fresh offer for the level just reached. Replaces any open offer.
pub fn offer_upgrades(state: &mut GameState) {
    let mut pool = UpgradeKind::ALL;
    state.rng.shuffle(&mut pool);
    state.upgrade_offer = pool[..OFFER_SIZE].to_vec();
}

/// Apply `upgrade` if it is on the open offer for `level`.
///
/// Returns false, leaving the state untouched, otherwise.
pub fn choose_upgrade(state: &mut GameState, level: u32, upgrade: UpgradeKind) -> bool {
    if !is_offered(state, level, upgrade) {
        return false;
    }

    match upgrade {
        UpgradeKind::Bullets => state.bullet_count += 1,
        UpgradeKind::Speed => state.player_speed += UPGRADE_SPEED_BONUS,
        UpgradeKind::Heal => {
            state.health = state
                .health
                .saturating_add(state.max_health / 2)
                .min(state.max_health);
        }
        UpgradeKind::Defense => state.defense += UPGRADE_DEFENSE_BONUS,
    }
    state.upgrade_offer.clear();
    true
}

/// Whether `upgrade` is on the open offer for `level`.
pub fn is_offered(state: &GameState, level: u32, upgrade: UpgradeKind) -> bool {
    state.game_active && state.level == level && state.upgrade_offer.contains(&upgrade)
}
