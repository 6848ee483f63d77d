//! Collision Detection
//!
//! Circle-vs-point tests in squared `i64` distance. Detection only: the
//! tick decides what a hit does.

use crate::core::fixed::Fixed;
use crate::core::vec2::FixedVec2;
use crate::game::state::{Enemy, EnemyBullet};

/// First enemy (in spawn order) strictly within `radius` of `point`.
#[inline]
pub fn first_enemy_hit(point: FixedVec2, enemies: &[Enemy], radius: Fixed) -> Option<usize> {
    enemies.iter().position(|enemy| point.within(enemy.position, radius))
}

/// Indices of every enemy touching the player, ascending.
pub fn enemies_touching(player: FixedVec2, enemies: &[Enemy], radius: Fixed) -> Vec<usize> {
    enemies
        .iter()
        .enumerate()
        .filter(|(_, enemy)| player.within(enemy.position, radius))
        .map(|(index, _)| index)
        .collect()
}

/// Indices of every enemy bullet striking the player, ascending.
pub fn enemy_bullets_hitting(player: FixedVec2, bullets: &[EnemyBullet], radius: Fixed) -> Vec<usize> {
    bullets
        .iter()
        .enumerate()
        .filter(|(_, bullet)| player.within(bullet.position, radius))
        .map(|(index, _)| index)
        .collect()
}

/// Remove the given ascending indices from a vector, keeping the order of the rest.
pub fn remove_indices<T>(items: &mut Vec<T>, indices: &[usize]) -> Vec<T> {
    let mut removed = Vec::with_capacity(indices.len());
    for &index in indices.iter().rev() {
        removed.push(items.remove(index));
    }
    removed.reverse();
    removed
}
