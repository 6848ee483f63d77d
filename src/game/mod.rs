//! Game Logic Module
//!
//! All game simulation code. 100% deterministic.
//!
//! ## Module Structure
//!
//! - `input`: Wire inputs and the validator
//! - `state`: Game state and entities
//! - `tick`: Authoritative simulation step
//! - `behavior`: Per-kind enemy logic
//! - `spawn`: Enemy spawn policy
//! - `collision`: Collision detection
//! - `upgrade`: Level-up upgrade offers and choices
//! - `events`: Game events
//! - `model`: The Model (inbox, controls, snapshots)
//! - `replay`: Input log and replay audit

pub mod input;
pub mod state;
pub mod tick;
pub mod behavior;
pub mod spawn;
pub mod collision;
pub mod upgrade;
pub mod events;
pub mod model;
pub mod replay;

// Re-export key types
pub use input::{Command, Direction, PlayerInput, TickInput, ValidationConfig, ValidationResult};
pub use state::{Bullet, Enemy, EnemyBullet, EnemyKind, GameState, ViewId};
pub use tick::{GameConfig, TickResult};
pub use events::{GameEvent, GameOverSummary};
pub use model::{Control, GameModel};
pub use replay::{replay, EpochRecord, InputLog};
pub use upgrade::UpgradeKind;
