//! Score Ledger
//!
//! Persistent record of finished games per player address. The ledger only
//! ever sees Model-produced summaries; views cannot submit scores.
//!
//! ## Module Structure
//!
//! - `memory`: In-process ledger
//! - `forwarder`: Submits game-over summaries from a session channel

pub mod memory;
pub mod forwarder;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};
use thiserror::Error;

pub use memory::MemoryLedger;
pub use forwarder::ScoreForwarder;

// =============================================================================
// ADDRESSES
// =============================================================================

/// A 20-byte account address, written as `0x` followed by 40 hex digits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlayerAddress([u8; 20]);

impl PlayerAddress {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for PlayerAddress {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| LedgerError::InvalidAddress(s.to_string()))?;

        let bytes = hex::decode(digits).map_err(|_| LedgerError::InvalidAddress(s.to_string()))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| LedgerError::InvalidAddress(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for PlayerAddress {
    type Error = LedgerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PlayerAddress> for String {
    fn from(address: PlayerAddress) -> Self {
        address.to_string()
    }
}

impl fmt::Display for PlayerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PlayerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlayerAddress({})", self)
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// One finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Level reached
    pub level: u32,
    /// Enemies killed
    pub kill_count: u32,
    /// Seconds survived
    pub game_time: u32,
    /// Submission time (Unix seconds)
    pub timestamp: u64,
}

impl ScoreRecord {
    /// Ranking order: level, then kills, then survival time. Submission time
    /// does not take part.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        (self.level, self.kill_count, self.game_time).cmp(&(other.level, other.kill_count, other.game_time))
    }

    /// True if this record ranks strictly above `other`.
    pub fn beats(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Greater
    }
}

/// Emitted by a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Every accepted score.
    ScoreSubmitted {
        /// Submitting player
        player: PlayerAddress,
        /// The stored record
        record: ScoreRecord,
    },
    /// The player's best score improved.
    NewHighScore {
        /// Submitting player
        player: PlayerAddress,
        /// New best level
        new_level: u32,
        /// New best kill count
        new_kill_count: u32,
    },
}

/// Ledger errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Level must be positive.
    #[error("Level must be greater than zero")]
    ZeroLevel,

    /// Game time must be positive.
    #[error("Game time must be greater than zero")]
    ZeroGameTime,

    /// Malformed address.
    #[error("Invalid player address: {0}")]
    InvalidAddress(String),
}

// =============================================================================
// LEDGER INTERFACE
// =============================================================================

/// Where finished games are recorded.
pub trait ScoreLedger: Send + Sync {
    /// Record a finished game. Rejects `level == 0` and `game_time == 0`.
    fn submit_score(
        &self,
        player: PlayerAddress,
        level: u32,
        kill_count: u32,
        game_time: u32,
    ) -> Result<Vec<LedgerEvent>, LedgerError>;

    /// The player's best record.
    fn player_score(&self, player: &PlayerAddress) -> Option<ScoreRecord>;

    /// True once the player has submitted at least one score.
    fn has_played_before(&self, player: &PlayerAddress) -> bool;

    /// Every record of the player, oldest first.
    fn player_history(&self, player: &PlayerAddress) -> Vec<ScoreRecord>;

    /// Number of distinct players.
    fn total_players(&self) -> usize;

    /// Up to `count` players with their best record, best first.
    fn leaderboard(&self, count: usize) -> Vec<(PlayerAddress, ScoreRecord)>;
}

/// Shared submission check.
pub fn validate_score(level: u32, game_time: u32) -> Result<(), LedgerError> {
    if level == 0 {
        return Err(LedgerError::ZeroLevel);
    }
    if game_time == 0 {
        return Err(LedgerError::ZeroGameTime);
    }
    Ok(())
}
