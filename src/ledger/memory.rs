//! In-process score ledger.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::ledger::{
    validate_score, LedgerError, LedgerEvent, PlayerAddress, ScoreLedger, ScoreRecord,
};
use crate::network::clock::{Clock, SystemClock};

#[derive(Default)]
struct PlayerEntry {
    best: Option<ScoreRecord>,
    history: Vec<ScoreRecord>,
}

/// Ledger kept in memory. Lost on restart.
pub struct MemoryLedger {
    players: RwLock<BTreeMap<PlayerAddress, PlayerEntry>>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for MemoryLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLedger")
            .field("players", &self.total_players())
            .finish()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    /// Empty ledger stamped by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Empty ledger stamped by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            players: RwLock::new(BTreeMap::new()),
            clock,
        }
    }
}

impl ScoreLedger for MemoryLedger {
    fn submit_score(
        &self,
        player: PlayerAddress,
        level: u32,
        kill_count: u32,
        game_time: u32,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        validate_score(level, game_time)?;

        let record = ScoreRecord {
            level,
            kill_count,
            game_time,
            timestamp: self.clock.now_ms() / 1000,
        };

        let mut players = self.players.write().unwrap_or_else(PoisonError::into_inner);
        let entry = players.entry(player).or_default();
        entry.history.push(record);

        let mut events = vec![LedgerEvent::ScoreSubmitted { player, record }];

        let improved = entry.best.map_or(true, |best| record.beats(&best));
        if improved {
            entry.best = Some(record);
            events.push(LedgerEvent::NewHighScore {
                player,
                new_level: level,
                new_kill_count: kill_count,
            });
            info!(%player, level, kill_count, "New high score");
        }

        Ok(events)
    }

    fn player_score(&self, player: &PlayerAddress) -> Option<ScoreRecord> {
        let players = self.players.read().unwrap_or_else(PoisonError::into_inner);
        players.get(player).and_then(|e| e.best)
    }

    fn has_played_before(&self, player: &PlayerAddress) -> bool {
        let players = self.players.read().unwrap_or_else(PoisonError::into_inner);
        players.contains_key(player)
    }

    fn player_history(&self, player: &PlayerAddress) -> Vec<ScoreRecord> {
        let players = self.players.read().unwrap_or_else(PoisonError::into_inner);
        players.get(player).map(|e| e.history.clone()).unwrap_or_default()
    }

    fn total_players(&self) -> usize {
        self.players.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn leaderboard(&self, count: usize) -> Vec<(PlayerAddress, ScoreRecord)> {
        let players = self.players.read().unwrap_or_else(PoisonError::into_inner);
        let mut board: Vec<(PlayerAddress, ScoreRecord)> = players
            .iter()
            .filter_map(|(address, entry)| entry.best.map(|best| (*address, best)))
            .collect();

        // Stable sort keeps address order among equal scores
        board.sort_by(|a, b| b.1.rank_cmp(&a.1));
        board.truncate(count);
        board
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::clock::ManualClock;

    fn address(n: u8) -> PlayerAddress {
        PlayerAddress::new([n; 20])
    }

    fn ledger() -> MemoryLedger {
        MemoryLedger::with_clock(Arc::new(ManualClock::new(1_700_000_000_000)))
    }

    #[test]
    fn test_first_submission() {
        let ledger = ledger();
        let player = address(1);
        assert!(!ledger.has_played_before(&player));

        let events = ledger.submit_score(player, 3, 15, 120).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], LedgerEvent::ScoreSubmitted { record, .. } if record.timestamp == 1_700_000_000));
        assert!(matches!(events[1], LedgerEvent::NewHighScore { new_level: 3, new_kill_count: 15, .. }));

        assert!(ledger.has_played_before(&player));
        assert_eq!(ledger.player_score(&player).unwrap().kill_count, 15);
        assert_eq!(ledger.total_players(), 1);
    }

    #[test]
    fn test_invalid_scores_leave_no_trace() {
        let ledger = ledger();
        assert_eq!(ledger.submit_score(address(1), 0, 5, 10), Err(LedgerError::ZeroLevel));
        assert_eq!(ledger.submit_score(address(1), 2, 5, 0), Err(LedgerError::ZeroGameTime));
        assert!(!ledger.has_played_before(&address(1)));
        assert_eq!(ledger.total_players(), 0);
    }

    #[test]
    fn test_worse_score_keeps_best() {
        let ledger = ledger();
        let player = address(1);
        ledger.submit_score(player, 4, 30, 200).unwrap();

        let events = ledger.submit_score(player, 2, 50, 300).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(ledger.player_score(&player).unwrap().level, 4);

        let history = ledger.player_history(&player);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].level, 2);
        assert_eq!(ledger.total_players(), 1);
    }

    #[test]
    fn test_leaderboard_order() {
        let ledger = ledger();
        ledger.submit_score(address(1), 3, 10, 60).unwrap();
        ledger.submit_score(address(2), 5, 2, 90).unwrap();
        ledger.submit_score(address(3), 3, 12, 30).unwrap();
        ledger.submit_score(address(4), 3, 10, 80).unwrap();

        let board = ledger.leaderboard(10);
        let order: Vec<PlayerAddress> = board.iter().map(|(a, _)| *a).collect();
        assert_eq!(order, vec![address(2), address(3), address(4), address(1)]);

        assert_eq!(ledger.leaderboard(2).len(), 2);
        assert!(ledger.leaderboard(0).is_empty());
    }

    #[test]
    fn test_unknown_player() {
        let ledger = ledger();
        assert!(ledger.player_score(&address(9)).is_none());
        assert!(ledger.player_history(&address(9)).is_empty());
    }
}
