//! Replay Audit
//!
//! The Model records every control and every validated per-tick batch, one
//! log per game. A restart closes the running log together with the hash of
//! the state it ended on. Feeding a log back through the same tick function
//! must land on that hash; a mismatch means the live run was tampered with
//! or the simulation is not deterministic.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::core::hash::{HashDomain, StateField, StateHash, StateHasher};
use crate::core::rng::derive_session_seed;
use crate::game::input::TickInput;
use crate::game::model::{apply_control, Control};
use crate::game::state::{GameState, ViewId};
use crate::game::tick::{tick, GameConfig};

/// One recorded Model tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedTick {
    /// Controls applied before the simulation step, in arrival order
    pub controls: Vec<Control>,
    /// The batch handed to the simulation
    pub inputs: BTreeMap<ViewId, TickInput>,
}

/// Where a game began: its epoch and the id counters it inherited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochStart {
    /// Restarts before this game
    pub epoch: u32,
    /// Enemy id counter at the start
    pub next_enemy_id: u32,
    /// Bullet id counter at the start
    pub next_bullet_id: u32,
}

impl EpochStart {
    /// Header for a game that begins in `state`.
    pub fn of(state: &GameState) -> Self {
        Self {
            epoch: state.epoch,
            next_enemy_id: state.next_enemy_id,
            next_bullet_id: state.next_bullet_id,
        }
    }
}

/// Everything needed to rebuild one game of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputLog {
    /// Session id (seed derivation)
    pub session_id: [u8; 16],
    /// App id (seed derivation)
    pub app_id: String,
    /// Starting point of the game
    pub start: EpochStart,
    /// Recorded ticks; idle and paused ticks are omitted
    pub ticks: Vec<LoggedTick>,
    /// Controls applied in the tick that ended the game, ahead of the restart
    pub closing: Vec<Control>,
}

impl InputLog {
    /// Empty log for a game beginning at `start`.
    pub fn new(session_id: [u8; 16], app_id: impl Into<String>, start: EpochStart) -> Self {
        Self {
            session_id,
            app_id: app_id.into(),
            start,
            ticks: Vec::new(),
            closing: Vec::new(),
        }
    }

    /// Append a tick.
    pub fn push(&mut self, tick: LoggedTick) {
        self.ticks.push(tick);
    }

    /// Encode with bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decode from bincode.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Digest of the whole log.
    pub fn compute_hash(&self) -> StateHash {
        let mut hasher = StateHasher::new(HashDomain::InputLog);
        hasher
            .put(&self.session_id)
            .put(self.app_id.as_str())
            .put(&self.start.epoch)
            .put(&self.start.next_enemy_id)
            .put(&self.start.next_bullet_id)
            .put(&self.ticks)
            .put(&self.closing);
        hasher.finalize()
    }
}

impl StateField for Control {
    fn feed(&self, hasher: &mut StateHasher) {
        match *self {
            Control::Start => hasher.put(&0u8),
            Control::Restart => hasher.put(&1u8),
            Control::SyncRequest => hasher.put(&2u8),
            Control::Upgrade { level, upgrade } => hasher.put(&3u8).put(&level).put(&upgrade),
        };
    }
}

impl StateField for LoggedTick {
    fn feed(&self, hasher: &mut StateHasher) {
        hasher.put(&self.controls).put(&(self.inputs.len() as u32));
        for (view, input) in &self.inputs {
            hasher
                .put(view.as_bytes())
                .put(&input.move_direction)
                .put(&input.shoot);
        }
    }
}

/// A finished game: its log and the hash of the state it ended on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// The game's inputs
    pub log: InputLog,
    /// Hash of the final state
    pub final_hash: StateHash,
}

impl EpochRecord {
    /// Replay the log and check it lands on `final_hash`.
    pub fn verify(&self, config: &GameConfig) -> bool {
        verify_replay(&self.log, config, &self.final_hash)
    }
}

/// The state a logged game begins in.
///
/// The first game waits for a start; later ones are restarts and begin
/// active.
pub fn initial_state(log: &InputLog) -> GameState {
    let seed = derive_session_seed(&log.session_id, &log.app_id, log.start.epoch);
    let mut state = GameState::new(seed);
    if log.start.epoch > 0 {
        state.epoch = log.start.epoch;
        state.next_enemy_id = log.start.next_enemy_id;
        state.next_bullet_id = log.start.next_bullet_id;
        state.started = true;
        state.game_active = true;
    }
    state
}

/// Rebuild the final state from a log.
pub fn replay(log: &InputLog, config: &GameConfig) -> GameState {
    let mut state = initial_state(log);

    for logged in &log.ticks {
        for &control in &logged.controls {
            apply_control(&mut state, control, &log.session_id, &log.app_id);
        }
        tick(&mut state, &logged.inputs, config);
        state.take_events();
    }
    for &control in &log.closing {
        apply_control(&mut state, control, &log.session_id, &log.app_id);
    }

    state
}

/// Replay `log` and compare against a claimed final hash.
pub fn verify_replay(log: &InputLog, config: &GameConfig, claimed: &StateHash) -> bool {
    replay(log, config).compute_hash() == *claimed
}
