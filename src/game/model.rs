//! The Model
//!
//! Sole owner and mutator of a session's [`GameState`]. Envelopes are
//! queued as they arrive and only take effect at the start of the next
//! [`GameModel::tick`], so a tick always runs to completion against a
//! stable state.
//!
//! Per tick:
//! 1. Apply queued controls (start, restart, upgrade, sync request) in arrival order
//! 2. Pop at most one move and one shot per sender, FIFO
//! 3. Run the simulation tick
//! 4. Turn events into outbound messages, then append the snapshot
//!
//! Each restart closes the running game's input log into an [`EpochRecord`];
//! only the last `retained_epochs` records are kept.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::core::hash::StateHash;
use crate::core::rng::{derive_session_seed, DeterministicRng};
use crate::game::events::GameEventData;
use crate::game::input::{validate_input, Command, PlayerInput, TickInput};
use crate::game::replay::{EpochRecord, EpochStart, InputLog, LoggedTick};
use crate::game::state::{GameState, ViewId};
use crate::game::tick::{tick, GameConfig};
use crate::game::upgrade::{choose_upgrade, is_offered, UpgradeKind};
use crate::network::channel::{Envelope, Message, Origin};

/// Session-level control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Control {
    /// Activate the first game
    Start,
    /// Replace the game and activate it
    Restart,
    /// Publish a snapshot now
    SyncRequest,
    /// Take an offered level-up upgrade
    Upgrade {
        /// Level the offer was made for
        level: u32,
        /// The chosen upgrade
        upgrade: UpgradeKind,
    },
}

/// Apply a control to `state`. Returns true if a snapshot was requested.
///
/// Shared by the live Model and replay so both derive restart seeds the
/// same way.
pub fn apply_control(state: &mut GameState, control: Control, session_id: &[u8; 16], app_id: &str) -> bool {
    match control {
        Control::Start => {
            if !state.started {
                state.started = true;
                state.game_active = true;
            }
            false
        }
        Control::Restart => {
            let seed = derive_session_seed(session_id, app_id, state.epoch + 1);
            *state = state.restarted(seed);
            false
        }
        Control::SyncRequest => true,
        Control::Upgrade { level, upgrade } => {
            choose_upgrade(state, level, upgrade);
            false
        }
    }
}

/// The authoritative simulation for one session.
#[derive(Debug)]
pub struct GameModel {
    state: GameState,
    config: GameConfig,
    session_id: [u8; 16],
    app_id: String,
    inbox: BTreeMap<ViewId, VecDeque<Command>>,
    controls: Vec<Control>,
    log: InputLog,
    finished: VecDeque<EpochRecord>,
}

impl GameModel {
    /// Create a model with a fresh, inactive game.
    pub fn new(session_id: [u8; 16], app_id: impl Into<String>, config: GameConfig) -> Self {
        let app_id = app_id.into();
        let seed = derive_session_seed(&session_id, &app_id, 0);
        Self {
            state: GameState::new(seed),
            config,
            session_id,
            log: InputLog::new(session_id, app_id.clone(), EpochStart::default()),
            app_id,
            inbox: BTreeMap::new(),
            controls: Vec::new(),
            finished: VecDeque::new(),
        }
    }

    /// Read-only view of the canonical state.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Balance config in use.
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Everything applied to the running game, for replay audit.
    pub fn input_log(&self) -> &InputLog {
        &self.log
    }

    /// Records of earlier games, oldest first.
    pub fn finished_epochs(&self) -> impl ExactSizeIterator<Item = &EpochRecord> {
        self.finished.iter()
    }

    /// Close the running game and hand back every retained record, oldest first.
    pub fn into_records(self) -> Vec<EpochRecord> {
        let final_hash = self.state.compute_hash();
        let mut records: Vec<EpochRecord> = self.finished.into_iter().collect();
        records.push(EpochRecord { log: self.log, final_hash });
        records
    }

    /// Commands waiting for `view`.
    pub fn pending_for(&self, view: ViewId) -> usize {
        self.inbox.get(&view).map_or(0, VecDeque::len)
    }

    /// Queue an inbound envelope. Invalid input is dropped without a trace
    /// beyond a debug log.
    pub fn receive(&mut self, envelope: &Envelope) {
        match (&envelope.message, envelope.origin) {
            (Message::PlayerInput { input }, Origin::Player(view)) => {
                self.accept_input(view, input, envelope.received_at_ms);
            }
            (Message::PlayerInput { .. }, origin) => {
                debug!(?origin, "Ignoring input from non-player origin");
            }
            (Message::SyncRequest, _) => self.controls.push(Control::SyncRequest),
            (_, Origin::Observer(view)) => {
                debug!(view = %view.short(), "Ignoring control from observer");
            }
            (Message::GameStart, _) => self.controls.push(Control::Start),
            (Message::GameRestart, _) => {
                // Inputs aimed at the old game never reach the new one.
                self.inbox.clear();
                self.controls.push(Control::Restart);
            }
            (Message::UpgradeChoice { level, upgrade }, Origin::Player(view)) => {
                if is_offered(&self.state, *level, *upgrade) {
                    self.controls.push(Control::Upgrade { level: *level, upgrade: *upgrade });
                } else {
                    debug!(view = %view.short(), level, ?upgrade, "Dropped upgrade that was not offered");
                }
            }
            _ => {}
        }
    }

    fn accept_input(&mut self, view: ViewId, input: &PlayerInput, received_at_ms: u64) {
        let result = validate_input(input, received_at_ms, &self.config.validation);
        let Some(command) = result.command() else {
            debug!(view = %view.short(), ?result, "Dropped input");
            return;
        };

        let queue = self.inbox.entry(view).or_default();
        if queue.len() >= self.config.max_pending_per_view {
            debug!(view = %view.short(), "Input queue full, dropping");
            return;
        }
        queue.push_back(command);
    }

    /// Pop this tick's batch: per sender, commands from the front until a
    /// second move or a second shot would be needed.
    fn take_batch(&mut self) -> BTreeMap<ViewId, TickInput> {
        let mut batch = BTreeMap::new();
        for (view, queue) in self.inbox.iter_mut() {
            let mut input = TickInput::default();
            while let Some(command) = queue.front() {
                match *command {
                    Command::Move { direction } if input.move_direction.is_none() => {
                        input.move_direction = Some(direction);
                    }
                    Command::Shoot if !input.shoot => input.shoot = true,
                    _ => break,
                }
                queue.pop_front();
            }
            if !input.is_empty() {
                batch.insert(*view, input);
            }
        }
        self.inbox.retain(|_, queue| !queue.is_empty());
        batch
    }

    /// Advance one tick and return the messages to publish, in order.
    pub fn tick(&mut self) -> Vec<Message> {
        let controls = std::mem::take(&mut self.controls);
        let controlled = !controls.is_empty();
        let mut sync_requested = false;
        let mut logged = Vec::new();
        for control in controls {
            if control == Control::Restart {
                let final_hash = self.state.compute_hash();
                let closing = std::mem::take(&mut logged);
                let before = self.state.epoch;
                apply_control(&mut self.state, control, &self.session_id, &self.app_id);
                self.close_epoch(closing, final_hash);
                info!(from = before, epoch = self.state.epoch, "Game restarted");
                continue;
            }

            sync_requested |= apply_control(&mut self.state, control, &self.session_id, &self.app_id);
            match control {
                Control::Start => info!("Game started"),
                Control::Upgrade { level, upgrade } => info!(level, ?upgrade, "Upgrade chosen"),
                Control::Restart | Control::SyncRequest => {}
            }
            logged.push(control);
        }

        let simulating = self.state.game_active && !self.state.awaiting_upgrade();
        if !simulating {
            self.inbox.clear();
        }
        let inputs = self.take_batch();

        if simulating || !logged.is_empty() {
            self.log.push(LoggedTick { controls: logged, inputs: inputs.clone() });
        }

        let result = tick(&mut self.state, &inputs, &self.config);

        let mut messages = Vec::new();
        for event in &result.events {
            match &event.data {
                GameEventData::PlayerMoved { position } => {
                    messages.push(Message::PositionUpdate { position: *position });
                }
                GameEventData::BulletFired { bullet } => {
                    messages.push(Message::BulletCreated { bullet: *bullet });
                }
                GameEventData::LevelUp { level, speed, .. } => {
                    info!(level, "Level up");
                    messages.push(Message::LevelUp { level: *level, speed: *speed });
                }
                GameEventData::GameOver(summary) => {
                    info!(kills = summary.kill_count, time = summary.game_time, level = summary.level, "Game over");
                    messages.push(Message::GameOver { summary: *summary });
                }
                _ => {}
            }
        }

        #[cfg(feature = "debug-tracing")]
        if result.simulated {
            tracing::trace!(
                tick = self.state.tick,
                hash = %crate::core::hash::short_hex(&self.state.compute_hash()),
                "Tick"
            );
        }

        if result.simulated || sync_requested || controlled {
            messages.push(Message::StateUpdate { state: self.snapshot() });
        }
        messages
    }

    /// Seal the running log as a finished game and open one for the
    /// game that now begins.
    fn close_epoch(&mut self, closing: Vec<Control>, final_hash: StateHash) {
        let fresh = InputLog::new(self.session_id, self.app_id.clone(), EpochStart::of(&self.state));
        let mut log = std::mem::replace(&mut self.log, fresh);
        log.closing = closing;
        self.finished.push_back(EpochRecord { log, final_hash });

        while self.finished.len() > self.config.retained_epochs {
            if let Some(dropped) = self.finished.pop_front() {
                debug!(epoch = dropped.log.start.epoch, "Dropped oldest game record");
            }
        }
    }

    /// Immutable copy for views, with the RNG scrubbed.
    pub fn snapshot(&self) -> Arc<GameState> {
        let mut snapshot = self.state.clone();
        snapshot.rng_seed = 0;
        snapshot.rng = DeterministicRng::default();
        Arc::new(snapshot)
    }
}
