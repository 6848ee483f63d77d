//! View Adapter
//!
//! Client-side half of a session link. Turns device actions into timestamped
//! inputs and draws whatever the Model last broadcast. Enemies and bullets
//! are never simulated here; only the view's own avatar is smoothed.
//!
//! ## Module Structure
//!
//! - `frame`: Render frames and the renderer interface
//! - `predictor`: Own-avatar prediction

pub mod frame;
pub mod predictor;

use std::sync::Arc;

use tracing::debug;

use crate::game::events::GameOverSummary;
use crate::game::input::{Direction, PlayerInput};
use crate::game::state::{GameState, ViewId};
use crate::game::upgrade::UpgradeKind;
use crate::network::channel::{Envelope, Message};
use crate::network::clock::Clock;
use crate::network::session::{SessionError, ViewLink, ViewRole};

pub use frame::{RenderFrame, Renderer, TraceRenderer};
pub use predictor::AvatarPredictor;

/// A view attached to a session.
pub struct GameView<R: Renderer> {
    link: ViewLink,
    clock: Arc<dyn Clock>,
    renderer: R,
    latest: Option<Arc<GameState>>,
    predictor: AvatarPredictor,
    heading: (f32, f32),
    last_game_over: Option<GameOverSummary>,
}

impl<R: Renderer> GameView<R> {
    /// Wrap a session link. `clock` stamps outgoing inputs.
    pub fn new(link: ViewLink, clock: Arc<dyn Clock>, renderer: R) -> Self {
        Self {
            link,
            clock,
            renderer,
            latest: None,
            predictor: AvatarPredictor::default(),
            heading: (0.0, 0.0),
            last_game_over: None,
        }
    }

    /// Replace the avatar predictor.
    pub fn with_predictor(mut self, predictor: AvatarPredictor) -> Self {
        self.predictor = predictor;
        self
    }

    /// This view's id.
    pub fn view_id(&self) -> ViewId {
        self.link.view_id()
    }

    /// Player or observer.
    pub fn role(&self) -> ViewRole {
        self.link.sender.role()
    }

    /// The renderer.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// The most recent snapshot.
    pub fn latest(&self) -> Option<&GameState> {
        self.latest.as_deref()
    }

    /// Upgrades on offer in the latest snapshot; empty unless paused on a level-up.
    pub fn upgrade_offer(&self) -> &[UpgradeKind] {
        self.latest.as_deref().map_or(&[], |state| state.upgrade_offer.as_slice())
    }

    /// Summary of the last game that ended.
    pub fn last_game_over(&self) -> Option<GameOverSummary> {
        self.last_game_over
    }

    // =========================================================================
    // ACTIONS
    // =========================================================================

    /// Steer. The direction is normalized and stamped now.
    pub fn send_move(&mut self, x: f64, y: f64) -> Result<u64, SessionError> {
        let direction = Direction::new(x, y).normalized();
        let seq = self.link.send(Message::PlayerInput {
            input: PlayerInput::Move { direction, timestamp: self.clock.now_ms() },
        })?;
        self.heading = (direction.x as f32, direction.y as f32);
        Ok(seq)
    }

    /// Fire at the nearest enemy.
    pub fn shoot(&self) -> Result<u64, SessionError> {
        self.link.send(Message::PlayerInput {
            input: PlayerInput::Shoot { timestamp: self.clock.now_ms() },
        })
    }

    /// Pick an upgrade for the level shown in the latest snapshot.
    pub fn choose_upgrade(&self, upgrade: UpgradeKind) -> Result<u64, SessionError> {
        let level = self.latest.as_ref().map_or(0, |state| state.level);
        self.link.send(Message::UpgradeChoice { level, upgrade })
    }

    /// Start the first game.
    pub fn start(&self) -> Result<u64, SessionError> {
        self.link.send(Message::GameStart)
    }

    /// Restart.
    pub fn restart(&self) -> Result<u64, SessionError> {
        self.link.send(Message::GameRestart)
    }

    /// Ask for a fresh snapshot.
    pub fn request_sync(&self) -> Result<u64, SessionError> {
        self.link.send(Message::SyncRequest)
    }

    // =========================================================================
    // UPDATES
    // =========================================================================

    /// Handle everything already delivered. Returns how many envelopes were
    /// consumed; draws once if a newer snapshot arrived.
    pub fn poll(&mut self) -> usize {
        let envelopes = self.link.subscription.drain();
        let mut fresh = false;
        for envelope in &envelopes {
            fresh |= self.apply(envelope);
        }
        if fresh {
            self.draw();
        }
        envelopes.len()
    }

    /// Wait for the next delivery, then handle the backlog.
    /// Returns false once the session is gone.
    pub async fn recv(&mut self) -> bool {
        let Some(envelope) = self.link.subscription.recv().await else {
            return false;
        };
        let mut fresh = self.apply(&envelope);
        for envelope in self.link.subscription.drain() {
            fresh |= self.apply(&envelope);
        }
        if fresh {
            self.draw();
        }
        true
    }

    /// Move the own avatar locally for `dt` seconds and redraw.
    pub fn advance(&mut self, dt: f32) {
        if self.role() != ViewRole::Player {
            return;
        }
        let Some(state) = &self.latest else {
            return;
        };
        if state.game_active && !state.awaiting_upgrade() {
            let speed = RenderFrame::player_speed(state);
            self.predictor.advance(self.heading, speed, dt);
            self.draw();
        }
    }

    /// The frame the renderer would get now.
    pub fn frame(&self) -> Option<RenderFrame> {
        let state = self.latest.as_ref()?;
        let player = match self.role() {
            ViewRole::Player => self.predictor.position(),
            ViewRole::Observer => None,
        }
        .unwrap_or_else(|| state.player_position.to_floats());
        Some(RenderFrame::from_state(state, player))
    }

    fn draw(&mut self) {
        if let Some(frame) = self.frame() {
            self.renderer.render(&frame);
        }
    }

    /// Returns true if the envelope carried a snapshot worth drawing.
    fn apply(&mut self, envelope: &Envelope) -> bool {
        match &envelope.message {
            Message::StateUpdate { state } => {
                if let Some(current) = &self.latest {
                    if (state.epoch, state.tick) < (current.epoch, current.tick) {
                        debug!(view = %self.view_id().short(), tick = state.tick, "Dropping stale snapshot");
                        return false;
                    }
                    if state.epoch != current.epoch {
                        self.predictor.reset();
                    }
                }
                self.predictor.reconcile(state.player_position.to_floats());
                self.latest = Some(state.clone());
                true
            }
            Message::GameOver { summary } => {
                self.last_game_over = Some(*summary);
                self.renderer.game_over(summary);
                false
            }
            Message::LevelUp { level, .. } => {
                self.renderer.level_up(*level);
                false
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::network::auth::AuthConfig;
    use crate::network::channel::Origin;
    use crate::network::clock::ManualClock;
    use crate::network::session::{Credentials, GameSession, SessionConfig};

    const NOW: u64 = 1_700_000_000_000;

    #[derive(Default)]
    struct Recorder {
        frames: Vec<RenderFrame>,
        levels: Vec<u32>,
    }

    impl Renderer for Recorder {
        fn render(&mut self, frame: &RenderFrame) {
            self.frames.push(frame.clone());
        }

        fn level_up(&mut self, level: u32) {
            self.levels.push(level);
        }
    }

    fn session(clock: Arc<ManualClock>) -> GameSession {
        let config = SessionConfig {
            tick_period: Duration::from_millis(2),
            auth: AuthConfig { allow_anonymous: true, ..Default::default() },
            ..Default::default()
        };
        let mut session = GameSession::with_clock("view-test", config, clock);
        session.join(&Credentials::new("guest")).unwrap();
        session
    }

    async fn wait_until<R: Renderer>(view: &mut GameView<R>, pred: impl Fn(&GameState) -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if view.latest().is_some_and(&pred) {
                    return;
                }
                assert!(view.recv().await, "session closed");
            }
        })
        .await
        .expect("timed out waiting for snapshot");
    }

    #[tokio::test]
    async fn test_player_view_moves_avatar() {
        let clock = Arc::new(ManualClock::new(NOW));
        let mut session = session(clock.clone());
        let link = session.attach_view(ViewId::new([1; 16]), ViewRole::Player).unwrap();
        let mut view = GameView::new(link, clock, Recorder::default());

        wait_until(&mut view, |s| !s.game_active).await;
        view.start().unwrap();
        view.send_move(30.0, 0.0).unwrap();

        wait_until(&mut view, |s| s.player_position.to_floats().0 > 400.0).await;
        assert!(!view.renderer().frames.is_empty());

        let before = view.frame().unwrap().player.0;
        view.advance(0.1);
        assert!(view.frame().unwrap().player.0 > before);

        session.teardown().await.unwrap();
        view.poll();
        assert!(!view.recv().await);
    }

    #[tokio::test]
    async fn test_observer_watches_only() {
        let clock = Arc::new(ManualClock::new(NOW));
        let mut session = session(clock.clone());
        let link = session.attach_view(ViewId::new([2; 16]), ViewRole::Observer).unwrap();
        let mut view = GameView::new(link, clock, Recorder::default());

        assert!(matches!(view.send_move(1.0, 0.0), Err(SessionError::ObserverInput)));
        assert!(matches!(view.shoot(), Err(SessionError::ObserverInput)));
        assert!(view.request_sync().is_ok());

        wait_until(&mut view, |_| true).await;
        let frame = view.frame().unwrap();
        assert_eq!(frame.player, frame.authoritative_player);

        session.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_snapshots_dropped() {
        let clock = Arc::new(ManualClock::new(NOW));
        let mut session = session(clock.clone());
        let link = session.attach_view(ViewId::new([3; 16]), ViewRole::Player).unwrap();
        let mut view = GameView::new(link, clock, Recorder::default());
        wait_until(&mut view, |_| true).await;

        let channel = session.channel().unwrap().clone();
        let snapshot = |epoch: u32, tick: u32| {
            let mut state = GameState::new(0);
            state.epoch = epoch;
            state.tick = tick;
            Message::StateUpdate { state: Arc::new(state) }
        };

        channel.publish(Origin::System, snapshot(0, 50)).unwrap();
        channel.publish(Origin::System, snapshot(0, 10)).unwrap();
        channel.publish(Origin::System, Message::LevelUp { level: 2, speed: 0 }).unwrap();
        assert_eq!(view.poll(), 3);
        assert_eq!(view.latest().unwrap().tick, 50);
        assert_eq!(view.renderer().levels, vec![2]);

        // A restart starts a new epoch at a low tick
        channel.publish(Origin::System, snapshot(1, 3)).unwrap();
        view.poll();
        assert_eq!(view.latest().unwrap().epoch, 1);
        assert_eq!(view.latest().unwrap().tick, 3);

        session.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_upgrade_choice_names_offered_level() {
        let clock = Arc::new(ManualClock::new(NOW));
        let mut session = session(clock.clone());
        let link = session.attach_view(ViewId::new([5; 16]), ViewRole::Player).unwrap();
        let mut view = GameView::new(link, clock, Recorder::default());
        assert!(view.upgrade_offer().is_empty());

        let channel = session.channel().unwrap().clone();
        let mut choices = channel.subscribe(Origin::System, &[crate::network::channel::Topic::PlayerUpgrade]).unwrap();

        let mut state = GameState::new(0);
        state.tick = 50;
        state.level = 3;
        state.game_active = true;
        state.upgrade_offer = vec![UpgradeKind::Speed, UpgradeKind::Defense, UpgradeKind::Bullets];
        channel.publish(Origin::System, Message::StateUpdate { state: Arc::new(state) }).unwrap();
        view.poll();
        assert_eq!(view.upgrade_offer()[1], UpgradeKind::Defense);
        assert_eq!(view.frame().unwrap().upgrade_offer.len(), 3);

        // Paused: the avatar holds still
        view.send_move(1.0, 0.0).unwrap();
        let before = view.frame().unwrap().player;
        view.advance(0.5);
        assert_eq!(view.frame().unwrap().player, before);

        view.choose_upgrade(UpgradeKind::Defense).unwrap();
        let envelope = choices.recv().await.unwrap();
        assert!(matches!(
            envelope.message,
            Message::UpgradeChoice { level: 3, upgrade: UpgradeKind::Defense }
        ));

        session.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_move_direction_is_normalized() {
        let clock = Arc::new(ManualClock::new(NOW));
        let mut session = session(clock.clone());
        let link = session.attach_view(ViewId::new([4; 16]), ViewRole::Player).unwrap();

        let channel = session.channel().unwrap().clone();
        let mut inputs = channel.subscribe(Origin::System, &[crate::network::channel::Topic::PlayerInput]).unwrap();

        let mut view = GameView::new(link, clock, Recorder::default());
        view.send_move(3.0, 4.0).unwrap();

        let envelope = inputs.recv().await.unwrap();
        match &envelope.message {
            Message::PlayerInput { input: PlayerInput::Move { direction, timestamp } } => {
                assert!((direction.x - 0.6).abs() < 1e-9);
                assert!((direction.y - 0.8).abs() < 1e-9);
                assert_eq!(*timestamp, NOW);
            }
            other => panic!("Unexpected message: {:?}", other),
        }

        session.teardown().await.unwrap();
    }
}
