//! Publish/Subscribe Channel
//!
//! Connects the Model and its Views. Every message is a variant of the
//! closed [`Message`] type and is addressed by its `(scope, event)`
//! [`Topic`]. The channel holds no game state.
//!
//! ## Delivery
//!
//! - All publishes go through one registry lock and get a sequence number,
//!   so each publisher's messages reach each subscriber in publish order.
//! - Delivery is into an unbounded queue per subscription; publishing never
//!   blocks on a slow reader.
//! - There is no replay buffer. A subscription only sees messages published
//!   after it was registered.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::fixed::Fixed;
use crate::core::vec2::FixedVec2;
use crate::game::events::GameOverSummary;
use crate::game::input::PlayerInput;
use crate::game::state::{Bullet, GameState, ViewId};
use crate::game::upgrade::UpgradeKind;
use crate::network::clock::{Clock, SystemClock};

/// Envelope schema version.
pub const PROTOCOL_VERSION: u16 = 1;

// =============================================================================
// TOPICS
// =============================================================================

/// A `(scope, event)` address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// ("game", "start")
    GameStart,
    /// ("game", "restart")
    GameRestart,
    /// ("game", "sync-request")
    GameSyncRequest,
    /// ("player", "input")
    PlayerInput,
    /// ("player", "upgrade")
    PlayerUpgrade,
    /// ("game", "state-update")
    GameStateUpdate,
    /// ("game", "over")
    GameOver,
    /// ("player", "level-up")
    PlayerLevelUp,
    /// ("player", "position-update")
    PlayerPositionUpdate,
    /// ("bullet", "created")
    BulletCreated,
}

impl Topic {
    /// Every topic.
    pub const ALL: [Topic; 10] = [
        Topic::GameStart,
        Topic::GameRestart,
        Topic::GameSyncRequest,
        Topic::PlayerInput,
        Topic::PlayerUpgrade,
        Topic::GameStateUpdate,
        Topic::GameOver,
        Topic::PlayerLevelUp,
        Topic::PlayerPositionUpdate,
        Topic::BulletCreated,
    ];

    /// Topics the Model consumes.
    pub const MODEL_INBOUND: [Topic; 5] = [
        Topic::GameStart,
        Topic::GameRestart,
        Topic::GameSyncRequest,
        Topic::PlayerInput,
        Topic::PlayerUpgrade,
    ];

    /// Topics the Model publishes.
    pub const MODEL_OUTBOUND: [Topic; 5] = [
        Topic::GameStateUpdate,
        Topic::GameOver,
        Topic::PlayerLevelUp,
        Topic::PlayerPositionUpdate,
        Topic::BulletCreated,
    ];

    /// The `(scope, event)` pair.
    pub const fn as_pair(self) -> (&'static str, &'static str) {
        match self {
            Topic::GameStart => ("game", "start"),
            Topic::GameRestart => ("game", "restart"),
            Topic::GameSyncRequest => ("game", "sync-request"),
            Topic::PlayerInput => ("player", "input"),
            Topic::PlayerUpgrade => ("player", "upgrade"),
            Topic::GameStateUpdate => ("game", "state-update"),
            Topic::GameOver => ("game", "over"),
            Topic::PlayerLevelUp => ("player", "level-up"),
            Topic::PlayerPositionUpdate => ("player", "position-update"),
            Topic::BulletCreated => ("bullet", "created"),
        }
    }

    /// Look a topic up by its pair.
    pub fn from_pair(scope: &str, event: &str) -> Option<Topic> {
        Topic::ALL.into_iter().find(|t| t.as_pair() == (scope, event))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (scope, event) = self.as_pair();
        write!(f, "{}/{}", scope, event)
    }
}

// =============================================================================
// MESSAGES
// =============================================================================

/// Every message that can travel over a channel, one variant per topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Activate the first game.
    GameStart,
    /// Replace the game wholesale and activate it.
    GameRestart,
    /// Ask for an immediate snapshot.
    SyncRequest,
    /// A player action.
    PlayerInput {
        /// Unvalidated input
        input: PlayerInput,
    },
    /// The player's pick from a level-up offer.
    UpgradeChoice {
        /// Level the offer was made for
        level: u32,
        /// Chosen upgrade
        upgrade: UpgradeKind,
    },
    /// Full snapshot at a tick boundary.
    StateUpdate {
        /// Immutable snapshot shared by every receiver
        state: Arc<GameState>,
    },
    /// The game ended.
    GameOver {
        /// Final numbers
        summary: GameOverSummary,
    },
    /// The player levelled up.
    LevelUp {
        /// New level
        level: u32,
        /// New speed (px/s)
        speed: Fixed,
    },
    /// The player moved.
    PositionUpdate {
        /// New position
        position: FixedVec2,
    },
    /// The player fired.
    BulletCreated {
        /// The new bullet
        bullet: Bullet,
    },
}

impl Message {
    /// The topic this message is addressed to.
    pub fn topic(&self) -> Topic {
        match self {
            Message::GameStart => Topic::GameStart,
            Message::GameRestart => Topic::GameRestart,
            Message::SyncRequest => Topic::GameSyncRequest,
            Message::PlayerInput { .. } => Topic::PlayerInput,
            Message::UpgradeChoice { .. } => Topic::PlayerUpgrade,
            Message::StateUpdate { .. } => Topic::GameStateUpdate,
            Message::GameOver { .. } => Topic::GameOver,
            Message::LevelUp { .. } => Topic::PlayerLevelUp,
            Message::PositionUpdate { .. } => Topic::PlayerPositionUpdate,
            Message::BulletCreated { .. } => Topic::BulletCreated,
        }
    }
}

/// Who published a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// The session's Model
    Model,
    /// A view allowed to play
    Player(ViewId),
    /// A watch-only view
    Observer(ViewId),
    /// Session plumbing (ledger forwarder, server)
    System,
}

impl Origin {
    /// The view behind this origin, if any.
    pub fn view_id(&self) -> Option<ViewId> {
        match self {
            Origin::Player(id) | Origin::Observer(id) => Some(*id),
            Origin::Model | Origin::System => None,
        }
    }
}

/// A published message as delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Schema version
    pub version: u16,
    /// Channel-wide publish order
    pub seq: u64,
    /// Publisher
    pub origin: Origin,
    /// Channel clock at publish, ms since the Unix epoch
    pub received_at_ms: u64,
    /// Payload
    pub message: Message,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Channel errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel was closed by session teardown
    #[error("channel closed")]
    Closed,
}

// =============================================================================
// CHANNEL
// =============================================================================

/// Subscription handle id.
pub type SubscriptionId = u64;

struct Subscriber {
    owner: Origin,
    topics: BTreeSet<Topic>,
    tx: mpsc::UnboundedSender<Arc<Envelope>>,
}

#[derive(Default)]
struct Registry {
    subscribers: BTreeMap<SubscriptionId, Subscriber>,
    next_subscription: SubscriptionId,
    next_seq: u64,
    closed: bool,
}

/// Topic-based pub/sub bus. Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct Channel {
    registry: Arc<Mutex<Registry>>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.lock();
        f.debug_struct("Channel")
            .field("subscribers", &registry.subscribers.len())
            .field("next_seq", &registry.next_seq)
            .field("closed", &registry.closed)
            .finish()
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl Channel {
    /// Create a channel stamping envelopes with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // A panicking subscriber cannot leave the registry half-updated.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register interest in `topics`.
    pub fn subscribe(&self, owner: Origin, topics: &[Topic]) -> Result<Subscription, ChannelError> {
        let mut registry = self.lock();
        if registry.closed {
            return Err(ChannelError::Closed);
        }

        let id = registry.next_subscription;
        registry.next_subscription += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        registry.subscribers.insert(id, Subscriber {
            owner,
            topics: topics.iter().copied().collect(),
            tx,
        });

        Ok(Subscription { id, rx })
    }

    /// Drop one subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().subscribers.remove(&id).is_some()
    }

    /// Drop every subscription held by `owner`. Returns how many were removed.
    pub fn unsubscribe_owner(&self, owner: Origin) -> usize {
        let mut registry = self.lock();
        let before = registry.subscribers.len();
        registry.subscribers.retain(|_, s| s.owner != owner);
        before - registry.subscribers.len()
    }

    /// Publish a message to every current subscriber of its topic.
    ///
    /// Returns the sequence number assigned to the message.
    pub fn publish(&self, origin: Origin, message: Message) -> Result<u64, ChannelError> {
        let received_at_ms = self.clock.now_ms();
        let topic = message.topic();

        let mut registry = self.lock();
        if registry.closed {
            return Err(ChannelError::Closed);
        }

        let seq = registry.next_seq;
        registry.next_seq += 1;

        let envelope = Arc::new(Envelope {
            version: PROTOCOL_VERSION,
            seq,
            origin,
            received_at_ms,
            message,
        });

        let mut gone = Vec::new();
        for (id, subscriber) in registry.subscribers.iter() {
            if subscriber.topics.contains(&topic) && subscriber.tx.send(envelope.clone()).is_err() {
                gone.push(*id);
            }
        }

        // Receivers dropped without unsubscribing
        for id in gone {
            debug!(subscription = id, %topic, "Pruning closed subscription");
            registry.subscribers.remove(&id);
        }

        Ok(seq)
    }

    /// A handle that publishes as `origin`.
    pub fn publisher(&self, origin: Origin) -> Publisher {
        Publisher { channel: self.clone(), origin }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Number of live subscriptions held by `owner`.
    pub fn owner_subscriptions(&self, owner: Origin) -> usize {
        self.lock().subscribers.values().filter(|s| s.owner == owner).count()
    }

    /// Close the channel. Remaining subscriptions end once drained.
    pub fn close(&self) {
        let mut registry = self.lock();
        registry.closed = true;
        registry.subscribers.clear();
    }

    /// True once closed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// Publishing side bound to one origin.
#[derive(Debug, Clone)]
pub struct Publisher {
    channel: Channel,
    origin: Origin,
}

impl Publisher {
    /// Publish `message` as this handle's origin.
    pub fn publish(&self, message: Message) -> Result<u64, ChannelError> {
        self.channel.publish(self.origin, message)
    }

    /// The origin stamped on every message.
    pub fn origin(&self) -> Origin {
        self.origin
    }
}

/// Receiving side of a subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<Arc<Envelope>>,
}

impl Subscription {
    /// Registry id, for [`Channel::unsubscribe`].
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next envelope. `None` once unsubscribed or closed.
    pub async fn recv(&mut self) -> Option<Arc<Envelope>> {
        self.rx.recv().await
    }

    /// Next envelope if one is queued.
    pub fn try_recv(&mut self) -> Option<Arc<Envelope>> {
        self.rx.try_recv().ok()
    }

    /// Everything queued right now, in delivery order.
    pub fn drain(&mut self) -> Vec<Arc<Envelope>> {
        let mut out = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            out.push(envelope);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::input::Direction;
    use crate::network::clock::ManualClock;

    fn channel() -> Channel {
        Channel::new(Arc::new(ManualClock::new(1_000)))
    }

    fn input(ts: u64) -> Message {
        Message::PlayerInput {
            input: PlayerInput::Move { direction: Direction::new(1.0, 0.0), timestamp: ts },
        }
    }

    #[test]
    fn test_topic_pairs() {
        assert_eq!(Topic::GameStateUpdate.as_pair(), ("game", "state-update"));
        assert_eq!(Topic::from_pair("player", "input"), Some(Topic::PlayerInput));
        assert_eq!(Topic::from_pair("player", "dance"), None);
        for topic in Topic::ALL {
            let (scope, event) = topic.as_pair();
            assert_eq!(Topic::from_pair(scope, event), Some(topic));
        }
        assert_eq!(Topic::BulletCreated.to_string(), "bullet/created");
    }

    #[test]
    fn test_delivery_by_topic() {
        let channel = channel();
        let mut model = channel.subscribe(Origin::Model, &Topic::MODEL_INBOUND).unwrap();
        let mut view = channel.subscribe(Origin::System, &[Topic::GameStateUpdate]).unwrap();

        channel.publish(Origin::System, Message::GameStart).unwrap();
        channel.publish(Origin::Model, Message::StateUpdate { state: Arc::new(GameState::new(1)) }).unwrap();

        let got = model.drain();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].message.topic(), Topic::GameStart);
        assert_eq!(got[0].received_at_ms, 1_000);
        assert_eq!(got[0].version, PROTOCOL_VERSION);

        let got = view.drain();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].message.topic(), Topic::GameStateUpdate);
    }

    #[test]
    fn test_fifo_per_publisher() {
        let channel = channel();
        let mut sub = channel.subscribe(Origin::Model, &[Topic::PlayerInput]).unwrap();
        let view = ViewId::new([3; 16]);
        let publisher = channel.publisher(Origin::Player(view));

        for ts in 0..50 {
            publisher.publish(input(ts)).unwrap();
        }

        let stamps: Vec<u64> = sub
            .drain()
            .iter()
            .map(|e| match &e.message {
                Message::PlayerInput { input } => input.timestamp(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(stamps, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_no_replay_for_late_subscriber() {
        let channel = channel();
        channel.publish(Origin::Model, Message::GameOver {
            summary: GameOverSummary { kill_count: 1, game_time: 2, level: 3 },
        }).unwrap();

        let mut late = channel.subscribe(Origin::System, &[Topic::GameOver]).unwrap();
        assert!(late.try_recv().is_none());
    }

    #[test]
    fn test_unsubscribe_owner() {
        let channel = channel();
        let view = Origin::Player(ViewId::new([1; 16]));
        let _a = channel.subscribe(view, &[Topic::GameStateUpdate]).unwrap();
        let _b = channel.subscribe(view, &[Topic::GameOver]).unwrap();
        let _c = channel.subscribe(Origin::Model, &[Topic::PlayerInput]).unwrap();

        assert_eq!(channel.owner_subscriptions(view), 2);
        assert_eq!(channel.unsubscribe_owner(view), 2);
        assert_eq!(channel.subscriber_count(), 1);
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let channel = channel();
        let sub = channel.subscribe(Origin::System, &[Topic::GameStart]).unwrap();
        drop(sub);
        channel.publish(Origin::System, Message::GameStart).unwrap();
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions() {
        let channel = channel();
        let mut sub = channel.subscribe(Origin::System, &[Topic::GameStart]).unwrap();
        channel.publish(Origin::System, Message::GameStart).unwrap();
        channel.close();

        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
        assert_eq!(channel.publish(Origin::System, Message::GameStart), Err(ChannelError::Closed));
        assert!(channel.subscribe(Origin::System, &[Topic::GameStart]).is_err());
    }

    #[test]
    fn test_message_wire_format() {
        let json = serde_json::to_string(&input(7)).unwrap();
        assert!(json.contains(r#""type":"player_input""#));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.topic(), Topic::PlayerInput);
    }
}
