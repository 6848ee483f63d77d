//! Protocol Messages
//!
//! Wire format between remote views and the server over WebSocket.
//! Messages are JSON text frames; binary frames carry the same JSON as UTF-8.
//! Internally tagged enums do not round-trip through bincode, so there is no
//! binary encoding here.

use std::sync::Arc;

use serde::{Serialize, Deserialize};

use crate::core::fixed::Fixed;
use crate::game::events::GameOverSummary;
use crate::game::input::PlayerInput;
use crate::game::state::{Bullet, GameState};
use crate::game::upgrade::UpgradeKind;
use crate::network::auth::AuthError;
use crate::network::channel::{Message, PROTOCOL_VERSION};
use crate::network::session::{SessionError, ViewRole};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from a remote view to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join (or create) a named session.
    Join(JoinRequest),

    /// Player action. Stamp the timestamp when the action happens.
    Input { input: PlayerInput },

    /// Pick an upgrade from the level-up offer.
    Upgrade { level: u32, upgrade: UpgradeKind },

    /// Start the first game.
    Start,

    /// Restart the game.
    Restart,

    /// Ask for an immediate snapshot.
    SyncRequest,

    /// Ping for latency measurement.
    Ping { timestamp: u64 },

    /// Leave the session, keeping the socket open.
    Leave,
}

/// Join request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Session name.
    pub session: String,
    /// Api key (JWT when auth is configured).
    pub token: String,
    /// Player or observer.
    pub role: ViewRole,
    /// App id override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
}

impl ClientMessage {
    /// The channel message this client message asks a view to send, if any.
    pub fn to_channel(&self) -> Option<Message> {
        match self {
            ClientMessage::Input { input } => Some(Message::PlayerInput { input: *input }),
            ClientMessage::Upgrade { level, upgrade } => {
                Some(Message::UpgradeChoice { level: *level, upgrade: *upgrade })
            }
            ClientMessage::Start => Some(Message::GameStart),
            ClientMessage::Restart => Some(Message::GameRestart),
            ClientMessage::SyncRequest => Some(Message::SyncRequest),
            ClientMessage::Join(_) | ClientMessage::Ping { .. } | ClientMessage::Leave => None,
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from the server to a remote view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join accepted.
    Joined(JoinedInfo),

    /// Authoritative snapshot.
    State { state: Arc<GameState> },

    /// The game ended.
    GameOver { summary: GameOverSummary },

    /// The player levelled up.
    LevelUp { level: u32, speed: Fixed },

    /// The player fired.
    BulletCreated { bullet: Bullet },

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server wall clock (ms).
        server_time: u64,
    },

    /// Error.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Join result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinedInfo {
    /// Session name.
    pub session: String,
    /// This view's id (UUID string).
    pub view_id: String,
    /// Granted role.
    pub role: ViewRole,
    /// Channel protocol version.
    pub protocol_version: u16,
    /// Server version.
    pub server_version: String,
}

impl JoinedInfo {
    /// Build with the current protocol and crate versions.
    pub fn new(session: impl Into<String>, view_id: String, role: ViewRole) -> Self {
        Self {
            session: session.into(),
            view_id,
            role,
            protocol_version: PROTOCOL_VERSION,
            server_version: crate::VERSION.to_string(),
        }
    }
}

impl ServerMessage {
    /// Translate a channel broadcast for a remote view.
    ///
    /// Control traffic and per-tick position updates stay inside the server;
    /// snapshots already carry the position.
    pub fn from_channel(message: &Message) -> Option<Self> {
        match message {
            Message::StateUpdate { state } => Some(ServerMessage::State { state: state.clone() }),
            Message::GameOver { summary } => Some(ServerMessage::GameOver { summary: *summary }),
            Message::LevelUp { level, speed } => Some(ServerMessage::LevelUp { level: *level, speed: *speed }),
            Message::BulletCreated { bullet } => Some(ServerMessage::BulletCreated { bullet: *bullet }),
            Message::GameStart
            | Message::GameRestart
            | Message::SyncRequest
            | Message::PlayerInput { .. }
            | Message::UpgradeChoice { .. }
            | Message::PositionUpdate { .. } => None,
        }
    }

    /// Error reply.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError { code, message: message.into() })
    }
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Missing or rejected credential.
    AuthFailed,
    /// JWT token has expired.
    TokenExpired,
    /// Invalid JWT token (signature, format, claims).
    InvalidToken,
    /// Unparseable message.
    InvalidMessage,
    /// Message needs a joined session.
    NotJoined,
    /// Already joined.
    AlreadyJoined,
    /// Observers cannot send that.
    Forbidden,
    /// Session is not running.
    SessionUnavailable,
    /// Connection limit reached.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl From<&SessionError> for ErrorCode {
    fn from(error: &SessionError) -> Self {
        match error {
            SessionError::MissingCredential => ErrorCode::AuthFailed,
            SessionError::Auth(AuthError::Expired) => ErrorCode::TokenExpired,
            SessionError::Auth(AuthError::NotConfigured) => ErrorCode::AuthFailed,
            SessionError::Auth(_) => ErrorCode::InvalidToken,
            SessionError::AlreadyJoined => ErrorCode::AlreadyJoined,
            SessionError::ObserverInput | SessionError::ForbiddenTopic(_) => ErrorCode::Forbidden,
            SessionError::NotActive
            | SessionError::InvalidTransition { .. }
            | SessionError::Channel(_) => ErrorCode::SessionUnavailable,
        }
    }
}

impl From<&SessionError> for ServerMessage {
    fn from(error: &SessionError) -> Self {
        ServerMessage::error(ErrorCode::from(error), error.to_string())
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Deserialize from a binary frame holding UTF-8 JSON.
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
