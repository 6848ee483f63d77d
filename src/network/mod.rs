//! Network Layer
//!
//! Channel, session lifecycle and the WebSocket bridge.
//! This layer is **non-deterministic** - all game logic runs through `game/`.

pub mod auth;
pub mod channel;
pub mod clock;
pub mod driver;
pub mod protocol;
pub mod session;
pub mod server;

pub use auth::{AuthConfig, AuthError, Identity, TokenClaims, validate_token, view_id_for};
pub use channel::{Channel, ChannelError, Envelope, Message, Origin, Publisher, Subscription, Topic};
pub use clock::{Clock, ManualClock, SystemClock};
pub use driver::DriverHandle;
pub use protocol::{ClientMessage, ServerMessage, ErrorCode};
pub use session::{
    Admission, Credentials, GameSession, SessionConfig, SessionError, SessionId, SessionManager, SessionRecord,
    SessionState, ViewLink, ViewRole, ViewSender,
};
pub use server::{GameServer, ServerConfig, GameServerError};
