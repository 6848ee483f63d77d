//! Session Lifecycle
//!
//! A session owns exactly one Model, the Channel it talks over and the
//! driver ticking it. States:
//!
//! ```text
//! Uninitialized --join--> Joining --ok--> Active --teardown--> TornDown
//!                            |
//!                            +--credential failure--> Uninitialized
//! ```
//!
//! The Channel and the driver are created together after the credentials
//! check passes, and live in one `Option`, so a session can never hold one
//! without the other. Teardown unsubscribes every view before the driver
//! stops and the Channel closes.
//!
//! The [`SessionManager`] admits and releases views under its map lock, so
//! a session found in the map is always active, and one is only torn down
//! after its last view left.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::core::hash::short_hex;
use crate::game::replay::EpochRecord;
use crate::game::state::ViewId;
use crate::game::tick::GameConfig;
use crate::game::model::GameModel;
use crate::network::auth::{validate_token, AuthConfig, AuthError, Identity};
use crate::network::channel::{
    Channel, ChannelError, Message, Origin, Publisher, Subscription, Topic,
};
use crate::network::clock::{Clock, SystemClock};
use crate::network::driver::DriverHandle;

/// Unique session identifier.
pub type SessionId = [u8; 16];

/// Default app id sent with session credentials.
pub const DEFAULT_APP_ID: &str = "com.monadhunter.game";

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, nothing running.
    Uninitialized,
    /// Credentials being checked.
    Joining,
    /// Model, channel and driver running.
    Active,
    /// Views detached, driver stopped, channel closed.
    TornDown,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Joining => "joining",
            SessionState::Active => "active",
            SessionState::TornDown => "torn-down",
        };
        f.write_str(name)
    }
}

/// What a view may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewRole {
    /// Sends inputs and controls, receives broadcasts.
    Player,
    /// Receives broadcasts only.
    Observer,
}

impl ViewRole {
    /// Channel origin for a view with this role.
    pub fn origin(self, view_id: ViewId) -> Origin {
        match self {
            ViewRole::Player => Origin::Player(view_id),
            ViewRole::Observer => Origin::Observer(view_id),
        }
    }
}

/// Credentials presented on join.
#[derive(Clone)]
pub struct Credentials {
    /// Application id.
    pub app_id: String,
    /// API key (a JWT when auth is configured).
    pub api_key: String,
}

impl Credentials {
    /// Credentials for the default app id.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            app_id: DEFAULT_APP_ID.to_string(),
            api_key: api_key.into(),
        }
    }

    /// Override the app id.
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Balance and validation tunables.
    pub game: GameConfig,
    /// Model tick period.
    pub tick_period: Duration,
    /// Credential verification.
    pub auth: AuthConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            tick_period: Duration::from_millis(16),
            auth: AuthConfig::default(),
        }
    }
}

/// Session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No api key or app id.
    #[error("Missing credential")]
    MissingCredential,

    /// Api key rejected.
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Lifecycle step not allowed from the current state.
    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: SessionState,
        /// Requested state
        to: SessionState,
    },

    /// View id already attached.
    #[error("View already joined")]
    AlreadyJoined,

    /// Operation needs an active session.
    #[error("Session not active")]
    NotActive,

    /// Observers cannot send inputs or controls.
    #[error("Observers cannot send input")]
    ObserverInput,

    /// Views may only publish Model-bound topics.
    #[error("Topic {0} is not accepted from views")]
    ForbiddenTopic(Topic),

    /// Channel failure.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Check credentials against the auth config at `now_secs`.
///
/// Returns the hunter's identity when a verifier is configured.
pub fn authorize(
    credentials: &Credentials,
    auth: &AuthConfig,
    now_secs: u64,
) -> Result<Option<Identity>, SessionError> {
    let key = credentials.api_key.trim();
    if key.is_empty() || credentials.app_id.trim().is_empty() {
        return Err(SessionError::MissingCredential);
    }

    if auth.is_configured() {
        return Ok(Some(validate_token(key, auth, &credentials.app_id, now_secs)?));
    }
    if auth.allow_anonymous {
        return Ok(None);
    }
    Err(SessionError::Auth(AuthError::NotConfigured))
}

// =============================================================================
// VIEW LINK
// =============================================================================

/// Sending side of a view's connection.
#[derive(Debug, Clone)]
pub struct ViewSender {
    view_id: ViewId,
    role: ViewRole,
    publisher: Publisher,
}

impl ViewSender {
    /// View identifier.
    pub fn view_id(&self) -> ViewId {
        self.view_id
    }

    /// Role granted at attach.
    pub fn role(&self) -> ViewRole {
        self.role
    }

    /// Publish a message as this view.
    ///
    /// Only Model-bound topics are accepted, and observers may only ask
    /// for a snapshot.
    pub fn send(&self, message: Message) -> Result<u64, SessionError> {
        let topic = message.topic();
        if !Topic::MODEL_INBOUND.contains(&topic) {
            return Err(SessionError::ForbiddenTopic(topic));
        }
        if self.role == ViewRole::Observer && topic != Topic::GameSyncRequest {
            return Err(SessionError::ObserverInput);
        }
        Ok(self.publisher.publish(message)?)
    }
}

/// A view's connection to its session's channel.
#[derive(Debug)]
pub struct ViewLink {
    /// Publishing half.
    pub sender: ViewSender,
    /// Broadcasts from the Model.
    pub subscription: Subscription,
}

impl ViewLink {
    /// View identifier.
    pub fn view_id(&self) -> ViewId {
        self.sender.view_id
    }

    /// Publish a message as this view.
    pub fn send(&self, message: Message) -> Result<u64, SessionError> {
        self.sender.send(message)
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Channel and driver, created and dropped together.
struct Runtime {
    channel: Channel,
    driver: DriverHandle,
}

/// What a finished session leaves behind for audit: one record per
/// retained game, oldest first, the last being the game that was running.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    /// Retained games
    pub epochs: Vec<EpochRecord>,
}

impl SessionRecord {
    /// The game that was running at teardown.
    pub fn latest(&self) -> Option<&EpochRecord> {
        self.epochs.last()
    }

    /// Replay every retained game against its final hash.
    pub fn verify(&self, config: &GameConfig) -> bool {
        self.epochs.iter().all(|record| record.verify(config))
    }
}

/// One game session.
pub struct GameSession {
    /// Unique session identifier.
    pub id: SessionId,
    /// Lookup name.
    pub name: String,
    state: SessionState,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    runtime: Option<Runtime>,
    views: BTreeMap<ViewId, ViewRole>,
}

impl fmt::Debug for GameSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameSession")
            .field("id", &hex::encode(&self.id[..4]))
            .field("name", &self.name)
            .field("state", &self.state)
            .field("views", &self.views.len())
            .finish()
    }
}

impl GameSession {
    /// Create an uninitialized session using the system clock.
    pub fn new(name: impl Into<String>, config: SessionConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Create an uninitialized session with an injected clock.
    pub fn with_clock(name: impl Into<String>, config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().into_bytes(),
            name: name.into(),
            state: SessionState::Uninitialized,
            config,
            clock,
            runtime: None,
            views: BTreeMap::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of attached views.
    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    /// The channel, while active.
    pub fn channel(&self) -> Option<&Channel> {
        self.runtime.as_ref().map(|r| &r.channel)
    }

    /// Check credentials, then start the Model, Channel and driver.
    ///
    /// On failure nothing is constructed and the session returns to
    /// `Uninitialized`. Must be called inside a Tokio runtime.
    pub fn join(&mut self, credentials: &Credentials) -> Result<Option<Identity>, SessionError> {
        if self.state != SessionState::Uninitialized {
            return Err(SessionError::InvalidTransition { from: self.state, to: SessionState::Joining });
        }
        self.state = SessionState::Joining;

        let now_secs = self.clock.now_ms() / 1000;
        let identity = match authorize(credentials, &self.config.auth, now_secs) {
            Ok(identity) => identity,
            Err(e) => return Err(self.abort_join(e)),
        };

        let channel = Channel::new(self.clock.clone());
        let inbox = match channel.subscribe(Origin::Model, &Topic::MODEL_INBOUND) {
            Ok(inbox) => inbox,
            Err(e) => return Err(self.abort_join(e.into())),
        };
        let model = GameModel::new(self.id, credentials.app_id.clone(), self.config.game.clone());
        let driver = DriverHandle::spawn(
            model,
            inbox,
            channel.publisher(Origin::Model),
            self.config.tick_period,
        );

        self.runtime = Some(Runtime { channel, driver });
        self.state = SessionState::Active;

        info!(session = %self.name, id = %hex::encode(&self.id[..4]), "Session active");
        Ok(identity)
    }

    fn abort_join(&mut self, error: SessionError) -> SessionError {
        warn!(session = %self.name, "Join rejected: {}", error);
        self.state = SessionState::Uninitialized;
        error
    }

    /// Attach a view. It receives every Model broadcast from now on, and a
    /// snapshot is requested on its behalf.
    pub fn attach_view(&mut self, view_id: ViewId, role: ViewRole) -> Result<ViewLink, SessionError> {
        let runtime = self.runtime.as_ref().ok_or(SessionError::NotActive)?;
        if self.views.contains_key(&view_id) {
            return Err(SessionError::AlreadyJoined);
        }

        let origin = role.origin(view_id);
        let subscription = runtime.channel.subscribe(origin, &Topic::MODEL_OUTBOUND)?;
        let publisher = runtime.channel.publisher(origin);
        runtime.channel.publish(Origin::System, Message::SyncRequest)?;

        self.views.insert(view_id, role);
        info!(session = %self.name, view = %view_id.short(), ?role, "View attached");

        Ok(ViewLink {
            sender: ViewSender { view_id, role, publisher },
            subscription,
        })
    }

    /// Detach a view. Returns false if it was not attached.
    pub fn detach_view(&mut self, view_id: ViewId) -> bool {
        let Some(role) = self.views.remove(&view_id) else {
            return false;
        };
        if let Some(runtime) = &self.runtime {
            runtime.channel.unsubscribe_owner(role.origin(view_id));
        }
        info!(session = %self.name, view = %view_id.short(), "View detached");
        true
    }

    /// Tear down: unsubscribe views, stop the driver, close the channel.
    ///
    /// Returns the audit record of the finished Model, if one ran.
    pub async fn teardown(&mut self) -> Result<Option<SessionRecord>, SessionError> {
        match self.state {
            SessionState::TornDown => return Ok(None),
            SessionState::Joining => {
                return Err(SessionError::InvalidTransition { from: self.state, to: SessionState::TornDown });
            }
            SessionState::Uninitialized | SessionState::Active => {}
        }

        let Some(runtime) = self.runtime.take() else {
            self.state = SessionState::TornDown;
            return Ok(None);
        };

        for (view_id, role) in std::mem::take(&mut self.views) {
            runtime.channel.unsubscribe_owner(role.origin(view_id));
        }

        let model = runtime.driver.stop().await;
        runtime.channel.close();
        self.state = SessionState::TornDown;

        let record = model.map(|m| {
            let ticks = m.state().tick;
            let epochs = m.into_records();
            if let Some(latest) = epochs.last() {
                info!(
                    session = %self.name,
                    ticks,
                    games = epochs.len(),
                    final_hash = %short_hex(&latest.final_hash),
                    "Session torn down"
                );
            }
            SessionRecord { epochs }
        });
        Ok(record)
    }
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// A view admitted to a session.
#[derive(Debug)]
pub struct Admission {
    /// The session joined
    pub session: Arc<RwLock<GameSession>>,
    /// The view's connection
    pub link: ViewLink,
    /// Who joined, when tokens are verified
    pub identity: Option<Identity>,
}

/// Manages all active sessions, keyed by name.
pub struct SessionManager {
    sessions: RwLock<BTreeMap<String, Arc<RwLock<GameSession>>>>,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    /// Create new session manager.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a manager whose sessions use `clock`.
    pub fn with_clock(config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            config,
            clock,
        }
    }

    /// Check credentials and attach a view to the named session, starting
    /// the session if needed.
    ///
    /// Runs under the map lock, so the session cannot be torn down between
    /// the credential check and the attach. A session started here is only
    /// published once its first view is attached.
    pub async fn join_view(
        &self,
        name: &str,
        credentials: &Credentials,
        role: ViewRole,
    ) -> Result<Admission, SessionError> {
        let mut sessions = self.sessions.write().await;

        if let Some(session) = sessions.get(name).cloned() {
            let identity = authorize(credentials, &self.config.auth, self.clock.now_ms() / 1000)?;
            let link = session.write().await.attach_view(view_id_of(&identity), role)?;
            return Ok(Admission { session, link, identity });
        }

        let mut session = GameSession::with_clock(name, self.config.clone(), self.clock.clone());
        let identity = session.join(credentials)?;
        let link = match session.attach_view(view_id_of(&identity), role) {
            Ok(link) => link,
            Err(e) => {
                if let Err(teardown) = session.teardown().await {
                    warn!(session = %name, "Teardown failed: {}", teardown);
                }
                return Err(e);
            }
        };

        let session = Arc::new(RwLock::new(session));
        sessions.insert(name.to_string(), session.clone());
        Ok(Admission { session, link, identity })
    }

    /// Get a session by name.
    pub async fn get(&self, name: &str) -> Option<Arc<RwLock<GameSession>>> {
        self.sessions.read().await.get(name).cloned()
    }

    /// Detach a view from `session`; tears the session down when that was
    /// its last view. Returns false if the view was not attached.
    pub async fn leave(&self, session: &Arc<RwLock<GameSession>>, view_id: ViewId) -> bool {
        let mut sessions = self.sessions.write().await;
        let name = {
            let mut s = session.write().await;
            if !s.detach_view(view_id) {
                return false;
            }
            if s.view_count() > 0 {
                return true;
            }
            s.name.clone()
        };

        // Only evict the exact session that emptied, never a newer one under the same name
        if !sessions.get(&name).is_some_and(|current| Arc::ptr_eq(current, session)) {
            return true;
        }
        sessions.remove(&name);
        drop(sessions);

        Self::teardown(&name, session).await;
        true
    }

    /// Remove and tear down a session.
    pub async fn remove(&self, name: &str) -> Option<SessionRecord> {
        let session = self.sessions.write().await.remove(name)?;
        Self::teardown(name, &session).await
    }

    async fn teardown(name: &str, session: &Arc<RwLock<GameSession>>) -> Option<SessionRecord> {
        match session.write().await.teardown().await {
            Ok(record) => record,
            Err(e) => {
                warn!(session = %name, "Teardown failed: {}", e);
                None
            }
        }
    }

    /// Tear down every session.
    pub async fn shutdown(&self) {
        let names: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        for name in names {
            self.remove(&name).await;
        }
    }

    /// Get session count.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Verified hunters keep their view id across reconnects; anonymous views get a fresh one.
fn view_id_of(identity: &Option<Identity>) -> ViewId {
    identity.as_ref().map_or_else(ViewId::generate, |identity| identity.view_id)
}
