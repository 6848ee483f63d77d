//! WebSocket Game Server
//!
//! Async WebSocket bridge for remote views. Each connection joins one named
//! session as a player or observer, forwards its actions through a
//! `ViewSender` and relays the Model's broadcasts back as JSON.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, instrument, warn};

use crate::ledger::{MemoryLedger, ScoreForwarder, ScoreLedger};
use crate::network::auth::AuthConfig;
use crate::network::clock::{Clock, SystemClock};
use crate::network::protocol::{
    ClientMessage, ErrorCode, JoinRequest, JoinedInfo, ServerMessage,
};
use crate::network::session::{
    Admission, Credentials, GameSession, SessionConfig, SessionError, SessionManager, ViewRole,
    ViewSender, DEFAULT_APP_ID,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Idle connections are dropped after this long without a message.
    pub idle_timeout: Duration,
    /// Tick rate for game simulation (Hz).
    pub tick_rate: u32,
    /// App id used when a join names none.
    pub app_id: String,
    /// Auth settings for session joins.
    pub auth: AuthConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            tick_rate: crate::TICK_RATE,
            app_id: DEFAULT_APP_ID.to_string(),
            auth: AuthConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_parse("HUNTER_BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_connections: env_parse("HUNTER_MAX_CONNECTIONS").unwrap_or(defaults.max_connections),
            tick_rate: env_parse("HUNTER_TICK_RATE")
                .filter(|rate| *rate > 0)
                .unwrap_or(defaults.tick_rate),
            app_id: std::env::var("HUNTER_APP_ID").unwrap_or(defaults.app_id),
            auth: AuthConfig::from_env(),
            ..defaults
        }
    }

    /// Session settings derived from this config.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            tick_period: Duration::from_millis(1000 / u64::from(self.tick_rate.max(1))),
            auth: self.auth.clone(),
            ..SessionConfig::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparseable {}={}", name, raw);
            None
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Session error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Connected client state.
struct ConnectedClient {
    /// Joined session, if any.
    session: Option<String>,
    /// Last activity.
    last_activity: Instant,
    /// Close signal for idle cleanup.
    kick: mpsc::Sender<()>,
}

type Clients = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// Shared by every connection task.
struct ServerContext {
    config: ServerConfig,
    sessions: Arc<SessionManager>,
    ledger: Arc<dyn ScoreLedger>,
    clients: Clients,
    clock: Arc<dyn Clock>,
}

/// The game server.
pub struct GameServer {
    ctx: Arc<ServerContext>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server with an in-memory ledger.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_ledger(config, Arc::new(MemoryLedger::new()))
    }

    /// Create a server submitting finished games to `ledger`.
    pub fn with_ledger(config: ServerConfig, ledger: Arc<dyn ScoreLedger>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let sessions = Arc::new(SessionManager::new(config.session_config()));

        Self {
            ctx: Arc::new(ServerContext {
                config,
                sessions,
                ledger,
                clients: Arc::new(RwLock::new(BTreeMap::new())),
                clock: Arc::new(SystemClock),
            }),
            shutdown_tx,
        }
    }

    /// Bind and run until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.ctx.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener until shutdown.
    #[instrument(skip_all)]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server listening on {}", listener.local_addr()?);

        let cleanup_ctx = self.ctx.clone();
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_ctx).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.ctx.clients.read().await.len();
                            if clients_count >= self.ctx.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        self.ctx.sessions.shutdown().await;

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let ctx = self.ctx.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);
            let (kick_tx, mut kick_rx) = mpsc::channel::<()>(1);

            // Register client
            ctx.clients.write().await.insert(addr, ConnectedClient {
                session: None,
                last_activity: Instant::now(),
                kick: kick_tx,
            });

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(WsMessage::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            let mut conn = ClientConnection::new(addr, ctx.clone(), msg_tx.clone());

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        let parsed = match msg {
                            Some(Ok(WsMessage::Text(text))) => ClientMessage::from_json(&text),
                            Some(Ok(WsMessage::Binary(data))) => ClientMessage::from_slice(&data),
                            Some(Ok(WsMessage::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            // Ping/pong frames are answered by tungstenite
                            Some(Ok(_)) => continue,
                        };

                        if let Some(client) = ctx.clients.write().await.get_mut(&addr) {
                            client.last_activity = Instant::now();
                        }

                        match parsed {
                            Ok(client_msg) => conn.handle(client_msg).await,
                            Err(e) => {
                                debug!("Invalid message from {}: {}", addr, e);
                                let _ = msg_tx.send(ServerMessage::error(
                                    ErrorCode::InvalidMessage,
                                    "Invalid message format",
                                )).await;
                            }
                        }
                    }
                    _ = kick_rx.recv() => {
                        info!("Closing idle client {}", addr);
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            conn.leave().await;
            drop(conn);
            drop(msg_tx);
            // Let queued replies (shutdown notice) flush before the socket drops
            let _ = tokio::time::timeout(Duration::from_secs(1), sender_task).await;

            ctx.clients.write().await.remove(&addr);
            info!("Client {} cleaned up", addr);
        });
    }

    /// Drop connections that went quiet.
    async fn run_cleanup_loop(ctx: Arc<ServerContext>) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            let now = Instant::now();
            let clients = ctx.clients.read().await;
            for (addr, client) in clients.iter() {
                if now.duration_since(client.last_activity) > ctx.config.idle_timeout {
                    debug!(session = ?client.session, "Kicking idle client {}", addr);
                    let _ = client.kick.try_send(());
                }
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.ctx.clients.read().await.len()
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.ctx.sessions.session_count().await
    }

    /// The ledger finished games are submitted to.
    pub fn ledger(&self) -> &Arc<dyn ScoreLedger> {
        &self.ctx.ledger
    }
}

// =============================================================================
// PER-CONNECTION STATE
// =============================================================================

/// A view joined through this connection.
struct JoinedView {
    name: String,
    session: Arc<RwLock<GameSession>>,
    sender: ViewSender,
    relay: JoinHandle<()>,
    scores: Option<JoinHandle<usize>>,
}

/// Message handling for one socket.
struct ClientConnection {
    addr: SocketAddr,
    ctx: Arc<ServerContext>,
    tx: mpsc::Sender<ServerMessage>,
    joined: Option<JoinedView>,
}

impl ClientConnection {
    fn new(addr: SocketAddr, ctx: Arc<ServerContext>, tx: mpsc::Sender<ServerMessage>) -> Self {
        Self { addr, ctx, tx, joined: None }
    }

    async fn reply(&self, msg: ServerMessage) {
        let _ = self.tx.send(msg).await;
    }

    async fn handle(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::Join(request) => {
                if self.joined.is_some() {
                    self.reply(ServerMessage::error(ErrorCode::AlreadyJoined, "Leave first")).await;
                    return;
                }
                if let Err(e) = self.join(request).await {
                    debug!("Join from {} failed: {}", self.addr, e);
                    self.reply(ServerMessage::from(&e)).await;
                }
            }
            ClientMessage::Ping { timestamp } => {
                self.reply(ServerMessage::Pong {
                    timestamp,
                    server_time: self.ctx.clock.now_ms(),
                }).await;
            }
            ClientMessage::Leave => {
                if self.joined.is_none() {
                    self.reply(ServerMessage::error(ErrorCode::NotJoined, "Not in a session")).await;
                } else {
                    self.leave().await;
                }
            }
            other => {
                let Some(message) = other.to_channel() else {
                    return;
                };
                let Some(joined) = &self.joined else {
                    self.reply(ServerMessage::error(ErrorCode::NotJoined, "Not in a session")).await;
                    return;
                };
                if let Err(e) = joined.sender.send(message) {
                    self.reply(ServerMessage::from(&e)).await;
                }
            }
        }
    }

    async fn join(&mut self, request: JoinRequest) -> Result<(), SessionError> {
        let app_id = request.app_id.unwrap_or_else(|| self.ctx.config.app_id.clone());
        let credentials = Credentials::new(request.token).with_app_id(app_id);

        let Admission { session, link, identity } = self
            .ctx
            .sessions
            .join_view(&request.session, &credentials, request.role)
            .await?;
        let view_id = link.view_id();
        let channel = session.read().await.channel().cloned();

        let mut subscription = link.subscription;
        let tx = self.tx.clone();
        let relay = tokio::spawn(async move {
            while let Some(envelope) = subscription.recv().await {
                if let Some(msg) = ServerMessage::from_channel(&envelope.message) {
                    if tx.send(msg).await.is_err() {
                        break;
                    }
                }
            }
        });

        // Only a signed-in player's own games are recorded under their wallet
        let wallet = match request.role {
            ViewRole::Player => identity.and_then(|identity| identity.wallet),
            ViewRole::Observer => None,
        };
        let scores = match (wallet, channel) {
            (Some(address), Some(channel)) => {
                ScoreForwarder::spawn(&channel, self.ctx.ledger.clone(), address).ok()
            }
            _ => None,
        };

        if let Some(client) = self.ctx.clients.write().await.get_mut(&self.addr) {
            client.session = Some(request.session.clone());
        }

        info!(session = %request.session, view = %view_id.short(), role = ?request.role, "Remote view joined");
        self.reply(ServerMessage::Joined(JoinedInfo::new(
            request.session.clone(),
            view_id.to_uuid_string(),
            request.role,
        ))).await;

        self.joined = Some(JoinedView {
            name: request.session,
            session,
            sender: link.sender,
            relay,
            scores,
        });
        Ok(())
    }

    async fn leave(&mut self) {
        let Some(joined) = self.joined.take() else {
            return;
        };

        joined.relay.abort();
        if let Some(scores) = joined.scores {
            scores.abort();
        }
        self.ctx.sessions.leave(&joined.session, joined.sender.view_id()).await;

        if let Some(client) = self.ctx.clients.write().await.get_mut(&self.addr) {
            client.session = None;
        }
        debug!(session = %joined.name, "Client {} left", self.addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::input::{Direction, PlayerInput};
    use crate::ledger::PlayerAddress;
    use crate::network::auth::TokenClaims;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use tokio_tungstenite::connect_async;

    fn anonymous_config() -> ServerConfig {
        ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            auth: AuthConfig { allow_anonymous: true, ..Default::default() },
            ..Default::default()
        }
    }

    fn join(session: &str, role: ViewRole) -> ClientMessage {
        ClientMessage::Join(JoinRequest {
            session: session.to_string(),
            token: "guest".to_string(),
            role,
            app_id: None,
        })
    }

    async fn next_matching(
        rx: &mut mpsc::Receiver<ServerMessage>,
        pred: impl Fn(&ServerMessage) -> bool,
    ) -> ServerMessage {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out")
                .expect("connection closed");
            if pred(&msg) {
                return msg;
            }
        }
    }

    fn connection(server: &GameServer) -> (ClientConnection, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(256);
        let addr = SocketAddr::from(([127, 0, 0, 1], 40000));
        (ClientConnection::new(addr, server.ctx.clone(), tx), rx)
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.app_id, DEFAULT_APP_ID);
        assert_eq!(config.session_config().tick_period, Duration::from_millis(16));
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = GameServer::new(anonymous_config());
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.session_count().await, 0);
        assert_eq!(server.ledger().total_players(), 0);
    }

    #[tokio::test]
    async fn test_join_then_snapshot() {
        let server = GameServer::new(anonymous_config());
        let (mut conn, mut rx) = connection(&server);

        conn.handle(join("lobby", ViewRole::Player)).await;
        assert!(matches!(rx.recv().await, Some(ServerMessage::Joined(_))));
        assert_eq!(server.session_count().await, 1);

        let state = next_matching(&mut rx, |m| matches!(m, ServerMessage::State { .. })).await;
        if let ServerMessage::State { state } = state {
            assert!(!state.game_active);
        }
        conn.leave().await;
        assert_eq!(server.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_actions_need_join() {
        let server = GameServer::new(anonymous_config());
        let (mut conn, mut rx) = connection(&server);

        conn.handle(ClientMessage::Start).await;
        match rx.recv().await {
            Some(ServerMessage::Error(e)) => assert_eq!(e.code, ErrorCode::NotJoined),
            other => panic!("Expected error, got {:?}", other),
        }

        conn.handle(ClientMessage::Ping { timestamp: 5 }).await;
        assert!(matches!(rx.recv().await, Some(ServerMessage::Pong { timestamp: 5, .. })));
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let server = GameServer::new(ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..Default::default()
        });
        let (mut conn, mut rx) = connection(&server);

        conn.handle(join("lobby", ViewRole::Player)).await;
        match rx.recv().await {
            Some(ServerMessage::Error(e)) => assert_eq!(e.code, ErrorCode::AuthFailed),
            other => panic!("Expected error, got {:?}", other),
        }
        assert_eq!(server.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_observer_cannot_play() {
        let server = GameServer::new(anonymous_config());
        let (mut player, mut player_rx) = connection(&server);
        let (mut observer, mut observer_rx) = connection(&server);

        player.handle(join("arena", ViewRole::Player)).await;
        observer.handle(join("arena", ViewRole::Observer)).await;
        assert!(matches!(player_rx.recv().await, Some(ServerMessage::Joined(_))));
        assert!(matches!(observer_rx.recv().await, Some(ServerMessage::Joined(_))));

        observer.handle(ClientMessage::Start).await;
        let err = next_matching(&mut observer_rx, |m| matches!(m, ServerMessage::Error(_))).await;
        if let ServerMessage::Error(e) = err {
            assert_eq!(e.code, ErrorCode::Forbidden);
        }

        player.handle(ClientMessage::Start).await;
        let input = PlayerInput::Move { direction: Direction::new(1.0, 0.0), timestamp: SystemClock.now_ms() };
        player.handle(ClientMessage::Input { input }).await;

        // The observer sees the game the player started
        next_matching(&mut observer_rx, |m| {
            matches!(m, ServerMessage::State { state } if state.game_active && state.tick > 0)
        }).await;

        player.leave().await;
        assert_eq!(server.session_count().await, 1);
        observer.leave().await;
        assert_eq!(server.session_count().await, 0);
    }

    const SECRET: &str = "server-test-secret-0123456789";
    const PLAYER_WALLET: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const OBSERVER_WALLET: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn signed_join(session: &str, role: ViewRole, subject: &str, wallet: &str) -> ClientMessage {
        let now = SystemClock.now_ms() / 1000;
        let claims = TokenClaims {
            sub: subject.into(),
            exp: now + 600,
            iat: now,
            wallet: Some(wallet.into()),
            ..Default::default()
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        ).unwrap();
        ClientMessage::Join(JoinRequest { session: session.to_string(), token, role, app_id: None })
    }

    #[tokio::test]
    async fn test_observer_wallet_not_credited() {
        let server = GameServer::new(ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            tick_rate: 1000,
            auth: AuthConfig { secret: Some(SECRET.into()), ..Default::default() },
            ..Default::default()
        });
        let (mut player, mut player_rx) = connection(&server);
        let (mut observer, mut observer_rx) = connection(&server);

        player.handle(signed_join("arena", ViewRole::Player, "hunter-a", PLAYER_WALLET)).await;
        observer.handle(signed_join("arena", ViewRole::Observer, "hunter-b", OBSERVER_WALLET)).await;
        assert!(matches!(player_rx.recv().await, Some(ServerMessage::Joined(_))));
        assert!(matches!(observer_rx.recv().await, Some(ServerMessage::Joined(_))));
        assert!(player.joined.as_ref().unwrap().scores.is_some());
        assert!(observer.joined.as_ref().unwrap().scores.is_none());

        // Standing still, the hunter is overrun within a few game seconds
        player.handle(ClientMessage::Start).await;
        let over = async {
            loop {
                match player_rx.recv().await {
                    Some(ServerMessage::GameOver { .. }) => return,
                    Some(_) => {}
                    None => panic!("player connection closed"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(20), over).await.expect("game never ended");

        let player_address: PlayerAddress = PLAYER_WALLET.parse().unwrap();
        let observer_address: PlayerAddress = OBSERVER_WALLET.parse().unwrap();
        let ledger = server.ledger().clone();
        tokio::time::timeout(Duration::from_secs(2), async {
            while ledger.player_history(&player_address).is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }).await.expect("player score never recorded");

        assert!(ledger.player_history(&observer_address).is_empty());
        assert_eq!(ledger.total_players(), 1);

        player.leave().await;
        observer.leave().await;
        assert_eq!(server.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_websocket_roundtrip() {
        let server = Arc::new(GameServer::new(anonymous_config()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let running = server.clone();
        let serve = tokio::spawn(async move { running.serve(listener).await });

        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        ws.send(WsMessage::Text(join("ws", ViewRole::Player).to_json().unwrap())).await.unwrap();

        let mut joined = false;
        let mut snapshot = false;
        while !(joined && snapshot) {
            let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let WsMessage::Text(text) = frame {
                match ServerMessage::from_json(&text).unwrap() {
                    ServerMessage::Joined(_) => joined = true,
                    ServerMessage::State { .. } => snapshot = true,
                    _ => {}
                }
            }
        }

        server.shutdown();
        serve.await.unwrap().unwrap();
        assert_eq!(server.session_count().await, 0);
    }
}
