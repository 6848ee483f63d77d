//! Monad Hunter Game Server
//!
//! Runs the WebSocket server, or `demo` for a headless session that plays
//! itself and checks the replay audit at the end.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use monad_hunter::{
    TICK_RATE, VERSION,
    network::{
        auth::AuthConfig,
        clock::{Clock, SystemClock},
        session::{Credentials, SessionConfig, SessionManager, ViewRole},
        GameServer, ServerConfig,
    },
    view::{GameView, TraceRenderer},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Monad Hunter Server v{}", VERSION);
    info!("Tick Rate: {} Hz", TICK_RATE);

    match std::env::args().nth(1).as_deref() {
        Some("demo") => demo_session().await,
        _ => run_server().await,
    }
}

async fn run_server() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();
    if !config.auth.is_configured() && !config.auth.allow_anonymous {
        warn!("No AUTH_SECRET or AUTH_PUBLIC_KEY_PEM set and AUTH_ALLOW_ANONYMOUS is off; every join will be refused");
    }

    let server = Arc::new(GameServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            signal_server.shutdown();
        }
    });

    server.run().await.context("game server failed")?;
    info!("Server stopped");
    Ok(())
}

/// Play one headless session with a scripted view, then audit it.
async fn demo_session() -> anyhow::Result<()> {
    info!("=== Starting Demo Session ===");

    let config = SessionConfig {
        auth: AuthConfig { allow_anonymous: true, ..Default::default() },
        ..Default::default()
    };
    let game_config = config.game.clone();
    let manager = SessionManager::new(config);

    let admission = manager.join_view("demo", &Credentials::new("demo"), ViewRole::Player).await?;
    let mut view = GameView::new(admission.link, Arc::new(SystemClock), TraceRenderer::default());

    view.start()?;

    let started = SystemClock.now_ms();
    let mut step: u32 = 0;
    let mut ticker = tokio::time::interval(Duration::from_millis(50));

    // Circle the arena and keep firing until the game ends or time runs out
    while view.last_game_over().is_none() && SystemClock.now_ms().saturating_sub(started) < 30_000 {
        ticker.tick().await;
        let angle = f64::from(step) * 0.1;
        view.send_move(angle.cos(), angle.sin())?;
        view.shoot()?;
        view.poll();
        if let Some(&upgrade) = view.upgrade_offer().first() {
            info!(?upgrade, "Taking upgrade");
            view.choose_upgrade(upgrade)?;
        }
        view.advance(0.05);
        step += 1;
    }

    if let Some(summary) = view.last_game_over() {
        info!(level = summary.level, kills = summary.kill_count, time = summary.game_time, "Demo game over");
    } else if let Some(state) = view.latest() {
        info!(level = state.level, kills = state.kill_count, health = state.health, "Demo time limit reached");
    }
    info!("Frames rendered: {}", view.renderer().frames());

    // Tear down and audit the recorded inputs against the live Model
    let record = manager
        .remove("demo")
        .await
        .context("demo session produced no audit record")?;
    let latest = record.latest().context("demo session recorded no game")?;
    info!("Recorded ticks: {}", latest.log.ticks.len());
    info!("Final State Hash: {}", hex::encode(latest.final_hash));

    if record.verify(&game_config) {
        info!("DETERMINISM VERIFIED: replay reproduces the live run");
    } else {
        warn!("DETERMINISM FAILURE: replay diverged");
    }
    Ok(())
}
