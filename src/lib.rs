//! # Monad Hunter Game Server
//!
//! Deterministic, server-authoritative core for Monad Hunter.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   MONAD HUNTER SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── fixed.rs    - Q16.16 fixed-point arithmetic             │
//! │  ├── vec2.rs     - 2D vector with fixed-point                │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── hash.rs     - State hashing for verification            │
//! │                                                              │
//! │  game/           - Game logic (deterministic)                │
//! │  ├── input.rs    - Wire inputs and validation                │
//! │  ├── state.rs    - Game state and entities                   │
//! │  ├── tick.rs     - Authoritative simulation step             │
//! │  ├── behavior.rs - Enemy kinds                               │
//! │  ├── spawn.rs    - Spawn policy                              │
//! │  ├── collision.rs- Collision detection                       │
//! │  ├── upgrade.rs  - Level-up upgrade offers                   │
//! │  ├── model.rs    - The Model (inbox, controls, snapshots)    │
//! │  └── replay.rs   - Per-game input logs and replay audit      │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── auth.rs     - Join token verification                   │
//! │  ├── channel.rs  - Topic pub/sub                             │
//! │  ├── driver.rs   - Fixed-period tick driver                  │
//! │  ├── session.rs  - Session lifecycle                         │
//! │  ├── server.rs   - WebSocket bridge                          │
//! │  └── protocol.rs - Message types                             │
//! │                                                              │
//! │  view/           - View adapter and render frames            │
//! │  ledger/         - Score ledger                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are **100% deterministic**:
//! - No floating-point arithmetic in game logic (wire directions are
//!   quantized once, at validation)
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies; receipt time arrives with each envelope
//! - All randomness from seeded Xorshift128+
//!
//! Given the same input log, replay lands on the same state hash.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod view;
pub mod ledger;

// Re-export commonly used types
pub use core::fixed::{Fixed, FIXED_ONE, FIXED_HALF, FIXED_SCALE};
pub use core::vec2::FixedVec2;
pub use core::rng::DeterministicRng;
pub use game::{GameConfig, GameModel, GameState, PlayerInput, ViewId};
pub use network::{Channel, GameSession, SessionManager};
pub use view::GameView;
pub use ledger::{MemoryLedger, ScoreLedger};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 60;
