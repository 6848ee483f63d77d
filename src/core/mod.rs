//! Core deterministic primitives.
//!
//! Everything the simulation computes is built from these types, so
//! two runs with the same seed and inputs agree bit for bit.

pub mod fixed;
pub mod vec2;
pub mod rng;
pub mod hash;

pub use fixed::{Fixed, FIXED_ONE, FIXED_HALF, FIXED_SCALE};
pub use vec2::FixedVec2;
pub use rng::DeterministicRng;
pub use hash::{HashDomain, StateField, StateHash, StateHasher};
