//! Deterministic Random Number Generator
//!
//! Every random decision in a game (spawn edge and point, enemy kind, boss
//! bursts, upgrade offers) draws from one generator owned by the game
//! state. Seeds come from [`derive_session_seed`], so a game can be
//! rebuilt from its session id, app id and epoch alone.

use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

use super::fixed::{Fixed, FIXED_ONE};

/// Xorshift128+ with a SplitMix64-expanded seed.
///
/// ```
/// use monad_hunter::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(12345);
/// let mut b = DeterministicRng::new(12345);
/// assert_eq!(a.next_int(4), b.next_int(4));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    words: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Expand a 64-bit seed.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let words = [splitmix64(&mut s), splitmix64(&mut s)];

        // The all-zero state is a fixed point
        if words == [0, 0] {
            return Self { words: [1, 1] };
        }
        Self { words }
    }

    /// Next raw 64-bit output.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let [s0, mut s1] = self.words;
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.words = [s0.rotate_left(24) ^ s1 ^ (s1 << 16), s1.rotate_left(37)];
        result
    }

    /// Uniform in `[0, max)`; 0 when `max` is 0.
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        (self.next_u64() % u64::from(max)) as u32
    }

    /// Uniform fixed-point value in `[0, max)`.
    #[inline]
    pub fn next_fixed(&mut self, max: Fixed) -> Fixed {
        if max <= 0 {
            return 0;
        }
        let raw = (self.next_u64() >> 32) as u32;
        ((i64::from(raw) * i64::from(max)) >> 32) as Fixed
    }

    /// True with `probability` out of `FIXED_ONE`.
    #[inline]
    pub fn next_bool(&mut self, probability: Fixed) -> bool {
        self.next_fixed(FIXED_ONE) < probability
    }

    /// Fisher-Yates shuffle in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_int(i as u32 + 1) as usize;
            items.swap(i, j);
        }
    }

    /// Internal state, for state hashing.
    pub fn words(&self) -> [u64; 2] {
        self.words
    }
}

#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Seed for game `epoch` of a session.
///
/// Each restart bumps the epoch, so every game gets its own arena while
/// staying reproducible. The app id keeps deployments apart even when
/// session ids collide.
pub fn derive_session_seed(session_id: &[u8; 16], app_id: &str, epoch: u32) -> u64 {
    let digest = Sha256::new()
        .chain_update(b"MONAD_HUNTER_SEED_V1")
        .chain_update(session_id)
        .chain_update((app_id.len() as u32).to_le_bytes())
        .chain_update(app_id.as_bytes())
        .chain_update(epoch.to_le_bytes())
        .finalize();

    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed)
}
