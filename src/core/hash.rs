//! State Hashing
//!
//! SHA-256 digests of game states and input logs. The replay audit
//! compares these, so the byte layout fed to the hasher is a format:
//! integers little-endian, collections length-prefixed, options tagged.

use sha2::{Digest, Sha256};

use super::vec2::FixedVec2;

/// 32-byte digest.
pub type StateHash = [u8; 32];

/// What is being hashed. Each domain gets its own prefix so a state and a
/// log can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashDomain {
    /// A `GameState`
    GameState,
    /// An `InputLog`
    InputLog,
}

impl HashDomain {
    fn tag(self) -> &'static [u8] {
        match self {
            HashDomain::GameState => b"MONAD_HUNTER_STATE_V2",
            HashDomain::InputLog => b"MONAD_HUNTER_INPUTS_V2",
        }
    }
}

/// Something with a canonical byte encoding for hashing.
pub trait StateField {
    /// Feed this value into `hasher`.
    fn feed(&self, hasher: &mut StateHasher);
}

/// Incremental hasher. Call order is part of the format.
pub struct StateHasher(Sha256);

impl StateHasher {
    /// Start a digest in `domain`.
    pub fn new(domain: HashDomain) -> Self {
        Self(Sha256::new_with_prefix(domain.tag()))
    }

    /// Feed one value.
    pub fn put<T: StateField + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.feed(self);
        self
    }

    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    /// Finish the digest.
    pub fn finalize(self) -> StateHash {
        self.0.finalize().into()
    }
}

macro_rules! le_field {
    ($($ty:ty),*) => {
        $(impl StateField for $ty {
            fn feed(&self, hasher: &mut StateHasher) {
                hasher.write(&self.to_le_bytes());
            }
        })*
    };
}

le_field!(u8, u32, u64, i32);

impl StateField for bool {
    fn feed(&self, hasher: &mut StateHasher) {
        hasher.put(&u8::from(*self));
    }
}

impl StateField for FixedVec2 {
    fn feed(&self, hasher: &mut StateHasher) {
        hasher.put(&self.x).put(&self.y);
    }
}

impl<const N: usize> StateField for [u8; N] {
    fn feed(&self, hasher: &mut StateHasher) {
        hasher.write(self);
    }
}

impl StateField for str {
    fn feed(&self, hasher: &mut StateHasher) {
        hasher.put(&(self.len() as u32));
        hasher.write(self.as_bytes());
    }
}

impl<T: StateField> StateField for Option<T> {
    fn feed(&self, hasher: &mut StateHasher) {
        match self {
            Some(value) => hasher.put(&true).put(value),
            None => hasher.put(&false),
        };
    }
}

impl<T: StateField> StateField for [T] {
    fn feed(&self, hasher: &mut StateHasher) {
        hasher.put(&(self.len() as u32));
        for item in self {
            hasher.put(item);
        }
    }
}

impl<T: StateField> StateField for Vec<T> {
    fn feed(&self, hasher: &mut StateHasher) {
        hasher.put(self.as_slice());
    }
}

/// Short hex prefix of a hash, for log lines.
pub fn short_hex(hash: &StateHash) -> String {
    hex::encode(&hash[..6])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::px;

    fn digest(build: impl FnOnce(&mut StateHasher)) -> StateHash {
        let mut hasher = StateHasher::new(HashDomain::GameState);
        build(&mut hasher);
        hasher.finalize()
    }

    #[test]
    fn test_same_fields_same_hash() {
        let build = |h: &mut StateHasher| {
            h.put(&42u32).put(&FixedVec2::from_ints(400, 300)).put(&true);
        };
        assert_eq!(digest(build), digest(build));
    }

    #[test]
    fn test_domains_are_separated() {
        let mut log = StateHasher::new(HashDomain::InputLog);
        log.put(&1u32);
        assert_ne!(digest(|h| { h.put(&1u32); }), log.finalize());
    }

    #[test]
    fn test_field_order_matters() {
        let a = digest(|h| { h.put(&px(1)).put(&px(2)); });
        let b = digest(|h| { h.put(&px(2)).put(&px(1)); });
        assert_ne!(a, b);
    }

    #[test]
    fn test_collections_are_length_prefixed() {
        // Without prefixes these would feed identical bytes
        let split = digest(|h| { h.put(&vec![1u32]).put(&vec![2u32, 3]); });
        let moved = digest(|h| { h.put(&vec![1u32, 2]).put(&vec![3u32]); });
        assert_ne!(split, moved);

        let some_zero = digest(|h| { h.put(&Some(0u32)); });
        let none = digest(|h| { h.put(&None::<u32>); });
        assert_ne!(some_zero, none);
        assert_eq!(short_hex(&none).len(), 12);
    }
}
