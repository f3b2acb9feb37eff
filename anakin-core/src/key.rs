//! Splittable random keys.
//!
//! A [`PrngKey`] is an immutable value. Randomness is never drawn from a key
//! twice for different purposes: a key is either split into child keys or turned
//! into a generator with [`PrngKey::rng`], in the same way as the update step
//! threads one key through collection, sampling and loss evaluation.
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64_with_seed;

const RNG_DOMAIN: &[u8] = b"anakin/rng";

/// A counter-based splittable key.
///
/// The `i`-th child of a key is a hash of the counter `i` seeded by the parent,
/// so splitting is deterministic and independent of the order in which children
/// are consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrngKey(u64);

impl PrngKey {
    /// Creates a root key from a seed.
    pub fn new(seed: u64) -> Self {
        Self(xxh3_64_with_seed(&seed.to_le_bytes(), 0))
    }

    /// Splits the key into `n` independent keys.
    pub fn split_n(self, n: usize) -> Vec<Self> {
        (0..n as u64)
            .map(|i| Self(xxh3_64_with_seed(&i.to_le_bytes(), self.0)))
            .collect()
    }

    /// Splits the key into two keys.
    pub fn split(self) -> (Self, Self) {
        let ks = self.split_n(2);
        (ks[0], ks[1])
    }

    /// Splits the key into four keys.
    pub fn split4(self) -> (Self, Self, Self, Self) {
        let ks = self.split_n(4);
        (ks[0], ks[1], ks[2], ks[3])
    }

    /// Returns a random number generator seeded from the key.
    pub fn rng(self) -> StdRng {
        StdRng::seed_from_u64(xxh3_64_with_seed(RNG_DOMAIN, self.0))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::Rng;
    use std::collections::HashSet;

    #[test]
    fn test_split_is_deterministic() {
        let key = PrngKey::new(42);
        assert_eq!(key.split_n(8), key.split_n(8));
        assert_eq!(key.split(), PrngKey::new(42).split());
    }

    #[test]
    fn test_children_are_distinct() {
        let key = PrngKey::new(0);
        let children: HashSet<_> = key.split_n(1024).into_iter().collect();
        assert_eq!(children.len(), 1024);
        assert!(!children.contains(&key));
    }

    #[test]
    fn test_rng_differs_from_children() {
        let (k1, k2) = PrngKey::new(7).split();
        let x1: u64 = k1.rng().gen();
        let x2: u64 = k2.rng().gen();
        assert_ne!(x1, x2);
        assert_eq!(x1, k1.rng().gen::<u64>());
    }
}
