use anakin_core::PrngKey;
use rand::Rng;

/// Draws `n` indices in `[0, size)` uniformly with replacement.
pub fn sample_indices(key: PrngKey, size: usize, n: usize) -> Vec<u32> {
    let mut rng = key.rng();
    (0..n).map(|_| rng.gen_range(0..size) as u32).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_indices_are_in_range() {
        let size = 16 * 4;
        for key in PrngKey::new(0).split_n(64) {
            let idx = sample_indices(key, size, 512);
            assert_eq!(idx.len(), 512);
            assert!(idx.iter().all(|&i| (i as usize) < size));
        }
    }

    #[test]
    fn test_draws_with_replacement() {
        // With 64 draws from 64 elements a duplicate is all but certain.
        let with_duplicates = PrngKey::new(1)
            .split_n(32)
            .into_iter()
            .filter(|&key| {
                let idx = sample_indices(key, 64, 64);
                idx.iter().collect::<HashSet<_>>().len() < idx.len()
            })
            .count();
        assert!(with_duplicates > 0);
    }

    #[test]
    fn test_keyed() {
        let (k1, k2) = PrngKey::new(2).split();
        assert_eq!(sample_indices(k1, 100, 20), sample_indices(k1, 100, 20));
        assert_ne!(sample_indices(k1, 100, 20), sample_indices(k2, 100, 20));
    }
}
