//! Seed management and dice helpers for tile generation.
//!
//! Each tile gets its own deterministic RNG derived from a master seed and
//! the tile's world coordinates, so regenerating a tile is reproducible
//! and independent tiles can be generated in parallel.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Derive a sub-seed from a master seed and a system name.
pub fn derive_seed(master: u64, system: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    master.hash(&mut hasher);
    system.hash(&mut hasher);
    hasher.finish()
}

/// Mix a master seed with tile coordinates into a per-tile seed.
pub fn tile_seed(master: u64, x: u64, y: u64) -> u64 {
    let mut h = master;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h ^= x;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h ^= y;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h
}

/// Build the RNG for one tile generation run.
pub fn tile_rng(master: u64, x: u64, y: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(tile_seed(master, x, y))
}

/// True with probability 1 in `n`. `n <= 1` always succeeds.
pub fn one_in(rng: &mut impl Rng, n: u32) -> bool {
    n <= 1 || rng.gen_range(0..n) == 0
}

/// True with probability `x` in `y`.
pub fn x_in_y(rng: &mut impl Rng, x: u32, y: u32) -> bool {
    y > 0 && rng.gen_range(0..y) < x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_seed_deterministic() {
        assert_eq!(tile_seed(12345, 3, 7), tile_seed(12345, 3, 7));
        assert_ne!(tile_seed(12345, 3, 7), tile_seed(12345, 7, 3));
        assert_ne!(tile_seed(12345, 3, 7), tile_seed(54321, 3, 7));
    }

    #[test]
    fn test_derive_seed_varies_by_system() {
        assert_ne!(derive_seed(42, "tiles"), derive_seed(42, "overmap"));
        assert_eq!(derive_seed(42, "tiles"), derive_seed(42, "tiles"));
    }

    #[test]
    fn test_one_in_edge_cases() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(one_in(&mut rng, 0));
        assert!(one_in(&mut rng, 1));
        // 1-in-2 over many rolls lands near half
        let hits = (0..10_000).filter(|_| one_in(&mut rng, 2)).count();
        assert!(hits > 4_500 && hits < 5_500);
    }

    #[test]
    fn test_x_in_y_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(!x_in_y(&mut rng, 5, 0));
        assert!(x_in_y(&mut rng, 10, 10));
        let hits = (0..10_000).filter(|_| x_in_y(&mut rng, 1, 4)).count();
        assert!(hits > 2_000 && hits < 3_000);
    }
}
