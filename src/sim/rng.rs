//! Seeded randomness for the generator algebra.
//!
//! One `SimRng` handle per engine run. Per-stream generators draw from a
//! stream-local `StdRng` derived from the base seed and the stream's index,
//! so each stream's sequence is a pure function of the seed no matter how
//! the scheduler interleaves streams.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};

/// Stream-local RNG handle shared by a stream's generators.
pub type SharedRng = Arc<Mutex<StdRng>>;

/// Engine-wide random source.
#[derive(Debug, Clone, Copy)]
pub struct SimRng {
    seed: Option<u64>,
}

impl SimRng {
    pub fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Derive the RNG for the stream at `index`.
    ///
    /// Seeds are spread with a golden-ratio multiply so neighboring indices
    /// land far apart in seed space. Without a base seed every stream gets an
    /// entropy-seeded RNG.
    pub fn derive(&self, index: u64) -> SharedRng {
        let rng = match self.seed {
            Some(base) => {
                StdRng::seed_from_u64(base.wrapping_add(index.wrapping_mul(0x9E3779B97F4A7C15)))
            }
            None => StdRng::from_entropy(),
        };
        Arc::new(Mutex::new(rng))
    }
}

/// Derive an independent sub-RNG from a single draw of `rng`.
///
/// Each field of a `json_fields` payload gets its own sub-RNG, so one
/// field's consumption never shifts a sibling field's draw sequence.
pub fn derive_field_rng(rng: &SharedRng) -> SharedRng {
    let seed: u64 = rng.lock().expect("stream rng poisoned").gen();
    Arc::new(Mutex::new(StdRng::seed_from_u64(seed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn draw(rng: &SharedRng, n: usize) -> Vec<u64> {
        let mut guard = rng.lock().unwrap();
        (0..n).map(|_| guard.gen()).collect()
    }

    #[test]
    fn test_same_seed_same_streams() {
        let a = SimRng::new(Some(42));
        let b = SimRng::new(Some(42));
        assert_eq!(draw(&a.derive(0), 8), draw(&b.derive(0), 8));
        assert_eq!(draw(&a.derive(3), 8), draw(&b.derive(3), 8));
    }

    #[test]
    fn test_streams_are_independent() {
        let rng = SimRng::new(Some(42));
        assert_ne!(draw(&rng.derive(0), 8), draw(&rng.derive(1), 8));
    }

    #[test]
    fn test_field_rngs_are_reproducible_and_distinct() {
        let a = SimRng::new(Some(9)).derive(1);
        let b = SimRng::new(Some(9)).derive(1);
        let a1 = derive_field_rng(&a);
        let a2 = derive_field_rng(&a);
        let b1 = derive_field_rng(&b);
        let b2 = derive_field_rng(&b);
        assert_eq!(draw(&a1, 4), draw(&b1, 4));
        assert_eq!(draw(&a2, 4), draw(&b2, 4));
        assert_ne!(draw(&a1, 4), draw(&a2, 4));
    }
}
