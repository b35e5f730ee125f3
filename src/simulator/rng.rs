use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded random source; the same seed always yields the same workload
pub struct DeterministicRng {
    rng: ChaCha8Rng,
    seed: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        DeterministicRng {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Uniform in `min..max`; `min` when the range is empty
    pub fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..max)
    }

    pub fn gen_bool(&mut self, probability: f64) -> bool {
        self.rng.gen_bool(probability.clamp(0.0, 1.0))
    }

    /// Uniform index into a collection of `len` elements; 0 when empty
    pub fn index(&mut self, len: usize) -> usize {
        self.gen_range(0, len as u64) as usize
    }

    /// Index biased toward 0 (hot keys); `exponent` 1.0 is uniform
    pub fn skewed_index(&mut self, len: usize, exponent: f64) -> usize {
        if len == 0 {
            return 0;
        }
        let u: f64 = self.rng.gen_range(0.0..1.0);
        let idx = (u.powf(exponent) * len as f64) as usize;
        idx.min(len - 1)
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.index(items.len());
        items.get(idx)
    }
}
