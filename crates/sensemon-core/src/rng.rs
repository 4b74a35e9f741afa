//! Small seedable random source
//!
//! The sparkle animation and the synthetic sensor fallback only need cheap,
//! reproducible noise, so this is a plain xorshift64* generator behind the
//! `rand_core` traits. Tests seed it with a fixed value; the binary seeds it
//! from the wall clock.

use rand_core::{RngCore, SeedableRng, impls};

/// Used when a caller hands in an all-zero seed, which would lock xorshift at 0.
const FALLBACK_STATE: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone)]
pub struct SparkleRng {
    state: u64,
}

impl SparkleRng {
    /// Uniform value in `0..bound`. Returns 0 for an empty range.
    pub fn below(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        // Multiply-shift keeps the bias negligible for the tiny bounds used here.
        ((u64::from(self.next_u32()) * u64::from(bound)) >> 32) as u32
    }

    /// Uniform value in `min..=max` with `0.1` resolution.
    pub fn tenths_between(&mut self, min: f32, max: f32) -> f32 {
        let steps = ((max - min) * 10.0) as u32;
        min + self.below(steps + 1) as f32 / 10.0
    }

    /// True with probability `numerator / denominator`.
    pub fn chance(&mut self, numerator: u32, denominator: u32) -> bool {
        self.below(denominator) < numerator
    }
}

impl RngCore for SparkleRng {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        impls::fill_bytes_via_next(self, dst)
    }
}

impl SeedableRng for SparkleRng {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        let state = u64::from_le_bytes(seed);
        Self {
            state: if state == 0 { FALLBACK_STATE } else { state },
        }
    }
}
