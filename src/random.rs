//! Random sampling used by the solver.
//!
//! Every sampler borrows the generator it draws from, so callers decide the
//! stream discipline. [`stream_rng`] gives one reproducible stream per cell.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Poisson};

use crate::state::Population;

const DEFAULT_SEED: u64 = 0xDEADBEEFCAFEBABE;

/// Uniform draw on `(0, 1)`, floored away from zero so `ln(1/u)` stays finite.
#[inline]
pub fn uniform01<G: Rng + ?Sized>(rng: &mut G) -> f64 {
    let u: f64 = rng.r#gen();
    u.max(f64::MIN_POSITIVE)
}

/// Poisson draw with the given mean. Non-positive or non-finite means give zero events.
#[inline]
pub fn poisson<G: Rng + ?Sized>(rng: &mut G, mean: f64) -> Population {
    if !mean.is_finite() || mean <= 0.0 {
        return 0;
    }
    match Poisson::new(mean) {
        Ok(dist) => {
            let draw: f64 = dist.sample(rng);
            draw as Population
        }
        Err(_) => 0,
    }
}

/// SplitMix64 mix of a base seed and a stream index.
pub fn derive_seed(seed: Option<u64>, stream: u64) -> u64 {
    const GOLDEN_GAMMA: u64 = 0x9E3779B97F4A7C15;
    let base = seed.unwrap_or(DEFAULT_SEED);
    let mut z = base ^ (stream.wrapping_mul(GOLDEN_GAMMA));
    z = z.wrapping_add(GOLDEN_GAMMA);
    let mut result = z;
    result = (result ^ (result >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    result = (result ^ (result >> 27)).wrapping_mul(0x94D049BB133111EB);
    result ^ (result >> 31)
}

pub fn stream_rng(seed: Option<u64>, stream: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(derive_seed(seed, stream))
}
