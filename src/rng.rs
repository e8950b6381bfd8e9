//! Randomness injection for the render thread.
//!
//! Every stochastic decision in the engine (voice selection, duration
//! jitter, ripple probability, grain detune) goes through a
//! [`RandomSource`] owned by the engine. Hosts that want reproducible
//! renders hand in a seeded source; everything else defaults to
//! [`SmallRngSource::from_entropy`].

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

pub trait RandomSource: Send {
    /// Uniform sample in `[0, 1)`.
    fn next_f32(&mut self) -> f32;

    /// Uniform sample in `[lo, hi)`.
    fn range(&mut self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.next_f32()
    }

    /// Bernoulli trial with the given probability of `true`.
    fn chance(&mut self, probability: f32) -> bool {
        self.next_f32() < probability
    }
}

/// Production source backed by `rand`'s non-cryptographic small RNG.
pub struct SmallRngSource(SmallRng);

impl SmallRngSource {
    pub fn seeded(seed: u64) -> Self {
        Self(SmallRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self(SmallRng::from_entropy())
    }
}

impl RandomSource for SmallRngSource {
    fn next_f32(&mut self) -> f32 {
        self.0.gen::<f32>()
    }
}

/// Source that always returns the same value. With `0.0` every weighted
/// draw lands on the first candidate with positive weight, which makes
/// scheduling scenarios deterministic in tests.
pub struct ConstSource(pub f32);

impl RandomSource for ConstSource {
    fn next_f32(&mut self) -> f32 {
        self.0.clamp(0.0, 0.999_999)
    }
}
