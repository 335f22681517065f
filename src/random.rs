//! Random Streams for Stochastic Layers
//!
//! Dropout draws one Bernoulli trial per unit per sample. Samples are
//! processed in parallel, so each sample needs its own generator. A single
//! master generator hands out one seed per sample, in sample order, before
//! any parallel work starts:
//!
//! ```text
//! master StdRng ──► seed₀ ──► StdRng (sample 0)
//!               ──► seed₁ ──► StdRng (sample 1)
//!               ──► ...
//! ```
//!
//! The resulting masks depend only on the master seed and the number of
//! previous draws, never on thread scheduling.

use rand::distributions::{Bernoulli, Distribution};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// Source of independent per-sample generators
#[derive(Clone, Debug)]
pub struct SeedStream {
    master: StdRng,
}

impl SeedStream {
    /// Create a stream with a fixed seed (reproducible masks)
    pub fn from_seed(seed: u64) -> Self {
        Self {
            master: StdRng::seed_from_u64(seed),
        }
    }

    /// Create a stream seeded from the thread-local entropy source
    pub fn from_entropy() -> Self {
        Self::from_seed(rand::thread_rng().gen())
    }

    /// Draw `count` generators, one per sample
    pub fn split(&mut self, count: usize) -> Vec<StdRng> {
        (0..count)
            .map(|_| StdRng::seed_from_u64(self.master.next_u64()))
            .collect()
    }
}

/// Single pass/fail draw that succeeds with probability `p`
///
/// # Example
///
/// ```rust
/// use gatenet::random::BernoulliSampler;
/// use rand::SeedableRng;
///
/// let sampler = BernoulliSampler::new(0.25).unwrap();
/// let mut rng = rand::rngs::StdRng::seed_from_u64(1);
/// let hits = (0..10_000).filter(|_| sampler.draw(&mut rng)).count();
/// assert!((2_000..3_000).contains(&hits));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct BernoulliSampler {
    dist: Bernoulli,
}

impl BernoulliSampler {
    /// Create a sampler; `None` unless `p` lies in `[0, 1]`
    pub fn new(p: f32) -> Option<Self> {
        Bernoulli::new(f64::from(p)).ok().map(|dist| Self { dist })
    }

    #[inline]
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        self.dist.sample(rng)
    }
}
