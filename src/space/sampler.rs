//! Uniform random configuration draws

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Configuration, ParamValue, SearchSpace};

/// Draws configurations from a [`SearchSpace`].
///
/// Independent parameters are drawn uniformly from their grids in
/// canonical (name) order; derived parameters are then computed from their
/// controller. The only side effect is RNG advancement, so the sampler can
/// be re-invoked on every collision.
#[derive(Debug, Clone)]
pub struct ConfigSampler {
    rng: StdRng,
}

impl ConfigSampler {
    /// Deterministic sampler for a given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Sampler seeded from OS entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Draw one configuration.
    pub fn sample(&mut self, space: &SearchSpace) -> Configuration {
        let mut config = Configuration::new();
        for (name, rule) in space.independent() {
            let index = self.rng.gen_range(0..rule.grid_len());
            if let Some(value) = rule.grid_value(index) {
                config = config.with(name, value);
            }
        }
        for (name, rule) in space.derived() {
            let count = rule
                .controller()
                .and_then(|controller| config.get_int(controller))
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(0);
            if let Some(value) = rule.derive(count) {
                config = config.with(name, value);
            }
        }
        config
    }
}

impl Default for ConfigSampler {
    fn default() -> Self {
        Self::from_entropy()
    }
}

/// Length of a sequence-valued parameter, if it is one.
#[must_use]
pub fn seq_len(value: &ParamValue) -> Option<usize> {
    value.as_seq().map(<[ParamValue]>::len)
}
