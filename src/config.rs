//! Harness configuration
//!
//! One [`HarnessConfig`] governs a single invocation of the retry loop:
//! which seeds are tried, how large the retry budget is, and which of the
//! seed and failure policies apply.
//!
//! # Example
//!
//! ```rust
//! use anomaly_sweep::config::{HarnessConfig, SeedPolicy};
//!
//! let config = HarnessConfig::from_json_str(
//!     r#"{ "max_seed": 3, "seed_policy": "all_seeds" }"#,
//! )?;
//! assert_eq!(config.seeds(), vec![1, 2, 3]);
//! assert_eq!(config.max_tries(), 30);
//! assert_eq!(config.seed_policy, SeedPolicy::AllSeeds);
//! # Ok::<(), anomaly_sweep::Error>(())
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::identity::DEFAULT_PRECISION;
use crate::{Error, Result};

/// Default retry multiplier: `max_tries = 10 * max_seed`.
pub const DEFAULT_TRIES_PER_SEED: u64 = 10;

/// How many seeds a single parameter draw is fit for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedPolicy {
    /// Stop after the first seed that reaches the fit pipeline.
    ///
    /// A duplicate on that seed throws the draw away and resamples, so at
    /// most one experiment is run per invocation.
    #[default]
    FirstSeedOnly,
    /// Fit every seed that has no record yet for the drawn configuration.
    AllSeeds,
}

/// What a failed fit does to the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitFailurePolicy {
    /// A failed fit ends the invocation like a successful one.
    #[default]
    Terminal,
    /// A failed fit consumes one try and the loop draws again.
    Resample,
}

/// Whether failed fits leave a record behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureRecordPolicy {
    /// Nothing is committed; a later invocation may retry the same draw.
    #[default]
    Discard,
    /// The failure record is committed, so later invocations skip the
    /// configuration as a duplicate.
    Persist,
}

/// Configuration for one harness invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Highest seed; default seeds are `1..=max_seed`.
    pub max_seed: u64,
    /// Explicit seed list overriding `1..=max_seed`.
    pub seeds: Option<Vec<u64>>,
    /// Retry multiplier per seed.
    pub tries_per_seed: u64,
    /// Seed handling per draw.
    pub seed_policy: SeedPolicy,
    /// Loop behaviour after a failed fit.
    pub fit_failure: FitFailurePolicy,
    /// Whether failed fits are committed.
    pub failure_records: FailureRecordPolicy,
    /// Significant digits for floats in identity keys.
    pub precision: usize,
    /// Seed for the configuration sampler; entropy when absent.
    pub sampler_seed: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            max_seed: 1,
            seeds: None,
            tries_per_seed: DEFAULT_TRIES_PER_SEED,
            seed_policy: SeedPolicy::default(),
            fit_failure: FitFailurePolicy::default(),
            failure_records: FailureRecordPolicy::default(),
            precision: DEFAULT_PRECISION,
            sampler_seed: None,
        }
    }
}

impl HarnessConfig {
    /// Create a configuration for seeds `1..=max_seed` with default policies.
    #[must_use]
    pub fn new(max_seed: u64) -> Self {
        Self {
            max_seed,
            ..Self::default()
        }
    }

    /// Restrict the invocation to an explicit list of seeds.
    #[must_use]
    pub fn with_seeds(mut self, seeds: Vec<u64>) -> Self {
        self.seeds = Some(seeds);
        self
    }

    /// Set the retry multiplier.
    #[must_use]
    pub const fn with_tries_per_seed(mut self, tries_per_seed: u64) -> Self {
        self.tries_per_seed = tries_per_seed;
        self
    }

    /// Set the seed policy.
    #[must_use]
    pub const fn with_seed_policy(mut self, policy: SeedPolicy) -> Self {
        self.seed_policy = policy;
        self
    }

    /// Set the fit failure policy.
    #[must_use]
    pub const fn with_fit_failure(mut self, policy: FitFailurePolicy) -> Self {
        self.fit_failure = policy;
        self
    }

    /// Set the failure record policy.
    #[must_use]
    pub const fn with_failure_records(mut self, policy: FailureRecordPolicy) -> Self {
        self.failure_records = policy;
        self
    }

    /// Set the float precision of identity keys.
    #[must_use]
    pub const fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    /// Fix the sampler seed.
    #[must_use]
    pub const fn with_sampler_seed(mut self, seed: u64) -> Self {
        self.sampler_seed = Some(seed);
        self
    }

    /// Seeds tried for every draw, in order.
    #[must_use]
    pub fn seeds(&self) -> Vec<u64> {
        self.seeds
            .clone()
            .unwrap_or_else(|| (1..=self.max_seed).collect())
    }

    /// Retry budget bound: `tries_per_seed * max_seed`.
    #[must_use]
    pub const fn max_tries(&self) -> u64 {
        self.tries_per_seed.saturating_mul(self.max_seed)
    }

    /// Check the configuration for values the harness cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.max_seed == 0 {
            return Err(Error::InvalidConfig("max_seed must be at least 1".to_string()));
        }
        if self.tries_per_seed == 0 {
            return Err(Error::InvalidConfig(
                "tries_per_seed must be at least 1".to_string(),
            ));
        }
        if self.precision == 0 {
            return Err(Error::InvalidConfig("precision must be at least 1".to_string()));
        }
        if let Some(seeds) = &self.seeds {
            if seeds.is_empty() {
                return Err(Error::InvalidConfig("seed list is empty".to_string()));
            }
            let mut sorted = seeds.clone();
            sorted.sort_unstable();
            if sorted.windows(2).any(|pair| pair[0] == pair[1]) {
                return Err(Error::InvalidConfig(format!(
                    "seed list {seeds:?} contains duplicates"
                )));
            }
        }
        Ok(())
    }

    /// Parse and validate a configuration from JSON.
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or fails [`validate`](Self::validate).
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or its contents are invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();
        assert_eq!(config.max_seed, 1);
        assert_eq!(config.max_tries(), 10);
        assert_eq!(config.seed_policy, SeedPolicy::FirstSeedOnly);
        assert_eq!(config.fit_failure, FitFailurePolicy::Terminal);
        assert_eq!(config.failure_records, FailureRecordPolicy::Discard);
        assert_eq!(config.precision, DEFAULT_PRECISION);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_seed_override() {
        let config = HarnessConfig::new(4);
        assert_eq!(config.seeds(), vec![1, 2, 3, 4]);
        assert_eq!(config.max_tries(), 40);

        let scoped = config.with_seeds(vec![2]);
        assert_eq!(scoped.seeds(), vec![2]);
        // Budget still follows max_seed
        assert_eq!(scoped.max_tries(), 40);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(HarnessConfig::new(0).validate().is_err());
        assert!(HarnessConfig::new(1).with_tries_per_seed(0).validate().is_err());
        assert!(HarnessConfig::new(1).with_precision(0).validate().is_err());
        assert!(HarnessConfig::new(2).with_seeds(vec![]).validate().is_err());
        assert!(HarnessConfig::new(2).with_seeds(vec![1, 1]).validate().is_err());
    }

    #[test]
    fn test_from_json_partial() {
        let config = HarnessConfig::from_json_str(
            r#"{"max_seed": 2, "fit_failure": "resample", "failure_records": "persist", "sampler_seed": 7}"#,
        )
        .unwrap();
        assert_eq!(config.max_seed, 2);
        assert_eq!(config.fit_failure, FitFailurePolicy::Resample);
        assert_eq!(config.failure_records, FailureRecordPolicy::Persist);
        assert_eq!(config.sampler_seed, Some(7));
        assert_eq!(config.tries_per_seed, DEFAULT_TRIES_PER_SEED);
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        assert!(matches!(
            HarnessConfig::from_json_str(r#"{"max_seed": 0}"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            HarnessConfig::from_json_str(r#"{"seed_policy": "sometimes"}"#),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.json");
        let config = HarnessConfig::new(3).with_seed_policy(SeedPolicy::AllSeeds);
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        assert_eq!(HarnessConfig::from_file(&path).unwrap(), config);
        assert!(matches!(
            HarnessConfig::from_file(dir.path().join("missing.json")),
            Err(Error::Io(_))
        ));
    }
}
