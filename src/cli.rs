//! Command line surface of a sweep driver
//!
//! ```text
//! sweep <MODEL> <MAX_SEED> <DATASET> [CONTAMINATION] [OPTIONS]
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{FailureRecordPolicy, FitFailurePolicy, HarnessConfig, SeedPolicy};
use crate::identity::DEFAULT_PRECISION;
use crate::space::format_significant;
use crate::Result;

/// Aux tag carrying a non-zero contamination rate.
pub const CONTAMINATION_TAG: &str = "contamination";

/// Arguments of one sweep invocation.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "sweep", version, about = "Deduplicated hyperparameter sweep")]
pub struct SweepArgs {
    /// Model whose search space is sampled
    pub model: String,

    /// Highest seed (seeds are 1..=MAX_SEED)
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    pub max_seed: u64,

    /// Dataset or category label
    pub dataset: String,

    /// Fraction of anomalies mixed into the training split
    #[arg(default_value_t = 0.0)]
    pub contamination: f64,

    /// Directory holding experiment records
    #[arg(long, default_value = "results")]
    pub store: PathBuf,

    /// JSON harness configuration; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Only try these seeds (repeatable)
    #[arg(long = "seed")]
    pub seeds: Vec<u64>,

    /// Retry multiplier: max tries = this * MAX_SEED
    #[arg(long)]
    pub tries_per_seed: Option<u64>,

    /// Fit every fresh seed of a draw instead of stopping after the first
    #[arg(long)]
    pub all_seeds: bool,

    /// Draw again after a failed fit instead of stopping
    #[arg(long)]
    pub resample_on_failure: bool,

    /// Commit failed fits so later runs skip them
    #[arg(long)]
    pub persist_failures: bool,

    /// Seed for the configuration sampler
    #[arg(long)]
    pub sampler_seed: Option<u64>,

    /// Before sampling, delete partial commits older than SECS
    #[arg(long, value_name = "SECS")]
    pub clean_partials: Option<u64>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl SweepArgs {
    /// Minimum age of partial commits to clean up, if cleanup was asked for.
    #[must_use]
    pub fn partial_cleanup_age(&self) -> Option<Duration> {
        self.clean_partials.map(Duration::from_secs)
    }

    /// Build and validate the harness configuration.
    ///
    /// # Errors
    ///
    /// Returns error if `--config` cannot be read or the result is invalid.
    pub fn to_config(&self) -> Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::from_file(path)?,
            None => HarnessConfig::default(),
        };
        config.max_seed = self.max_seed;
        if !self.seeds.is_empty() {
            config.seeds = Some(self.seeds.clone());
        }
        if let Some(tries) = self.tries_per_seed {
            config.tries_per_seed = tries;
        }
        if self.all_seeds {
            config.seed_policy = SeedPolicy::AllSeeds;
        }
        if self.resample_on_failure {
            config.fit_failure = FitFailurePolicy::Resample;
        }
        if self.persist_failures {
            config.failure_records = FailureRecordPolicy::Persist;
        }
        if let Some(seed) = self.sampler_seed {
            config.sampler_seed = Some(seed);
        }
        config.validate()?;
        Ok(config)
    }

    /// Identity tags implied by the arguments.
    ///
    /// A zero contamination adds no tag, so clean runs keep their plain keys.
    #[must_use]
    pub fn aux_tags(&self) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        if self.contamination != 0.0 {
            tags.insert(
                CONTAMINATION_TAG.to_string(),
                format_significant(self.contamination, DEFAULT_PRECISION),
            );
        }
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<SweepArgs, clap::Error> {
        SweepArgs::try_parse_from(std::iter::once("sweep").chain(args.iter().copied()))
    }

    #[test]
    fn test_positionals_and_defaults() {
        let args = parse(&["ae", "3", "mnist"]).unwrap();
        assert_eq!(args.model, "ae");
        assert_eq!(args.max_seed, 3);
        assert_eq!(args.dataset, "mnist");
        assert!(args.contamination.abs() < f64::EPSILON);
        assert_eq!(args.store, PathBuf::from("results"));
        assert!(args.aux_tags().is_empty());
        assert_eq!(args.partial_cleanup_age(), None);

        let config = args.to_config().unwrap();
        assert_eq!(config.seeds(), vec![1, 2, 3]);
        assert_eq!(config.max_tries(), 30);
        assert_eq!(config.seed_policy, SeedPolicy::FirstSeedOnly);
    }

    #[test]
    fn test_contamination_tag() {
        let args = parse(&["gan", "1", "cifar10", "0.05"]).unwrap();
        assert_eq!(args.aux_tags().get(CONTAMINATION_TAG).unwrap(), "0.05");
    }

    #[test]
    fn test_max_seed_must_be_positive() {
        assert!(parse(&["ae", "0", "mnist"]).is_err());
        assert!(parse(&["ae", "mnist"]).is_err());
    }

    #[test]
    fn test_flags_map_to_config() {
        let args = parse(&[
            "ocsvm",
            "4",
            "thyroid",
            "--seed",
            "2",
            "--seed",
            "4",
            "--tries-per-seed",
            "3",
            "--all-seeds",
            "--resample-on-failure",
            "--persist-failures",
            "--sampler-seed",
            "11",
            "-vv",
        ])
        .unwrap();
        assert_eq!(args.verbose, 2);

        let config = args.to_config().unwrap();
        assert_eq!(config.seeds(), vec![2, 4]);
        assert_eq!(config.max_tries(), 12);
        assert_eq!(config.seed_policy, SeedPolicy::AllSeeds);
        assert_eq!(config.fit_failure, FitFailurePolicy::Resample);
        assert_eq!(config.failure_records, FailureRecordPolicy::Persist);
        assert_eq!(config.sampler_seed, Some(11));
    }

    #[test]
    fn test_clean_partials_is_opt_in() {
        let args = parse(&["ae", "1", "mnist", "--clean-partials", "3600"]).unwrap();
        assert_eq!(args.partial_cleanup_age(), Some(Duration::from_secs(3600)));
        assert!(parse(&["ae", "1", "mnist", "--clean-partials", "soon"]).is_err());
    }

    #[test]
    fn test_config_file_is_overridden_by_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.json");
        std::fs::write(&path, r#"{"tries_per_seed": 2, "precision": 3}"#).unwrap();

        let args = parse(&["ae", "2", "mnist", "--config", path.to_str().unwrap()]).unwrap();
        let config = args.to_config().unwrap();
        assert_eq!(config.precision, 3);
        assert_eq!(config.max_tries(), 4);

        let bad = parse(&["ae", "2", "mnist", "--tries-per-seed", "0"]).unwrap();
        assert!(bad.to_config().is_err());
    }
}
