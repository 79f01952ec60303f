//! Retry Loop - sample, check, run, commit
//!
//! The loop draws a configuration, derives its identity for each seed,
//! skips identities the store already holds and hands fresh ones to the
//! fit pipeline. Every duplicate costs one try from a [`RetryBudget`] of
//! `max_tries`; when the budget runs out without a fit, the loop ends in
//! [`LoopOutcome::Exhausted`], which is a normal result and not an error.
//!
//! How far one draw goes is set by [`SeedPolicy`]:
//!
//! - [`SeedPolicy::FirstSeedOnly`]: the draw is checked against the first
//!   seed. A duplicate throws the draw away. A fit (successful or not)
//!   exhausts the budget, so one invocation fits at most one experiment.
//! - [`SeedPolicy::AllSeeds`]: the draw is checked against every seed;
//!   duplicate seeds are skipped and the rest are fit.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::config::{FitFailurePolicy, HarnessConfig, SeedPolicy};
use crate::experiment::ExperimentStore;
use crate::identity::ExperimentIdentity;
use crate::kv::{FsKvStore, KvStore};
use crate::runner::{DataSplits, ExperimentPipeline, ExperimentRunner, RunSummary};
use crate::space::{ConfigSampler, Configuration, SearchSpace};
use crate::Result;

/// Bounded try counter for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    used: u64,
    max: u64,
}

impl RetryBudget {
    /// Create a fresh budget of `max` tries.
    #[must_use]
    pub const fn new(max: u64) -> Self {
        Self { used: 0, max }
    }

    /// Spend one try. Saturates at the bound.
    pub fn consume(&mut self) {
        self.used = self.max.min(self.used.saturating_add(1));
    }

    /// Spend everything that is left.
    pub fn exhaust(&mut self) {
        self.used = self.max;
    }

    /// Whether no tries are left.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.used >= self.max
    }

    /// Tries spent so far.
    #[must_use]
    pub const fn used(&self) -> u64 {
        self.used
    }

    /// Tries left.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.max.saturating_sub(self.used)
    }

    /// The bound.
    #[must_use]
    pub const fn max(&self) -> u64 {
        self.max
    }
}

/// What one invocation of the loop did.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopReport {
    draws: u64,
    duplicates: u64,
    budget: RetryBudget,
    runs: Vec<RunSummary>,
}

impl LoopReport {
    /// Configurations drawn from the sampler.
    #[must_use]
    pub const fn draws(&self) -> u64 {
        self.draws
    }

    /// Identities skipped because the store already held them.
    #[must_use]
    pub const fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Budget state when the loop stopped.
    #[must_use]
    pub const fn budget(&self) -> RetryBudget {
        self.budget
    }

    /// Every call into the fit pipeline, in order.
    #[must_use]
    pub fn runs(&self) -> &[RunSummary] {
        &self.runs
    }

    /// Seeds that reached the fit pipeline, in order.
    #[must_use]
    pub fn fitted_seeds(&self) -> Vec<u64> {
        self.runs.iter().map(RunSummary::seed).collect()
    }
}

/// Terminal state of the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    /// At least one fresh identity reached the fit pipeline.
    Success(LoopReport),
    /// The budget ran out first.
    Exhausted(LoopReport),
}

impl LoopOutcome {
    /// Get the report regardless of outcome.
    #[must_use]
    pub const fn report(&self) -> &LoopReport {
        match self {
            Self::Success(report) | Self::Exhausted(report) => report,
        }
    }

    /// Whether the loop ended in success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Whether the budget ran out.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }
}

/// Outcome of checking one drawn configuration against the seeds.
enum DrawResult {
    /// Stop the loop with success.
    Done,
    /// Draw again.
    Resample,
}

/// Deduplicating sample-and-run loop for one (model, dataset) pair.
pub struct RetryLoop<P: ExperimentPipeline, K: KvStore = FsKvStore> {
    model: String,
    dataset: String,
    space: SearchSpace,
    store: ExperimentStore<K>,
    runner: ExperimentRunner<P>,
    config: HarnessConfig,
    sampler: ConfigSampler,
    aux_tags: BTreeMap<String, String>,
    data: BTreeMap<u64, DataSplits<P::Split>>,
}

impl<P: ExperimentPipeline, K: KvStore> RetryLoop<P, K> {
    /// Create a loop over `space` for `model` on `dataset`.
    ///
    /// The store's key precision is set from `config`. The sampler is
    /// seeded from `config.sampler_seed`, or from entropy when unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if
    /// `config` fails validation.
    pub fn new(
        model: impl Into<String>,
        dataset: impl Into<String>,
        space: SearchSpace,
        store: ExperimentStore<K>,
        pipeline: P,
        config: HarnessConfig,
    ) -> Result<Self> {
        config.validate()?;
        let sampler = config
            .sampler_seed
            .map_or_else(ConfigSampler::from_entropy, ConfigSampler::new);
        Ok(Self {
            model: model.into(),
            dataset: dataset.into(),
            space,
            store: store.with_precision(config.precision),
            runner: ExperimentRunner::new(pipeline, config.failure_records),
            config,
            sampler,
            aux_tags: BTreeMap::new(),
            data: BTreeMap::new(),
        })
    }

    /// Add an auxiliary identity tag, such as a contamination rate.
    #[must_use]
    pub fn with_aux_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.aux_tags.insert(name.into(), value.into());
        self
    }

    /// Replace the configuration sampler.
    #[must_use]
    pub fn with_sampler(mut self, sampler: ConfigSampler) -> Self {
        self.sampler = sampler;
        self
    }

    /// Get the model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the dataset label.
    #[must_use]
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Get the search space.
    #[must_use]
    pub const fn space(&self) -> &SearchSpace {
        &self.space
    }

    /// Get the store.
    #[must_use]
    pub const fn store(&self) -> &ExperimentStore<K> {
        &self.store
    }

    /// Get the harness configuration.
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Get the pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &P {
        self.runner.pipeline()
    }

    /// Give back the store, e.g. to reuse it for another loop.
    #[must_use]
    pub fn into_store(self) -> ExperimentStore<K> {
        self.store
    }

    /// Run until a fit happens or the budget is spent.
    ///
    /// Each call starts with a fresh budget; sampler state carries over.
    ///
    /// # Errors
    ///
    /// Returns error for infrastructure faults only: data loading, key
    /// derivation, store IO. Fit failures and exhaustion are outcomes.
    pub fn run(&mut self) -> Result<LoopOutcome> {
        let seeds = self.config.seeds();
        let mut budget = RetryBudget::new(self.config.max_tries());
        let mut report = LoopReport {
            draws: 0,
            duplicates: 0,
            budget,
            runs: Vec::new(),
        };
        info!(
            model = %self.model,
            dataset = %self.dataset,
            seeds = ?seeds,
            max_tries = budget.max(),
            space = %self.space.cardinality(),
            "sweep started"
        );

        while !budget.is_exhausted() {
            let sampled = self.sampler.sample(&self.space);
            report.draws += 1;
            let draw = match self.config.seed_policy {
                SeedPolicy::FirstSeedOnly => {
                    self.first_seed(&seeds, sampled, &mut budget, &mut report)?
                }
                SeedPolicy::AllSeeds => self.all_seeds(&seeds, &sampled, &mut budget, &mut report)?,
            };
            if matches!(draw, DrawResult::Done) {
                report.budget = budget;
                return Ok(LoopOutcome::Success(report));
            }
        }

        report.budget = budget;
        info!(
            model = %self.model,
            dataset = %self.dataset,
            attempts = budget.used(),
            duplicates = report.duplicates,
            "giving up: retry budget exhausted"
        );
        Ok(LoopOutcome::Exhausted(report))
    }

    fn first_seed(
        &mut self,
        seeds: &[u64],
        sampled: Configuration,
        budget: &mut RetryBudget,
        report: &mut LoopReport,
    ) -> Result<DrawResult> {
        let Some(&seed) = seeds.first() else {
            return Ok(DrawResult::Resample);
        };
        let Some(identity) = self.check(seed, &sampled, budget, report)? else {
            budget.consume();
            return Ok(DrawResult::Resample);
        };
        let succeeded = self.fit(&identity, budget, report)?;
        if succeeded || self.config.fit_failure == FitFailurePolicy::Terminal {
            budget.exhaust();
            Ok(DrawResult::Done)
        } else {
            budget.consume();
            Ok(DrawResult::Resample)
        }
    }

    fn all_seeds(
        &mut self,
        seeds: &[u64],
        sampled: &Configuration,
        budget: &mut RetryBudget,
        report: &mut LoopReport,
    ) -> Result<DrawResult> {
        let mut fitted = false;
        let mut succeeded = false;
        for &seed in seeds {
            let Some(identity) = self.check(seed, sampled, budget, report)? else {
                budget.consume();
                continue;
            };
            fitted = true;
            if self.fit(&identity, budget, report)? {
                succeeded = true;
            } else if self.config.fit_failure == FitFailurePolicy::Resample {
                budget.consume();
            }
        }

        let done = match self.config.fit_failure {
            FitFailurePolicy::Terminal => fitted,
            FitFailurePolicy::Resample => succeeded,
        };
        Ok(if done {
            DrawResult::Done
        } else {
            DrawResult::Resample
        })
    }

    /// Load, edit and look up one seed. `None` means duplicate.
    fn check(
        &mut self,
        seed: u64,
        sampled: &Configuration,
        budget: &RetryBudget,
        report: &mut LoopReport,
    ) -> Result<Option<ExperimentIdentity>> {
        if !self.data.contains_key(&seed) {
            let data = self.runner.load(&self.dataset, seed)?;
            self.data.insert(seed, data);
        }
        let configuration = match self.data.get(&seed) {
            Some(data) => self.runner.edit(data, sampled.clone()),
            None => sampled.clone(),
        };
        let identity = ExperimentIdentity::new(&self.model, &self.dataset, seed, configuration)
            .with_tags(&self.aux_tags);
        let key = self.store.key_for(&identity)?;

        if self.store.contains(&key)? {
            report.duplicates += 1;
            info!(
                seed,
                key = %key,
                attempt = budget.used() + 1,
                max_tries = budget.max(),
                "duplicate configuration, resampling"
            );
            return Ok(None);
        }
        debug!(seed, key = %key, "no record found");
        Ok(Some(identity))
    }

    /// Fit one fresh identity. Returns whether the fit succeeded.
    fn fit(
        &mut self,
        identity: &ExperimentIdentity,
        budget: &RetryBudget,
        report: &mut LoopReport,
    ) -> Result<bool> {
        let key = self.store.key_for(identity)?;
        info!(
            model = %self.model,
            dataset = %self.dataset,
            seed = identity.seed(),
            key = %key,
            attempt = budget.used() + 1,
            max_tries = budget.max(),
            "attempting"
        );
        let Some(data) = self.data.get(&identity.seed()) else {
            return Ok(false);
        };
        let summary = self.runner.run(&self.store, identity, &key, data)?;
        let succeeded = summary.status().is_success();
        report.runs.push(summary);
        Ok(succeeded)
    }
}
