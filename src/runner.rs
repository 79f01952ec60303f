//! Experiment Runner - the boundary to the external fit pipeline
//!
//! Dataset loading, parameter editing and model fitting live outside this
//! crate. They reach the harness through [`ExperimentPipeline`]; the
//! [`ExperimentRunner`] times the fit, turns its [`FitOutcome`] into an
//! [`ExperimentRecord`] and hands it to the store.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::FailureRecordPolicy;
use crate::experiment::{ExperimentRecord, ExperimentStore, MetricRecord, ScoreRecord};
use crate::identity::{ExperimentIdentity, IdentityKey};
use crate::kv::KvStore;
use crate::space::Configuration;
use crate::{Error, Result};

/// Train, validation and test splits of one dataset for one seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSplits<T> {
    /// Training split
    pub train: T,
    /// Validation split
    pub val: T,
    /// Test split
    pub test: T,
}

impl<T> DataSplits<T> {
    /// Bundle three splits.
    pub const fn new(train: T, val: T, test: T) -> Self {
        Self { train, val, test }
    }
}

/// Results of a successful fit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitReport {
    training_curve: Vec<MetricRecord>,
    parameter_count: Option<u64>,
    scores: Vec<ScoreRecord>,
}

impl FitReport {
    /// Create an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the training curve.
    #[must_use]
    pub fn with_training_curve(mut self, curve: Vec<MetricRecord>) -> Self {
        self.training_curve = curve;
        self
    }

    /// Set the trainable parameter count.
    #[must_use]
    pub const fn with_parameter_count(mut self, count: u64) -> Self {
        self.parameter_count = Some(count);
        self
    }

    /// Append one score function output.
    #[must_use]
    pub fn with_score(mut self, score: ScoreRecord) -> Self {
        self.scores.push(score);
        self
    }

    /// Get the training curve.
    #[must_use]
    pub fn training_curve(&self) -> &[MetricRecord] {
        &self.training_curve
    }

    /// Get the trainable parameter count, if reported.
    #[must_use]
    pub const fn parameter_count(&self) -> Option<u64> {
        self.parameter_count
    }

    /// Get the score function outputs.
    #[must_use]
    pub fn scores(&self) -> &[ScoreRecord] {
        &self.scores
    }
}

/// What the fit pipeline reports back.
///
/// A failed fit (divergence, out of memory, ...) is a value, not an error:
/// the harness records and logs it and carries on.
#[derive(Debug, Clone, PartialEq)]
pub enum FitOutcome {
    /// The model was fit and scored.
    Success(FitReport),
    /// The fit failed for the given reason.
    Failure(String),
}

impl FitOutcome {
    /// Shorthand for a failure outcome.
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure(reason.into())
    }

    /// Whether the fit succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// External collaborators of the harness.
///
/// Only `load` and `fit` are required. `shape` feeds the log line emitted
/// after loading, and `edit` adjusts a sampled configuration to the data
/// before its identity key is derived.
pub trait ExperimentPipeline {
    /// One data split, opaque to the harness.
    type Split;

    /// Load the splits of `dataset` for `seed`.
    ///
    /// # Errors
    ///
    /// Any loader failure; the harness wraps it into [`Error::DataLoad`].
    fn load(&mut self, dataset: &str, seed: u64) -> anyhow::Result<DataSplits<Self::Split>>;

    /// Shape of a split, for logging only.
    fn shape(&self, _split: &Self::Split) -> Vec<usize> {
        Vec::new()
    }

    /// Adjust a sampled configuration to the loaded data.
    fn edit(&self, _data: &DataSplits<Self::Split>, configuration: Configuration) -> Configuration {
        configuration
    }

    /// Fit and score a model.
    fn fit(&mut self, data: &DataSplits<Self::Split>, configuration: &Configuration) -> FitOutcome;
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The fit succeeded and its record was committed.
    Committed,
    /// The fit failed; nothing was committed.
    Failed,
    /// The fit failed and the failure record was committed.
    FailedRecorded,
}

impl RunStatus {
    /// Whether the fit itself succeeded.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Committed)
    }

    /// Whether a record is now visible in the store.
    #[must_use]
    pub const fn is_committed(self) -> bool {
        matches!(self, Self::Committed | Self::FailedRecorded)
    }
}

/// Outcome of one call into the fit pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    key: IdentityKey,
    status: RunStatus,
    record: ExperimentRecord,
}

impl RunSummary {
    /// Seed the run was fit for.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.record.seed()
    }

    /// Identity key of the run.
    #[must_use]
    pub const fn key(&self) -> &IdentityKey {
        &self.key
    }

    /// How the run ended.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// The record built for the run, committed or not.
    #[must_use]
    pub const fn record(&self) -> &ExperimentRecord {
        &self.record
    }
}

/// Adapter between the harness and an [`ExperimentPipeline`].
#[derive(Debug)]
pub struct ExperimentRunner<P> {
    pipeline: P,
    failure_records: FailureRecordPolicy,
}

impl<P: ExperimentPipeline> ExperimentRunner<P> {
    /// Wrap a pipeline.
    pub const fn new(pipeline: P, failure_records: FailureRecordPolicy) -> Self {
        Self {
            pipeline,
            failure_records,
        }
    }

    /// Get the pipeline.
    pub const fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Get the pipeline mutably.
    pub fn pipeline_mut(&mut self) -> &mut P {
        &mut self.pipeline
    }

    /// Unwrap the pipeline.
    pub fn into_pipeline(self) -> P {
        self.pipeline
    }

    /// Load the splits of `dataset` for `seed`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataLoad`] if the pipeline's loader fails.
    pub fn load(&mut self, dataset: &str, seed: u64) -> Result<DataSplits<P::Split>> {
        let data = self
            .pipeline
            .load(dataset, seed)
            .map_err(|source| Error::DataLoad {
                dataset: dataset.to_string(),
                seed,
                source,
            })?;
        debug!(
            dataset,
            seed,
            train = ?self.pipeline.shape(&data.train),
            val = ?self.pipeline.shape(&data.val),
            test = ?self.pipeline.shape(&data.test),
            "data loaded"
        );
        Ok(data)
    }

    /// Apply the pipeline's parameter editor.
    pub fn edit(&self, data: &DataSplits<P::Split>, configuration: Configuration) -> Configuration {
        self.pipeline.edit(data, configuration)
    }

    /// Fit `identity` on `data` and commit its record under `key`.
    ///
    /// A failed fit is logged and only committed under
    /// [`FailureRecordPolicy::Persist`].
    ///
    /// # Errors
    ///
    /// Returns error only if the record cannot be committed.
    pub fn run<K: KvStore>(
        &mut self,
        store: &ExperimentStore<K>,
        identity: &ExperimentIdentity,
        key: &IdentityKey,
        data: &DataSplits<P::Split>,
    ) -> Result<RunSummary> {
        let started = Instant::now();
        let outcome = self.pipeline.fit(data, identity.configuration());
        let elapsed = started.elapsed();

        let builder = ExperimentRecord::builder(identity, key);
        let (status, record) = match outcome {
            FitOutcome::Success(report) => {
                let record = builder
                    .fit_duration(elapsed)
                    .training_curve(report.training_curve)
                    .parameter_count(report.parameter_count)
                    .scores(report.scores)
                    .build();
                store.commit_at(key, &record)?;
                info!(
                    seed = identity.seed(),
                    key = %key,
                    secs = elapsed.as_secs_f64(),
                    "committed"
                );
                (RunStatus::Committed, record)
            }
            FitOutcome::Failure(reason) => {
                warn!(seed = identity.seed(), key = %key, reason = %reason, "fit failed");
                let record = builder.failure(reason).build();
                match self.failure_records {
                    FailureRecordPolicy::Persist => {
                        store.commit_at(key, &record)?;
                        (RunStatus::FailedRecorded, record)
                    }
                    FailureRecordPolicy::Discard => (RunStatus::Failed, record),
                }
            }
        };

        Ok(RunSummary {
            key: key.clone(),
            status,
            record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Scripted {
        outcomes: Vec<FitOutcome>,
        fits: usize,
    }

    impl ExperimentPipeline for Scripted {
        type Split = Vec<f64>;

        fn load(&mut self, dataset: &str, _seed: u64) -> anyhow::Result<DataSplits<Vec<f64>>> {
            if dataset == "missing" {
                anyhow::bail!("no such dataset");
            }
            Ok(DataSplits::new(vec![0.0; 8], vec![0.0; 2], vec![0.0; 2]))
        }

        fn shape(&self, split: &Vec<f64>) -> Vec<usize> {
            vec![split.len()]
        }

        fn edit(&self, data: &DataSplits<Vec<f64>>, configuration: Configuration) -> Configuration {
            let width = configuration.get_int("width").unwrap_or(0);
            configuration.with("width", width.min(data.train.len() as i64))
        }

        fn fit(&mut self, _data: &DataSplits<Vec<f64>>, _configuration: &Configuration) -> FitOutcome {
            self.fits += 1;
            self.outcomes.remove(0)
        }
    }

    fn runner(outcomes: Vec<FitOutcome>, policy: FailureRecordPolicy) -> ExperimentRunner<Scripted> {
        ExperimentRunner::new(Scripted { outcomes, fits: 0 }, policy)
    }

    fn identity() -> ExperimentIdentity {
        ExperimentIdentity::new("ae", "mnist", 1, Configuration::new().with("width", 4))
    }

    #[test]
    fn test_runner_commits_success() {
        let store = ExperimentStore::in_memory();
        let report = FitReport::new()
            .with_parameter_count(42)
            .with_training_curve(vec![MetricRecord::new("loss", 0, 0.5)])
            .with_score(ScoreRecord::new("auc", json!(0.8)));
        let mut runner = runner(vec![FitOutcome::Success(report)], FailureRecordPolicy::Discard);
        let data = runner.load("mnist", 1).unwrap();
        let id = identity();
        let key = store.key_for(&id).unwrap();

        let summary = runner.run(&store, &id, &key, &data).unwrap();
        assert_eq!(summary.status(), RunStatus::Committed);
        assert_eq!(summary.seed(), 1);
        assert_eq!(summary.record().parameter_count(), Some(42));
        assert!(summary.record().fit_duration() >= 0.0);
        assert!(store.exists(&id).unwrap());
        assert_eq!(runner.pipeline().fits, 1);
    }

    #[test]
    fn test_runner_discards_failure() {
        let store = ExperimentStore::in_memory();
        let mut runner = runner(vec![FitOutcome::failure("diverged")], FailureRecordPolicy::Discard);
        let data = runner.load("mnist", 1).unwrap();
        let id = identity();
        let key = store.key_for(&id).unwrap();

        let summary = runner.run(&store, &id, &key, &data).unwrap();
        assert_eq!(summary.status(), RunStatus::Failed);
        assert!(!summary.status().is_committed());
        assert!(summary.record().fit_duration().is_nan());
        assert!(summary.record().scores().is_empty());
        assert!(!store.exists(&id).unwrap());
    }

    #[test]
    fn test_runner_persists_failure() {
        let store = ExperimentStore::in_memory();
        let mut runner = runner(vec![FitOutcome::failure("oom")], FailureRecordPolicy::Persist);
        let data = runner.load("mnist", 1).unwrap();
        let id = identity();
        let key = store.key_for(&id).unwrap();

        let summary = runner.run(&store, &id, &key, &data).unwrap();
        assert_eq!(summary.status(), RunStatus::FailedRecorded);
        let stored = store.load(&id).unwrap().unwrap();
        assert!(stored.is_failure());
        assert_eq!(stored.failure_reason(), Some("oom"));
    }

    #[test]
    fn test_runner_wraps_load_error() {
        let mut runner = runner(vec![], FailureRecordPolicy::Discard);
        let err = runner.load("missing", 3).unwrap_err();
        assert!(matches!(err, Error::DataLoad { seed: 3, .. }));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_runner_edit_clips_to_data() {
        let mut runner = runner(vec![], FailureRecordPolicy::Discard);
        let data = runner.load("mnist", 1).unwrap();
        let edited = runner.edit(&data, Configuration::new().with("width", 100));
        assert_eq!(edited.get_int("width"), Some(8));
    }
}
