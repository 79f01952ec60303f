//! Experiment Record - the persisted outcome of one fit attempt

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MetricRecord, ScoreRecord};
use crate::identity::{ExperimentIdentity, IdentityKey};
use crate::space::Configuration;
use crate::Result;

/// Experiment Record is what the store persists under an identity key.
///
/// A successful fit carries its duration, training curve, parameter count
/// and score outputs. A failed fit carries the failure reason, no duration
/// and no scores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentRecord {
    key: String,
    model: String,
    dataset: String,
    seed: u64,
    configuration: Configuration,
    #[serde(default)]
    aux_tags: BTreeMap<String, String>,
    created_at: DateTime<Utc>,
    fit_duration_secs: Option<f64>,
    #[serde(default)]
    training_curve: Vec<MetricRecord>,
    parameter_count: Option<u64>,
    failed: bool,
    failure_reason: Option<String>,
    #[serde(default)]
    scores: Vec<ScoreRecord>,
}

impl ExperimentRecord {
    /// Create a builder for the record of `identity`, stored under `key`.
    #[must_use]
    pub fn builder(identity: &ExperimentIdentity, key: &IdentityKey) -> ExperimentRecordBuilder {
        ExperimentRecordBuilder::new(identity, key)
    }

    /// Decode a record from its stored JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`](crate::Error::Serialization) if the
    /// bytes are not a valid record.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode the record as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`](crate::Error::Serialization) if a
    /// score payload cannot be encoded.
    pub fn to_json_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Get the identity key the record is stored under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the dataset or category label.
    #[must_use]
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Get the seed.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Get the configuration the model was fit with.
    #[must_use]
    pub const fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Get the auxiliary tags.
    #[must_use]
    pub const fn aux_tags(&self) -> &BTreeMap<String, String> {
        &self.aux_tags
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Fit duration in seconds; NaN for a failed fit.
    #[must_use]
    pub fn fit_duration(&self) -> f64 {
        self.fit_duration_secs.unwrap_or(f64::NAN)
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

    /// Whether the fit failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.failed
    }

    /// Get the failure reason, if the fit failed.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Get the score function outputs.
    #[must_use]
    pub fn scores(&self) -> &[ScoreRecord] {
        &self.scores
    }
}

/// Builder for `ExperimentRecord`.
#[derive(Debug)]
pub struct ExperimentRecordBuilder {
    record: ExperimentRecord,
}

impl ExperimentRecordBuilder {
    /// Create a new builder with the identity fields filled in.
    #[must_use]
    pub fn new(identity: &ExperimentIdentity, key: &IdentityKey) -> Self {
        Self {
            record: ExperimentRecord {
                key: key.to_string(),
                model: identity.model().to_string(),
                dataset: identity.dataset().to_string(),
                seed: identity.seed(),
                configuration: identity.configuration().clone(),
                aux_tags: identity.aux_tags().clone(),
                created_at: Utc::now(),
                fit_duration_secs: None,
                training_curve: Vec::new(),
                parameter_count: None,
                failed: false,
                failure_reason: None,
                scores: Vec::new(),
            },
        }
    }

    /// Set the fit duration.
    #[must_use]
    pub fn fit_duration(mut self, duration: Duration) -> Self {
        self.record.fit_duration_secs = Some(duration.as_secs_f64());
        self
    }

    /// Set the training curve.
    #[must_use]
    pub fn training_curve(mut self, curve: Vec<MetricRecord>) -> Self {
        self.record.training_curve = curve;
        self
    }

    /// Set the trainable parameter count.
    #[must_use]
    pub const fn parameter_count(mut self, count: Option<u64>) -> Self {
        self.record.parameter_count = count;
        self
    }

    /// Set the score function outputs.
    #[must_use]
    pub fn scores(mut self, scores: Vec<ScoreRecord>) -> Self {
        self.record.scores = scores;
        self
    }

    /// Mark the fit as failed.
    ///
    /// A failed record has no duration and no scores, whatever else was set.
    #[must_use]
    pub fn failure(mut self, reason: impl Into<String>) -> Self {
        self.record.failed = true;
        self.record.failure_reason = Some(reason.into());
        self
    }

    /// Set a custom creation timestamp (useful for deserialization/testing).
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.record.created_at = created_at;
        self
    }

    /// Build the `ExperimentRecord`.
    #[must_use]
    pub fn build(self) -> ExperimentRecord {
        let mut record = self.record;
        if record.failed {
            record.fit_duration_secs = None;
            record.scores.clear();
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity() -> ExperimentIdentity {
        ExperimentIdentity::new(
            "ae",
            "mnist",
            1,
            Configuration::new().with("lr", 0.001).with("layers", 2),
        )
        .with_tag("contamination", "0.05")
    }

    #[test]
    fn test_record_builder_success() {
        let identity = identity();
        let key = identity.key(5).unwrap();
        let record = ExperimentRecord::builder(&identity, &key)
            .fit_duration(Duration::from_millis(1500))
            .training_curve(vec![MetricRecord::new("loss", 0, 1.0)])
            .parameter_count(Some(1024))
            .scores(vec![ScoreRecord::new("auc", json!(0.9))])
            .build();

        assert_eq!(record.key(), key.to_string());
        assert_eq!(record.model(), "ae");
        assert_eq!(record.seed(), 1);
        assert!((record.fit_duration() - 1.5).abs() < 1e-9);
        assert_eq!(record.parameter_count(), Some(1024));
        assert_eq!(record.scores().len(), 1);
        assert!(!record.is_failure());
        assert_eq!(record.aux_tags().get("contamination").unwrap(), "0.05");
    }

    #[test]
    fn test_record_builder_failure_clears_results() {
        let identity = identity();
        let key = identity.key(5).unwrap();
        let record = ExperimentRecord::builder(&identity, &key)
            .fit_duration(Duration::from_secs(3))
            .scores(vec![ScoreRecord::new("auc", json!(0.9))])
            .failure("loss diverged")
            .build();

        assert!(record.is_failure());
        assert!(record.fit_duration().is_nan());
        assert!(record.scores().is_empty());
        assert_eq!(record.failure_reason(), Some("loss diverged"));
    }

    #[test]
    fn test_record_json_roundtrip_keeps_failure_nan() {
        let identity = identity();
        let key = identity.key(5).unwrap();
        let record = ExperimentRecord::builder(&identity, &key)
            .failure("out of memory")
            .build();

        let bytes = record.to_json_vec().unwrap();
        let decoded = ExperimentRecord::from_json_slice(&bytes).unwrap();
        assert!(decoded.fit_duration().is_nan());
        assert_eq!(decoded.configuration(), record.configuration());
        assert_eq!(decoded.created_at(), record.created_at());
    }

    #[test]
    fn test_record_rejects_truncated_json() {
        let identity = identity();
        let key = identity.key(5).unwrap();
        let bytes = ExperimentRecord::builder(&identity, &key)
            .build()
            .to_json_vec()
            .unwrap();
        assert!(ExperimentRecord::from_json_slice(&bytes[..bytes.len() / 2]).is_err());
    }
}
