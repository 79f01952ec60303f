//! Metric Record - one point of a training curve

use serde::{Deserialize, Serialize};

/// Metric Record represents a single training-curve data point.
///
/// The fit pipeline reports its curve as a list of these, ordered by step
/// (epoch or iteration). Several keys (e.g. `loss`, `val_loss`) may share
/// the same step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    key: String,
    step: u64,
    value: f64,
}

impl MetricRecord {
    /// Create a new metric record.
    ///
    /// # Arguments
    ///
    /// * `key` - Metric name/key (e.g., "loss", "val_loss")
    /// * `step` - Training step or epoch number
    /// * `value` - Metric value
    #[must_use]
    pub fn new(key: impl Into<String>, step: u64, value: f64) -> Self {
        Self {
            key: key.into(),
            step,
            value,
        }
    }

    /// Get the metric key/name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the step/epoch number.
    #[must_use]
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Get the metric value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }
}

/// Points of one metric from a curve, ordered by step.
#[must_use]
pub fn curve_for<'a>(curve: &'a [MetricRecord], key: &str) -> Vec<&'a MetricRecord> {
    let mut points: Vec<&MetricRecord> = curve.iter().filter(|m| m.key() == key).collect();
    points.sort_by_key(|m| m.step());
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_record_new() {
        let metric = MetricRecord::new("loss", 0, 0.5);
        assert_eq!(metric.key(), "loss");
        assert_eq!(metric.step(), 0);
        assert!((metric.value() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_curve_for_ordering() {
        // Add out of order
        let curve = vec![
            MetricRecord::new("loss", 2, 0.2),
            MetricRecord::new("val_loss", 0, 0.9),
            MetricRecord::new("loss", 0, 0.0),
            MetricRecord::new("loss", 1, 0.1),
        ];

        let loss = curve_for(&curve, "loss");

        assert_eq!(loss.len(), 3);
        assert_eq!(loss[0].step(), 0);
        assert_eq!(loss[1].step(), 1);
        assert_eq!(loss[2].step(), 2);
    }
}
