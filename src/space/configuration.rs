//! Configuration - one concrete hyperparameter assignment

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ParamValue;
use crate::identity::{render_value, DEFAULT_PRECISION};

/// An immutable mapping from parameter name to sampled value.
///
/// Produced by [`ConfigSampler`](super::ConfigSampler), consumed by the fit
/// pipeline and by identity derivation. Two configurations are equal iff
/// their canonical renderings (sorted keys, fixed float precision) match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    params: BTreeMap<String, ParamValue>,
}

impl Configuration {
    /// Create an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy with `name` set to `value`.
    ///
    /// Parameter editors use this to adjust a sampled value to the data.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Return a copy without `name`.
    #[must_use]
    pub fn without(mut self, name: &str) -> Self {
        self.params.remove(name);
        self
    }

    /// Get a parameter value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    /// Get an integer parameter by name.
    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_int)
    }

    /// Get a float parameter by name (integers are widened).
    #[must_use]
    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_float)
    }

    /// Get a categorical parameter by name.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    /// Iterate parameters in canonical (sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether the configuration has no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Canonical rendering: `name=value` pairs in sorted order joined by `_`,
    /// floats at `precision` significant digits.
    #[must_use]
    pub fn canonical(&self, precision: usize) -> String {
        self.params
            .iter()
            .map(|(name, value)| format!("{name}={}", render_value(value, precision)))
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.canonical(DEFAULT_PRECISION) == other.canonical(DEFAULT_PRECISION)
    }
}

impl Eq for Configuration {}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            params: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
