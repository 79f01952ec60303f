//! Search space declarations

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::value::round_significant;
use super::ParamValue;
use crate::identity::DEFAULT_PRECISION;
use crate::{Error, Result};

/// Longest sequence a `Repeat` rule may produce.
pub const MAX_DERIVED_LEN: usize = 4096;

/// Sampling rule for one parameter.
///
/// Independent rules describe a finite grid that is sampled uniformly.
/// Derived rules are computed from a controlling integer parameter after
/// the independent draw, so per-layer arrays always match the layer count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamRule {
    /// Uniform choice over a discrete set
    Choice {
        /// Candidate values
        values: Vec<ParamValue>,
    },
    /// Log-uniform range discretised into a geometric grid
    LogGrid {
        /// Smallest grid value (> 0)
        low: f64,
        /// Largest grid value (>= low)
        high: f64,
        /// Number of grid points (>= 1)
        points: usize,
    },
    /// Inclusive integer range with a fixed step
    IntGrid {
        /// First value
        low: i64,
        /// Last admissible value
        high: i64,
        /// Step between values (> 0)
        step: i64,
    },
    /// First N entries of a canonical sequence, N taken from `controller`
    Prefix {
        /// Name of the controlling integer parameter
        controller: String,
        /// Canonical sequence to cut
        sequence: Vec<ParamValue>,
    },
    /// N copies of `value`, N taken from `controller`
    Repeat {
        /// Name of the controlling integer parameter
        controller: String,
        /// Value to repeat
        value: ParamValue,
    },
}

impl ParamRule {
    /// Controlling parameter of a derived rule.
    #[must_use]
    pub fn controller(&self) -> Option<&str> {
        match self {
            Self::Prefix { controller, .. } | Self::Repeat { controller, .. } => Some(controller),
            _ => None,
        }
    }

    /// Whether the rule is derived from another parameter.
    #[must_use]
    pub fn is_derived(&self) -> bool {
        self.controller().is_some()
    }

    /// Number of grid points of an independent rule (0 for derived rules).
    #[must_use]
    pub fn grid_len(&self) -> usize {
        match self {
            Self::Choice { values } => values.len(),
            Self::LogGrid { points, .. } => *points,
            Self::IntGrid { low, high, step } => int_grid_len(*low, *high, *step).unwrap_or(0),
            Self::Prefix { .. } | Self::Repeat { .. } => 0,
        }
    }

    /// Grid value at `index` of an independent rule.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn grid_value(&self, index: usize) -> Option<ParamValue> {
        if index >= self.grid_len() {
            return None;
        }
        match self {
            Self::Choice { values } => values.get(index).cloned(),
            Self::LogGrid { low, high, points } => {
                if *points == 1 {
                    return Some(ParamValue::Float(*low));
                }
                let frac = index as f64 / (*points - 1) as f64;
                let value = low * (high / low).powf(frac);
                Some(ParamValue::Float(round_significant(value, DEFAULT_PRECISION)))
            }
            Self::IntGrid { low, step, .. } => {
                let offset = i128::try_from(index).ok()? * i128::from(*step);
                i64::try_from(i128::from(*low) + offset).ok().map(ParamValue::Int)
            }
            Self::Prefix { .. } | Self::Repeat { .. } => None,
        }
    }

    /// All grid values of an independent rule.
    ///
    /// Materialises the whole grid; use [`grid_value`](Self::grid_value)
    /// for large integer ranges.
    #[must_use]
    pub fn grid(&self) -> Vec<ParamValue> {
        (0..self.grid_len())
            .filter_map(|i| self.grid_value(i))
            .collect()
    }

    /// Value of a derived rule for a given controller count.
    #[must_use]
    pub fn derive(&self, count: usize) -> Option<ParamValue> {
        match self {
            Self::Prefix { sequence, .. } => {
                Some(ParamValue::Seq(sequence.iter().take(count).cloned().collect()))
            }
            Self::Repeat { value, .. } => Some(ParamValue::Seq(vec![value.clone(); count])),
            _ => None,
        }
    }

    /// Smallest and largest value of an independent rule whose values are
    /// all integers. `None` if any value is not an integer.
    fn int_bounds(&self) -> Option<(i64, i64)> {
        match self {
            Self::Choice { values } => values.iter().try_fold(None, |bounds, value| {
                let n = value.as_int()?;
                Some(Some(match bounds {
                    Some((min, max)) => (n.min(min), n.max(max)),
                    None => (n, n),
                }))
            })?,
            Self::IntGrid { low, .. } => {
                let last = self.grid_len().checked_sub(1)?;
                Some((*low, self.grid_value(last)?.as_int()?))
            }
            _ => None,
        }
    }

    fn validate_independent(&self, name: &str) -> Result<()> {
        match self {
            Self::Choice { values } if values.is_empty() => Err(invalid(name, "empty choice set")),
            Self::LogGrid { low, high, points } => {
                if !(low.is_finite() && high.is_finite()) || *low <= 0.0 || high < low {
                    Err(invalid(name, "log grid needs 0 < low <= high"))
                } else if *points == 0 {
                    Err(invalid(name, "log grid needs at least one point"))
                } else {
                    Ok(())
                }
            }
            Self::IntGrid { low, high, step } => {
                if *step <= 0 || high < low {
                    Err(invalid(name, "integer grid needs step > 0 and low <= high"))
                } else if int_grid_len(*low, *high, *step).is_none() {
                    Err(invalid(name, "integer grid has more points than can be indexed"))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }
}

/// Point count of an inclusive integer grid, `None` if empty or too large.
fn int_grid_len(low: i64, high: i64, step: i64) -> Option<usize> {
    if step <= 0 || high < low {
        return None;
    }
    let points = (i128::from(high) - i128::from(low)) / i128::from(step) + 1;
    usize::try_from(points).ok()
}

fn invalid(name: &str, reason: &str) -> Error {
    Error::InvalidSearchSpace(format!("parameter '{name}': {reason}"))
}

/// A per-model search space: parameter name to sampling rule.
///
/// Validated once when built and immutable afterwards, so sampling from it
/// cannot fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, ParamRule>",
    into = "BTreeMap<String, ParamRule>"
)]
pub struct SearchSpace {
    rules: BTreeMap<String, ParamRule>,
}

impl SearchSpace {
    /// Start declaring a search space.
    #[must_use]
    pub fn builder() -> SearchSpaceBuilder {
        SearchSpaceBuilder::default()
    }

    /// Rule for a parameter.
    #[must_use]
    pub fn rule(&self, name: &str) -> Option<&ParamRule> {
        self.rules.get(name)
    }

    /// All rules in canonical order.
    pub fn rules(&self) -> impl Iterator<Item = (&str, &ParamRule)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Independent (sampled) rules in canonical order.
    pub fn independent(&self) -> impl Iterator<Item = (&str, &ParamRule)> {
        self.rules().filter(|(_, rule)| !rule.is_derived())
    }

    /// Derived rules in canonical order.
    pub fn derived(&self) -> impl Iterator<Item = (&str, &ParamRule)> {
        self.rules().filter(|(_, rule)| rule.is_derived())
    }

    /// Number of declared parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the space declares no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of distinct configurations the space can produce.
    ///
    /// Derived parameters add nothing. Saturates at `u128::MAX`.
    #[must_use]
    pub fn cardinality(&self) -> u128 {
        self.independent().fold(1u128, |acc, (_, rule)| {
            acc.saturating_mul(u128::try_from(rule.grid_len()).unwrap_or(u128::MAX))
        })
    }
}

impl TryFrom<BTreeMap<String, ParamRule>> for SearchSpace {
    type Error = Error;

    fn try_from(rules: BTreeMap<String, ParamRule>) -> Result<Self> {
        for (name, rule) in &rules {
            rule.validate_independent(name)?;
            let Some(controller) = rule.controller() else {
                continue;
            };
            let controlling = rules
                .get(controller)
                .ok_or_else(|| invalid(name, &format!("unknown controller '{controller}'")))?;
            if controlling.is_derived() {
                return Err(invalid(name, "controller must be an independent parameter"));
            }
            let max = controlling
                .int_bounds()
                .filter(|(min, _)| *min >= 0)
                .map(|(_, max)| max)
                .ok_or_else(|| invalid(name, "controller values must be non-negative integers"))?;
            let count = usize::try_from(max).unwrap_or(usize::MAX);
            let limit = match rule {
                ParamRule::Prefix { sequence, .. } => sequence.len(),
                _ => MAX_DERIVED_LEN,
            };
            if count > limit {
                let reason = format!("controller can request {max} entries, limit is {limit}");
                return Err(invalid(name, &reason));
            }
        }
        Ok(Self { rules })
    }
}

impl From<SearchSpace> for BTreeMap<String, ParamRule> {
    fn from(space: SearchSpace) -> Self {
        space.rules
    }
}

/// Builder for `SearchSpace`.
#[derive(Debug, Default)]
pub struct SearchSpaceBuilder {
    rules: BTreeMap<String, ParamRule>,
    duplicates: Vec<String>,
}

impl SearchSpaceBuilder {
    /// Declare a parameter with an explicit rule.
    #[must_use]
    pub fn rule(mut self, name: impl Into<String>, rule: ParamRule) -> Self {
        let name = name.into();
        if self.rules.contains_key(&name) {
            self.duplicates.push(name.clone());
        }
        self.rules.insert(name, rule);
        self
    }

    /// Uniform choice over a discrete set.
    #[must_use]
    pub fn choice<V: Into<ParamValue>>(
        self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.rule(name, ParamRule::Choice { values })
    }

    /// Log-uniform range discretised into `points` grid values.
    #[must_use]
    pub fn log_grid(self, name: impl Into<String>, low: f64, high: f64, points: usize) -> Self {
        self.rule(name, ParamRule::LogGrid { low, high, points })
    }

    /// Inclusive integer range with a fixed step.
    #[must_use]
    pub fn int_grid(self, name: impl Into<String>, low: i64, high: i64, step: i64) -> Self {
        self.rule(name, ParamRule::IntGrid { low, high, step })
    }

    /// First N entries of `sequence`, where N is the value of `controller`.
    #[must_use]
    pub fn prefix<V: Into<ParamValue>>(
        self,
        name: impl Into<String>,
        controller: impl Into<String>,
        sequence: impl IntoIterator<Item = V>,
    ) -> Self {
        let sequence = sequence.into_iter().map(Into::into).collect();
        self.rule(
            name,
            ParamRule::Prefix {
                controller: controller.into(),
                sequence,
            },
        )
    }

    /// N copies of `value`, where N is the value of `controller`.
    #[must_use]
    pub fn repeat(
        self,
        name: impl Into<String>,
        controller: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Self {
        self.rule(
            name,
            ParamRule::Repeat {
                controller: controller.into(),
                value: value.into(),
            },
        )
    }

    /// Validate and build the `SearchSpace`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSearchSpace`] for duplicate names, empty grids,
    /// or derived rules whose controller is missing or out of range.
    pub fn build(self) -> Result<SearchSpace> {
        if let Some(name) = self.duplicates.first() {
            return Err(invalid(name, "declared more than once"));
        }
        SearchSpace::try_from(self.rules)
    }
}
