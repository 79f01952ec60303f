//! Parameter values - the leaves of a configuration

use serde::{Deserialize, Serialize};

/// A single sampled hyperparameter value.
///
/// Numeric, categorical, or a small sequence such as a layer-width
/// schedule. Serialized untagged so records read naturally as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean flag
    Bool(bool),
    /// Integer value (layer counts, batch sizes, ...)
    Int(i64),
    /// Floating point value (learning rates, regularisation, ...)
    Float(f64),
    /// Categorical value (activation names, kernels, ...)
    Text(String),
    /// Small sequence of values (per-layer schedules)
    Seq(Vec<ParamValue>),
}

impl ParamValue {
    /// Integer view of the value, if it is an integer.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float view of the value. Integers are widened.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// String view of the value, if it is categorical.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Boolean view of the value.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Sequence view of the value.
    #[must_use]
    pub fn as_seq(&self) -> Option<&[Self]> {
        match self {
            Self::Seq(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<Self>> From<Vec<T>> for ParamValue {
    fn from(v: Vec<T>) -> Self {
        Self::Seq(v.into_iter().map(Into::into).collect())
    }
}

/// Format a float with a fixed number of significant digits.
///
/// Mirrors `%g`: fixed notation for moderate exponents, scientific
/// otherwise, trailing zeros removed. `-0.0` renders as `0`.
#[must_use]
pub fn format_significant(value: f64, digits: usize) -> String {
    let digits = digits.max(1);
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    // Rounding happens here, so the exponent below already accounts for carries
    let sci = format!("{:.*e}", digits - 1, value);
    let Some((mantissa, exponent)) = sci.split_once('e') else {
        return sci;
    };
    let exponent: i64 = exponent.parse().unwrap_or(0);
    let digits_i = i64::try_from(digits).unwrap_or(i64::MAX);

    if exponent < -4 || exponent >= digits_i {
        format!("{}e{exponent}", trim_fraction(mantissa))
    } else {
        let rounded: f64 = sci.parse().unwrap_or(value);
        let decimals = usize::try_from(digits_i - 1 - exponent).unwrap_or(0);
        trim_fraction(&format!("{rounded:.decimals$}"))
    }
}

/// Round a float to a fixed number of significant digits.
#[must_use]
pub fn round_significant(value: f64, digits: usize) -> f64 {
    format_significant(value, digits).parse().unwrap_or(value)
}

fn trim_fraction(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}
