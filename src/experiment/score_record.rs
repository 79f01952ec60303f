//! Score Record - output of one score function

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Score Record holds what one score function produced for a fitted model.
///
/// Both the score output and the final model parameters are opaque JSON:
/// their shape belongs to the external scoring code, not to the harness.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreRecord {
    function: String,
    output: Value,
    #[serde(default)]
    final_parameters: Value,
}

impl ScoreRecord {
    /// Create a score record without final parameters.
    ///
    /// # Arguments
    ///
    /// * `function` - Score function name (e.g., "reconstruction_error")
    /// * `output` - Whatever the score function returned
    #[must_use]
    pub fn new(function: impl Into<String>, output: Value) -> Self {
        Self {
            function: function.into(),
            output,
            final_parameters: Value::Null,
        }
    }

    /// Attach the model parameters the scores were computed with.
    #[must_use]
    pub fn with_final_parameters(mut self, final_parameters: Value) -> Self {
        self.final_parameters = final_parameters;
        self
    }

    /// Get the score function name.
    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Get the score output.
    #[must_use]
    pub const fn output(&self) -> &Value {
        &self.output
    }

    /// Get the final model parameters (`Null` if not reported).
    #[must_use]
    pub const fn final_parameters(&self) -> &Value {
        &self.final_parameters
    }
}
