//! Error types for anomaly-sweep
//!
//! Only infrastructure faults are errors. Duplicate configurations, fit
//! failures and an exhausted retry budget are ordinary outcomes of the
//! harness and never show up here.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// anomaly-sweep error types
#[derive(Error, Debug)]
pub enum Error {
    /// Search space declaration rejected at build time
    #[error("Invalid search space: {0}")]
    InvalidSearchSpace(String),

    /// Harness configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Identity key cannot be rendered as a storage entry name
    #[error("Invalid identity key: {0}")]
    InvalidKey(String),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Record (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External data loader failed
    #[error("Data loading failed for dataset '{dataset}' (seed {seed}): {source}")]
    DataLoad {
        /// Dataset or category label
        dataset: String,
        /// Seed the split was requested for
        seed: u64,
        /// Loader-reported cause
        #[source]
        source: anyhow::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
