//! # Anomaly-Sweep: Deduplicated Hyperparameter Sweeps
//!
//! **Version**: 0.1.0
//!
//! Anomaly-Sweep draws hyperparameter configurations from per-model search
//! spaces, gives every (model, dataset, seed, configuration) tuple a
//! canonical identity key, and only fits tuples whose key has no committed
//! record yet. Model fitting itself is supplied by the caller.
//!
//! ## Design Principles
//!
//! - **Uniqueness**: one identity maps to at most one committed record
//! - **No partial visibility**: records are committed all-or-nothing
//! - **Bounded retries**: duplicate draws spend a finite [`retry::RetryBudget`]
//! - **Valid by construction**: per-layer arrays derive from their layer count
//!
//! ## Example Usage
//!
//! ```rust
//! use anomaly_sweep::config::HarnessConfig;
//! use anomaly_sweep::experiment::ExperimentStore;
//! use anomaly_sweep::retry::RetryLoop;
//! use anomaly_sweep::runner::{DataSplits, ExperimentPipeline, FitOutcome, FitReport};
//! use anomaly_sweep::space::{Configuration, SearchSpace};
//!
//! struct Toy;
//!
//! impl ExperimentPipeline for Toy {
//!     type Split = Vec<f32>;
//!
//!     fn load(&mut self, _dataset: &str, _seed: u64) -> anyhow::Result<DataSplits<Vec<f32>>> {
//!         Ok(DataSplits::new(vec![0.0; 16], vec![0.0; 4], vec![0.0; 4]))
//!     }
//!
//!     fn fit(&mut self, _data: &DataSplits<Vec<f32>>, _config: &Configuration) -> FitOutcome {
//!         FitOutcome::Success(FitReport::new().with_parameter_count(128))
//!     }
//! }
//!
//! let space = SearchSpace::builder().log_grid("learning_rate", 1e-4, 1e-2, 3).build()?;
//! let mut sweep = RetryLoop::new(
//!     "ae",
//!     "mnist",
//!     space,
//!     ExperimentStore::in_memory(),
//!     Toy,
//!     HarnessConfig::new(1).with_sampler_seed(7),
//! )?;
//!
//! assert!(sweep.run()?.is_success());
//! # Ok::<(), anomaly_sweep::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod experiment;
pub mod identity;
pub mod kv;
pub mod logging;
pub mod retry;
pub mod runner;
pub mod space;

pub use error::{Error, Result};
