//! Experiment records and their deduplicating store
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentRecord (one per IdentityKey)
//!     ├──< MetricRecord (N) [training curve]
//!     └──< ScoreRecord (N)  [score function outputs]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use anomaly_sweep::experiment::{ExperimentRecord, ExperimentStore, MetricRecord};
//! use anomaly_sweep::identity::ExperimentIdentity;
//! use anomaly_sweep::space::Configuration;
//!
//! let store = ExperimentStore::in_memory();
//! let identity = ExperimentIdentity::new("ae", "mnist", 1, Configuration::new().with("lr", 0.001));
//! assert!(!store.exists(&identity)?);
//!
//! let key = store.key_for(&identity)?;
//! let record = ExperimentRecord::builder(&identity, &key)
//!     .training_curve(vec![MetricRecord::new("loss", 0, 0.7)])
//!     .build();
//! store.commit(&identity, &record)?;
//! assert!(store.exists(&identity)?);
//! # Ok::<(), anomaly_sweep::Error>(())
//! ```

mod metric_record;
mod record;
mod score_record;
mod store;

pub use metric_record::{curve_for, MetricRecord};
pub use record::{ExperimentRecord, ExperimentRecordBuilder};
pub use score_record::ScoreRecord;
pub use store::ExperimentStore;
