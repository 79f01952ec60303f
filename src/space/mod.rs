//! Hyperparameter search spaces and configuration sampling
//!
//! A [`SearchSpace`] is declared once per model and validated when built.
//! [`ConfigSampler`] draws [`Configuration`]s from it: each independent
//! parameter uniformly from its grid, then each derived (per-layer)
//! parameter from its controlling count.
//!
//! ```rust
//! use anomaly_sweep::space::{ConfigSampler, SearchSpace};
//!
//! let space = SearchSpace::builder()
//!     .int_grid("layers", 1, 3, 1)
//!     .prefix("widths", "layers", [256, 128, 64])
//!     .log_grid("learning_rate", 1e-4, 1e-2, 5)
//!     .build()?;
//!
//! let mut sampler = ConfigSampler::new(42);
//! let config = sampler.sample(&space);
//! let layers = config.get_int("layers").unwrap() as usize;
//! assert_eq!(config.get("widths").unwrap().as_seq().unwrap().len(), layers);
//! # Ok::<(), anomaly_sweep::Error>(())
//! ```

mod configuration;
mod rule;
mod sampler;
mod value;

pub use configuration::Configuration;
pub use rule::{ParamRule, SearchSpace, SearchSpaceBuilder, MAX_DERIVED_LEN};
pub use sampler::{seq_len, ConfigSampler};
pub use value::{format_significant, round_significant, ParamValue};
