//! Built-in search spaces
//!
//! One declaration per supported model. Depth-dependent parameters are
//! derived from their layer count, so a sampled configuration always has
//! per-layer arrays of matching length.

use crate::space::SearchSpace;
use crate::{Error, Result};

/// Names accepted by [`search_space`].
pub const MODELS: &[&str] = &["ae", "cnn_ae", "gan", "ocsvm", "iforest"];

/// Search space declared for `model`.
///
/// # Errors
///
/// Returns [`Error::InvalidSearchSpace`] for an unknown model name.
///
/// # Example
///
/// ```rust
/// use anomaly_sweep::catalog;
///
/// let space = catalog::search_space("cnn_ae")?;
/// assert!(space.rule("kernel_sizes").unwrap().is_derived());
/// # Ok::<(), anomaly_sweep::Error>(())
/// ```
pub fn search_space(model: &str) -> Result<SearchSpace> {
    match model {
        "ae" => autoencoder(),
        "cnn_ae" => conv_autoencoder(),
        "gan" => gan(),
        "ocsvm" => one_class_svm(),
        "iforest" => isolation_forest(),
        other => Err(Error::InvalidSearchSpace(format!(
            "unknown model '{other}', expected one of {MODELS:?}"
        ))),
    }
}

fn autoencoder() -> Result<SearchSpace> {
    SearchSpace::builder()
        .int_grid("layers", 1, 4, 1)
        .prefix("widths", "layers", [512, 256, 128, 64])
        .choice("bottleneck", [8, 16, 32])
        .choice("activation", ["relu", "tanh", "leaky_relu"])
        .choice("dropout", [0.0, 0.1, 0.2])
        .log_grid("learning_rate", 1e-4, 1e-2, 5)
        .choice("batch_size", [32, 64, 128])
        .choice("epochs", [50, 100])
        .build()
}

fn conv_autoencoder() -> Result<SearchSpace> {
    SearchSpace::builder()
        .int_grid("layers", 1, 3, 1)
        .prefix("kernel_sizes", "layers", [7, 5, 3])
        .prefix("channels", "layers", [16, 32, 64])
        .repeat("downsampling", "layers", 2)
        .choice("bottleneck", [16, 32, 64])
        .log_grid("learning_rate", 1e-4, 1e-2, 5)
        .choice("batch_size", [32, 64])
        .choice("epochs", [50, 100])
        .build()
}

fn gan() -> Result<SearchSpace> {
    SearchSpace::builder()
        .int_grid("generator_layers", 1, 3, 1)
        .prefix("generator_widths", "generator_layers", [256, 128, 64])
        .int_grid("discriminator_layers", 1, 3, 1)
        .prefix("discriminator_widths", "discriminator_layers", [256, 128, 64])
        .choice("latent_dim", [16, 32, 64])
        .log_grid("learning_rate", 1e-5, 1e-3, 5)
        .choice("batch_size", [32, 64, 128])
        .choice("epochs", [100, 200])
        .build()
}

fn one_class_svm() -> Result<SearchSpace> {
    SearchSpace::builder()
        .choice("kernel", ["rbf", "sigmoid", "poly"])
        .log_grid("nu", 1e-3, 0.5, 6)
        .log_grid("gamma", 1e-4, 1.0, 5)
        .build()
}

fn isolation_forest() -> Result<SearchSpace> {
    SearchSpace::builder()
        .int_grid("n_estimators", 50, 300, 50)
        .choice("max_samples", [64, 128, 256])
        .choice("max_features", [0.5, 0.75, 1.0])
        .choice("bootstrap", [false, true])
        .build()
}
