//! Sweep driver with a toy pipeline
//!
//! Run with: cargo run --example sweep -- ae 2 synthetic -v
//!
//! Add `--clean-partials 3600` to drop commits interrupted over an hour ago.
//!
//! The "model" is a mean/deviation threshold detector over random data. It
//! fails on purpose for the largest learning rates so the failure path shows
//! up in the log.

use std::process::ExitCode;

use anomaly_sweep::catalog;
use anomaly_sweep::cli::SweepArgs;
use anomaly_sweep::experiment::{ExperimentStore, MetricRecord, ScoreRecord};
use anomaly_sweep::logging::init_tracing;
use anomaly_sweep::retry::{LoopOutcome, RetryLoop};
use anomaly_sweep::runner::{DataSplits, ExperimentPipeline, FitOutcome, FitReport};
use anomaly_sweep::space::Configuration;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::{error, info};

struct ThresholdPipeline {
    contamination: f64,
}

impl ExperimentPipeline for ThresholdPipeline {
    type Split = Vec<f64>;

    fn load(&mut self, dataset: &str, seed: u64) -> anyhow::Result<DataSplits<Vec<f64>>> {
        if dataset.is_empty() {
            anyhow::bail!("empty dataset label");
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let contamination = self.contamination;
        let mut split = |n: usize| -> Vec<f64> {
            (0..n)
                .map(|_| {
                    let x: f64 = rng.gen_range(-1.0..1.0);
                    if rng.gen_bool(contamination.clamp(0.0, 1.0)) {
                        x * 10.0
                    } else {
                        x
                    }
                })
                .collect()
        };
        Ok(DataSplits::new(split(512), split(128), split(128)))
    }

    fn shape(&self, split: &Vec<f64>) -> Vec<usize> {
        vec![split.len()]
    }

    fn fit(&mut self, data: &DataSplits<Vec<f64>>, configuration: &Configuration) -> FitOutcome {
        let lr = configuration.get_float("learning_rate").unwrap_or(1e-3);
        if lr >= 1e-2 {
            return FitOutcome::failure(format!("loss diverged at learning_rate={lr}"));
        }

        #[allow(clippy::cast_precision_loss)]
        let n = data.train.len() as f64;
        let mean = data.train.iter().sum::<f64>() / n;
        let std = (data.train.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
        let curve = (0..5_u64)
            .map(|step| {
                #[allow(clippy::cast_precision_loss)]
                let loss = std / (1.0 + lr * 100.0 * step as f64);
                MetricRecord::new("loss", step, loss)
            })
            .collect();
        let flagged = data.test.iter().filter(|x| (*x - mean).abs() > 3.0 * std).count();

        FitOutcome::Success(
            FitReport::new()
                .with_training_curve(curve)
                .with_parameter_count(2)
                .with_score(
                    ScoreRecord::new("flagged", json!(flagged))
                        .with_final_parameters(json!({ "mean": mean, "std": std })),
                ),
        )
    }
}

fn run(args: &SweepArgs) -> anomaly_sweep::Result<LoopOutcome> {
    let config = args.to_config()?;
    let space = catalog::search_space(&args.model)?;
    let store = ExperimentStore::open_dir(&args.store)?;
    if let Some(age) = args.partial_cleanup_age() {
        let removed = store.remove_partials(age)?;
        info!(removed, ?age, "cleaned up interrupted commits");
    }

    let pipeline = ThresholdPipeline {
        contamination: args.contamination,
    };
    let mut sweep = RetryLoop::new(&args.model, &args.dataset, space, store, pipeline, config)?;
    for (name, value) in args.aux_tags() {
        sweep = sweep.with_aux_tag(name, value);
    }
    sweep.run()
}

fn main() -> ExitCode {
    let args = SweepArgs::parse();
    init_tracing(args.verbose);

    match run(&args) {
        Ok(outcome) => {
            let report = outcome.report();
            info!(
                success = outcome.is_success(),
                draws = report.draws(),
                duplicates = report.duplicates(),
                fitted = ?report.fitted_seeds(),
                "sweep finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "sweep aborted");
            ExitCode::FAILURE
        }
    }
}
