//! Independent restarts on a fixed-size worker pool.
//!
//! Runs share the training and holdout streams read-only and own everything
//! else. Results come back ordered by run index regardless of finish order.

use crate::config::{ConfigError, SearchConfig};
use crate::event::EventStream;
use crate::optimizer::{BatOptimizer, RunResult};
use crate::rule::RuleError;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MinerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("rule construction failed: {0}")]
    Rule(#[from] RuleError),
    #[error("training stream has no events")]
    EmptyTraining,
}

/// Statistics over every run of one configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub runs: usize,
    pub mean_fitness: f64,
    pub min_fitness: f64,
    pub max_fitness: f64,
    pub std_fitness: f64,
    pub mean_holdout_f1: f64,
}

impl RunSummary {
    pub fn from_results(results: &[RunResult]) -> Self {
        if results.is_empty() { return Self::default(); }
        let n = results.len() as f64;
        let fitness: Vec<f64> = results.iter().map(|r| r.training_fitness).collect();
        let mean = fitness.iter().sum::<f64>() / n;
        let variance = fitness.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / n;
        Self {
            runs: results.len(),
            mean_fitness: mean,
            min_fitness: fitness.iter().copied().fold(f64::INFINITY, f64::min),
            max_fitness: fitness.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            std_fitness: variance.sqrt(),
            mean_holdout_f1: results.iter().map(RunResult::holdout_f1).sum::<f64>() / n,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub summary: RunSummary,
    pub results: Vec<RunResult>,
}

impl RunReport {
    /// Run with the highest training fitness; the lowest index wins ties.
    pub fn best(&self) -> Option<&RunResult> {
        self.results.iter().fold(None, |best: Option<&RunResult>, r| match best {
            Some(b) if b.training_fitness >= r.training_fitness => Some(b),
            _ => Some(r),
        })
    }
}

/// Validates `cfg`, then runs `cfg.runs` optimizations on `cfg.workers` threads.
pub fn execute(cfg: &SearchConfig, training: &EventStream, holdout: &EventStream) -> Result<RunReport, MinerError> {
    cfg.validate()?;
    if training.is_empty() { return Err(MinerError::EmptyTraining); }
    let seeds: Vec<u64> = (0..cfg.runs).map(|i| cfg.run_seed(i).unwrap_or_else(rand::random)).collect();
    info!(runs = cfg.runs, workers = cfg.workers, swarm = %cfg.bat.name, events = training.len(), "starting runs");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.workers)
        .thread_name(|i| format!("bat-run-{i}"))
        .build()?;
    let optimizer = BatOptimizer::new(cfg, training);
    let results = pool.install(|| {
        seeds.par_iter()
            .enumerate()
            .map(|(index, seed)| optimizer.run(index, *seed, holdout))
            .collect::<Result<Vec<_>, _>>()
    })?;

    let summary = RunSummary::from_results(&results);
    info!(
        mean = summary.mean_fitness,
        max = summary.max_fitness,
        std = summary.std_fitness,
        holdout_f1 = summary.mean_holdout_f1,
        "all runs finished"
    );
    Ok(RunReport { summary, results })
}
