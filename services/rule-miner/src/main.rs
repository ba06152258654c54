use anyhow::{Context, Result};
use batcep_core::{execute, init_tracing, load_config, synthetic, RunReport, SearchConfig, SyntheticConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

mod scenarios;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct MinerConfig {
    search: SearchConfig,
    data: SyntheticConfig,
    /// Name of a builtin target rule; ignored when `rule_file` is set.
    scenario: String,
    rule_file: Option<PathBuf>,
    /// Directory for the JSON report; nothing is written when unset.
    output_dir: Option<PathBuf>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            data: SyntheticConfig::default(),
            scenario: "complex#1".into(),
            rule_file: None,
            output_dir: None,
        }
    }
}

fn main() -> Result<()> {
    init_tracing("rule-miner")?;
    let file = std::env::args_os().nth(1).map(PathBuf::from);
    let cfg: MinerConfig = load_config("rule-miner", file.as_deref()).context("loading configuration")?;

    let target = match &cfg.rule_file {
        Some(path) => scenarios::load(path, &cfg.search.limits).with_context(|| format!("loading rule from {}", path.display()))?,
        None => scenarios::builtin(&cfg.scenario, &cfg.data).context("building scenario rule")?,
    };
    info!(target: "rule-miner", scenario = %cfg.scenario, rule = %target, "generating labeled streams");

    let mut rng = match cfg.search.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let (training, holdout) = synthetic::generate_split(&cfg.data, &target, &mut rng).context("generating synthetic streams")?;
    info!(
        target: "rule-miner",
        training_events = training.len(),
        training_hits = training.occurrences().len(),
        holdout_hits = holdout.occurrences().len(),
        "streams ready"
    );

    let report = execute(&cfg.search, &training, &holdout).context("running bat search")?;
    for r in &report.results {
        info!(
            target: "rule-miner",
            run = r.run,
            fitness = r.training_fitness,
            holdout_f1 = r.holdout_f1(),
            tp = r.holdout.true_positives,
            fp = r.holdout.false_positives,
            fn_ = r.holdout.false_negatives,
            elapsed_ms = r.elapsed_ms,
            rule = %r.rendered,
            "run result"
        );
    }
    if let Some(best) = report.best() {
        info!(target: "rule-miner", run = best.run, fitness = best.training_fitness, rule = %best.rendered, expected = %target, "best rule");
    }

    if let Some(dir) = &cfg.output_dir {
        let path = write_report(dir, &cfg, &report)?;
        info!(target: "rule-miner", path = %path.display(), "report written");
    }
    Ok(())
}

#[derive(Serialize)]
struct ReportFile<'a> {
    scenario: &'a str,
    generated_at: String,
    data: &'a SyntheticConfig,
    report: &'a RunReport,
}

fn write_report(dir: &Path, cfg: &MinerConfig, report: &RunReport) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let now = chrono::Local::now();
    let name = format!("bat4cep-{}-{}.json", cfg.scenario.replace('#', "-"), now.format("%Y%m%d-%H%M%S"));
    let path = dir.join(name);
    let file = std::fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    let body = ReportFile { scenario: &cfg.scenario, generated_at: now.to_rfc3339(), data: &cfg.data, report };
    serde_json::to_writer_pretty(file, &body).context("serializing report")?;
    Ok(path)
}
