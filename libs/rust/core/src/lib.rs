//! Core library for mining CEP rules with a discrete bat algorithm.
//!
//! Leaves first: the rule model ([`pattern`], [`condition`], [`window`], [`rule`]),
//! the [`evaluator`] that replays a rule over a labeled stream, the [`fitness`]
//! scorer, and the search itself ([`generate`], [`mutation`], [`bat`],
//! [`optimizer`], [`runner`]). [`synthetic`] supplies labeled test streams.

use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::prelude::*;

pub mod bat;
pub mod condition;
pub mod config;
pub mod evaluator;
pub mod event;
pub mod fitness;
pub mod generate;
pub mod mutation;
pub mod optimizer;
pub mod pattern;
pub mod rule;
pub mod runner;
pub mod synthetic;
pub mod window;

pub use bat::Bat;
pub use condition::{Aggregate, Arith, Comparison, Condition, Expr};
pub use crate::config::{BatConfig, ConfigError, SearchConfig, WindowConfig};
pub use evaluator::{evaluate, Evaluator, MatchOutcome};
pub use event::{Bounds, Event, EventStream, Schema, StreamError, Timestamp};
pub use fitness::{score, Combination, FitnessConfig};
pub use generate::RuleGenerator;
pub use mutation::{Candidate, Move, Mutator};
pub use optimizer::{BatOptimizer, RunPhase, RunResult, RunState};
pub use pattern::{Alias, Pattern};
pub use rule::{Action, HeightLimits, Rule, RuleError};
pub use runner::{execute, MinerError, RunReport, RunSummary};
pub use synthetic::SyntheticConfig;
pub use window::{TimeUnit, TimeWindow};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Installs the global subscriber once. `RUST_LOG` sets the filter (default
/// `info`); `BATCEP_JSON_LOG=1` switches to flattened JSON lines.
pub fn init_tracing(service: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let json = std::env::var("BATCEP_JSON_LOG").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(env_filter);
        if json {
            registry.with(tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false))
                .try_init()?;
        } else {
            registry.with(tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true))
                .try_init()?;
        }
        Ok(())
    })?;
    info!(service, "tracing initialized");
    Ok(())
}

/// Layers `T::default()`, then an optional YAML/JSON file (`file`, else
/// `BATCEP_CONFIG_FILE`), then `BATCEP__SECTION__KEY` environment variables.
pub fn load_config<T>(service: &str, file: Option<&Path>) -> Result<T>
where
    T: Default + Serialize + DeserializeOwned,
{
    let mut builder = ::config::Config::builder().add_source(::config::Config::try_from(&T::default())?);
    let file = file.map(Path::to_path_buf).or_else(|| std::env::var_os("BATCEP_CONFIG_FILE").map(PathBuf::from));
    if let Some(path) = &file {
        builder = builder.add_source(::config::File::from(path.as_path()).required(true));
    }
    builder = builder.add_source(::config::Environment::with_prefix("BATCEP").separator("__").try_parsing(true));
    let cfg = builder.build()?.try_deserialize()?;
    info!(service, file = ?file, "configuration loaded");
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn tracing_init_is_idempotent() {
        assert!(init_tracing("batcep-test").is_ok());
        assert!(init_tracing("batcep-test").is_ok());
    }

    #[test]
    fn file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("batcep-config-{}.yaml", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "bat:\n  swarm_size: 12\nmax_moves: 3").unwrap();
        let cfg: SearchConfig = load_config("batcep-test", Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(cfg.bat.swarm_size, 12);
        assert_eq!(cfg.max_moves, 3);
        assert_eq!(cfg.bat.timesteps, BatConfig::default().timesteps);
        assert_eq!(cfg.window, WindowConfig::default());
    }
}
