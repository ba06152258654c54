//! Search configuration. Every field has a default, so a config file or the
//! `BATCEP__` environment only needs to name what it overrides.

use crate::fitness::FitnessConfig;
use crate::rule::HeightLimits;
use crate::window::TimeWindow;
use crate::evaluator::DEFAULT_MAX_BINDINGS;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("frequency bounds invalid: min {min}, max {max}")]
    Frequency { min: f64, max: f64 },
    #[error("{name} must lie in [0, 1], got {value}")]
    UnitRange { name: &'static str, value: f64 },
    #[error("gamma must be non-negative, got {0}")]
    Gamma(f64),
    #[error("height limits invalid: pattern {pattern}, condition {condition} (need >= 1 and >= 2)")]
    Heights { pattern: usize, condition: usize },
    #[error("window range invalid: initial {initial}s, min {min}s, max {max}s")]
    Window { initial: u64, min: u64, max: u64 },
    #[error("fitness weights must be finite and non-negative")]
    Fitness,
}

/// Bat algorithm parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatConfig {
    pub name: String,
    pub swarm_size: usize,
    pub timesteps: usize,
    pub min_frequency: f64,
    pub max_frequency: f64,
    /// Asymptotic pulse rate `r0`.
    pub pulse_rate: f64,
    pub gamma: f64,
    /// Initial loudness `A0`.
    pub loudness: f64,
    pub alpha: f64,
}

impl Default for BatConfig {
    fn default() -> Self {
        Self {
            name: "swarm".into(),
            swarm_size: 200,
            timesteps: 500,
            min_frequency: 0.0,
            max_frequency: 2.5,
            pulse_rate: 0.1,
            gamma: 0.9,
            loudness: 1.0,
            alpha: 0.9,
        }
    }
}

/// Window length in seconds. The window is searched when `min < max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub initial_secs: u64,
    pub min_secs: u64,
    pub max_secs: u64,
}

impl Default for WindowConfig {
    fn default() -> Self { Self { initial_secs: 60, min_secs: 60, max_secs: 60 } }
}

impl WindowConfig {
    pub fn initial(&self) -> TimeWindow { TimeWindow::seconds(self.initial_secs) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub bat: BatConfig,
    pub limits: HeightLimits,
    pub fitness: FitnessConfig,
    pub window: WindowConfig,
    pub max_moves: usize,
    pub local_moves: usize,
    pub condition_probability: f64,
    pub max_bindings: usize,
    pub runs: usize,
    pub workers: usize,
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            bat: BatConfig::default(),
            limits: HeightLimits::default(),
            fitness: FitnessConfig::default(),
            window: WindowConfig::default(),
            max_moves: 4,
            local_moves: 2,
            condition_probability: 0.5,
            max_bindings: DEFAULT_MAX_BINDINGS,
            runs: 10,
            workers: 5,
            seed: None,
        }
    }
}

fn unit(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) { Ok(()) } else { Err(ConfigError::UnitRange { name, value }) }
}

fn positive(name: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 { Err(ConfigError::Zero(name)) } else { Ok(()) }
}

impl SearchConfig {
    /// Rejects configurations no run could start from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.bat;
        positive("swarm_size", b.swarm_size)?;
        positive("timesteps", b.timesteps)?;
        positive("runs", self.runs)?;
        positive("workers", self.workers)?;
        positive("max_moves", self.max_moves)?;
        positive("max_bindings", self.max_bindings)?;
        if !(b.min_frequency >= 0.0 && b.max_frequency >= b.min_frequency && b.max_frequency.is_finite()) {
            return Err(ConfigError::Frequency { min: b.min_frequency, max: b.max_frequency });
        }
        unit("loudness", b.loudness)?;
        unit("pulse_rate", b.pulse_rate)?;
        unit("alpha", b.alpha)?;
        unit("condition_probability", self.condition_probability)?;
        if !(b.gamma >= 0.0 && b.gamma.is_finite()) { return Err(ConfigError::Gamma(b.gamma)); }
        let l = &self.limits;
        if l.max_pattern_height < 1 || l.max_condition_height < 2 {
            return Err(ConfigError::Heights { pattern: l.max_pattern_height, condition: l.max_condition_height });
        }
        let w = &self.window;
        if w.min_secs == 0 || w.min_secs > w.max_secs || !(w.min_secs..=w.max_secs).contains(&w.initial_secs) {
            return Err(ConfigError::Window { initial: w.initial_secs, min: w.min_secs, max: w.max_secs });
        }
        if !self.fitness.is_valid() { return Err(ConfigError::Fitness); }
        Ok(())
    }

    /// Seed for run `index`: consecutive from the base seed, if one is set.
    pub fn run_seed(&self, index: usize) -> Option<u64> { self.seed.map(|s| s.wrapping_add(index as u64)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(SearchConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_inverted_frequencies_and_empty_swarm() {
        let mut cfg = SearchConfig::default();
        cfg.bat.max_frequency = -1.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Frequency { .. })));
        let mut cfg = SearchConfig::default();
        cfg.bat.swarm_size = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::Zero("swarm_size")));
    }

    #[test]
    fn rejects_out_of_range_rates_and_windows() {
        let mut cfg = SearchConfig::default();
        cfg.bat.alpha = 1.5;
        assert!(matches!(cfg.validate(), Err(ConfigError::UnitRange { name: "alpha", .. })));
        let mut cfg = SearchConfig::default();
        cfg.window = WindowConfig { initial_secs: 10, min_secs: 30, max_secs: 90 };
        assert!(matches!(cfg.validate(), Err(ConfigError::Window { .. })));
        let mut cfg = SearchConfig::default();
        cfg.limits.max_condition_height = 1;
        assert!(matches!(cfg.validate(), Err(ConfigError::Heights { .. })));
    }

    #[test]
    fn run_seeds_are_consecutive() {
        let cfg = SearchConfig { seed: Some(40), ..Default::default() };
        assert_eq!(cfg.run_seed(2), Some(42));
        assert_eq!(SearchConfig::default().run_seed(2), None);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg: SearchConfig = serde_yaml::from_str("bat:\n  swarm_size: 20\nruns: 2\n").unwrap();
        assert_eq!(cfg.bat.swarm_size, 20);
        assert_eq!(cfg.bat.timesteps, 500);
        assert_eq!(cfg.runs, 2);
        assert_eq!(cfg.limits, HeightLimits::default());
    }
}
