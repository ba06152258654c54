//! Scalar rule quality used for ranking.
//!
//! `fitness = quality(precision, recall) - size_penalty * rule_size`
//!
//! `quality` is either the F-beta measure or a non-negative weighted sum, so
//! fitness never decreases with precision or recall and never increases with
//! size. Keep the configuration fixed across runs that are compared.

use crate::evaluator::MatchOutcome;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Combination {
    FMeasure { beta: f64 },
    WeightedSum { precision: f64, recall: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessConfig {
    pub combination: Combination,
    pub size_penalty: f64,
}

impl Default for FitnessConfig {
    fn default() -> Self { Self { combination: Combination::FMeasure { beta: 1.0 }, size_penalty: 0.001 } }
}

impl FitnessConfig {
    pub fn is_valid(&self) -> bool {
        let weights_ok = match self.combination {
            Combination::FMeasure { beta } => beta.is_finite() && beta > 0.0,
            Combination::WeightedSum { precision, recall } => {
                precision.is_finite() && recall.is_finite() && precision >= 0.0 && recall >= 0.0
            }
        };
        weights_ok && self.size_penalty.is_finite() && self.size_penalty >= 0.0
    }

    pub fn quality(&self, outcome: &MatchOutcome) -> f64 {
        match self.combination {
            Combination::FMeasure { beta } => outcome.f_measure(beta),
            Combination::WeightedSum { precision, recall } => precision * outcome.precision() + recall * outcome.recall(),
        }
    }

    pub fn score(&self, outcome: &MatchOutcome, rule_size: usize) -> f64 {
        self.quality(outcome) - self.size_penalty * rule_size as f64
    }
}

/// Convenience wrapper over [`FitnessConfig::score`].
pub fn score(outcome: &MatchOutcome, rule_size: usize, cfg: &FitnessConfig) -> f64 { cfg.score(outcome, rule_size) }
