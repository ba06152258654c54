//! One search agent: a rule plus the bat algorithm's per-agent parameters.

use crate::config::BatConfig;
use crate::rule::Rule;
use serde::Serialize;

const VELOCITY_DECAY: f64 = 0.5;

#[derive(Debug, Clone, Serialize)]
pub struct Bat {
    pub rule: Rule,
    pub fitness: f64,
    pub frequency: f64,
    /// Velocity magnitude, in tree edits.
    pub velocity: f64,
    pub loudness: f64,
    pub pulse_rate: f64,
    pub best_rule: Rule,
    pub best_fitness: f64,
}

impl Bat {
    pub fn new(rule: Rule, fitness: f64, cfg: &BatConfig) -> Self {
        Self {
            best_rule: rule.copy(),
            best_fitness: fitness,
            rule,
            fitness,
            frequency: cfg.min_frequency,
            velocity: 0.0,
            loudness: cfg.loudness,
            pulse_rate: 0.0,
        }
    }

    /// `f = f_min + (f_max - f_min) * beta` for `beta` in `[0, 1]`.
    pub fn tune_frequency(&mut self, beta: f64, cfg: &BatConfig) {
        self.frequency = cfg.min_frequency + (cfg.max_frequency - cfg.min_frequency) * beta.clamp(0.0, 1.0);
    }

    /// `v = decay * v + |x - x_best| * f`, capped at `max_moves`. An agent sitting
    /// on the best halves its velocity each step.
    pub fn update_velocity(&mut self, distance: usize, max_moves: usize) {
        self.velocity = (VELOCITY_DECAY * self.velocity + distance as f64 * self.frequency).clamp(0.0, max_moves as f64);
    }

    /// Number of global-search edits the current velocity buys.
    pub fn moves(&self, max_moves: usize) -> usize {
        (self.velocity.ceil() as usize).clamp(1, max_moves.max(1))
    }

    /// Pulse emission gate: a draw above the pulse rate triggers the local walk.
    pub fn wants_local_walk(&self, draw: f64) -> bool { draw > self.pulse_rate }

    /// Stochastic acceptance gate.
    pub fn admits(&self, fitness: f64, draw: f64) -> bool { fitness > self.fitness && draw < self.loudness }

    /// Adopts `rule` at timestep `t`: loudness decays, pulse rate grows toward `r0`.
    pub fn accept(&mut self, rule: Rule, fitness: f64, t: usize, cfg: &BatConfig) {
        self.rule = rule;
        self.fitness = fitness;
        self.loudness *= cfg.alpha;
        self.pulse_rate = cfg.pulse_rate * (1.0 - (-cfg.gamma * t as f64).exp());
        if fitness > self.best_fitness {
            self.best_fitness = fitness;
            self.best_rule = self.rule.copy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;
    use crate::rule::Action;
    use crate::window::TimeWindow;

    fn rule(t: &str) -> Rule { Rule::unconditional(Pattern::atomic(t), TimeWindow::seconds(60), Action::emit("HIT")).unwrap() }

    #[test]
    fn starts_at_configured_state() {
        let cfg = BatConfig::default();
        let bat = Bat::new(rule("A"), 0.3, &cfg);
        assert_eq!(bat.frequency, 0.0);
        assert_eq!(bat.loudness, 1.0);
        assert_eq!(bat.pulse_rate, 0.0);
        assert_eq!(bat.best_fitness, 0.3);
    }

    #[test]
    fn acceptance_decays_loudness_and_raises_pulse() {
        let cfg = BatConfig::default();
        let mut bat = Bat::new(rule("A"), 0.1, &cfg);
        let (mut loud, mut pulse) = (bat.loudness, bat.pulse_rate);
        for t in 1..=30 {
            bat.accept(rule("B"), 0.1 + t as f64 * 0.01, t, &cfg);
            assert!(bat.loudness <= loud && bat.pulse_rate >= pulse);
            (loud, pulse) = (bat.loudness, bat.pulse_rate);
        }
        assert!(bat.loudness < 0.05);
        assert!((bat.pulse_rate - cfg.pulse_rate).abs() < 1e-6);
        assert_eq!(bat.best_rule, rule("B"));
    }

    #[test]
    fn velocity_and_moves_are_capped() {
        let cfg = BatConfig::default();
        let mut bat = Bat::new(rule("A"), 0.0, &cfg);
        bat.tune_frequency(1.0, &cfg);
        assert_eq!(bat.frequency, 2.5);
        bat.update_velocity(10, 4);
        assert_eq!(bat.velocity, 4.0);
        assert_eq!(bat.moves(4), 4);
        bat.velocity = 0.0;
        assert_eq!(bat.moves(4), 1);
    }

    #[test]
    fn velocity_decays_at_the_best() {
        let cfg = BatConfig::default();
        let mut bat = Bat::new(rule("A"), 0.0, &cfg);
        bat.tune_frequency(1.0, &cfg);
        bat.update_velocity(3, 4);
        assert_eq!(bat.moves(4), 4);
        let mut last = bat.velocity;
        for _ in 0..4 {
            bat.update_velocity(0, 4);
            assert!(bat.velocity < last);
            last = bat.velocity;
        }
        assert_eq!(bat.moves(4), 1);
    }

    #[test]
    fn gates() {
        let bat = Bat::new(rule("A"), 0.5, &BatConfig::default());
        assert!(bat.wants_local_walk(0.5));
        assert!(bat.admits(0.6, 0.99));
        assert!(!bat.admits(0.5, 0.0));
    }
}
