//! Discrete bat algorithm over rule trees.
//!
//! A run moves `Initializing -> Iterating -> Terminated` and always spends its
//! full timestep budget. Agents are updated one after another within a timestep,
//! and a new global best found by one agent is visible to every later agent of
//! the same timestep. Results therefore depend on agent order; keep it fixed
//! when comparing runs.

use crate::bat::Bat;
use crate::config::SearchConfig;
use crate::evaluator::{Evaluator, MatchOutcome};
use crate::event::EventStream;
use crate::generate::RuleGenerator;
use crate::mutation::Mutator;
use crate::rule::{Action, Rule, RuleError};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, instrument, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Initializing,
    Iterating,
    Terminated,
}

/// Everything one run owns exclusively.
#[derive(Debug)]
pub struct RunState {
    pub phase: RunPhase,
    pub bats: Vec<Bat>,
    pub best_rule: Rule,
    pub best_fitness: f64,
    pub timestep: usize,
    /// Global-best fitness after each timestep.
    pub history: Vec<f64>,
    pub accepted: usize,
    pub rejected: usize,
    rng: StdRng,
}

impl RunState {
    fn advance(&mut self) {
        let next = match self.phase {
            RunPhase::Initializing => RunPhase::Iterating,
            RunPhase::Iterating | RunPhase::Terminated => RunPhase::Terminated,
        };
        trace!(from = ?self.phase, to = ?next, timestep = self.timestep, "run phase");
        self.phase = next;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run: usize,
    pub seed: u64,
    pub rule: Rule,
    pub rendered: String,
    pub training_fitness: f64,
    pub training: MatchOutcome,
    pub holdout: MatchOutcome,
    pub holdout_fitness: f64,
    pub history: Vec<f64>,
    pub accepted: usize,
    pub rejected: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub config: SearchConfig,
}

impl RunResult {
    pub fn holdout_f1(&self) -> f64 { self.holdout.f_measure(1.0) }
}

pub struct BatOptimizer<'a> {
    cfg: &'a SearchConfig,
    training: &'a EventStream,
    evaluator: Evaluator,
    mutator: Mutator,
}

impl<'a> BatOptimizer<'a> {
    /// Rules emit the training stream's target event. `cfg` is expected to be validated.
    pub fn new(cfg: &'a SearchConfig, training: &'a EventStream) -> Self {
        let generator = RuleGenerator::new(
            training.schema(),
            cfg.limits,
            cfg.window.initial(),
            Action::emit(training.target()),
            cfg.condition_probability,
        );
        Self {
            cfg,
            training,
            evaluator: Evaluator::new(cfg.max_bindings),
            mutator: Mutator::new(generator, cfg.window.min_secs, cfg.window.max_secs),
        }
    }

    pub fn fitness(&self, rule: &Rule) -> f64 {
        let outcome = self.evaluator.evaluate(rule, self.training);
        self.cfg.fitness.score(&outcome, rule.size())
    }

    /// Random population within the height limits; the fittest agent seeds the global best.
    pub fn initialize(&self, seed: u64) -> Result<RunState, RuleError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let bat_cfg = &self.cfg.bat;
        let mut bats = Vec::with_capacity(bat_cfg.swarm_size);
        for _ in 0..bat_cfg.swarm_size {
            let rule = self.mutator.generator().random_rule(&mut rng)?;
            let fitness = self.fitness(&rule);
            bats.push(Bat::new(rule, fitness, bat_cfg));
        }
        let leader = bats.iter()
            .max_by(|a, b| a.fitness.total_cmp(&b.fitness))
            .map(|b| (b.rule.copy(), b.fitness));
        let (best_rule, best_fitness) = match leader {
            Some(l) => l,
            None => {
                let rule = self.mutator.generator().random_rule(&mut rng)?;
                let fitness = self.fitness(&rule);
                (rule, fitness)
            }
        };
        debug!(best_fitness, rule = %best_rule, "population initialized");
        let mut state = RunState {
            phase: RunPhase::Initializing,
            bats,
            best_rule,
            best_fitness,
            timestep: 0,
            history: Vec::with_capacity(bat_cfg.timesteps),
            accepted: 0,
            rejected: 0,
            rng,
        };
        state.advance();
        Ok(state)
    }

    /// One timestep over every agent, in population order.
    pub fn step(&self, state: &mut RunState) {
        if state.phase != RunPhase::Iterating { return; }
        state.timestep += 1;
        let t = state.timestep;
        let mean_loudness = state.bats.iter().map(|b| b.loudness).sum::<f64>() / state.bats.len().max(1) as f64;
        let local_moves = ((mean_loudness * self.cfg.local_moves as f64).round() as usize).max(1);

        for i in 0..state.bats.len() {
            self.visit(state, i, mean_loudness, local_moves);
        }

        state.history.push(state.best_fitness);
        debug!(timestep = t, best_fitness = state.best_fitness, mean_loudness, "timestep done");
        if t >= self.cfg.bat.timesteps { state.advance(); }
    }

    /// Updates agent `i` against the current global best and promotes it if it
    /// beats that best.
    fn visit(&self, state: &mut RunState, i: usize, mean_loudness: f64, local_moves: usize) {
        let cfg = self.cfg;
        let t = state.timestep;
        let bat = &mut state.bats[i];
        let beta: f64 = state.rng.gen();
        bat.tune_frequency(beta, &cfg.bat);
        bat.update_velocity(bat.rule.distance(&state.best_rule), cfg.max_moves);

        let candidate = if bat.wants_local_walk(state.rng.gen()) {
            self.mutator.local_candidate(&mut state.rng, &state.best_rule, local_moves, mean_loudness)
        } else {
            let splice = if cfg.bat.max_frequency > 0.0 { bat.frequency / cfg.bat.max_frequency } else { 0.0 };
            self.mutator.global_candidate(&mut state.rng, &bat.rule, &state.best_rule, bat.moves(cfg.max_moves), splice)
        };
        state.rejected += candidate.rejected;

        match candidate.rule.validate(&cfg.limits) {
            Err(e) => {
                trace!(error = %e, "candidate rejected, keeping previous rule");
                state.rejected += 1;
            }
            Ok(()) if candidate.rule != bat.rule => {
                let fitness = self.fitness(&candidate.rule);
                if bat.admits(fitness, state.rng.gen()) {
                    bat.accept(candidate.rule, fitness, t, &cfg.bat);
                    state.accepted += 1;
                }
            }
            Ok(()) => {}
        }
        if bat.fitness > state.best_fitness {
            state.best_fitness = bat.fitness;
            state.best_rule = bat.rule.copy();
            debug!(timestep = t, fitness = bat.fitness, rule = %state.best_rule, "new global best");
        }
    }

    /// Full run, then a final evaluation of the best rule on `holdout`.
    #[instrument(skip_all, fields(run = index, seed = seed))]
    pub fn run(&self, index: usize, seed: u64, holdout: &EventStream) -> Result<RunResult, RuleError> {
        let started_at = Utc::now();
        let started = Instant::now();
        info!(swarm = self.cfg.bat.swarm_size, timesteps = self.cfg.bat.timesteps, "run started");
        let mut state = self.initialize(seed)?;
        while state.phase == RunPhase::Iterating { self.step(&mut state); }

        let rule = state.best_rule;
        let training = self.evaluator.evaluate(&rule, self.training);
        let holdout = self.evaluator.evaluate(&rule, holdout);
        let holdout_fitness = self.cfg.fitness.score(&holdout, rule.size());
        info!(
            fitness = state.best_fitness,
            tp = holdout.true_positives,
            fp = holdout.false_positives,
            fn_ = holdout.false_negatives,
            rule = %rule,
            "run finished"
        );
        Ok(RunResult {
            run: index,
            seed,
            rendered: rule.to_string(),
            rule,
            training_fitness: state.best_fitness,
            training,
            holdout,
            holdout_fitness,
            history: state.history,
            accepted: state.accepted,
            rejected: state.rejected,
            started_at,
            elapsed_ms: started.elapsed().as_millis() as u64,
            config: self.cfg.clone(),
        })
    }
}
