//! Tree-edit moves: the discrete counterpart of the bat position update.
//!
//! Every move runs on a scratch copy of the rule. The copy replaces the original
//! only when the edit changed something and the result still passes
//! [`Rule::validate`]; otherwise the move is retried a few times and then
//! dropped, leaving the rule untouched.

use crate::condition::{Comparison, Condition};
use crate::generate::RuleGenerator;
use crate::pattern::Pattern;
use crate::rule::Rule;
use crate::window::{TimeUnit, TimeWindow};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

const MAX_ATTEMPTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Move {
    ReplacePattern,
    RetypeLeaf,
    FlipOperator,
    SwapChildren,
    ReplaceCondition,
    TweakConstant,
    RetuneComparison,
    DropCondition,
    GrowCondition,
    SpliceBestPattern,
    SpliceBestCondition,
    ResizeWindow,
}

impl Move {
    pub const STRUCTURAL: [Move; 10] = [
        Move::ReplacePattern,
        Move::RetypeLeaf,
        Move::FlipOperator,
        Move::SwapChildren,
        Move::ReplaceCondition,
        Move::TweakConstant,
        Move::RetuneComparison,
        Move::DropCondition,
        Move::GrowCondition,
        Move::ResizeWindow,
    ];

    /// Edits that keep most of the rule intact, used by the local walk.
    pub const SMALL: [Move; 5] = [
        Move::RetypeLeaf,
        Move::TweakConstant,
        Move::RetuneComparison,
        Move::FlipOperator,
        Move::ResizeWindow,
    ];
}

/// A proposed rule plus how many of its edits took effect.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub rule: Rule,
    pub applied: usize,
    pub rejected: usize,
}

impl Candidate {
    fn record(&mut self, applied: bool) {
        if applied { self.applied += 1 } else { self.rejected += 1 }
    }
}

#[derive(Debug, Clone)]
pub struct Mutator {
    generator: RuleGenerator,
    window_min: u64,
    window_max: u64,
}

impl Mutator {
    /// `window_min`/`window_max` are in seconds; equal values pin the window.
    pub fn new(generator: RuleGenerator, window_min: u64, window_max: u64) -> Self {
        Self { generator, window_min: window_min.min(window_max), window_max: window_max.max(window_min) }
    }

    pub fn generator(&self) -> &RuleGenerator { &self.generator }

    pub fn window_is_searchable(&self) -> bool { self.window_min < self.window_max }

    /// Global search step: `moves` edits on a copy of `current`. Each edit splices
    /// from `best` with probability `splice_probability`, otherwise it is a random
    /// structural move.
    pub fn global_candidate<R: Rng + ?Sized>(&self, rng: &mut R, current: &Rule, best: &Rule, moves: usize, splice_probability: f64) -> Candidate {
        let mut out = Candidate { rule: current.copy(), applied: 0, rejected: 0 };
        for _ in 0..moves {
            let mv = if rng.gen_bool(splice_probability.clamp(0.0, 1.0)) {
                if best.condition().is_some() && rng.gen_bool(0.5) { Move::SpliceBestCondition } else { Move::SpliceBestPattern }
            } else {
                *Move::STRUCTURAL.choose(rng).unwrap_or(&Move::ReplacePattern)
            };
            let applied = self.apply(rng, &mut out.rule, mv, best, 1.0);
            out.record(applied);
        }
        out
    }

    /// Local walk: `moves` small edits on a copy of `best`, with constant
    /// perturbations scaled by `strength`.
    pub fn local_candidate<R: Rng + ?Sized>(&self, rng: &mut R, best: &Rule, moves: usize, strength: f64) -> Candidate {
        let mut out = Candidate { rule: best.copy(), applied: 0, rejected: 0 };
        for _ in 0..moves {
            let mv = *Move::SMALL.choose(rng).unwrap_or(&Move::TweakConstant);
            let applied = self.apply(rng, &mut out.rule, mv, best, strength);
            out.record(applied);
        }
        out
    }

    /// Applies `mv` to `rule` in place. Returns whether the rule changed.
    pub fn apply<R: Rng + ?Sized>(&self, rng: &mut R, rule: &mut Rule, mv: Move, best: &Rule, strength: f64) -> bool {
        for _ in 0..MAX_ATTEMPTS {
            let mut scratch = rule.copy();
            if !self.edit(rng, &mut scratch, mv, best, strength) { continue; }
            match scratch.validate(self.generator.limits()) {
                Ok(()) if scratch != *rule => {
                    *rule = scratch;
                    return true;
                }
                Ok(()) => {}
                Err(e) => tracing::trace!(?mv, error = %e, "discarding invalid edit"),
            }
        }
        false
    }

    fn edit<R: Rng + ?Sized>(&self, rng: &mut R, rule: &mut Rule, mv: Move, best: &Rule, strength: f64) -> bool {
        let changed = match mv {
            Move::ReplacePattern => self.replace_pattern(rng, rule),
            Move::RetypeLeaf => self.retype_leaf(rng, rule),
            Move::FlipOperator => flip_operator(rng, rule),
            Move::SwapChildren => swap_children(rng, rule),
            Move::ReplaceCondition => self.replace_condition(rng, rule),
            Move::TweakConstant => tweak_constant(rng, rule, strength),
            Move::RetuneComparison => retune_comparison(rng, rule),
            Move::DropCondition => drop_condition(rng, rule),
            Move::GrowCondition => self.grow_condition(rng, rule),
            Move::SpliceBestPattern => self.splice_pattern(rng, rule, best),
            Move::SpliceBestCondition => self.splice_condition(rng, rule, best),
            Move::ResizeWindow => self.resize_window(rng, rule, strength),
        };
        if changed { self.repair_condition(rng, rule); }
        changed
    }

    fn replace_pattern<R: Rng + ?Sized>(&self, rng: &mut R, rule: &mut Rule) -> bool {
        let max = self.generator.limits().max_pattern_height;
        let idx = rng.gen_range(0..rule.pattern().size());
        let Some(depth) = rule.pattern().depth_of(idx) else { return false; };
        if depth > max { return false; }
        let subtree = self.generator.random_pattern(rng, max + 1 - depth);
        match rule.pattern_mut().node_mut(idx) {
            Some(node) => { *node = subtree; true }
            None => false,
        }
    }

    fn retype_leaf<R: Rng + ?Sized>(&self, rng: &mut R, rule: &mut Rule) -> bool {
        let new_type = self.generator.random_type(rng);
        let mut leaves = rule.pattern_mut().leaf_types_mut();
        let Some(leaf) = leaves.choose_mut(rng) else { return false; };
        if **leaf == new_type { return false; }
        **leaf = new_type;
        true
    }

    fn replace_condition<R: Rng + ?Sized>(&self, rng: &mut R, rule: &mut Rule) -> bool {
        let max = self.generator.limits().max_condition_height;
        let aliases = rule.aliases();
        let window = *rule.window();
        if rule.condition().is_none() {
            let fresh = self.generator.random_condition(rng, &aliases, &window, max);
            let changed = fresh.is_some();
            *rule.condition_slot() = fresh;
            return changed;
        }
        let Some(cond) = rule.condition_slot() else { return false; };
        let idx = rng.gen_range(0..cond.node_count());
        let Some(depth) = cond.depth_of(idx) else { return false; };
        if depth > max { return false; }
        let Some(fresh) = self.generator.random_condition(rng, &aliases, &window, max + 1 - depth) else { return false; };
        match cond.node_mut(idx) {
            Some(node) => { *node = fresh; true }
            None => false,
        }
    }

    fn grow_condition<R: Rng + ?Sized>(&self, rng: &mut R, rule: &mut Rule) -> bool {
        let max = self.generator.limits().max_condition_height;
        let aliases = rule.aliases();
        let window = *rule.window();
        let slot = rule.condition_slot();
        match slot.take() {
            None => {
                *slot = self.generator.random_condition(rng, &aliases, &window, max);
                slot.is_some()
            }
            Some(existing) => {
                let extra = if existing.height() < max {
                    self.generator.random_comparison(rng, &aliases, &window, max - 1)
                } else {
                    None
                };
                match extra {
                    Some(extra) if rng.gen_bool(0.5) => { *slot = Some(Condition::and(existing, extra)); true }
                    Some(extra) => { *slot = Some(Condition::or(existing, extra)); true }
                    None => { *slot = Some(existing); false }
                }
            }
        }
    }

    fn splice_pattern<R: Rng + ?Sized>(&self, rng: &mut R, rule: &mut Rule, best: &Rule) -> bool {
        let max = self.generator.limits().max_pattern_height;
        let donor_idx = rng.gen_range(0..best.pattern().size());
        let Some(donor) = best.pattern().node(donor_idx) else { return false; };
        let donor_height = donor.height();
        let targets: Vec<usize> = (0..rule.pattern().size())
            .filter(|&i| rule.pattern().depth_of(i).is_some_and(|d| d - 1 + donor_height <= max))
            .collect();
        let Some(&target) = targets.choose(rng) else { return false; };
        let donor = donor.clone();
        match rule.pattern_mut().node_mut(target) {
            Some(node) => { *node = donor; true }
            None => false,
        }
    }

    fn splice_condition<R: Rng + ?Sized>(&self, rng: &mut R, rule: &mut Rule, best: &Rule) -> bool {
        let max = self.generator.limits().max_condition_height;
        let Some(source) = best.condition() else { return false; };
        let known = rule.aliases();
        let donors: Vec<&Condition> = (0..source.node_count())
            .filter_map(|i| source.node(i))
            .filter(|c| c.aliases().into_iter().all(|a| known.contains(a)))
            .collect();
        let Some(donor) = donors.choose(rng).map(|c| (*c).clone()) else { return false; };
        if rule.condition().is_none() {
            *rule.condition_slot() = Some(donor);
            return true;
        }
        let Some(cond) = rule.condition_slot() else { return false; };
        let targets: Vec<usize> = (0..cond.node_count())
            .filter(|&i| cond.depth_of(i).is_some_and(|d| d - 1 + donor.height() <= max))
            .collect();
        let Some(&target) = targets.choose(rng) else { return false; };
        match cond.node_mut(target) {
            Some(node) => { *node = donor; true }
            None => false,
        }
    }

    fn resize_window<R: Rng + ?Sized>(&self, rng: &mut R, rule: &mut Rule, strength: f64) -> bool {
        if !self.window_is_searchable() { return false; }
        let current = *rule.window();
        if current.unit != TimeUnit::Seconds { return false; }
        let range = (self.window_max - self.window_min) as f64;
        let max_step = ((range * strength.clamp(0.0, 1.0) / 4.0).round() as u64).max(1);
        let step = rng.gen_range(1..=max_step);
        let duration = if rng.gen_bool(0.5) {
            current.duration.saturating_add(step).min(self.window_max)
        } else {
            current.duration.saturating_sub(step).max(self.window_min)
        };
        if duration == current.duration { return false; }
        rule.set_window(TimeWindow { duration, ..current }).is_ok()
    }

    /// After a pattern edit, a condition naming aliases that no longer exist is
    /// regenerated over the new aliases, or dropped.
    fn repair_condition<R: Rng + ?Sized>(&self, rng: &mut R, rule: &mut Rule) {
        let known = rule.aliases();
        let stale = rule.condition().is_some_and(|c| c.aliases().into_iter().any(|a| !known.contains(a)));
        if !stale { return; }
        let window = *rule.window();
        let fresh = self.generator.random_condition(rng, &known, &window, self.generator.limits().max_condition_height);
        *rule.condition_slot() = fresh;
    }
}

fn flip_operator<R: Rng + ?Sized>(rng: &mut R, rule: &mut Rule) -> bool {
    let composites: Vec<usize> = (0..rule.pattern().size())
        .filter(|&i| rule.pattern().node(i).is_some_and(|n| !n.is_leaf()))
        .collect();
    let Some(&idx) = composites.choose(rng) else { return false; };
    let Some(node) = rule.pattern_mut().node_mut(idx) else { return false; };
    let old = std::mem::replace(node, Pattern::Atomic(String::new()));
    *node = match old {
        Pattern::Sequence(l, r) => Pattern::Conjunction(l, r),
        Pattern::Conjunction(l, r) => Pattern::Sequence(l, r),
        Pattern::Negation { negated, scope } => Pattern::Conjunction(scope, negated),
        leaf @ Pattern::Atomic(_) => leaf,
    };
    true
}

fn swap_children<R: Rng + ?Sized>(rng: &mut R, rule: &mut Rule) -> bool {
    let binary: Vec<usize> = (0..rule.pattern().size())
        .filter(|&i| matches!(rule.pattern().node(i), Some(Pattern::Sequence(..) | Pattern::Conjunction(..))))
        .collect();
    let Some(&idx) = binary.choose(rng) else { return false; };
    match rule.pattern_mut().node_mut(idx) {
        Some(Pattern::Sequence(l, r) | Pattern::Conjunction(l, r)) if l != r => {
            std::mem::swap(l, r);
            true
        }
        _ => false,
    }
}

fn tweak_constant<R: Rng + ?Sized>(rng: &mut R, rule: &mut Rule, strength: f64) -> bool {
    let Some(cond) = rule.condition_slot() else { return false; };
    let mut constants = cond.constants_mut();
    let Some((c, domain)) = constants.choose_mut(rng) else { return false; };
    let current = **c;
    let integral = current.fract() == 0.0;
    let scale = (current.abs() * 0.25).max(1.0) * strength.max(0.05);
    let mut next = current + rng.gen_range(-scale..=scale);
    if integral { next = next.round(); }
    if next == current { next = current + if rng.gen_bool(0.5) { 1.0 } else { -1.0 }; }
    let next = domain.clamp(next);
    if next == current { return false; }
    **c = next;
    true
}

fn retune_comparison<R: Rng + ?Sized>(rng: &mut R, rule: &mut Rule) -> bool {
    let Some(cond) = rule.condition_slot() else { return false; };
    let mut ops = cond.comparisons_mut();
    let Some(op) = ops.choose_mut(rng) else { return false; };
    let current = **op;
    let others: Vec<Comparison> = Comparison::ALL.into_iter().filter(|o| *o != current).collect();
    match others.choose(rng) {
        Some(next) => { **op = *next; true }
        None => false,
    }
}

fn drop_condition<R: Rng + ?Sized>(rng: &mut R, rule: &mut Rule) -> bool {
    let slot = rule.condition_slot();
    *slot = match slot.take() {
        None => return false,
        Some(Condition::And(l, r) | Condition::Or(l, r)) => Some(if rng.gen_bool(0.5) { *l } else { *r }),
        Some(_) => None,
    };
    true
}
