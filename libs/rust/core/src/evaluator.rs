//! Replays a rule over an event stream and classifies its predictions against
//! the stream's ground truth.
//!
//! Every event is tried as an anchor. A binding for an anchor assigns one distinct
//! event to each bindable pattern leaf, uses the anchor itself, and keeps every
//! bound event inside the anchor's window and no later than the anchor. The rule
//! fires at the anchor's timestamp when at least one binding satisfies the
//! attribute condition. Evaluation is a pure function of `(rule, stream)`.

use crate::condition::Binding;
use crate::event::{Event, EventStream, Timestamp};
use crate::pattern::Pattern;
use crate::rule::Rule;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Per-node cap on enumerated bindings for one anchor.
pub const DEFAULT_MAX_BINDINGS: usize = 4096;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    #[serde(skip)]
    pub predicted: Vec<Timestamp>,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl MatchOutcome {
    /// Multiset comparison: a prediction and an occurrence pair up when their
    /// timestamps are equal, each used at most once. Both inputs must be sorted.
    pub fn classify(predicted: Vec<Timestamp>, truth: &[Timestamp]) -> Self {
        let (mut i, mut j, mut tp) = (0, 0, 0);
        while i < predicted.len() && j < truth.len() {
            match predicted[i].cmp(&truth[j]) {
                Ordering::Equal => { tp += 1; i += 1; j += 1; }
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
            }
        }
        Self {
            true_positives: tp,
            false_positives: predicted.len() - tp,
            false_negatives: truth.len() - tp,
            predicted,
        }
    }

    pub fn precision(&self) -> f64 { ratio(self.true_positives, self.true_positives + self.false_positives) }
    pub fn recall(&self) -> f64 { ratio(self.true_positives, self.true_positives + self.false_negatives) }

    /// F-beta measure; 0 when precision and recall are both 0.
    pub fn f_measure(&self, beta: f64) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        let b2 = beta * beta;
        let denom = b2 * p + r;
        if denom <= 0.0 { 0.0 } else { (1.0 + b2) * p * r / denom }
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 { 0.0 } else { num as f64 / denom as f64 }
}

/// Evaluates with the default binding cap.
pub fn evaluate(rule: &Rule, stream: &EventStream) -> MatchOutcome {
    Evaluator::default().evaluate(rule, stream)
}

#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    max_bindings: usize,
}

impl Default for Evaluator {
    fn default() -> Self { Self { max_bindings: DEFAULT_MAX_BINDINGS } }
}

impl Evaluator {
    pub fn new(max_bindings: usize) -> Self { Self { max_bindings: max_bindings.max(1) } }

    pub fn evaluate(&self, rule: &Rule, stream: &EventStream) -> MatchOutcome {
        MatchOutcome::classify(self.predict(rule, stream.events()), stream.occurrences())
    }

    /// Timestamps at which the rule fires, in stream order.
    pub fn predict(&self, rule: &Rule, events: &[Event]) -> Vec<Timestamp> {
        let anchors = rule.pattern().anchor_types();
        let aliases = rule.aliases();
        let mut out = Vec::new();
        for (anchor, ev) in events.iter().enumerate() {
            if !anchors.contains(ev.event_type.as_str()) { continue; }
            let (lo, hi) = rule.window().range(ev.timestamp);
            let start = events.partition_point(|e| e.timestamp < lo);
            let end = events.partition_point(|e| e.timestamp <= hi);
            if start > anchor { continue; }
            let scope = Scope { events, start, anchor, window_lo: lo, cap: self.max_bindings };
            let window = &events[start..end];
            let fires = scope.matches(rule.pattern(), 0, true).into_iter().any(|partial| {
                let Some(cond) = rule.condition() else { return true; };
                let mut slots = partial.slots;
                slots.sort_unstable_by_key(|(ordinal, _)| *ordinal);
                let bound: Vec<&Event> = slots.iter().map(|(_, idx)| &events[*idx]).collect();
                cond.holds(&Binding { aliases: &aliases, bound: &bound, window })
            });
            if fires { out.push(ev.timestamp); }
        }
        out
    }
}

/// Partial binding of a subtree: `(leaf ordinal, event index)` pairs plus the
/// earliest and latest bound timestamps.
#[derive(Debug, Clone)]
struct Partial {
    slots: Vec<(usize, usize)>,
    first: Timestamp,
    last: Timestamp,
}

impl Partial {
    fn disjoint(&self, other: &Partial) -> bool {
        self.slots.iter().all(|(_, a)| other.slots.iter().all(|(_, b)| a != b))
    }

    fn join(&self, other: &Partial) -> Partial {
        let mut slots = self.slots.clone();
        slots.extend_from_slice(&other.slots);
        Partial { slots, first: self.first.min(other.first), last: self.last.max(other.last) }
    }

    fn contains(&self, idx: usize) -> bool { self.slots.iter().any(|(_, i)| *i == idx) }
}

/// Bindable candidates for one anchor: event indices `start..=anchor`.
struct Scope<'e> {
    events: &'e [Event],
    start: usize,
    anchor: usize,
    window_lo: Timestamp,
    cap: usize,
}

impl Scope<'_> {
    /// Bindings of `node` whose leaves are numbered from `base`. With `anchored`,
    /// only bindings that use the anchor event are returned.
    fn matches(&self, node: &Pattern, base: usize, anchored: bool) -> Vec<Partial> {
        match node {
            Pattern::Atomic(t) => {
                let leaf = |idx: usize| {
                    let ts = self.events[idx].timestamp;
                    Partial { slots: vec![(base, idx)], first: ts, last: ts }
                };
                if anchored {
                    if self.events[self.anchor].event_type == *t { vec![leaf(self.anchor)] } else { vec![] }
                } else {
                    (self.start..=self.anchor)
                        .filter(|&i| self.events[i].event_type == *t)
                        .take(self.cap)
                        .map(leaf)
                        .collect()
                }
            }
            Pattern::Sequence(l, r) => {
                // The anchor is the latest bound event, so it can only sit on the right.
                let rights = self.matches(r, base + l.bindable_count(), anchored);
                if rights.is_empty() { return vec![]; }
                let lefts = self.matches(l, base, false);
                self.combine(&lefts, &rights, |a, b| a.last < b.first)
            }
            Pattern::Conjunction(l, r) => {
                let rbase = base + l.bindable_count();
                if anchored {
                    let mut out = self.combine(&self.matches(l, base, true), &self.matches(r, rbase, false), |_, _| true);
                    let free_left: Vec<Partial> = self.matches(l, base, false).into_iter().filter(|p| !p.contains(self.anchor)).collect();
                    out.extend(self.combine(&free_left, &self.matches(r, rbase, true), |_, _| true));
                    out.truncate(self.cap);
                    out
                } else {
                    self.combine(&self.matches(l, base, false), &self.matches(r, rbase, false), |_, _| true)
                }
            }
            Pattern::Negation { negated, scope } => {
                let scopes = self.matches(scope, base, anchored);
                if scopes.is_empty() { return scopes; }
                let forbidden = self.matches(negated, 0, false);
                scopes.into_iter().filter(|s| !forbidden.iter().any(|n| self.inside_region(n, s))).collect()
            }
        }
    }

    /// Whether a negated binding falls in the region a scope binding establishes:
    /// strictly between its first and last event, or, for a single-instant scope,
    /// anywhere in the window before it.
    fn inside_region(&self, negated: &Partial, scope: &Partial) -> bool {
        if scope.first < scope.last {
            negated.first > scope.first && negated.last < scope.last
        } else {
            negated.first >= self.window_lo && negated.last < scope.first
        }
    }

    fn combine(&self, lefts: &[Partial], rights: &[Partial], ordered: impl Fn(&Partial, &Partial) -> bool) -> Vec<Partial> {
        let mut out = Vec::new();
        for a in lefts {
            for b in rights {
                if ordered(a, b) && a.disjoint(b) {
                    out.push(a.join(b));
                    if out.len() >= self.cap { return out; }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Aggregate, Condition, Expr};
    use crate::event::Bounds;
    use crate::pattern::Alias;
    use crate::rule::Action;
    use crate::window::TimeWindow;

    fn secs(s: i64) -> Timestamp { s * 1000 }

    fn ev(t: &str, s: i64, room: f64) -> Event { Event::new(t, secs(s)).with_attr("ROOM", room) }

    fn room(alias: &str) -> Expr { Expr::attr(Alias::parse(alias).unwrap(), "ROOM", Bounds::new(1.0, 10.0)) }

    fn rule(pattern: Pattern, cond: Option<Condition>) -> Rule {
        Rule::new(pattern, cond, TimeWindow::seconds(60), Action::emit("HIT")).unwrap()
    }

    fn predict(rule: &Rule, events: &[Event]) -> Vec<Timestamp> { Evaluator::default().predict(rule, events) }

    #[test]
    fn sequence_requires_strict_order() {
        let r = rule(Pattern::seq(Pattern::atomic("A"), Pattern::atomic("B")), None);
        assert_eq!(predict(&r, &[ev("A", 0, 1.0), ev("B", 5, 1.0)]), vec![secs(5)]);
        assert!(predict(&r, &[ev("B", 0, 1.0), ev("A", 5, 1.0)]).is_empty());
        assert!(predict(&r, &[ev("A", 5, 1.0), ev("B", 5, 1.0)]).is_empty());
    }

    #[test]
    fn conjunction_is_order_independent() {
        let r = rule(Pattern::and(Pattern::atomic("A"), Pattern::atomic("B")), None);
        assert_eq!(predict(&r, &[ev("B", 0, 1.0), ev("A", 5, 1.0)]), vec![secs(5)]);
        assert_eq!(predict(&r, &[ev("A", 0, 1.0), ev("B", 5, 1.0)]), vec![secs(5)]);
    }

    #[test]
    fn repeated_type_binds_distinct_events() {
        let r = rule(Pattern::and(Pattern::atomic("A"), Pattern::atomic("A")), None);
        assert!(predict(&r, &[ev("A", 0, 1.0)]).is_empty());
        assert_eq!(predict(&r, &[ev("A", 0, 1.0), ev("A", 3, 1.0)]), vec![secs(3)]);
    }

    #[test]
    fn window_excludes_old_events() {
        let r = rule(Pattern::seq(Pattern::atomic("A"), Pattern::atomic("B")), None);
        assert!(predict(&r, &[ev("A", 0, 1.0), ev("B", 61, 1.0)]).is_empty());
        assert_eq!(predict(&r, &[ev("A", 1, 1.0), ev("B", 61, 1.0)]), vec![secs(61)]);
    }

    #[test]
    fn negation_blocks_events_inside_scope() {
        let p = Pattern::not(Pattern::atomic("B"), Pattern::seq(Pattern::atomic("A"), Pattern::atomic("C")));
        let r = rule(p, None);
        assert_eq!(predict(&r, &[ev("A", 0, 1.0), ev("C", 10, 1.0)]), vec![secs(10)]);
        assert!(predict(&r, &[ev("A", 0, 1.0), ev("B", 5, 1.0), ev("C", 10, 1.0)]).is_empty());
        // B before the scope starts does not count.
        assert_eq!(predict(&r, &[ev("B", 0, 1.0), ev("A", 1, 1.0), ev("C", 10, 1.0)]), vec![secs(10)]);
    }

    #[test]
    fn negation_over_single_instant_uses_window_before_it() {
        let r = rule(Pattern::not(Pattern::atomic("B"), Pattern::atomic("A")), None);
        assert!(predict(&r, &[ev("B", 0, 1.0), ev("A", 10, 1.0)]).is_empty());
        assert_eq!(predict(&r, &[ev("B", 0, 1.0), ev("A", 70, 1.0)]), vec![secs(70)]);
    }

    #[test]
    fn condition_filters_bindings() {
        let r = rule(Pattern::seq(Pattern::atomic("A"), Pattern::atomic("B")), Some(Condition::eq(room("A0"), room("B0"))));
        let events = [ev("A", 0, 2.0), ev("A", 1, 1.0), ev("B", 5, 1.0)];
        assert_eq!(predict(&r, &events), vec![secs(5)]);
        let events = [ev("A", 0, 2.0), ev("B", 5, 1.0)];
        assert!(predict(&r, &events).is_empty());
    }

    #[test]
    fn aggregate_ranges_over_all_window_events_of_type() {
        let sum = Expr::aggregate(Aggregate::Sum, Alias::new("A", 0), "ROOM", Bounds::new(0.0, 100.0));
        let r = rule(Pattern::atomic("A"), Some(Condition::gt(sum, Expr::constant(5.0))));
        let events = [ev("A", 0, 2.0), ev("A", 10, 2.0), ev("A", 20, 2.0), ev("A", 100, 2.0)];
        assert_eq!(predict(&r, &events), vec![secs(20)]);
    }

    #[test]
    fn classify_matches_duplicates_by_count() {
        let out = MatchOutcome::classify(vec![5, 5, 7, 9], &[5, 7, 7, 8]);
        assert_eq!((out.true_positives, out.false_positives, out.false_negatives), (2, 2, 2));
        assert_eq!(out.precision(), 0.5);
        assert_eq!(out.recall(), 0.5);
        assert!((out.f_measure(1.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn degenerate_outcome_scores_zero() {
        let out = MatchOutcome::classify(vec![], &[]);
        assert_eq!(out.precision(), 0.0);
        assert_eq!(out.recall(), 0.0);
        assert_eq!(out.f_measure(1.0), 0.0);
    }
}
