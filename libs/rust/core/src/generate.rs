//! Random rule construction within height limits, drawing event types,
//! attributes and constant ranges from a [`Schema`].

use crate::condition::{Aggregate, Arith, Comparison, Condition, Expr};
use crate::event::{Bounds, Schema};
use crate::pattern::{Alias, Pattern};
use crate::rule::{Action, HeightLimits, Rule, RuleError};
use crate::window::TimeWindow;
use rand::seq::SliceRandom;
use rand::Rng;

const LEAF_PROBABILITY: f64 = 0.3;
const NEGATION_PROBABILITY: f64 = 0.1;
const FALLBACK_RANGE: Bounds = Bounds { min: -100.0, max: 100.0 };

#[derive(Debug, Clone)]
pub struct RuleGenerator {
    schema: Schema,
    types: Vec<String>,
    limits: HeightLimits,
    window: TimeWindow,
    action: Action,
    condition_probability: f64,
}

impl RuleGenerator {
    pub fn new(schema: Schema, limits: HeightLimits, window: TimeWindow, action: Action, condition_probability: f64) -> Self {
        let types = schema.event_types().map(str::to_string).collect();
        Self { schema, types, limits, window, action, condition_probability }
    }

    pub fn limits(&self) -> &HeightLimits { &self.limits }
    pub fn schema(&self) -> &Schema { &self.schema }

    pub fn random_rule<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Rule, RuleError> {
        let pattern = self.random_pattern(rng, self.limits.max_pattern_height);
        let condition = if rng.gen_bool(self.condition_probability) {
            self.random_condition(rng, &pattern.aliases(), &self.window, self.limits.max_condition_height)
        } else {
            None
        };
        Rule::new(pattern, condition, self.window, self.action.clone())
    }

    pub fn random_type<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        self.types.choose(rng).cloned().unwrap_or_else(|| "A".to_string())
    }

    /// Random pattern of height at most `max_height` (at least 1).
    pub fn random_pattern<R: Rng + ?Sized>(&self, rng: &mut R, max_height: usize) -> Pattern {
        if max_height <= 1 || rng.gen_bool(LEAF_PROBABILITY) {
            return Pattern::Atomic(self.random_type(rng));
        }
        let h = max_height - 1;
        if rng.gen_bool(NEGATION_PROBABILITY) {
            return Pattern::not(Pattern::Atomic(self.random_type(rng)), self.random_pattern(rng, h));
        }
        if rng.gen_bool(0.5) {
            Pattern::seq(self.random_pattern(rng, h), self.random_pattern(rng, h))
        } else {
            Pattern::and(self.random_pattern(rng, h), self.random_pattern(rng, h))
        }
    }

    /// Random condition over `aliases`, or `None` when no comparison fits.
    pub fn random_condition<R: Rng + ?Sized>(&self, rng: &mut R, aliases: &[Alias], window: &TimeWindow, max_height: usize) -> Option<Condition> {
        if aliases.is_empty() || max_height < 2 { return None; }
        self.random_condition_node(rng, aliases, window, max_height)
    }

    fn random_condition_node<R: Rng + ?Sized>(&self, rng: &mut R, aliases: &[Alias], window: &TimeWindow, max_height: usize) -> Option<Condition> {
        if max_height <= 2 || rng.gen_bool(0.6) {
            return self.random_comparison(rng, aliases, window, max_height);
        }
        let h = max_height - 1;
        match rng.gen_range(0..5) {
            0 | 1 => Some(Condition::and(
                self.random_condition_node(rng, aliases, window, h)?,
                self.random_condition_node(rng, aliases, window, h)?,
            )),
            2 => Some(Condition::or(
                self.random_condition_node(rng, aliases, window, h)?,
                self.random_condition_node(rng, aliases, window, h)?,
            )),
            _ => Some(Condition::negate(self.random_condition_node(rng, aliases, window, h)?)),
        }
    }

    /// Comparison whose expressions fit in `max_height - 1`.
    pub fn random_comparison<R: Rng + ?Sized>(&self, rng: &mut R, aliases: &[Alias], window: &TimeWindow, max_height: usize) -> Option<Condition> {
        if max_height < 2 { return None; }
        let budget = max_height - 1;
        let lhs = self.random_expr(rng, aliases, window, budget)?;
        let rhs = if rng.gen_bool(0.5) {
            self.sibling_attr(rng, aliases, &lhs).unwrap_or_else(|| Expr::Const(self.constant_in(rng, lhs.bounds())))
        } else {
            Expr::Const(self.constant_in(rng, lhs.bounds()))
        };
        let op = *Comparison::ALL.choose(rng)?;
        Some(Condition::compare(op, lhs, rhs))
    }

    /// Attribute, aggregate or arithmetic expression of height at most `budget`.
    pub fn random_expr<R: Rng + ?Sized>(&self, rng: &mut R, aliases: &[Alias], window: &TimeWindow, budget: usize) -> Option<Expr> {
        if budget >= 2 && rng.gen_bool(0.15) {
            let lhs = self.random_attr(rng, aliases)?;
            let rhs = if rng.gen_bool(0.5) {
                self.random_attr(rng, aliases)?
            } else {
                Expr::Const(self.constant_in(rng, lhs.bounds()))
            };
            let op = if rng.gen_bool(0.5) { Arith::Add } else { Arith::Sub };
            return Some(Expr::Arith { op, lhs: Box::new(lhs), rhs: Box::new(rhs) });
        }
        if rng.gen_bool(0.15) {
            return self.random_aggregate(rng, aliases, window);
        }
        self.random_attr(rng, aliases)
    }

    pub fn random_attr<R: Rng + ?Sized>(&self, rng: &mut R, aliases: &[Alias]) -> Option<Expr> {
        let (alias, attribute, bounds) = self.pick_attribute(rng, aliases)?;
        Some(Expr::attr(alias, attribute, bounds))
    }

    fn random_aggregate<R: Rng + ?Sized>(&self, rng: &mut R, aliases: &[Alias], window: &TimeWindow) -> Option<Expr> {
        let (alias, attribute, bounds) = self.pick_attribute(rng, aliases)?;
        let func = *Aggregate::ALL.choose(rng)?;
        Some(Expr::aggregate(func, alias.clone(), attribute, self.aggregate_bounds(func, &alias, bounds, window)))
    }

    /// Sum grows with the number of events the window is expected to hold.
    pub fn aggregate_bounds(&self, func: Aggregate, alias: &Alias, bounds: Bounds, window: &TimeWindow) -> Bounds {
        match func {
            Aggregate::Sum => {
                let n = self.schema.expected_in_window(&alias.event_type, window.span_ms());
                Bounds::new((bounds.min * n).min(bounds.min), (bounds.max * n).max(bounds.max))
            }
            _ => bounds,
        }
    }

    fn pick_attribute<R: Rng + ?Sized>(&self, rng: &mut R, aliases: &[Alias]) -> Option<(Alias, String, Bounds)> {
        let candidates: Vec<(&Alias, &String, &Bounds)> = aliases.iter()
            .filter_map(|a| self.schema.info(&a.event_type).map(|info| (a, info)))
            .flat_map(|(a, info)| info.attributes.iter().map(move |(name, b)| (a, name, b)))
            .collect();
        let (alias, name, bounds) = candidates.choose(rng)?;
        Some(((*alias).clone(), (*name).clone(), **bounds))
    }

    /// Same attribute on a different alias, the shape most join conditions take.
    fn sibling_attr<R: Rng + ?Sized>(&self, rng: &mut R, aliases: &[Alias], lhs: &Expr) -> Option<Expr> {
        let (own, attribute) = match lhs {
            Expr::Attr { alias, attribute, .. } => (alias, attribute),
            _ => return None,
        };
        let others: Vec<&Alias> = aliases.iter()
            .filter(|a| *a != own && self.schema.attribute_bounds(&a.event_type, attribute).is_some())
            .collect();
        let other = *others.choose(rng)?;
        let bounds = self.schema.attribute_bounds(&other.event_type, attribute)?;
        Some(Expr::attr(other.clone(), attribute.clone(), bounds))
    }

    /// Uniform constant inside `bounds`, rounded when the bounds are integral.
    pub fn constant_in<R: Rng + ?Sized>(&self, rng: &mut R, bounds: Bounds) -> f64 {
        let b = if bounds.is_finite() { bounds } else { FALLBACK_RANGE };
        if b.width() <= 0.0 { return b.min; }
        let v = rng.gen_range(b.min..=b.max);
        if b.min.fract() == 0.0 && b.max.fract() == 0.0 { v.round() } else { v }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventStream};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn schema() -> Schema {
        let events: Vec<Event> = (0..40)
            .map(|i| {
                let t = ["A", "B", "C", "D"][i % 4];
                Event::new(t, i as i64 * 3000).with_attr("ROOM", (i % 10 + 1) as f64).with_attr("TEMP", (i * 2) as f64)
            })
            .collect();
        EventStream::new(events, "HIT", vec![]).unwrap().schema()
    }

    fn generator(limits: HeightLimits) -> RuleGenerator {
        RuleGenerator::new(schema(), limits, TimeWindow::seconds(60), Action::emit("HIT"), 0.8)
    }

    #[test]
    fn generated_rules_respect_limits_and_aliases() {
        let mut rng = StdRng::seed_from_u64(7);
        for limits in [HeightLimits::default(), HeightLimits { max_pattern_height: 1, max_condition_height: 2 }, HeightLimits { max_pattern_height: 5, max_condition_height: 6 }] {
            let gen = generator(limits);
            for _ in 0..200 {
                let rule = gen.random_rule(&mut rng).unwrap();
                assert!(rule.validate(&limits).is_ok(), "{rule}");
            }
        }
    }

    #[test]
    fn constants_stay_in_bounds() {
        let gen = generator(HeightLimits::default());
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let v = gen.constant_in(&mut rng, Bounds::new(1.0, 10.0));
            assert!((1.0..=10.0).contains(&v));
            assert_eq!(v.fract(), 0.0);
        }
        assert_eq!(gen.constant_in(&mut rng, Bounds::point(4.5)), 4.5);
        let v = gen.constant_in(&mut rng, Bounds::UNBOUNDED);
        assert!((-100.0..=100.0).contains(&v));
    }

    #[test]
    fn sum_bounds_scale_with_window() {
        let gen = generator(HeightLimits::default());
        let b = gen.aggregate_bounds(Aggregate::Sum, &Alias::new("A", 0), Bounds::new(1.0, 10.0), &TimeWindow::seconds(60));
        assert!(b.max > 10.0);
        assert_eq!(b.min, 1.0);
        let b = gen.aggregate_bounds(Aggregate::Avg, &Alias::new("A", 0), Bounds::new(1.0, 10.0), &TimeWindow::seconds(60));
        assert_eq!(b, Bounds::new(1.0, 10.0));
    }
}
