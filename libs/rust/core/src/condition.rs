//! Attribute condition tree: which bound event instances qualify.
//!
//! Every [`Expr`] exposes a conservative `(min, max)` envelope derived from its
//! operands. The generator and mutator use it to keep constants inside plausible
//! domain ranges. Subtraction uses the loose symmetric envelope
//! `[-max(max1, max2), max(max1, max2)]` rather than interval arithmetic.

use crate::event::{Bounds, Event};
use crate::pattern::Alias;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

const EQ_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison { Eq, Gt, Lt }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arith { Add, Sub }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate { Sum, Avg, Min, Max }

impl Comparison {
    pub const ALL: [Comparison; 3] = [Comparison::Eq, Comparison::Gt, Comparison::Lt];

    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Eq => (lhs - rhs).abs() <= EQ_TOLERANCE,
            Comparison::Gt => lhs > rhs,
            Comparison::Lt => lhs < rhs,
        }
    }

    fn symbol(self) -> &'static str {
        match self { Comparison::Eq => "=", Comparison::Gt => ">", Comparison::Lt => "<" }
    }
}

impl Aggregate {
    pub const ALL: [Aggregate; 4] = [Aggregate::Sum, Aggregate::Avg, Aggregate::Min, Aggregate::Max];

    fn name(self) -> &'static str {
        match self { Aggregate::Sum => "sum", Aggregate::Avg => "avg", Aggregate::Min => "min", Aggregate::Max => "max" }
    }
}

/// Numeric attribute expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Attribute of the event bound to `alias`.
    Attr { alias: Alias, attribute: String, bounds: Bounds },
    Const(f64),
    Arith { op: Arith, lhs: Box<Expr>, rhs: Box<Expr> },
    /// Aggregate of `attribute` over every event of the alias's type in the active window.
    Aggregate { func: Aggregate, alias: Alias, attribute: String, bounds: Bounds },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Compare { op: Comparison, lhs: Expr, rhs: Expr },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
}

/// What a condition is evaluated against: the events bound to each alias and the
/// window slice that aggregates range over.
pub struct Binding<'a> {
    pub aliases: &'a [Alias],
    pub bound: &'a [&'a Event],
    pub window: &'a [Event],
}

impl<'a> Binding<'a> {
    fn event(&self, alias: &Alias) -> Option<&'a Event> {
        self.aliases.iter().position(|a| a == alias).and_then(|i| self.bound.get(i).copied())
    }
}

impl Expr {
    pub fn attr(alias: Alias, attribute: impl Into<String>, bounds: Bounds) -> Self {
        Expr::Attr { alias, attribute: attribute.into(), bounds }
    }

    pub fn constant(v: f64) -> Self { Expr::Const(v) }

    pub fn add(lhs: Expr, rhs: Expr) -> Self { Expr::Arith { op: Arith::Add, lhs: Box::new(lhs), rhs: Box::new(rhs) } }
    pub fn sub(lhs: Expr, rhs: Expr) -> Self { Expr::Arith { op: Arith::Sub, lhs: Box::new(lhs), rhs: Box::new(rhs) } }

    pub fn aggregate(func: Aggregate, alias: Alias, attribute: impl Into<String>, bounds: Bounds) -> Self {
        Expr::Aggregate { func, alias, attribute: attribute.into(), bounds }
    }

    pub fn bounds(&self) -> Bounds {
        match self {
            Expr::Attr { bounds, .. } | Expr::Aggregate { bounds, .. } => *bounds,
            Expr::Const(v) => Bounds::point(*v),
            Expr::Arith { op: Arith::Add, lhs, rhs } => {
                let (a, b) = (lhs.bounds(), rhs.bounds());
                Bounds { min: a.min + b.min, max: a.max + b.max }
            }
            Expr::Arith { op: Arith::Sub, lhs, rhs } => {
                let top = lhs.bounds().max.max(rhs.bounds().max);
                Bounds { min: -top, max: top }
            }
        }
    }

    pub fn min(&self) -> f64 { self.bounds().min }
    pub fn max(&self) -> f64 { self.bounds().max }

    pub fn height(&self) -> usize {
        match self {
            Expr::Arith { lhs, rhs, .. } => 1 + lhs.height().max(rhs.height()),
            _ => 1,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Expr::Arith { lhs, rhs, .. } => 1 + lhs.size() + rhs.size(),
            _ => 1,
        }
    }

    /// `None` when an alias is unbound or an attribute is missing; comparisons
    /// involving a missing value are false.
    pub fn eval(&self, binding: &Binding<'_>) -> Option<f64> {
        match self {
            Expr::Attr { alias, attribute, .. } => binding.event(alias)?.value(attribute),
            Expr::Const(v) => Some(*v),
            Expr::Arith { op, lhs, rhs } => {
                let (l, r) = (lhs.eval(binding)?, rhs.eval(binding)?);
                Some(match op { Arith::Add => l + r, Arith::Sub => l - r })
            }
            Expr::Aggregate { func, alias, attribute, .. } => {
                let values = binding.window.iter()
                    .filter(|e| e.event_type == alias.event_type)
                    .filter_map(|e| e.value(attribute));
                aggregate(*func, values)
            }
        }
    }

    fn collect_aliases<'a>(&'a self, out: &mut BTreeSet<&'a Alias>) {
        match self {
            Expr::Attr { alias, .. } | Expr::Aggregate { alias, .. } => { out.insert(alias); }
            Expr::Const(_) => {}
            Expr::Arith { lhs, rhs, .. } => {
                lhs.collect_aliases(out);
                rhs.collect_aliases(out);
            }
        }
    }

    fn collect_constants_mut<'a>(&'a mut self, domain: Bounds, out: &mut Vec<(&'a mut f64, Bounds)>) {
        match self {
            Expr::Const(v) => out.push((v, domain)),
            Expr::Arith { lhs, rhs, .. } => {
                lhs.collect_constants_mut(domain, out);
                rhs.collect_constants_mut(domain, out);
            }
            _ => {}
        }
    }
}

/// Range a constant compared against `other` may take. A constant-only side
/// gives no usable range.
fn constant_domain(other: &Expr) -> Bounds {
    let b = other.bounds();
    if b.min < b.max && b.min.is_finite() && b.max.is_finite() { b } else { Bounds::UNBOUNDED }
}

fn aggregate(func: Aggregate, values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut count = 0usize;
    let (mut sum, mut lo, mut hi) = (0.0, f64::INFINITY, f64::NEG_INFINITY);
    for v in values {
        count += 1;
        sum += v;
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if count == 0 { return None; }
    Some(match func {
        Aggregate::Sum => sum,
        Aggregate::Avg => sum / count as f64,
        Aggregate::Min => lo,
        Aggregate::Max => hi,
    })
}

impl Condition {
    pub fn compare(op: Comparison, lhs: Expr, rhs: Expr) -> Self { Condition::Compare { op, lhs, rhs } }
    pub fn eq(lhs: Expr, rhs: Expr) -> Self { Self::compare(Comparison::Eq, lhs, rhs) }
    pub fn gt(lhs: Expr, rhs: Expr) -> Self { Self::compare(Comparison::Gt, lhs, rhs) }
    pub fn lt(lhs: Expr, rhs: Expr) -> Self { Self::compare(Comparison::Lt, lhs, rhs) }
    pub fn and(l: Condition, r: Condition) -> Self { Condition::And(Box::new(l), Box::new(r)) }
    pub fn or(l: Condition, r: Condition) -> Self { Condition::Or(Box::new(l), Box::new(r)) }
    pub fn negate(c: Condition) -> Self { Condition::Not(Box::new(c)) }

    pub fn holds(&self, binding: &Binding<'_>) -> bool {
        match self {
            Condition::Compare { op, lhs, rhs } => match (lhs.eval(binding), rhs.eval(binding)) {
                (Some(l), Some(r)) => op.holds(l, r),
                _ => false,
            },
            Condition::And(l, r) => l.holds(binding) && r.holds(binding),
            Condition::Or(l, r) => l.holds(binding) || r.holds(binding),
            Condition::Not(c) => !c.holds(binding),
        }
    }

    /// A comparison over two leaves has height 2.
    pub fn height(&self) -> usize {
        match self {
            Condition::Compare { lhs, rhs, .. } => 1 + lhs.height().max(rhs.height()),
            Condition::And(l, r) | Condition::Or(l, r) => 1 + l.height().max(r.height()),
            Condition::Not(c) => 1 + c.height(),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Condition::Compare { lhs, rhs, .. } => 1 + lhs.size() + rhs.size(),
            Condition::And(l, r) | Condition::Or(l, r) => 1 + l.size() + r.size(),
            Condition::Not(c) => 1 + c.size(),
        }
    }

    pub fn aliases(&self) -> BTreeSet<&Alias> {
        let mut out = BTreeSet::new();
        self.collect_aliases(&mut out);
        out
    }

    fn collect_aliases<'a>(&'a self, out: &mut BTreeSet<&'a Alias>) {
        match self {
            Condition::Compare { lhs, rhs, .. } => {
                lhs.collect_aliases(out);
                rhs.collect_aliases(out);
            }
            Condition::And(l, r) | Condition::Or(l, r) => {
                l.collect_aliases(out);
                r.collect_aliases(out);
            }
            Condition::Not(c) => c.collect_aliases(out),
        }
    }

    fn logical_children(&self) -> Vec<&Condition> {
        match self {
            Condition::Compare { .. } => vec![],
            Condition::And(l, r) | Condition::Or(l, r) => vec![l.as_ref(), r.as_ref()],
            Condition::Not(c) => vec![c.as_ref()],
        }
    }

    /// Number of logical nodes (comparisons, and, or, not); expressions are not counted.
    pub fn node_count(&self) -> usize { 1 + self.logical_children().iter().map(|c| c.node_count()).sum::<usize>() }

    /// Logical node at pre-order position `idx` (the root is 0).
    pub fn node(&self, idx: usize) -> Option<&Condition> {
        if idx == 0 { return Some(self); }
        let mut rest = idx - 1;
        for child in self.logical_children() {
            let n = child.node_count();
            if rest < n { return child.node(rest); }
            rest -= n;
        }
        None
    }

    pub fn node_mut(&mut self, idx: usize) -> Option<&mut Condition> {
        if idx == 0 { return Some(self); }
        let rest = idx - 1;
        match self {
            Condition::Compare { .. } => None,
            Condition::Not(c) => c.node_mut(rest),
            Condition::And(l, r) | Condition::Or(l, r) => {
                let n = l.node_count();
                if rest < n { l.node_mut(rest) } else { r.node_mut(rest - n) }
            }
        }
    }

    /// Depth of the logical node at `idx`; the root has depth 1.
    pub fn depth_of(&self, idx: usize) -> Option<usize> {
        if idx == 0 { return Some(1); }
        let mut rest = idx - 1;
        for child in self.logical_children() {
            let n = child.node_count();
            if rest < n { return child.depth_of(rest).map(|d| d + 1); }
            rest -= n;
        }
        None
    }

    /// Every constant paired with the domain it may range over: the bounds of
    /// the opposite side of its comparison.
    pub fn constants_mut(&mut self) -> Vec<(&mut f64, Bounds)> {
        let mut out = Vec::new();
        self.collect_constants_mut(&mut out);
        out
    }

    fn collect_constants_mut<'a>(&'a mut self, out: &mut Vec<(&'a mut f64, Bounds)>) {
        match self {
            Condition::Compare { lhs, rhs, .. } => {
                let (left, right) = (constant_domain(rhs), constant_domain(lhs));
                lhs.collect_constants_mut(left, out);
                rhs.collect_constants_mut(right, out);
            }
            Condition::And(l, r) | Condition::Or(l, r) => {
                l.collect_constants_mut(out);
                r.collect_constants_mut(out);
            }
            Condition::Not(c) => c.collect_constants_mut(out),
        }
    }

    pub fn comparisons_mut(&mut self) -> Vec<&mut Comparison> {
        let mut out = Vec::new();
        self.collect_comparisons_mut(&mut out);
        out
    }

    fn collect_comparisons_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Comparison>) {
        match self {
            Condition::Compare { op, .. } => out.push(op),
            Condition::And(l, r) | Condition::Or(l, r) => {
                l.collect_comparisons_mut(out);
                r.collect_comparisons_mut(out);
            }
            Condition::Not(c) => c.collect_comparisons_mut(out),
        }
    }

    /// Structural difference, counted the same way as [`crate::Pattern::distance`].
    pub fn distance(&self, other: &Condition) -> usize {
        match (self, other) {
            (Condition::Compare { op: o1, lhs: l1, rhs: r1 }, Condition::Compare { op: o2, lhs: l2, rhs: r2 }) => {
                usize::from(o1 != o2) + usize::from(l1 != l2) + usize::from(r1 != r2)
            }
            (Condition::And(l1, r1), Condition::And(l2, r2)) | (Condition::Or(l1, r1), Condition::Or(l2, r2)) => {
                l1.distance(l2) + r1.distance(r2)
            }
            (Condition::Not(a), Condition::Not(b)) => a.distance(b),
            _ => self.size().max(other.size()),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Attr { alias, attribute, .. } => write!(f, "{alias}.{attribute}"),
            Expr::Const(v) if v.fract() == 0.0 => write!(f, "{v:.0}"),
            Expr::Const(v) => write!(f, "{v:.2}"),
            Expr::Arith { op, lhs, rhs } => {
                let sym = match op { Arith::Add => "+", Arith::Sub => "-" };
                write!(f, "({lhs} {sym} {rhs})")
            }
            Expr::Aggregate { func, alias, attribute, .. } => write!(f, "{}({alias}.{attribute})", func.name()),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Compare { op, lhs, rhs } => write!(f, "{lhs} {} {rhs}", op.symbol()),
            Condition::And(l, r) => write!(f, "({l} AND {r})"),
            Condition::Or(l, r) => write!(f, "({l} OR {r})"),
            Condition::Not(c) => write!(f, "NOT {c}"),
        }
    }
}
