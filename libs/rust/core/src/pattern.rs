//! Event pattern tree: which primitive events, in which temporal arrangement.
//!
//! Leaves reference event types. Aliases (`A0`, `A1`, `B0`, ...) are derived from the
//! in-order position of each bindable leaf, so a leaf can never refer forward to an
//! alias that has not been introduced yet. Leaves under the negated side of a
//! [`Pattern::Negation`] are never bound to events and therefore get no alias.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    Atomic(String),
    /// Left completes strictly before right starts.
    Sequence(Box<Pattern>, Box<Pattern>),
    /// Both sides occur inside the window, in any order.
    Conjunction(Box<Pattern>, Box<Pattern>),
    /// `scope` occurs and `negated` does not occur in the region `scope` spans.
    Negation { negated: Box<Pattern>, scope: Box<Pattern> },
}

/// Per-occurrence name of a bindable leaf: the `index`-th leaf of `event_type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Alias {
    pub event_type: String,
    pub index: usize,
}

impl Alias {
    pub fn new(event_type: impl Into<String>, index: usize) -> Self {
        Self { event_type: event_type.into(), index }
    }

    /// Parses `"A0"` style names; the trailing digits are the occurrence index.
    pub fn parse(s: &str) -> Option<Self> {
        let split = s.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        if split == 0 || split == s.len() { return None; }
        let index = s[split..].parse().ok()?;
        Some(Self::new(&s[..split], index))
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}{}", self.event_type, self.index) }
}

impl Pattern {
    pub fn atomic(event_type: impl Into<String>) -> Self { Pattern::Atomic(event_type.into()) }
    pub fn seq(left: Pattern, right: Pattern) -> Self { Pattern::Sequence(Box::new(left), Box::new(right)) }
    pub fn and(left: Pattern, right: Pattern) -> Self { Pattern::Conjunction(Box::new(left), Box::new(right)) }
    pub fn not(negated: Pattern, scope: Pattern) -> Self { Pattern::Negation { negated: Box::new(negated), scope: Box::new(scope) } }

    /// Node count on the longest root-to-leaf path; a single leaf has height 1.
    pub fn height(&self) -> usize {
        match self {
            Pattern::Atomic(_) => 1,
            _ => 1 + self.children().iter().map(|c| c.height()).max().unwrap_or(0),
        }
    }

    pub fn size(&self) -> usize { 1 + self.children().iter().map(|c| c.size()).sum::<usize>() }

    pub fn is_leaf(&self) -> bool { matches!(self, Pattern::Atomic(_)) }

    /// Children in evaluation order (for a negation: negated, then scope).
    pub fn children(&self) -> Vec<&Pattern> {
        match self {
            Pattern::Atomic(_) => vec![],
            Pattern::Sequence(l, r) | Pattern::Conjunction(l, r) => vec![l.as_ref(), r.as_ref()],
            Pattern::Negation { negated, scope } => vec![negated.as_ref(), scope.as_ref()],
        }
    }

    /// Aliases of every bindable leaf, in in-order position.
    pub fn aliases(&self) -> Vec<Alias> {
        let mut counts = BTreeMap::new();
        let mut out = Vec::new();
        self.collect_aliases(false, &mut counts, &mut out);
        out
    }

    fn collect_aliases(&self, negated: bool, counts: &mut BTreeMap<String, usize>, out: &mut Vec<Alias>) {
        match self {
            Pattern::Atomic(t) => {
                if negated { return; }
                let n = counts.entry(t.clone()).or_insert(0);
                out.push(Alias::new(t, *n));
                *n += 1;
            }
            Pattern::Sequence(l, r) | Pattern::Conjunction(l, r) => {
                l.collect_aliases(negated, counts, out);
                r.collect_aliases(negated, counts, out);
            }
            Pattern::Negation { negated: n, scope } => {
                n.collect_aliases(true, counts, out);
                scope.collect_aliases(negated, counts, out);
            }
        }
    }

    /// Number of leaves that get bound to events.
    pub fn bindable_count(&self) -> usize {
        match self {
            Pattern::Atomic(_) => 1,
            Pattern::Sequence(l, r) | Pattern::Conjunction(l, r) => l.bindable_count() + r.bindable_count(),
            Pattern::Negation { scope, .. } => scope.bindable_count(),
        }
    }

    /// Event types that can be the latest event of a complete binding.
    pub fn anchor_types(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_anchor_types(&mut out);
        out
    }

    fn collect_anchor_types<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Pattern::Atomic(t) => { out.insert(t.as_str()); }
            Pattern::Sequence(_, r) => r.collect_anchor_types(out),
            Pattern::Conjunction(l, r) => {
                l.collect_anchor_types(out);
                r.collect_anchor_types(out);
            }
            Pattern::Negation { scope, .. } => scope.collect_anchor_types(out),
        }
    }

    /// Node at pre-order position `idx` (the root is 0).
    pub fn node(&self, idx: usize) -> Option<&Pattern> {
        if idx == 0 { return Some(self); }
        let mut rest = idx - 1;
        for child in self.children() {
            let size = child.size();
            if rest < size { return child.node(rest); }
            rest -= size;
        }
        None
    }

    pub fn node_mut(&mut self, idx: usize) -> Option<&mut Pattern> {
        if idx == 0 { return Some(self); }
        let (first, second) = match self {
            Pattern::Atomic(_) => return None,
            Pattern::Sequence(l, r) | Pattern::Conjunction(l, r) => (l, r),
            Pattern::Negation { negated, scope } => (negated, scope),
        };
        let rest = idx - 1;
        let left_size = first.size();
        if rest < left_size { first.node_mut(rest) } else { second.node_mut(rest - left_size) }
    }

    /// Depth of the node at pre-order position `idx`; the root has depth 1.
    pub fn depth_of(&self, idx: usize) -> Option<usize> {
        if idx == 0 { return Some(1); }
        let mut rest = idx - 1;
        for child in self.children() {
            let size = child.size();
            if rest < size { return child.depth_of(rest).map(|d| d + 1); }
            rest -= size;
        }
        None
    }

    /// Mutable references to every leaf's event type, negated leaves included.
    pub fn leaf_types_mut(&mut self) -> Vec<&mut String> {
        let mut out = Vec::new();
        self.collect_leaf_types_mut(&mut out);
        out
    }

    fn collect_leaf_types_mut<'a>(&'a mut self, out: &mut Vec<&'a mut String>) {
        match self {
            Pattern::Atomic(t) => out.push(t),
            Pattern::Sequence(l, r) | Pattern::Conjunction(l, r) => {
                l.collect_leaf_types_mut(out);
                r.collect_leaf_types_mut(out);
            }
            Pattern::Negation { negated, scope } => {
                negated.collect_leaf_types_mut(out);
                scope.collect_leaf_types_mut(out);
            }
        }
    }

    /// Structural difference: matching nodes cost nothing, a differing leaf costs one,
    /// and a differing operator costs the larger of the two subtrees.
    pub fn distance(&self, other: &Pattern) -> usize {
        match (self, other) {
            (Pattern::Atomic(a), Pattern::Atomic(b)) => usize::from(a != b),
            (Pattern::Sequence(l1, r1), Pattern::Sequence(l2, r2))
            | (Pattern::Conjunction(l1, r1), Pattern::Conjunction(l2, r2))
            | (Pattern::Negation { negated: l1, scope: r1 }, Pattern::Negation { negated: l2, scope: r2 }) => {
                l1.distance(l2) + r1.distance(r2)
            }
            _ => self.size().max(other.size()),
        }
    }

    fn fmt_child(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_leaf() { write!(f, "{self}") } else { write!(f, "({self})") }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Atomic(t) => write!(f, "{t}"),
            Pattern::Sequence(l, r) => {
                l.fmt_child(f)?;
                write!(f, " → ")?;
                r.fmt_child(f)
            }
            Pattern::Conjunction(l, r) => {
                l.fmt_child(f)?;
                write!(f, " ∧ ")?;
                r.fmt_child(f)
            }
            Pattern::Negation { negated, scope } => {
                scope.fmt_child(f)?;
                write!(f, " ∧ ¬")?;
                negated.fmt_child(f)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a() -> Pattern { Pattern::atomic("A") }
    fn b() -> Pattern { Pattern::atomic("B") }
    fn c() -> Pattern { Pattern::atomic("C") }

    #[test]
    fn aliases_number_occurrences_and_skip_negated_leaves() {
        let p = Pattern::seq(Pattern::not(b(), Pattern::seq(a(), c())), Pattern::seq(b(), a()));
        let names: Vec<String> = p.aliases().iter().map(|a| a.to_string()).collect();
        assert_eq!(names, vec!["A0", "C0", "B0", "A1"]);
        assert_eq!(p.bindable_count(), 4);
    }

    #[test]
    fn alias_parse_splits_trailing_digits() {
        assert_eq!(Alias::parse("A0"), Some(Alias::new("A", 0)));
        assert_eq!(Alias::parse("OTHER_12"), Some(Alias::new("OTHER_", 12)));
        assert_eq!(Alias::parse("A"), None);
        assert_eq!(Alias::parse("12"), None);
    }

    #[test]
    fn height_size_and_preorder_access() {
        let p = Pattern::seq(Pattern::seq(a(), b()), c());
        assert_eq!(p.height(), 3);
        assert_eq!(p.size(), 5);
        assert_eq!(p.node(1), Some(&Pattern::seq(a(), b())));
        assert_eq!(p.node(3), Some(&b()));
        assert_eq!(p.node(4), Some(&c()));
        assert_eq!(p.node(5), None);
        assert_eq!(p.depth_of(2), Some(3));
        assert_eq!(p.depth_of(4), Some(2));
    }

    #[test]
    fn node_mut_replaces_in_place() {
        let mut p = Pattern::and(a(), b());
        *p.node_mut(2).unwrap() = Pattern::seq(c(), c());
        assert_eq!(p.to_string(), "A ∧ (C → C)");
        assert_eq!(p.height(), 3);
    }

    #[test]
    fn anchor_types_follow_temporal_semantics() {
        let p = Pattern::seq(a(), Pattern::and(b(), c()));
        assert_eq!(p.anchor_types().into_iter().collect::<Vec<_>>(), vec!["B", "C"]);
        let n = Pattern::not(b(), Pattern::seq(a(), c()));
        assert_eq!(n.anchor_types().into_iter().collect::<Vec<_>>(), vec!["C"]);
    }

    #[test]
    fn renders_human_readable() {
        assert_eq!(Pattern::seq(a(), b()).to_string(), "A → B");
        assert_eq!(Pattern::not(b(), Pattern::seq(a(), c())).to_string(), "(A → C) ∧ ¬B");
    }

    #[test]
    fn distance_counts_differences() {
        let p = Pattern::seq(a(), b());
        assert_eq!(p.distance(&p.clone()), 0);
        assert_eq!(p.distance(&Pattern::seq(a(), c())), 1);
        assert_eq!(p.distance(&Pattern::and(a(), b())), 3);
    }
}
