//! A complete CEP rule: pattern, optional condition, window and action.

use crate::condition::Condition;
use crate::pattern::{Alias, Pattern};
use crate::window::TimeWindow;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuleError {
    #[error("condition references unknown alias {0}")]
    UnknownAlias(Alias),
    #[error("pattern height {height} exceeds maximum {max}")]
    PatternTooTall { height: usize, max: usize },
    #[error("condition height {height} exceeds maximum {max}")]
    ConditionTooTall { height: usize, max: usize },
    #[error("invalid time window {0}")]
    InvalidWindow(TimeWindow),
    #[error("action event type must not be empty")]
    EmptyAction,
}

/// Maximum tree heights enforced during generation and mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightLimits {
    pub max_pattern_height: usize,
    pub max_condition_height: usize,
}

impl Default for HeightLimits {
    fn default() -> Self { Self { max_pattern_height: 3, max_condition_height: 4 } }
}

/// The complex event emitted when the rule fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub event_type: String,
}

impl Action {
    pub fn emit(event_type: impl Into<String>) -> Self { Self { event_type: event_type.into() } }
}

/// Value-semantics rule tree: every node is owned by its parent, so [`Rule::copy`]
/// yields a fully independent tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pattern: Pattern,
    condition: Option<Condition>,
    window: TimeWindow,
    action: Action,
}

impl Rule {
    pub fn new(pattern: Pattern, condition: Option<Condition>, window: TimeWindow, action: Action) -> Result<Self, RuleError> {
        let rule = Self { pattern, condition, window, action };
        rule.check_references()?;
        Ok(rule)
    }

    /// Rule without an attribute condition (always true).
    pub fn unconditional(pattern: Pattern, window: TimeWindow, action: Action) -> Result<Self, RuleError> {
        Self::new(pattern, None, window, action)
    }

    pub fn copy(&self) -> Self { self.clone() }

    pub fn pattern(&self) -> &Pattern { &self.pattern }
    pub fn condition(&self) -> Option<&Condition> { self.condition.as_ref() }
    pub fn window(&self) -> &TimeWindow { &self.window }
    pub fn action(&self) -> &Action { &self.action }

    pub(crate) fn pattern_mut(&mut self) -> &mut Pattern { &mut self.pattern }
    pub(crate) fn condition_slot(&mut self) -> &mut Option<Condition> { &mut self.condition }

    pub fn set_condition(&mut self, condition: Option<Condition>) -> Result<(), RuleError> {
        let previous = std::mem::replace(&mut self.condition, condition);
        if let Err(e) = self.check_references() {
            self.condition = previous;
            return Err(e);
        }
        Ok(())
    }

    pub fn set_window(&mut self, window: TimeWindow) -> Result<(), RuleError> {
        if !window.is_valid() { return Err(RuleError::InvalidWindow(window)); }
        self.window = window;
        Ok(())
    }

    pub fn aliases(&self) -> Vec<Alias> { self.pattern.aliases() }

    pub fn pattern_height(&self) -> usize { self.pattern.height() }
    pub fn condition_height(&self) -> usize { self.condition.as_ref().map_or(0, Condition::height) }

    /// Structural complexity used by the fitness penalty.
    pub fn size(&self) -> usize { self.pattern.size() + self.condition.as_ref().map_or(0, Condition::size) }

    fn check_references(&self) -> Result<(), RuleError> {
        if self.action.event_type.is_empty() { return Err(RuleError::EmptyAction); }
        if !self.window.is_valid() { return Err(RuleError::InvalidWindow(self.window)); }
        if let Some(cond) = &self.condition {
            let known = self.pattern.aliases();
            if let Some(missing) = cond.aliases().into_iter().find(|a| !known.contains(*a)) {
                return Err(RuleError::UnknownAlias(missing.clone()));
            }
        }
        Ok(())
    }

    /// Full structural check: alias references plus the height limits.
    pub fn validate(&self, limits: &HeightLimits) -> Result<(), RuleError> {
        self.check_references()?;
        let height = self.pattern_height();
        if height > limits.max_pattern_height {
            return Err(RuleError::PatternTooTall { height, max: limits.max_pattern_height });
        }
        let height = self.condition_height();
        if height > limits.max_condition_height {
            return Err(RuleError::ConditionTooTall { height, max: limits.max_condition_height });
        }
        Ok(())
    }

    /// Difference to `other`, used as the distance term of the velocity update.
    pub fn distance(&self, other: &Rule) -> usize {
        let cond = match (&self.condition, &other.condition) {
            (Some(a), Some(b)) => a.distance(b),
            (Some(c), None) | (None, Some(c)) => c.size(),
            (None, None) => 0,
        };
        self.pattern.distance(&other.pattern) + cond + usize::from(self.window != other.window)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pattern)?;
        if let Some(c) = &self.condition { write!(f, " WHERE {c}")?; }
        write!(f, " WITHIN {} => {}", self.window, self.action.event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Expr;
    use crate::event::Bounds;

    fn room(alias: &str) -> Expr { Expr::attr(Alias::parse(alias).unwrap(), "ROOM", Bounds::new(1.0, 10.0)) }

    fn a_then_b() -> Rule {
        Rule::new(
            Pattern::seq(Pattern::atomic("A"), Pattern::atomic("B")),
            Some(Condition::eq(room("A0"), room("B0"))),
            TimeWindow::seconds(60),
            Action::emit("HIT"),
        ).unwrap()
    }

    #[test]
    fn rejects_condition_on_missing_alias() {
        let err = Rule::new(
            Pattern::atomic("A"),
            Some(Condition::eq(room("A0"), room("B0"))),
            TimeWindow::seconds(60),
            Action::emit("HIT"),
        ).unwrap_err();
        assert_eq!(err, RuleError::UnknownAlias(Alias::new("B", 0)));
    }

    #[test]
    fn rejects_condition_on_negated_leaf() {
        let p = Pattern::not(Pattern::atomic("B"), Pattern::seq(Pattern::atomic("A"), Pattern::atomic("C")));
        let r = Rule::new(p, Some(Condition::eq(room("A0"), room("B0"))), TimeWindow::seconds(60), Action::emit("HIT"));
        assert!(matches!(r, Err(RuleError::UnknownAlias(_))));
    }

    #[test]
    fn set_condition_keeps_previous_on_error() {
        let mut r = a_then_b();
        let before = r.clone();
        assert!(r.set_condition(Some(Condition::eq(room("C0"), Expr::constant(1.0)))).is_err());
        assert_eq!(r, before);
    }

    #[test]
    fn validate_enforces_heights() {
        let r = a_then_b();
        assert!(r.validate(&HeightLimits::default()).is_ok());
        let tight = HeightLimits { max_pattern_height: 1, max_condition_height: 4 };
        assert_eq!(r.validate(&tight), Err(RuleError::PatternTooTall { height: 2, max: 1 }));
        let tight = HeightLimits { max_pattern_height: 3, max_condition_height: 1 };
        assert_eq!(r.validate(&tight), Err(RuleError::ConditionTooTall { height: 2, max: 1 }));
    }

    #[test]
    fn copy_is_independent() {
        let original = a_then_b();
        let mut c = original.copy();
        *c.pattern_mut().node_mut(1).unwrap() = Pattern::atomic("Z");
        if let Some(cond) = c.condition_slot() { *cond.comparisons_mut()[0] = crate::condition::Comparison::Gt; }
        c.set_window(TimeWindow::seconds(5)).unwrap();
        assert_eq!(original, a_then_b());
        assert_ne!(original, c);
    }

    #[test]
    fn renders_rule() {
        assert_eq!(a_then_b().to_string(), "A → B WHERE A0.ROOM = B0.ROOM WITHIN 60 sec => HIT");
        assert_eq!(a_then_b().size(), 6);
    }
}
