//! Named target rules used to label synthetic streams, plus loading a custom
//! one from YAML.

use batcep_core::{Action, Aggregate, Alias, Bounds, Condition, Expr, HeightLimits, Pattern, Rule, RuleError, SyntheticConfig, TimeWindow};
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("unknown scenario {0:?}; known: {1}")] Unknown(String, String),
    #[error("io error: {0}")] Io(#[from] std::io::Error),
    #[error("serde error: {0}")] Serde(#[from] serde_yaml::Error),
    #[error("invalid rule: {0}")] Rule(#[from] RuleError),
}

pub const NAMES: &[&str] = &[
    "complex#1", "complex#2", "complex#3", "complex#4", "complex#5", "complex#6", "complex#7",
    "complex#8", "complex#9", "complex#10", "complex#11", "complex#12", "complex#13",
    "arithmetic#1", "arithmetic#2", "arithmetic#3", "arithmetic#4", "arithmetic#5", "arithmetic#6",
    "or#1", "not#1", "not#2", "not#3", "not#4",
    "aggregation#1", "aggregation#2", "aggregation#3", "aggregation#4", "aggregation#5",
    "window#1", "window#2", "window#3", "window#4", "window#5", "window#6", "window#7", "window#8",
];

struct Attrs<'a> { data: &'a SyntheticConfig, room: Bounds, temp: Bounds }

impl<'a> Attrs<'a> {
    fn from(data: &'a SyntheticConfig) -> Self {
        let range = |name: &str| {
            let r = data.range_of(name);
            Bounds::new(r.min as f64, r.max as f64)
        };
        Self { data, room: range("ROOM"), temp: range("TEMP") }
    }
    fn room(&self, alias: &str) -> Expr { Expr::attr(alias_of(alias), "ROOM", self.room) }
    fn temp(&self, alias: &str) -> Expr { Expr::attr(alias_of(alias), "TEMP", self.temp) }
    fn temp_above(&self, alias: &str, c: f64) -> Condition { Condition::gt(self.temp(alias), Expr::constant(c)) }

    fn aggregate(&self, func: Aggregate, alias: &str, attribute: &str, window_secs: u64) -> Expr {
        let domain = if attribute == "ROOM" { self.room } else { self.temp };
        let bounds = match func {
            Aggregate::Sum => {
                let n = self.expected_per_type(window_secs);
                Bounds::new(domain.min * n, domain.max * n)
            }
            _ => domain,
        };
        Expr::aggregate(func, alias_of(alias), attribute, bounds)
    }

    /// Events of one type expected in `window_secs`, from the mean gap and type count.
    fn expected_per_type(&self, window_secs: u64) -> f64 {
        let mean_gap = (self.data.min_gap_secs + self.data.max_gap_secs).max(1) as f64 / 2.0;
        let types = self.data.num_event_types.max(1) as f64;
        (window_secs as f64 / mean_gap / types).ceil().max(1.0)
    }
}

fn alias_of(s: &str) -> Alias { Alias::parse(s).unwrap_or_else(|| Alias::new(s, 0)) }

fn atom(t: &str) -> Pattern { Pattern::atomic(t) }
fn seq(l: Pattern, r: Pattern) -> Pattern { Pattern::seq(l, r) }
fn and(l: Condition, r: Condition) -> Condition { Condition::and(l, r) }

/// Builds the scenario `name`, emitting `data.target`. Windows are 60 seconds
/// unless the scenario sets its own.
pub fn builtin(name: &str, data: &SyntheticConfig) -> Result<Rule, ScenarioError> {
    let x = Attrs::from(data);
    let room_eq = |a: &str, b: &str| Condition::eq(x.room(a), x.room(b));
    let temp_gt = |a: &str, b: &str| Condition::gt(x.temp(a), x.temp(b));
    let ab = || seq(atom("A"), atom("B"));
    let abc = || seq(seq(atom("A"), atom("B")), atom("C"));
    let ab_cd = || Pattern::and(seq(atom("A"), atom("B")), seq(atom("C"), atom("D")));
    let a_to_f = || ["E", "D", "C", "B", "A"].into_iter().fold(atom("F"), |acc, t| Pattern::and(atom(t), acc));
    let not_b = |scope: Pattern| Pattern::not(atom("B"), scope);
    let ab_room_temp = || and(room_eq("A0", "B0"), temp_gt("A0", "B0"));
    let avg_a = |window| (atom("A"), Some(Condition::lt(x.aggregate(Aggregate::Avg, "A0", "TEMP", window), x.temp("A0"))), window);
    let complex6 = |window| (abc(), Some(ab_room_temp()), window);

    let (pattern, condition, window_secs) = match name {
        "complex#1" => (ab(), Some(room_eq("A0", "B0")), 60),
        "complex#2" => (ab(), Some(temp_gt("A0", "B0")), 60),
        "complex#3" => (ab(), Some(Condition::lt(x.temp("A0"), x.temp("B0"))), 60),
        "complex#4" => (ab(), Some(Condition::negate(room_eq("A0", "B0"))), 60),
        "complex#5" => (ab(), Some(ab_room_temp()), 60),
        "complex#6" => complex6(60),
        "complex#7" => (abc(), Some(and(room_eq("A0", "B0"), room_eq("A0", "C0"))), 60),
        "complex#8" => (ab_cd(), Some(and(room_eq("A0", "B0"), room_eq("C0", "D0"))), 60),
        "complex#9" => (ab_cd(), Some(and(room_eq("A0", "B0"), temp_gt("C0", "D0"))), 60),
        "complex#10" => (ab_cd(), Some(and(and(temp_gt("A0", "B0"), temp_gt("B0", "C0")), temp_gt("C0", "D0"))), 60),
        "complex#11" => (a_to_f(), Some(and(and(temp_gt("A0", "B0"), temp_gt("C0", "D0")), room_eq("E0", "F0"))), 60),
        "complex#12" => (ab(), Some(and(room_eq("A0", "B0"), and(temp_gt("A0", "B0"), x.temp_above("A0", 80.0)))), 60),
        "complex#13" => (
            ab_cd(),
            Some(and(x.temp_above("A0", 60.0), and(x.temp_above("B0", 60.0), and(x.temp_above("C0", 60.0), x.temp_above("D0", 60.0))))),
            60,
        ),
        "arithmetic#1" => (ab(), Some(Condition::gt(Expr::add(x.temp("A0"), x.temp("B0")), Expr::constant(110.0))), 60),
        "arithmetic#2" => (ab(), Some(Condition::gt(Expr::sub(x.temp("A0"), x.temp("B0")), Expr::constant(60.0))), 60),
        "arithmetic#3" => (
            ab(),
            Some(Condition::gt(Expr::sub(x.temp("A0"), x.temp("B0")), Expr::add(x.room("A0"), x.room("B0")))),
            60,
        ),
        "arithmetic#4" => (ab(), Some(Condition::gt(Expr::add(x.room("A0"), x.room("B0")), Expr::constant(60.0))), 60),
        "arithmetic#5" => (ab(), Some(Condition::gt(Expr::add(x.room("A0"), x.room("B0")), x.temp("A0"))), 60),
        "arithmetic#6" => (ab(), Some(Condition::eq(Expr::sub(x.temp("A0"), x.temp("B0")), x.room("B0"))), 60),
        "or#1" => (ab(), Some(Condition::or(room_eq("A0", "B0"), temp_gt("A0", "B0"))), 60),
        "not#1" => (not_b(seq(atom("A"), atom("C"))), Some(room_eq("A0", "C0")), 60),
        "not#2" => (not_b(seq(atom("A"), seq(atom("C"), atom("D")))), Some(room_eq("A0", "C0")), 60),
        "not#3" => (not_b(Pattern::and(atom("A"), atom("C"))), Some(room_eq("A0", "C0")), 60),
        "not#4" => (seq(not_b(seq(atom("A"), atom("C"))), atom("B")), Some(room_eq("A0", "C0")), 60),
        "aggregation#1" | "window#1" => avg_a(60),
        "aggregation#2" => (
            abc(),
            Some(and(room_eq("A0", "B0"), Condition::lt(x.aggregate(Aggregate::Avg, "B0", "TEMP", 60), x.temp("A0")))),
            60,
        ),
        "aggregation#3" => (atom("A"), Some(Condition::gt(x.aggregate(Aggregate::Sum, "A0", "ROOM", 3000), Expr::constant(500.0))), 3000),
        "aggregation#4" => (atom("A"), Some(Condition::gt(x.aggregate(Aggregate::Sum, "A0", "TEMP", 3000), Expr::constant(5000.0))), 3000),
        "aggregation#5" => (
            ab(),
            Some(and(
                Condition::eq(x.aggregate(Aggregate::Min, "A0", "TEMP", 60), x.temp("A0")),
                Condition::eq(x.aggregate(Aggregate::Max, "B0", "TEMP", 60), x.temp("B0")),
            )),
            60,
        ),
        "window#2" => avg_a(600),
        "window#3" => avg_a(3000),
        "window#4" => avg_a(6000),
        "window#5" => complex6(60),
        "window#6" => complex6(600),
        "window#7" => complex6(3000),
        "window#8" => complex6(6000),
        other => return Err(ScenarioError::Unknown(other.to_string(), NAMES.join(", "))),
    };
    Ok(Rule::new(pattern, condition, TimeWindow::seconds(window_secs), Action::emit(data.target.as_str()))?)
}

/// Reads a serialized [`Rule`] and checks it the same way constructed rules are checked.
pub fn load(path: &Path, limits: &HeightLimits) -> Result<Rule, ScenarioError> {
    let content = fs::read_to_string(path)?;
    let rule: Rule = serde_yaml::from_str(&content)?;
    rule.validate(limits)?;
    Ok(rule)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_named_scenario_builds() {
        let data = SyntheticConfig::default();
        let roomy = HeightLimits { max_pattern_height: 6, max_condition_height: 5 };
        for name in NAMES {
            let rule = builtin(name, &data).unwrap();
            assert!(rule.validate(&roomy).is_ok(), "{name}: {rule}");
        }
        assert!(builtin("complex#5", &data).unwrap().validate(&HeightLimits::default()).is_ok());
    }

    #[test]
    fn catalog_variants_match_their_family() {
        let data = SyntheticConfig::default();
        let render = |name: &str| builtin(name, &data).unwrap().to_string();
        assert_eq!(render("not#1"), "(A → C) ∧ ¬B WHERE A0.ROOM = C0.ROOM WITHIN 60 sec => HIT");
        assert_eq!(render("aggregation#1"), "A WHERE avg(A0.TEMP) < A0.TEMP WITHIN 60 sec => HIT");
        assert_eq!(render("window#1"), render("aggregation#1"));
        assert!(render("window#4").ends_with("WITHIN 6000 sec => HIT"));
        let w7 = builtin("window#7", &data).unwrap();
        let c6 = builtin("complex#6", &data).unwrap();
        assert_eq!((w7.pattern(), w7.condition()), (c6.pattern(), c6.condition()));
        assert_eq!(w7.window().duration, 3000);
    }

    #[test]
    fn renders_classic_rule() {
        let rule = builtin("complex#1", &SyntheticConfig::default()).unwrap();
        assert_eq!(rule.to_string(), "A → B WHERE A0.ROOM = B0.ROOM WITHIN 60 sec => HIT");
    }

    #[test]
    fn unknown_scenario_lists_known_ones() {
        let err = builtin("nope", &SyntheticConfig::default()).unwrap_err();
        assert!(err.to_string().contains("complex#1"));
    }

    #[test]
    fn yaml_round_trip_is_validated() {
        let rule = builtin("not#1", &SyntheticConfig::default()).unwrap();
        let path = std::env::temp_dir().join(format!("rule-miner-scenario-{}.yaml", std::process::id()));
        fs::write(&path, serde_yaml::to_string(&rule).unwrap()).unwrap();
        let loaded = load(&path, &HeightLimits::default()).unwrap();
        let tight = load(&path, &HeightLimits { max_pattern_height: 1, max_condition_height: 2 });
        fs::remove_file(&path).ok();
        assert_eq!(loaded, rule);
        assert!(matches!(tight, Err(ScenarioError::Rule(RuleError::PatternTooTall { .. }))));
    }
}
