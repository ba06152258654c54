/// End-to-end evaluator checks on small hand-built streams and a full-size synthetic one.
/// Run with: cargo test --test evaluation

use batcep_core::synthetic::{self, SyntheticConfig};
use batcep_core::{evaluate, Action, Alias, Bounds, Condition, Event, EventStream, Expr, MatchOutcome, Pattern, Rule, TimeWindow};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn room(alias: &str) -> Expr {
    Expr::attr(Alias::parse(alias).unwrap(), "ROOM", Bounds::new(1.0, 10.0))
}

fn a_then_b_same_room() -> Rule {
    Rule::new(
        Pattern::seq(Pattern::atomic("A"), Pattern::atomic("B")),
        Some(Condition::eq(room("A0"), room("B0"))),
        TimeWindow::seconds(60),
        Action::emit("HIT"),
    )
    .unwrap()
}

#[test]
fn test_worked_sequence_example() {
    let matching = EventStream::new(
        vec![Event::new("A", 0).with_attr("ROOM", 1.0), Event::new("B", 5).with_attr("ROOM", 1.0)],
        "HIT",
        vec![5],
    )
    .unwrap();
    let outcome = evaluate(&a_then_b_same_room(), &matching);
    assert_eq!(outcome.predicted, vec![5]);
    assert_eq!((outcome.true_positives, outcome.false_positives, outcome.false_negatives), (1, 0, 0));

    let other_room = EventStream::new(
        vec![Event::new("A", 0).with_attr("ROOM", 1.0), Event::new("B", 5).with_attr("ROOM", 2.0)],
        "HIT",
        vec![],
    )
    .unwrap();
    assert!(evaluate(&a_then_b_same_room(), &other_room).predicted.is_empty());
}

#[test]
fn test_empty_ground_truth_is_not_an_error() {
    let stream = EventStream::new(vec![Event::new("C", 0)], "HIT", vec![]).unwrap();
    let outcome = evaluate(&a_then_b_same_room(), &stream);
    assert_eq!(outcome, MatchOutcome::default());
    assert_eq!(outcome.precision(), 0.0);
    assert_eq!(outcome.recall(), 0.0);
    assert_eq!(outcome.f_measure(1.0), 0.0);
}

#[test]
fn test_generating_rule_is_perfect_on_full_synthetic_stream() {
    let cfg = SyntheticConfig::default();
    let rule = a_then_b_same_room();
    let stream = synthetic::generate(&cfg, &rule, &mut StdRng::seed_from_u64(2024)).unwrap();
    assert_eq!(stream.len(), 15_000);
    assert!(!stream.occurrences().is_empty());
    let outcome = evaluate(&rule, &stream);
    assert_eq!(outcome.recall(), 1.0);
    assert_eq!(outcome.precision(), 1.0);
}

#[test]
fn test_negation_blocks_match_inside_scope() {
    let rule = Rule::unconditional(
        Pattern::not(Pattern::atomic("B"), Pattern::seq(Pattern::atomic("A"), Pattern::atomic("C"))),
        TimeWindow::seconds(60),
        Action::emit("HIT"),
    )
    .unwrap();
    let clean = EventStream::new(vec![Event::new("A", 0), Event::new("C", 10_000)], "HIT", vec![10_000]).unwrap();
    assert_eq!(evaluate(&rule, &clean).true_positives, 1);
    let blocked = EventStream::new(
        vec![Event::new("A", 0), Event::new("B", 5_000), Event::new("C", 10_000)],
        "HIT",
        vec![],
    )
    .unwrap();
    assert!(evaluate(&rule, &blocked).predicted.is_empty());
}

#[test]
fn test_labeled_input_splits_into_ground_truth() {
    let mixed = vec![
        Event::new("A", 0).with_attr("ROOM", 3.0),
        Event::new("B", 4_000).with_attr("ROOM", 3.0),
        Event::new("HIT", 4_000),
        Event::new("A", 70_000).with_attr("ROOM", 3.0),
        Event::new("B", 200_000).with_attr("ROOM", 3.0),
    ];
    let stream = EventStream::from_labeled(mixed, "HIT").unwrap();
    let outcome = evaluate(&a_then_b_same_room(), &stream);
    assert_eq!((outcome.true_positives, outcome.false_positives, outcome.false_negatives), (1, 0, 0));
}
