/// Optimizer and executor behavior on small synthetic data.
/// Run with: cargo test --test optimizer

use batcep_core::synthetic::{self, SyntheticConfig};
use batcep_core::{execute, Action, BatOptimizer, ConfigError, MinerError, Pattern, Rule, RunPhase, SearchConfig, TimeWindow};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn data() -> (batcep_core::EventStream, batcep_core::EventStream) {
    let cfg = SyntheticConfig { num_events: 400, num_event_types: 4, ..Default::default() };
    let rule = Rule::unconditional(Pattern::seq(Pattern::atomic("A"), Pattern::atomic("B")), TimeWindow::seconds(60), Action::emit("HIT")).unwrap();
    synthetic::generate_split(&cfg, &rule, &mut StdRng::seed_from_u64(77)).unwrap()
}

fn small() -> SearchConfig {
    let mut cfg = SearchConfig { runs: 3, workers: 2, seed: Some(9), ..Default::default() };
    cfg.bat.swarm_size = 10;
    cfg.bat.timesteps = 12;
    cfg
}

#[test]
fn test_global_best_is_non_decreasing() {
    let (train, hold) = data();
    let report = execute(&small(), &train, &hold).unwrap();
    for r in &report.results {
        assert_eq!(r.history.len(), 12);
        assert!(r.history.windows(2).all(|w| w[1] >= w[0]), "run {} regressed: {:?}", r.run, r.history);
        assert_eq!(r.history.last().copied(), Some(r.training_fitness));
        assert!(r.rule.validate(&r.config.limits).is_ok());
    }
}

#[test]
fn test_loudness_decays_and_pulse_grows() {
    let (train, _) = data();
    let cfg = small();
    let opt = BatOptimizer::new(&cfg, &train);
    let mut state = opt.initialize(4).unwrap();
    let mut previous: Vec<(f64, f64)> = state.bats.iter().map(|b| (b.loudness, b.pulse_rate)).collect();
    while state.phase == RunPhase::Iterating {
        opt.step(&mut state);
        for (bat, (loud, pulse)) in state.bats.iter().zip(&previous) {
            assert!(bat.loudness <= *loud);
            assert!(bat.pulse_rate >= *pulse);
            assert!(bat.pulse_rate <= cfg.bat.pulse_rate);
            assert!((0.0..=1.0).contains(&bat.loudness));
        }
        previous = state.bats.iter().map(|b| (b.loudness, b.pulse_rate)).collect();
    }
    assert!(state.accepted > 0);
    assert_eq!(state.phase, RunPhase::Terminated);
}

#[test]
fn test_invalid_configuration_is_rejected_up_front() {
    let (train, hold) = data();
    let mut cfg = small();
    cfg.bat.min_frequency = 3.0;
    assert!(matches!(execute(&cfg, &train, &hold), Err(MinerError::Config(ConfigError::Frequency { .. }))));
    let mut cfg = small();
    cfg.bat.timesteps = 0;
    assert!(matches!(execute(&cfg, &train, &hold), Err(MinerError::Config(ConfigError::Zero("timesteps")))));
}

#[test]
fn test_report_carries_configuration() {
    let (train, hold) = data();
    let cfg = small();
    let report = execute(&cfg, &train, &hold).unwrap();
    let best = report.best().unwrap();
    assert_eq!(best.config, cfg);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["results"][0]["config"]["bat"]["swarm_size"], 10);
    assert!(json["results"][0]["rendered"].as_str().unwrap().contains("=> HIT"));
}
