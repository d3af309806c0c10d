//! The apply breaker reports probable update loops without stopping them.

mod common;

use common::{init_logging, json, Recorder};
use serde_json::json;
use std::rc::Rc;
use tie::{Engine, EngineConfig, ManualClock, TieSpec};

fn engine(clock: &ManualClock) -> Engine {
    init_logging();
    let config = EngineConfig {
        diagnostics: true,
        ..EngineConfig::default()
    };
    let mut engine = Engine::with_clock(config, Rc::new(clock.clone()));
    engine
        .register_tie(TieSpec::new("counter", json(json!({"n": 0}))))
        .unwrap();
    engine
}

#[test]
fn burst_within_window_trips_once() {
    let clock = ManualClock::new();
    let mut engine = engine(&clock);
    let recorder = Recorder::attach(&mut engine, "counter", "n");

    for n in 1..=11 {
        clock.advance_by(10);
        engine.set("counter", "n", n).unwrap();
    }

    let trips = engine.diagnostics().trips();
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0].tie, "counter");
    assert_eq!(trips[0].count, 11);
    // Tripping never blocks propagation.
    assert_eq!(recorder.len(), 11);
}

#[test]
fn quiet_windows_reset_the_count() {
    let clock = ManualClock::new();
    let mut engine = engine(&clock);

    for n in 1..=30 {
        if n % 10 == 0 {
            clock.advance_by(3000);
        }
        engine.set("counter", "n", n).unwrap();
    }
    assert!(engine.diagnostics().trips().is_empty());
}

#[test]
fn threshold_comes_from_config() {
    init_logging();
    let clock = ManualClock::new();
    let config = EngineConfig::from_toml_str(
        r#"
        diagnostics = true
        [breaker]
        threshold = 2
        "#,
    )
    .unwrap();
    let mut engine = Engine::with_clock(config, Rc::new(clock.clone()));
    engine
        .register_tie(TieSpec::new("counter", json(json!({"n": 0}))))
        .unwrap();

    for n in 1..=3 {
        engine.set("counter", "n", n).unwrap();
    }
    assert_eq!(engine.diagnostics().trips().len(), 1);
}
