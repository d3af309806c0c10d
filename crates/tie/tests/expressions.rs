//! Evaluating expressions against the engine.

mod common;

use common::{init_logging, json};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use tie::{CallbackError, Engine, EngineError, Pipe, PipeFn, TieSpec, Value};

fn engine() -> Engine {
    init_logging();
    let mut engine = Engine::new();
    engine
        .register_tie(TieSpec::new(
            "user",
            json(json!({"name": "ann", "greeting": "hi", "profile": {"city": "Oslo"}})),
        ))
        .unwrap();
    engine
        .register_pipe(Pipe::new(
            "uppercase",
            PipeFn::sync(|call| {
                call.value
                    .as_str()
                    .map(|text| Value::from(text.to_uppercase()))
                    .ok_or_else(|| {
                        CallbackError::new(format!("cannot uppercase {}", call.value.type_name()))
                    })
            }),
        ))
        .unwrap();
    engine
        .register_pipe(Pipe::new(
            "greet",
            PipeFn::sync(|call| {
                let salutation = call.arg(0).map(Value::to_string).unwrap_or_default();
                Ok(Value::from(format!("{salutation}, {}", call.value)))
            }),
        ))
        .unwrap();
    engine
        .register_pipe(Pipe::new(
            "later",
            PipeFn::deferred(|call, next| {
                let scheduler = next.scheduler().clone();
                scheduler.defer(move || next.resume(call.value));
            }),
        ))
        .unwrap();
    engine
}

#[test]
fn property_and_pipe() {
    let engine = engine();
    let value = engine.evaluate("user.name|uppercase", None).unwrap().value();
    assert_eq!(value, Some(Value::from("ANN")));
}

#[test]
fn shorthand_uses_the_context_tie() {
    let engine = engine();
    let value = engine
        .evaluate(".profile.city|uppercase", Some("user"))
        .unwrap()
        .value();
    assert_eq!(value, Some(Value::from("OSLO")));

    let error = engine.evaluate(".name", None).unwrap_err();
    assert!(matches!(error, EngineError::MissingContext(_)));
}

#[test]
fn references_read_the_tie_model() {
    let engine = engine();
    let value = engine
        .evaluate("user.name|greet:#{greeting}|uppercase", None)
        .unwrap()
        .value();
    assert_eq!(value, Some(Value::from("HI, ANN")));
}

#[test]
fn missing_properties_fall_back_through_default() {
    let engine = engine();
    let value = engine
        .evaluate("user.nickname|default:'anonymous'", None)
        .unwrap()
        .value();
    assert_eq!(value, Some(Value::from("anonymous")));
}

#[test]
fn whole_tie_as_json() {
    let engine = engine();
    let value = engine.evaluate("user.profile|json", None).unwrap().value();
    assert_eq!(value, Some(Value::from(r#"{"city":"Oslo"}"#)));
}

#[test]
fn deferred_expressions_deliver_through_then() {
    let engine = engine();
    let seen = Rc::new(RefCell::new(None));
    let sink = seen.clone();
    engine
        .evaluate("user.name|later|uppercase", None)
        .unwrap()
        .then(move |value| *sink.borrow_mut() = Some(value));
    assert!(seen.borrow().is_none());
    engine.run_until_idle();
    assert_eq!(*seen.borrow(), Some(Value::from("ANN")));
}

#[test]
fn evaluation_errors() {
    let engine = engine();
    assert!(matches!(
        engine.evaluate("ghost.name", None).unwrap_err(),
        EngineError::UnknownTie(name) if name == "ghost"
    ));
    assert!(matches!(
        engine.evaluate("user|missing", None).unwrap_err(),
        EngineError::UnknownPipe(name) if name == "missing"
    ));
    match engine.evaluate("user|", None).unwrap_err() {
        EngineError::Parse(failure) => {
            assert_eq!(failure.input(), "user|");
            assert!(!failure.report("expression").is_empty());
        }
        other => panic!("expected a parse failure, got {other:?}"),
    }
}
