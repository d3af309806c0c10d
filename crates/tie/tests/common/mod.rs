//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use tie::{Change, Engine, EngineConfig, Value, Watcher};
use ulid::Ulid;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn json(value: serde_json::Value) -> Value {
    Value::from(value)
}

/// Engine that records diagnostics.
pub fn diagnostic_engine() -> Engine {
    init_logging();
    Engine::with_config(EngineConfig {
        diagnostics: true,
        ..EngineConfig::default()
    })
}

/// Changes seen by watchers on one tie.
#[derive(Clone, Default)]
pub struct Recorder {
    changes: Rc<RefCell<Vec<Change>>>,
}

impl Recorder {
    /// Record changes and deletes of paths matching `pattern` on `tie`.
    pub fn attach(engine: &mut Engine, tie: &str, pattern: &str) -> Self {
        let recorder = Self::default();
        let on_change = recorder.clone();
        let on_delete = recorder.clone();
        let watcher = Watcher::new(Ulid::new(), pattern)
            .unwrap()
            .on_change(move |_, change| {
                on_change.changes.borrow_mut().push(change.clone());
                Ok(())
            })
            .on_delete(move |_, change| {
                on_delete.changes.borrow_mut().push(change.clone());
                Ok(())
            });
        engine.watch(tie, watcher).unwrap();
        recorder
    }

    pub fn changes(&self) -> Vec<Change> {
        self.changes.borrow().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.changes.borrow().iter().map(|change| change.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.changes.borrow().len()
    }

    pub fn clear(&self) {
        self.changes.borrow_mut().clear();
    }
}
