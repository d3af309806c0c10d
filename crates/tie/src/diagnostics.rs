//! Diagnostics for the propagation engine.
//!
//! Provides "why did X change?" queries for debugging. Recording is off
//! unless enabled through `EngineConfig::diagnostics` or `enable()`.

use crate::error::CallbackError;
use crate::model::REFERENCE_PREFIX;
use crate::observer::Change;

/// A processed change and when it happened.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// Position in processing order
    pub sequence: u64,
    pub at_ms: u64,
    pub change: Change,
}

/// A user callback that failed.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultRecord {
    pub at_ms: u64,
    pub tie: String,
    /// What failed, e.g. `handle 'view'` or `watcher`
    pub context: String,
    pub error: CallbackError,
}

/// The apply breaker tripped on a tie.
#[derive(Debug, Clone, PartialEq)]
pub struct TripRecord {
    pub at_ms: u64,
    pub tie: String,
    pub count: u32,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    enabled: bool,
    sequence: u64,
    changes: Vec<ChangeRecord>,
    faults: Vec<FaultRecord>,
    trips: Vec<TripRecord>,
}

impl Diagnostics {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_change(&mut self, change: &Change, at_ms: u64) {
        if !self.enabled {
            return;
        }
        self.sequence += 1;
        self.changes.push(ChangeRecord {
            sequence: self.sequence,
            at_ms,
            change: change.clone(),
        });
    }

    pub fn record_fault(&mut self, tie: &str, context: &str, error: &CallbackError, at_ms: u64) {
        if !self.enabled {
            return;
        }
        self.faults.push(FaultRecord {
            at_ms,
            tie: tie.to_owned(),
            context: context.to_owned(),
            error: error.clone(),
        });
    }

    pub fn record_trip(&mut self, tie: &str, count: u32, at_ms: u64) {
        if !self.enabled {
            return;
        }
        self.trips.push(TripRecord {
            at_ms,
            tie: tie.to_owned(),
            count,
        });
    }

    pub fn changes(&self) -> &[ChangeRecord] {
        &self.changes
    }

    pub fn faults(&self) -> &[FaultRecord] {
        &self.faults
    }

    pub fn trips(&self) -> &[TripRecord] {
        &self.trips
    }

    pub fn changes_for<'a>(&'a self, tie: &'a str) -> impl Iterator<Item = &'a ChangeRecord> + 'a {
        self.changes
            .iter()
            .filter(move |record| record.change.tie.as_ref() == tie)
    }

    /// Get the full change chain for debugging, newest first.
    ///
    /// Starts at the latest change of `tie.path`. While the current link is a
    /// back-reference refresh (`@dep`), follows it to the latest earlier
    /// change on `dep`.
    pub fn change_chain(&self, tie: &str, path: &str) -> Vec<&ChangeRecord> {
        let mut chain = Vec::new();
        let mut cursor = self.changes.len();
        let mut target_tie = tie.to_owned();
        let mut target_path = Some(path.to_owned());

        while let Some(position) = self.changes[..cursor].iter().rposition(|record| {
            record.change.tie.as_ref() == target_tie
                && target_path
                    .as_ref()
                    .is_none_or(|path| &record.change.path == path)
        }) {
            let record = &self.changes[position];
            chain.push(record);
            cursor = position;
            match record.change.path.strip_prefix(REFERENCE_PREFIX) {
                Some(dependency) => {
                    target_tie = dependency.to_owned();
                    target_path = None;
                }
                None => break,
            }
        }
        chain
    }

    pub fn clear(&mut self) {
        self.sequence = 0;
        self.changes.clear();
        self.faults.clear();
        self.trips.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn disabled_diagnostics_record_nothing() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.record_change(&Change::set(Arc::from("a"), "x"), 0);
        diagnostics.record_trip("a", 11, 0);
        assert!(diagnostics.changes().is_empty());
        assert!(diagnostics.trips().is_empty());
    }

    #[test]
    fn change_chain_follows_back_references() {
        let mut diagnostics = Diagnostics::new(true);
        diagnostics.record_change(&Change::set(Arc::from("app"), "title"), 1);
        diagnostics.record_change(&Change::set(Arc::from("other"), "x"), 2);
        diagnostics.record_change(&Change::set(Arc::from("greeter"), "@app"), 3);
        diagnostics.record_change(&Change::set(Arc::from("page"), "@greeter"), 4);

        let chain = diagnostics.change_chain("page", "@greeter");
        let links: Vec<(&str, &str)> = chain
            .iter()
            .map(|record| (record.change.tie.as_ref(), record.change.path.as_str()))
            .collect();
        assert_eq!(
            links,
            vec![("page", "@greeter"), ("greeter", "@app"), ("app", "title")]
        );
        assert_eq!(chain[0].sequence, 4);
    }
}
