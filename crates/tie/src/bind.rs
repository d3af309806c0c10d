//! Per-tie propagation state.
//!
//! A `Bind` carries everything a tie needs while changes flow through it:
//! the model, its watchers, the ties relying on it, and the handles already
//! resolved in the current pass or configured from the root tie. It also
//! holds the property a handle is currently writing and the apply breaker.

use crate::capability::Observable;
use crate::config::BreakerConfig;
use crate::model::Model;
use crate::observer::Observer;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use std::sync::Arc;

/// Counts applies per window and reports probable feedback loops.
///
/// Tripping only reports; propagation continues.
#[derive(Debug, Clone)]
pub struct ApplyBreaker {
    threshold: u32,
    window_ms: u64,
    count: u32,
    last_apply_ms: Option<u64>,
}

impl ApplyBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            threshold: config.threshold,
            window_ms: config.window_ms,
            count: 0,
            last_apply_ms: None,
        }
    }

    /// Record one apply at `now_ms`. Returns the count when the breaker trips.
    pub fn record(&mut self, now_ms: u64) -> Option<u32> {
        if self
            .last_apply_ms
            .is_some_and(|last| now_ms.saturating_sub(last) >= self.window_ms)
        {
            self.count = 0;
        }
        self.last_apply_ms = Some(now_ms);
        self.count += 1;
        if self.count > self.threshold {
            let count = self.count;
            self.count = 0;
            Some(count)
        } else {
            None
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

#[derive(Debug)]
pub struct Bind {
    model: Model,
    observer: Observer,
    reliers: SmallVec<[Arc<str>; 4]>,
    processed: FxHashSet<String>,
    inherited: FxHashSet<String>,
    current_property: Option<String>,
    breaker: ApplyBreaker,
}

impl Bind {
    pub fn new(model: Model, breaker: ApplyBreaker) -> Self {
        Self {
            model,
            observer: Observer::new(),
            reliers: SmallVec::new(),
            processed: FxHashSet::default(),
            inherited: FxHashSet::default(),
            current_property: None,
            breaker,
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    /// Names of the ties that depend on this one.
    pub fn reliers(&self) -> &[Arc<str>] {
        &self.reliers
    }

    /// Returns false if `relier` was already recorded.
    pub fn add_relier(&mut self, relier: Arc<str>) -> bool {
        if self.reliers.contains(&relier) {
            return false;
        }
        self.reliers.push(relier);
        true
    }

    pub fn remove_relier(&mut self, relier: &str) -> bool {
        let before = self.reliers.len();
        self.reliers.retain(|known| known.as_ref() != relier);
        self.reliers.len() != before
    }

    // --- Handle pass bookkeeping ---

    pub fn begin_pass(&mut self) {
        self.processed.clear();
    }

    pub fn is_processed(&self, handle: &str) -> bool {
        self.processed.contains(handle)
    }

    pub fn mark_processed(&mut self, handle: &str) {
        self.processed.insert(handle.to_owned());
    }

    pub fn reset_processed(&mut self, handle: &str) {
        self.processed.remove(handle);
    }

    /// True when `handle` last ran with the root tie's config.
    pub fn inherits(&self, handle: &str) -> bool {
        self.inherited.contains(handle)
    }

    pub fn set_inherited(&mut self, handle: &str, inherited: bool) {
        if inherited {
            self.inherited.insert(handle.to_owned());
        } else {
            self.inherited.remove(handle);
        }
    }

    /// Suppress applies on `property` while a handle writes it.
    pub fn guard_property(&mut self, property: &str) {
        self.current_property = Some(property.to_owned());
    }

    pub fn release_property(&mut self) {
        self.current_property = None;
    }

    pub fn is_guarded(&self, path: &str) -> bool {
        self.current_property.as_deref() == Some(path)
    }

    pub fn breaker_mut(&mut self) -> &mut ApplyBreaker {
        &mut self.breaker
    }

    /// Model and observer borrowed together, for handle invocation.
    pub(crate) fn split_mut(&mut self) -> (&Model, &mut Observer) {
        (&self.model, &mut self.observer)
    }
}

impl Observable for Bind {
    fn observer(&self) -> &Observer {
        &self.observer
    }

    fn observer_mut(&mut self) -> &mut Observer {
        &mut self.observer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, window_ms: u64) -> ApplyBreaker {
        ApplyBreaker::new(&BreakerConfig { threshold, window_ms })
    }

    #[test]
    fn breaker_trips_past_threshold_and_resets() {
        let mut breaker = breaker(10, 3000);
        for _ in 0..10 {
            assert_eq!(breaker.record(0), None);
        }
        assert_eq!(breaker.record(0), Some(11));
        assert_eq!(breaker.count(), 0);
        assert_eq!(breaker.record(1), None);
    }

    #[test]
    fn breaker_window_expiry_resets_count() {
        let mut breaker = breaker(2, 100);
        assert_eq!(breaker.record(0), None);
        assert_eq!(breaker.record(50), None);
        assert_eq!(breaker.record(150), None);
        assert_eq!(breaker.count(), 1);
    }

    #[test]
    fn reliers_are_unique() {
        let mut bind = Bind::new(Model::new(), breaker(10, 3000));
        assert!(bind.add_relier(Arc::from("a")));
        assert!(!bind.add_relier(Arc::from("a")));
        assert_eq!(bind.reliers().len(), 1);

        assert!(bind.remove_relier("a"));
        assert!(!bind.remove_relier("a"));
        assert!(bind.reliers().is_empty());
    }

    #[test]
    fn guard_matches_only_the_current_property() {
        let mut bind = Bind::new(Model::new(), breaker(10, 3000));
        bind.guard_property("$view");
        assert!(bind.is_guarded("$view"));
        assert!(!bind.is_guarded("name"));
        bind.release_property();
        assert!(!bind.is_guarded("$view"));
    }
}
