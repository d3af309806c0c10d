//! The engine: owner of the registry and driver of change propagation.
//!
//! Every write goes through the change-tracking facade (`set`, `delete`,
//! `push`, `remove_at`). A write that changes the model is applied: the
//! tie's breaker counts it and a `Change` is queued. The queue is drained
//! until quiescent; each change fires the tie's watchers, re-runs handles
//! whose `$name` property moved, and refreshes the `@tie` back-reference of
//! every relier whose snapshot differs, which queues further changes.
//!
//! Watcher callbacks receive `&mut Engine` and may write; those writes are
//! queued behind the change being processed rather than recursing.

use crate::bind::{ApplyBreaker, Bind};
use crate::capability::{Observable, Resolvable};
use crate::chain::Chain;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{CallbackError, EngineError};
use crate::handle::{self, Handle, HandleScope};
use crate::model::{self, Model, READY_KEY, REFERENCE_PREFIX, ROOT_TIE};
use crate::observer::{Change, ChangeKind, ListDelta, Watcher, WILDCARD};
use crate::parser::parse_expression;
use crate::pipe::{builtin_pipes, Pipe, PROPERTY_PIPE};
use crate::registry::{Registry, Tie, TieSpec};
use crate::scheduler::Scheduler;
use crate::value::Value;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use ulid::Ulid;

pub struct Engine {
    registry: Registry,
    scheduler: Scheduler,
    clock: Rc<dyn Clock>,
    config: EngineConfig,
    diagnostics: Diagnostics,
    queue: VecDeque<Change>,
    draining: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_clock(config, Rc::new(SystemClock::new()))
    }

    /// Engine with an explicit time source for the apply breaker.
    pub fn with_clock(config: EngineConfig, clock: Rc<dyn Clock>) -> Self {
        let mut registry = Registry::new();
        for pipe in builtin_pipes() {
            if let Err(error) = registry.insert_pipe(pipe) {
                log::error!("cannot install built-in pipe: {error}");
            }
        }
        let root = Tie::new(
            Arc::from(ROOT_TIE),
            false,
            SmallVec::new(),
            Bind::new(Model::new(), ApplyBreaker::new(&config.breaker)),
        );
        registry.insert_tie(root);

        Self {
            registry,
            scheduler: Scheduler::new(),
            clock,
            diagnostics: Diagnostics::new(config.diagnostics),
            config,
            queue: VecDeque::new(),
            draining: false,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    pub fn tie(&self, name: &str) -> Option<&Tie> {
        self.registry.tie(name)
    }

    /// Run scheduler ticks until every deferred chain step has finished.
    pub fn run_until_idle(&self) -> u64 {
        self.scheduler.run_until_idle()
    }

    // --- Registration ---

    /// Register (or replace) a tie and wire it into the graph.
    ///
    /// Handle dependencies are checked before anything is inserted, so a
    /// failed registration leaves the engine untouched.
    pub fn register_tie(&mut self, spec: TieSpec) -> Result<Ulid, EngineError> {
        let TieSpec {
            name,
            value,
            dependencies,
            sealed,
        } = spec;
        if self.registry.tie(&name).is_some_and(Tie::is_sealed) {
            return Err(EngineError::SealedTie(name));
        }

        let model = Model::wrap(value);
        let order = self.handle_order(&name, &model, None)?;
        let declared = model.declared_dependencies();
        let mut names: SmallVec<[Arc<str>; 4]> = SmallVec::new();
        let implicit = (name != ROOT_TIE).then_some(ROOT_TIE);
        for dependency in implicit
            .into_iter()
            .chain(dependencies.iter().map(String::as_str))
            .chain(declared.iter().map(String::as_str))
        {
            if dependency != name && !names.iter().any(|known| known.as_ref() == dependency) {
                names.push(Arc::from(dependency));
            }
        }

        let mut tie = Tie::new(
            Arc::from(name.as_str()),
            sealed,
            names,
            Bind::new(model, ApplyBreaker::new(&self.config.breaker)),
        );
        let id = tie.id();
        let replaced = match self.registry.remove_tie(&name) {
            Some(previous) => {
                for relier in previous.bind().reliers() {
                    tie.bind_mut().add_relier(relier.clone());
                }
                let dropped = previous
                    .dependencies()
                    .iter()
                    .filter(|dependency| !tie.dependencies().contains(dependency));
                for dependency in dropped {
                    if let Some(source) = self.registry.tie_mut(dependency) {
                        source.bind_mut().remove_relier(&name);
                    }
                }
                true
            }
            None => false,
        };
        self.registry.insert_tie(tie);
        log::debug!(
            "{} tie '{name}'",
            if replaced { "replaced" } else { "registered" }
        );

        self.resolve_dependencies(&name)?;
        // Reliers of a replaced tie catch up through the wildcard below.
        self.run_handles(&name, order, false);
        self.observe_initial_state(&name);
        if replaced {
            self.apply(&name, WILDCARD, ChangeKind::Wildcard);
        }
        Ok(id)
    }

    pub fn register_pipe(&mut self, pipe: Pipe) -> Result<Ulid, EngineError> {
        log::debug!("registering pipe '{}'", pipe.name());
        self.registry.insert_pipe(pipe)
    }

    /// Register (or replace) a handle and run it on every tie it applies to.
    ///
    /// Dependencies on handles that are not registered yet are allowed; they
    /// are checked when a resolution pass needs them.
    pub fn register_handle(&mut self, handle: Handle) -> Result<Ulid, EngineError> {
        self.registry.check_handle(&handle)?;
        let handle = Rc::new(handle);
        let order = handle::resolution_order(
            |name| {
                if name == handle.name() {
                    Some(Rc::clone(&handle))
                } else {
                    self.registry.handle(name)
                }
            },
            [handle.name()],
        );
        match order {
            Err(EngineError::UnknownHandle { name, required_by }) => {
                log::debug!(
                    "handle '{}' waits for '{name}' (required by '{required_by}')",
                    handle.name()
                );
            }
            Err(error) => return Err(error),
            Ok(_) => {}
        }

        let id = handle.id();
        self.registry.insert_handle(Rc::clone(&handle));
        log::debug!("registered handle '{}'", handle.name());

        let ties: Vec<Arc<str>> = self
            .registry
            .tie_names()
            .filter(|name| name.as_ref() != ROOT_TIE)
            .cloned()
            .collect();
        for tie in ties {
            self.rerun_handle(&tie, &handle);
        }
        Ok(id)
    }

    // --- Change-tracking facade ---

    /// Model value at `path`, else a computed getter, else `$ready`.
    pub fn get(&self, tie: &str, path: &str) -> Option<Value> {
        let entry = self.registry.tie(tie)?;
        if let Some(value) = entry.model().get(path) {
            return Some(value.clone());
        }
        if let Some(value) = entry.bind().observer().computed(entry.model(), path) {
            return Some(value);
        }
        (path == READY_KEY).then(|| Value::Bool(self.registry.is_ready(tie)))
    }

    /// Write `value` at `path`. Returns false (and notifies nobody) when the
    /// value is deep-equal to the current one.
    pub fn set(
        &mut self,
        tie: &str,
        path: &str,
        value: impl Into<Value>,
    ) -> Result<bool, EngineError> {
        let value = value.into();
        let current = self.get(tie, path);
        let entry = self.tie_mut(tie)?;
        if path == READY_KEY || current.as_ref() == Some(&value) {
            return Ok(false);
        }
        entry.bind_mut().model_mut().set(path, value);
        self.apply(tie, path, ChangeKind::Set);
        Ok(true)
    }

    /// Remove `path`. Returns false when nothing was there.
    pub fn delete(&mut self, tie: &str, path: &str) -> Result<bool, EngineError> {
        let entry = self.tie_mut(tie)?;
        if entry.bind_mut().model_mut().remove(path).is_none() {
            return Ok(false);
        }
        self.apply(tie, path, ChangeKind::Delete);
        Ok(true)
    }

    /// Append to the list at `path`, creating it if needed. Returns the new
    /// item's index.
    pub fn push(
        &mut self,
        tie: &str,
        path: &str,
        item: impl Into<Value>,
    ) -> Result<usize, EngineError> {
        let item = item.into();
        let model = self.tie_mut(tie)?.bind_mut().model_mut();
        let index = match model.get_mut(path) {
            Some(Value::List(items)) => {
                items.push(item);
                items.len() - 1
            }
            _ => {
                model.set(path, Value::list([item]));
                0
            }
        };
        self.apply(tie, path, ChangeKind::List(ListDelta::Insert { index }));
        Ok(index)
    }

    /// Remove the list item at `index`, if there is one.
    pub fn remove_at(
        &mut self,
        tie: &str,
        path: &str,
        index: usize,
    ) -> Result<Option<Value>, EngineError> {
        let model = self.tie_mut(tie)?.bind_mut().model_mut();
        let removed = match model.get_mut(path) {
            Some(Value::List(items)) if index < items.len() => items.remove(index),
            _ => return Ok(None),
        };
        self.apply(tie, path, ChangeKind::List(ListDelta::Remove { index }));
        Ok(Some(removed))
    }

    /// True when none of the tie's dependencies is an empty stub.
    pub fn is_ready(&self, tie: &str) -> bool {
        self.registry.is_ready(tie)
    }

    // --- Observation ---

    pub fn watch(&mut self, tie: &str, watcher: Watcher) -> Result<Ulid, EngineError> {
        Ok(self.tie_mut(tie)?.watch(watcher))
    }

    pub fn unwatch(&mut self, tie: &str, id: Ulid) -> Result<bool, EngineError> {
        Ok(self.tie_mut(tie)?.unwatch(id))
    }

    pub fn unwatch_owner(&mut self, tie: &str, owner: Ulid) -> Result<usize, EngineError> {
        Ok(self.tie_mut(tie)?.unwatch_owner(owner))
    }

    /// Remove every watcher matching `path` and the getter defined on it.
    pub fn unwatch_path(&mut self, tie: &str, path: &str) -> Result<usize, EngineError> {
        Ok(self.tie_mut(tie)?.observer_mut().remove_matching(path))
    }

    pub fn define_getter(
        &mut self,
        tie: &str,
        owner: Ulid,
        path: &str,
        compute: impl Fn(&Model) -> Value + 'static,
    ) -> Result<Ulid, EngineError> {
        Ok(self.tie_mut(tie)?.observer_mut().define_getter(owner, path, compute))
    }

    // --- Chains ---

    /// A pipe chain over the tie's current model.
    pub fn view(&self, tie: &str) -> Result<Chain<'_>, EngineError> {
        let entry = self
            .registry
            .tie(tie)
            .ok_or_else(|| EngineError::UnknownTie(tie.to_owned()))?;
        Ok(Chain::new(
            &self.registry,
            self.scheduler.clone(),
            Some(entry.name().clone()),
            self.config.error_policy,
            self.registry.is_ready(tie),
            Value::Object(entry.model().fields().clone()),
        ))
    }

    /// A pipe chain over an arbitrary value.
    pub fn chain(&self, value: impl Into<Value>) -> Chain<'_> {
        Chain::new(
            &self.registry,
            self.scheduler.clone(),
            None,
            self.config.error_policy,
            true,
            value.into(),
        )
    }

    /// Parse `expression` and build its chain. `context` is the tie used by
    /// the `.prop` shorthand.
    pub fn evaluate(
        &self,
        expression: &str,
        context: Option<&str>,
    ) -> Result<Chain<'_>, EngineError> {
        let parsed = parse_expression(expression)?;
        let tie = parsed
            .tie
            .as_deref()
            .or(context)
            .ok_or_else(|| EngineError::MissingContext(expression.to_owned()))?;
        let mut chain = self.view(tie)?;
        let model = self.registry.tie(tie).map(Tie::model);
        if let Some(property) = &parsed.property {
            chain = chain.pipe(PROPERTY_PIPE, [Value::from(property.as_str())])?;
        }
        for invocation in &parsed.pipes {
            let args: Vec<Value> = invocation
                .arguments
                .iter()
                .map(|argument| argument.resolve(model))
                .collect();
            chain = chain.pipe(&invocation.name, args)?;
        }
        Ok(chain)
    }

    // --- Propagation ---

    fn tie_mut(&mut self, name: &str) -> Result<&mut Tie, EngineError> {
        self.registry
            .tie_mut(name)
            .ok_or_else(|| EngineError::UnknownTie(name.to_owned()))
    }

    /// Count the change against the tie's breaker, queue it, and drain.
    fn apply(&mut self, name: &str, path: &str, kind: ChangeKind) {
        let now = self.clock.now_ms();
        let Some(tie) = self.registry.tie_mut(name) else {
            return;
        };
        let bind = tie.bind_mut();
        if bind.is_guarded(path) {
            return;
        }
        if let Some(count) = bind.breaker_mut().record(now) {
            log::warn!(
                "tie '{name}' applied {count} changes within {}ms, probable update loop",
                self.config.breaker.window_ms
            );
            self.diagnostics.record_trip(name, count, now);
        }
        self.queue
            .push_back(Change::new(tie.name().clone(), path, kind));
        self.drain();
    }

    fn drain(&mut self) {
        if self.draining {
            return;
        }
        self.draining = true;
        while let Some(change) = self.queue.pop_front() {
            self.process(change);
        }
        self.draining = false;
    }

    fn process(&mut self, change: Change) {
        log::trace!("{}: {} ({:?})", change.tie, change.path, change.kind);
        self.diagnostics.record_change(&change, self.clock.now_ms());
        self.notify(&change);
        self.rerun_affected_handles(&change);
        self.refresh_reliers(&change);
    }

    fn notify(&mut self, change: &Change) {
        let Some(tie) = self.registry.tie(&change.tie) else {
            return;
        };
        let callbacks = tie.observer().callbacks_for(change);
        for callback in callbacks {
            if let Err(error) = callback(self, change) {
                self.report_fault(&change.tie, "watcher", &error);
            }
        }
    }

    /// Feed every explored path to the tie's watchers once.
    fn observe_initial_state(&mut self, name: &str) {
        let Some(tie) = self.registry.tie(name) else {
            return;
        };
        let tie_name = tie.name().clone();
        let paths = tie.model().observable_paths();
        for path in paths {
            self.notify(&Change::set(tie_name.clone(), path));
        }
    }

    fn rerun_affected_handles(&mut self, change: &Change) {
        if change.kind == ChangeKind::Wildcard {
            // A dependency was replaced wholesale.
            if change.path != WILDCARD {
                if let Err(error) = self.resolve_handles(&change.tie) {
                    log::error!("cannot re-resolve handles on '{}': {error}", change.tie);
                }
            }
            return;
        }
        let handle = model::handle_name(&change.path).and_then(|name| self.registry.handle(name));
        let Some(handle) = handle else {
            return;
        };
        if change.tie.as_ref() != ROOT_TIE {
            // An external write to `$name` is the tie's own config from now on.
            if let Some(tie) = self.registry.tie_mut(&change.tie) {
                tie.bind_mut().set_inherited(handle.name(), false);
            }
            self.rerun_handle(&change.tie, &handle);
            return;
        }
        let property = model::handle_property(handle.name());
        let inheriting: Vec<Arc<str>> = self
            .registry
            .tie(ROOT_TIE)
            .map(|app| app.bind().reliers().to_vec())
            .unwrap_or_default()
            .into_iter()
            .filter(|relier| {
                self.registry.tie(relier).is_some_and(|tie| {
                    tie.bind().inherits(handle.name())
                        || tie.model().get(&property).is_none_or(Value::is_null)
                })
            })
            .collect();
        for relier in inheriting {
            self.rerun_handle(&relier, &handle);
        }
    }

    /// Re-run `handle` on `tie`, then every handle depending on it.
    fn rerun_handle(&mut self, tie: &str, handle: &Rc<Handle>) {
        let order = handle::resolution_order(
            |name| self.registry.handle(name),
            self.registry.handle_names(),
        );
        let affected = match order {
            Ok(order) => handle::dependents_in_order(&order, handle.name()),
            Err(error) => {
                log::debug!("re-running handle '{}' alone: {error}", handle.name());
                vec![Rc::clone(handle)]
            }
        };
        for handle in affected {
            if let Some(entry) = self.registry.tie_mut(tie) {
                entry.bind_mut().reset_processed(handle.name());
            }
            self.resolve_handle(tie, &handle, true);
        }
    }

    /// Handles `tie` configures through its own, the root's or an inherited
    /// `$name`, with their dependencies first.
    fn handle_order(
        &self,
        tie: &str,
        source: &Model,
        bind: Option<&Bind>,
    ) -> Result<Vec<Rc<Handle>>, EngineError> {
        if tie == ROOT_TIE {
            return Ok(Vec::new());
        }
        let app = self.registry.tie(ROOT_TIE).map(Tie::model);
        let configured = |handle: &&str| {
            let property = model::handle_property(handle);
            let defined = |model: &Model| {
                model.get(&property).is_some_and(|value| !value.is_null())
            };
            defined(source)
                || app.is_some_and(defined)
                || bind.is_some_and(|bind| bind.inherits(handle))
        };
        handle::resolution_order(
            |name| self.registry.handle(name),
            self.registry.handle_names().filter(configured),
        )
    }

    fn run_handles(&mut self, name: &str, order: Vec<Rc<Handle>>, refresh: bool) {
        if let Some(tie) = self.registry.tie_mut(name) {
            tie.bind_mut().begin_pass();
        }
        for handle in order {
            self.resolve_handle(name, &handle, refresh);
        }
    }

    /// Run `handle` on tie `name` unless it already ran this pass.
    ///
    /// The output (or `Null` when the handle fails) replaces `$name`. The
    /// re-entrancy token keeps that write from re-running the handle;
    /// reliers still receive the new snapshot when `refresh` is set.
    fn resolve_handle(&mut self, name: &str, handle: &Rc<Handle>, refresh: bool) {
        if name == ROOT_TIE {
            return;
        }
        let property = model::handle_property(handle.name());
        let app_config = self
            .registry
            .tie(ROOT_TIE)
            .and_then(|app| app.model().get(&property))
            .filter(|value| !value.is_null())
            .cloned();
        let Some(tie) = self.registry.tie_mut(name) else {
            return;
        };
        let bind = tie.bind_mut();
        if bind.is_processed(handle.name()) {
            return;
        }
        bind.mark_processed(handle.name());
        bind.observer_mut().remove_owner(handle.id());
        // Once inherited, `$name` holds the handle's output rather than config.
        let own = if bind.inherits(handle.name()) {
            None
        } else {
            bind.model().get(&property).filter(|value| !value.is_null()).cloned()
        };
        bind.set_inherited(handle.name(), own.is_none() && app_config.is_some());
        let Some(config) = own.or_else(|| app_config.clone()) else {
            return;
        };

        bind.guard_property(&property);
        let outcome = {
            let (model, observer) = bind.split_mut();
            let app = app_config.as_ref();
            let mut scope = HandleScope::new(name, model, &config, app, observer, handle.id());
            handle.invoke(&mut scope)
        };
        let output = match outcome {
            Ok(value) => value,
            Err(error) => {
                self.report_fault(name, &format!("handle '{}'", handle.name()), &error);
                Value::Null
            }
        };
        if let Some(tie) = self.registry.tie_mut(name) {
            tie.bind_mut().model_mut().set(&property, output);
        }
        self.apply(name, &property, ChangeKind::Set);
        if let Some(tie) = self.registry.tie_mut(name) {
            tie.bind_mut().release_property();
        }
        if refresh {
            self.refresh_reliers(&Change::set(Arc::from(name), property));
        }
    }

    /// Push the tie's snapshot into each relier's `@tie` property.
    fn refresh_reliers(&mut self, change: &Change) {
        // Back-references are excluded from snapshots; nothing downstream moved.
        if change.path.starts_with(REFERENCE_PREFIX) {
            return;
        }
        let Some(tie) = self.registry.tie(&change.tie) else {
            return;
        };
        let snapshot = tie.model().snapshot();
        let reliers = tie.bind().reliers().to_vec();
        let property = model::reference_property(&change.tie);
        let wholesale = change.kind == ChangeKind::Wildcard;

        for relier in reliers {
            let Some(dependent) = self.registry.tie_mut(&relier) else {
                continue;
            };
            let model = dependent.bind_mut().model_mut();
            if !wholesale && model.get(&property) == Some(&snapshot) {
                continue;
            }
            model.set(&property, snapshot.clone());
            let kind = if wholesale {
                ChangeKind::Wildcard
            } else {
                ChangeKind::Set
            };
            self.apply(&relier, &property, kind);
        }
    }

    fn register_stub(&mut self, name: &str) {
        log::debug!("creating empty stub for '{name}'");
        let bind = Bind::new(Model::new(), ApplyBreaker::new(&self.config.breaker));
        self.registry.insert_tie(Tie::stub(Arc::from(name), bind));
    }

    fn report_fault(&mut self, tie: &str, context: &str, error: &CallbackError) {
        if self.config.error_policy.should_log(self.registry.is_ready(tie)) {
            log::error!("{context} failed on tie '{tie}': {error}");
        }
        self.diagnostics
            .record_fault(tie, context, error, self.clock.now_ms());
    }
}

impl Resolvable for Engine {
    fn resolve_dependencies(&mut self, name: &str) -> Result<(), EngineError> {
        let dependencies = self.tie_mut(name)?.dependencies().to_vec();
        let relier: Arc<str> = Arc::from(name);
        for dependency in dependencies {
            if self.registry.tie(&dependency).is_none() {
                self.register_stub(&dependency);
            }
            let Some(target) = self.registry.tie_mut(&dependency) else {
                continue;
            };
            target.bind_mut().add_relier(relier.clone());
            let snapshot = target.model().snapshot();
            self.tie_mut(name)?
                .bind_mut()
                .model_mut()
                .set(&model::reference_property(&dependency), snapshot);
        }
        Ok(())
    }

    fn resolve_handles(&mut self, name: &str) -> Result<(), EngineError> {
        let tie = self
            .registry
            .tie(name)
            .ok_or_else(|| EngineError::UnknownTie(name.to_owned()))?;
        let order = self.handle_order(name, tie.model(), Some(tie.bind()))?;
        self.run_handles(name, order, true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallbackResult;
    use serde_json::json;
    use std::cell::RefCell;

    #[test]
    fn root_tie_exists_from_the_start() {
        let engine = Engine::new();
        assert!(engine.tie(ROOT_TIE).is_some());
        assert!(engine.is_ready(ROOT_TIE));
    }

    #[test]
    fn implicit_and_declared_dependencies_merge() {
        let mut engine = Engine::new();
        engine
            .register_tie(
                TieSpec::new("page", Value::from(json!({"$deps": ["user", "app"]})))
                    .with_dependencies(["user", "session"]),
            )
            .unwrap();
        let names: Vec<&str> = engine
            .tie("page")
            .unwrap()
            .dependencies()
            .iter()
            .map(|name| name.as_ref())
            .collect();
        assert_eq!(names, vec!["app", "user", "session"]);
        assert!(engine.tie("user").unwrap().is_empty());
        assert!(!engine.is_ready("page"));
        assert_eq!(engine.get("page", READY_KEY), Some(Value::Bool(false)));
    }

    #[test]
    fn watcher_writes_are_queued_not_recursive() {
        let mut engine = Engine::new();
        engine.register_tie(TieSpec::new("t", Value::from(json!({"a": 0, "b": 0})))).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let owner = Ulid::new();

        let log = seen.clone();
        engine
            .watch(
                "t",
                Watcher::new(owner, "a")
                    .unwrap()
                    .on_change(move |engine, change| -> CallbackResult {
                        log.borrow_mut().push(change.path.clone());
                        engine.set("t", "b", 1)?;
                        log.borrow_mut().push("after-set".to_owned());
                        Ok(())
                    }),
            )
            .unwrap();
        let log = seen.clone();
        engine
            .watch(
                "t",
                Watcher::new(owner, "b").unwrap().on_change(move |_, change| {
                    log.borrow_mut().push(change.path.clone());
                    Ok(())
                }),
            )
            .unwrap();

        engine.set("t", "a", 1).unwrap();
        assert_eq!(*seen.borrow(), vec!["a", "after-set", "b"]);
    }

    #[test]
    fn failing_watcher_is_recorded() {
        let mut engine = Engine::with_config(EngineConfig {
            diagnostics: true,
            ..EngineConfig::default()
        });
        engine.register_tie(TieSpec::new("t", Value::from(json!({"a": 0})))).unwrap();
        engine
            .watch(
                "t",
                Watcher::new(Ulid::new(), "a")
                    .unwrap()
                    .on_change(|_, _| Err("nope".into())),
            )
            .unwrap();
        engine.set("t", "a", 1).unwrap();
        let faults = engine.diagnostics().faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].context, "watcher");
        assert_eq!(faults[0].error.message(), "nope");
    }
}
