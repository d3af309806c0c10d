//! Handles: named behaviors attached to ties through `$name` properties.
//!
//! A tie opts into handle `view` by carrying a `$view` property (or by
//! inheriting the root tie's `$view`). The handle receives that config
//! through a `HandleScope`, may install watchers and getters on the tie, and
//! its return value replaces the `$view` property.
//!
//! Handles may depend on other handles. Resolution runs them in topological
//! order; each node is `Unprocessed` (absent from the marks), `Resolving`
//! while its dependencies are visited, then `Processed`. Meeting a
//! `Resolving` node again is a cycle.

use crate::capability::Observable;
use crate::error::{CallbackResult, EngineError};
use crate::engine::Engine;
use crate::model::Model;
use crate::observer::{Change, Observer, Watcher};
use crate::value::Value;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::fmt;
use std::rc::Rc;
use ulid::Ulid;

pub type HandleFn = Rc<dyn Fn(&mut HandleScope<'_>) -> CallbackResult<Value>>;

pub struct Handle {
    name: String,
    id: Ulid,
    dependencies: SmallVec<[String; 4]>,
    sealed: bool,
    function: HandleFn,
}

impl Handle {
    pub fn new(
        name: impl Into<String>,
        function: impl Fn(&mut HandleScope<'_>) -> CallbackResult<Value> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            id: Ulid::new(),
            dependencies: SmallVec::new(),
            sealed: false,
            function: Rc::new(function),
        }
    }

    /// Handles that must run before this one on the same tie.
    pub fn with_dependencies(
        mut self,
        dependencies: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.dependencies.extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub fn sealed(mut self) -> Self {
        self.sealed = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owner id of every watcher and getter this handle installs.
    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub(crate) fn invoke(&self, scope: &mut HandleScope<'_>) -> CallbackResult<Value> {
        (self.function)(scope)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("sealed", &self.sealed)
            .finish()
    }
}

/// What a handle sees while it runs on one tie.
pub struct HandleScope<'a> {
    tie: &'a str,
    model: &'a Model,
    config: &'a Value,
    app_config: Option<&'a Value>,
    observer: &'a mut Observer,
    owner: Ulid,
}

impl<'a> HandleScope<'a> {
    pub(crate) fn new(
        tie: &'a str,
        model: &'a Model,
        config: &'a Value,
        app_config: Option<&'a Value>,
        observer: &'a mut Observer,
        owner: Ulid,
    ) -> Self {
        Self {
            tie,
            model,
            config,
            app_config,
            observer,
            owner,
        }
    }

    pub fn tie(&self) -> &str {
        self.tie
    }

    pub fn model(&self) -> &Model {
        self.model
    }

    /// The tie's own `$name` value, or the root tie's when it has none.
    pub fn config(&self) -> &Value {
        self.config
    }

    /// The root tie's `$name` value, if any.
    pub fn app_config(&self) -> Option<&Value> {
        self.app_config
    }

    /// Watch paths on this tie; removed when the handle re-runs.
    pub fn watch(
        &mut self,
        pattern: &str,
        on_change: impl Fn(&mut Engine, &Change) -> CallbackResult + 'static,
    ) -> Result<Ulid, EngineError> {
        let watcher = Watcher::new(self.owner, pattern)?.on_change(on_change);
        Ok(self.observer.add(watcher))
    }

    pub fn add_watcher(&mut self, watcher: Watcher) -> Ulid {
        self.observer.add(watcher)
    }

    pub fn define_getter(
        &mut self,
        path: impl Into<String>,
        compute: impl Fn(&Model) -> Value + 'static,
    ) -> Ulid {
        self.observer.define_getter(self.owner, path, compute)
    }

    pub fn owner(&self) -> Ulid {
        self.owner
    }
}

impl Observable for HandleScope<'_> {
    fn observer(&self) -> &Observer {
        &*self.observer
    }

    fn observer_mut(&mut self) -> &mut Observer {
        &mut *self.observer
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Resolving,
    Processed,
}

/// Order `roots` and their transitive dependencies so every handle comes
/// after the handles it depends on. Each handle appears once.
pub fn resolution_order<'n>(
    lookup: impl Fn(&str) -> Option<Rc<Handle>>,
    roots: impl IntoIterator<Item = &'n str>,
) -> Result<Vec<Rc<Handle>>, EngineError> {
    let mut marks = FxHashMap::default();
    let mut stack = Vec::new();
    let mut order = Vec::new();
    for root in roots {
        visit(root, None, &lookup, &mut marks, &mut stack, &mut order)?;
    }
    Ok(order)
}

fn visit(
    name: &str,
    required_by: Option<&str>,
    lookup: &impl Fn(&str) -> Option<Rc<Handle>>,
    marks: &mut FxHashMap<String, Mark>,
    stack: &mut Vec<String>,
    order: &mut Vec<Rc<Handle>>,
) -> Result<(), EngineError> {
    match marks.get(name) {
        Some(Mark::Processed) => return Ok(()),
        Some(Mark::Resolving) => {
            let start = stack.iter().position(|entry| entry == name).unwrap_or(0);
            let mut cycle = stack[start..].to_vec();
            cycle.push(name.to_owned());
            return Err(EngineError::HandleCycle(cycle));
        }
        None => {}
    }

    let handle = lookup(name).ok_or_else(|| EngineError::UnknownHandle {
        name: name.to_owned(),
        required_by: required_by.unwrap_or_default().to_owned(),
    })?;

    marks.insert(name.to_owned(), Mark::Resolving);
    stack.push(name.to_owned());
    for dependency in handle.dependencies() {
        visit(dependency, Some(name), lookup, marks, stack, order)?;
    }
    stack.pop();
    marks.insert(name.to_owned(), Mark::Processed);
    order.push(handle);
    Ok(())
}

/// Handles in `order` that are `root` or depend on it, directly or not.
pub fn dependents_in_order(order: &[Rc<Handle>], root: &str) -> Vec<Rc<Handle>> {
    let mut affected = FxHashSet::default();
    affected.insert(root.to_owned());
    order
        .iter()
        .filter(|handle| {
            let hit = handle.name() == root
                || handle
                    .dependencies()
                    .iter()
                    .any(|dependency| affected.contains(dependency));
            if hit {
                affected.insert(handle.name().to_owned());
            }
            hit
        })
        .cloned()
        .collect()
}
