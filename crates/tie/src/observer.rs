//! Watchers: dynamic subscriptions to property changes of one tie.
//!
//! A watcher pairs a path pattern with change and delete callbacks. Patterns
//! are anchored regular expressions over dotted property paths, so `name`
//! matches only `name` while `user\..*` matches every nested user field.
//! Getters are computed properties served by `Engine::get` when the model
//! itself has no value at that path.

use crate::engine::Engine;
use crate::error::{CallbackResult, EngineError};
use crate::model::Model;
use crate::value::Value;
use regex::Regex;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use ulid::Ulid;

/// Path used by wholesale replacement; every watcher of the tie hears it.
pub const WILDCARD: &str = "*";

pub type WatchCallback = Rc<dyn Fn(&mut Engine, &Change) -> CallbackResult>;
pub type GetterFn = Rc<dyn Fn(&Model) -> Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListDelta {
    Insert { index: usize },
    Remove { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Set,
    Delete,
    /// The source was replaced as a whole.
    Wildcard,
    List(ListDelta),
}

/// One queued notification: `path` of `tie` changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub tie: Arc<str>,
    pub path: String,
    pub kind: ChangeKind,
}

impl Change {
    pub fn new(tie: Arc<str>, path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            tie,
            path: path.into(),
            kind,
        }
    }

    pub fn set(tie: Arc<str>, path: impl Into<String>) -> Self {
        Self::new(tie, path, ChangeKind::Set)
    }

    pub fn delete(tie: Arc<str>, path: impl Into<String>) -> Self {
        Self::new(tie, path, ChangeKind::Delete)
    }

    pub fn wildcard(tie: Arc<str>) -> Self {
        Self::new(tie, WILDCARD, ChangeKind::Wildcard)
    }

    pub fn is_wildcard(&self) -> bool {
        self.kind == ChangeKind::Wildcard
    }
}

pub struct Watcher {
    id: Ulid,
    owner: Ulid,
    pattern: Regex,
    on_change: Option<WatchCallback>,
    on_delete: Option<WatchCallback>,
}

impl Watcher {
    /// Create a watcher for paths fully matching `pattern`.
    pub fn new(owner: Ulid, pattern: &str) -> Result<Self, EngineError> {
        let anchored = format!("^(?:{pattern})$");
        let pattern_regex = Regex::new(&anchored).map_err(|source| EngineError::InvalidPattern {
            pattern: pattern.to_owned(),
            source,
        })?;
        Ok(Self {
            id: Ulid::new(),
            owner,
            pattern: pattern_regex,
            on_change: None,
            on_delete: None,
        })
    }

    /// Watch one exact property path.
    pub fn exact(owner: Ulid, path: &str) -> Result<Self, EngineError> {
        Self::new(owner, &regex::escape(path))
    }

    pub fn on_change(
        mut self,
        callback: impl Fn(&mut Engine, &Change) -> CallbackResult + 'static,
    ) -> Self {
        self.on_change = Some(Rc::new(callback));
        self
    }

    pub fn on_delete(
        mut self,
        callback: impl Fn(&mut Engine, &Change) -> CallbackResult + 'static,
    ) -> Self {
        self.on_delete = Some(Rc::new(callback));
        self
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn owner(&self) -> Ulid {
        self.owner
    }

    pub fn matches(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }

    fn callback_for(&self, change: &Change) -> Option<&WatchCallback> {
        match change.kind {
            ChangeKind::Delete if self.matches(&change.path) => self.on_delete.as_ref(),
            ChangeKind::Wildcard if change.path == WILDCARD => self.on_change.as_ref(),
            ChangeKind::Delete => None,
            _ if self.matches(&change.path) => self.on_change.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

struct Getter {
    id: Ulid,
    owner: Ulid,
    path: String,
    compute: GetterFn,
}

/// Per-tie table of watchers and getters.
#[derive(Default)]
pub struct Observer {
    watchers: Vec<Watcher>,
    getters: Vec<Getter>,
}

impl Observer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, watcher: Watcher) -> Ulid {
        let id = watcher.id;
        self.watchers.push(watcher);
        id
    }

    /// Register a computed property. Replaces an earlier getter on `path`.
    pub fn define_getter(
        &mut self,
        owner: Ulid,
        path: impl Into<String>,
        compute: impl Fn(&Model) -> Value + 'static,
    ) -> Ulid {
        let path = path.into();
        self.getters.retain(|getter| getter.path != path);
        let id = Ulid::new();
        self.getters.push(Getter {
            id,
            owner,
            path,
            compute: Rc::new(compute),
        });
        id
    }

    /// Remove the watcher or getter with `id`.
    pub fn remove(&mut self, id: Ulid) -> bool {
        let before = self.len();
        self.watchers.retain(|watcher| watcher.id != id);
        self.getters.retain(|getter| getter.id != id);
        self.len() != before
    }

    /// Remove every watcher whose pattern matches `path` and the getter on it.
    pub fn remove_matching(&mut self, path: &str) -> usize {
        let before = self.len();
        self.watchers.retain(|watcher| !watcher.matches(path));
        self.getters.retain(|getter| getter.path != path);
        before - self.len()
    }

    /// Remove everything registered by `owner`.
    pub fn remove_owner(&mut self, owner: Ulid) -> usize {
        let before = self.len();
        self.watchers.retain(|watcher| watcher.owner != owner);
        self.getters.retain(|getter| getter.owner != owner);
        before - self.len()
    }

    /// Callbacks that should hear `change`, in registration order.
    pub fn callbacks_for(&self, change: &Change) -> Vec<WatchCallback> {
        self.watchers
            .iter()
            .filter_map(|watcher| watcher.callback_for(change))
            .cloned()
            .collect()
    }

    pub fn computed(&self, model: &Model, path: &str) -> Option<Value> {
        self.getters
            .iter()
            .find(|getter| getter.path == path)
            .map(|getter| (getter.compute)(model))
    }

    pub fn watchers(&self) -> impl Iterator<Item = &Watcher> {
        self.watchers.iter()
    }

    pub fn len(&self) -> usize {
        self.watchers.len() + self.getters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("watchers", &self.watchers)
            .field("getters", &self.getters.len())
            .finish()
    }
}
