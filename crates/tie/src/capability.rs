//! Capability traits shared by models, binds, ties and the engine.

use crate::error::EngineError;
use crate::model::Model;
use crate::observer::{Observer, Watcher};
use crate::registry::Tie;
use crate::value::Value;
use ulid::Ulid;

/// Read access by dotted property path.
pub trait Readable {
    fn read(&self, path: &str) -> Option<&Value>;

    fn has(&self, path: &str) -> bool {
        self.read(path).is_some()
    }
}

impl Readable for Value {
    fn read(&self, path: &str) -> Option<&Value> {
        self.lookup(path)
    }
}

impl Readable for Model {
    fn read(&self, path: &str) -> Option<&Value> {
        self.get(path)
    }
}

impl Readable for Tie {
    fn read(&self, path: &str) -> Option<&Value> {
        self.model().get(path)
    }
}

/// Something carrying a watcher table.
pub trait Observable {
    fn observer(&self) -> &Observer;
    fn observer_mut(&mut self) -> &mut Observer;

    fn watch(&mut self, watcher: Watcher) -> Ulid {
        self.observer_mut().add(watcher)
    }

    fn unwatch(&mut self, id: Ulid) -> bool {
        self.observer_mut().remove(id)
    }

    fn unwatch_owner(&mut self, owner: Ulid) -> usize {
        self.observer_mut().remove_owner(owner)
    }
}

impl Observable for Tie {
    fn observer(&self) -> &Observer {
        self.bind().observer()
    }

    fn observer_mut(&mut self) -> &mut Observer {
        self.bind_mut().observer_mut()
    }
}

/// Dependency and handle resolution for named ties.
pub trait Resolvable {
    /// Link `tie` to each of its dependencies, creating empty stubs for the
    /// missing ones and refreshing its `@dep` back-references.
    fn resolve_dependencies(&mut self, tie: &str) -> Result<(), EngineError>;

    /// Run every applicable handle on `tie` in dependency order.
    fn resolve_handles(&mut self, tie: &str) -> Result<(), EngineError>;
}
