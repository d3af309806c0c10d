//! The name tables an engine owns: ties, pipes and handles.

use crate::bind::Bind;
use crate::error::EngineError;
use crate::handle::Handle;
use crate::model::Model;
use crate::pipe::Pipe;
use crate::value::Value;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::rc::Rc;
use std::sync::Arc;
use ulid::Ulid;

/// Registration request for a tie.
#[derive(Debug, Clone)]
pub struct TieSpec {
    pub name: String,
    pub value: Value,
    pub dependencies: Vec<String>,
    pub sealed: bool,
}

impl TieSpec {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            dependencies: Vec::new(),
            sealed: false,
        }
    }

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
}

/// A named, observable model.
#[derive(Debug)]
pub struct Tie {
    name: Arc<str>,
    id: Ulid,
    sealed: bool,
    empty: bool,
    dependencies: SmallVec<[Arc<str>; 4]>,
    bind: Bind,
}

impl Tie {
    pub(crate) fn new(
        name: Arc<str>,
        sealed: bool,
        dependencies: SmallVec<[Arc<str>; 4]>,
        bind: Bind,
    ) -> Self {
        Self {
            name,
            id: Ulid::new(),
            sealed,
            empty: false,
            dependencies,
            bind,
        }
    }

    /// Placeholder for a dependency that has not been registered yet.
    pub(crate) fn stub(name: Arc<str>, bind: Bind) -> Self {
        Self {
            empty: true,
            ..Self::new(name, false, SmallVec::new(), bind)
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// True for stubs created on behalf of dependents.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn dependencies(&self) -> &[Arc<str>] {
        &self.dependencies
    }

    pub fn model(&self) -> &Model {
        self.bind.model()
    }

    pub fn bind(&self) -> &Bind {
        &self.bind
    }

    pub fn bind_mut(&mut self) -> &mut Bind {
        &mut self.bind
    }
}

#[derive(Default)]
pub struct Registry {
    ties: FxHashMap<Arc<str>, Tie>,
    pipes: FxHashMap<String, Rc<Pipe>>,
    handles: IndexMap<String, Rc<Handle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Ties ---

    pub fn tie(&self, name: &str) -> Option<&Tie> {
        self.ties.get(name)
    }

    pub fn tie_mut(&mut self, name: &str) -> Option<&mut Tie> {
        self.ties.get_mut(name)
    }

    pub fn tie_names(&self) -> impl Iterator<Item = &Arc<str>> {
        self.ties.keys()
    }

    pub(crate) fn insert_tie(&mut self, tie: Tie) -> Option<Tie> {
        self.ties.insert(tie.name.clone(), tie)
    }

    pub(crate) fn remove_tie(&mut self, name: &str) -> Option<Tie> {
        self.ties.remove(name)
    }

    /// A tie is ready when none of its dependencies is still an empty stub.
    pub fn is_ready(&self, name: &str) -> bool {
        self.ties.get(name).is_some_and(|tie| {
            tie.dependencies
                .iter()
                .all(|dependency| self.ties.get(dependency).is_some_and(|dep| !dep.empty))
        })
    }

    // --- Pipes ---

    pub fn pipe(&self, name: &str) -> Option<Rc<Pipe>> {
        self.pipes.get(name).cloned()
    }

    pub fn pipe_names(&self) -> impl Iterator<Item = &str> {
        self.pipes.keys().map(String::as_str)
    }

    pub(crate) fn insert_pipe(&mut self, pipe: Pipe) -> Result<Ulid, EngineError> {
        if pipe.name().starts_with('.') {
            return Err(EngineError::InvalidPipeName(pipe.name().to_owned()));
        }
        if self.pipes.get(pipe.name()).is_some_and(|existing| existing.is_sealed()) {
            return Err(EngineError::SealedPipe(pipe.name().to_owned()));
        }
        let id = pipe.id();
        self.pipes.insert(pipe.name().to_owned(), Rc::new(pipe));
        Ok(id)
    }

    // --- Handles ---

    pub fn handle(&self, name: &str) -> Option<Rc<Handle>> {
        self.handles.get(name).cloned()
    }

    /// Handles in registration order.
    pub fn handle_names(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }

    pub(crate) fn check_handle(&self, handle: &Handle) -> Result<(), EngineError> {
        if self.handles.get(handle.name()).is_some_and(|existing| existing.is_sealed()) {
            return Err(EngineError::SealedHandle(handle.name().to_owned()));
        }
        Ok(())
    }

    pub(crate) fn insert_handle(&mut self, handle: Rc<Handle>) {
        self.handles.insert(handle.name().to_owned(), handle);
    }
}
