//! Pipes: named value transformers chained by `Chain`.
//!
//! A pipe is either synchronous, returning its output directly, or deferred,
//! receiving a `Next` it must resume (or fail) later. A pipe may depend on
//! ties; their current snapshots arrive in `PipeCall::deps`.

use crate::chain::Next;
use crate::error::{CallbackError, CallbackResult};
use crate::value::Value;
use indexmap::IndexMap;
use smallvec::SmallVec;
use std::fmt;
use std::rc::Rc;
use ulid::Ulid;

/// Built-in pipe reading a dotted property of the incoming value.
pub const PROPERTY_PIPE: &str = "property";
/// Built-in pipe serializing the incoming value to JSON text.
pub const JSON_PIPE: &str = "json";
/// Built-in pipe substituting its argument for a null value.
pub const DEFAULT_PIPE: &str = "default";

pub type SyncPipeFn = Rc<dyn Fn(&PipeCall) -> CallbackResult<Value>>;
pub type DeferredPipeFn = Rc<dyn Fn(PipeCall, Next)>;

#[derive(Clone)]
pub enum PipeFn {
    Sync(SyncPipeFn),
    Deferred(DeferredPipeFn),
}

impl PipeFn {
    pub fn sync(function: impl Fn(&PipeCall) -> CallbackResult<Value> + 'static) -> Self {
        PipeFn::Sync(Rc::new(function))
    }

    pub fn deferred(function: impl Fn(PipeCall, Next) + 'static) -> Self {
        PipeFn::Deferred(Rc::new(function))
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, PipeFn::Deferred(_))
    }
}

/// Input of one pipe step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipeCall {
    pub value: Value,
    pub args: Vec<Value>,
    /// Snapshot of each tie the pipe depends on, by name.
    pub deps: IndexMap<String, Value>,
}

impl PipeCall {
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn dependency(&self, name: &str) -> Option<&Value> {
        self.deps.get(name)
    }
}

pub struct Pipe {
    name: String,
    id: Ulid,
    dependencies: SmallVec<[String; 4]>,
    sealed: bool,
    function: PipeFn,
}

impl Pipe {
    pub fn new(name: impl Into<String>, function: PipeFn) -> Self {
        Self {
            name: name.into(),
            id: Ulid::new(),
            dependencies: SmallVec::new(),
            sealed: false,
            function,
        }
    }

    /// Ties whose snapshots the pipe receives.
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

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn is_deferred(&self) -> bool {
        self.function.is_deferred()
    }

    pub fn function(&self) -> &PipeFn {
        &self.function
    }
}

impl fmt::Debug for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipe")
            .field("name", &self.name)
            .field("deferred", &self.is_deferred())
            .field("sealed", &self.sealed)
            .finish()
    }
}

/// Pipes every engine starts with.
pub fn builtin_pipes() -> Vec<Pipe> {
    vec![
        Pipe::new(PROPERTY_PIPE, PipeFn::sync(property)),
        Pipe::new(JSON_PIPE, PipeFn::sync(json)),
        Pipe::new(DEFAULT_PIPE, PipeFn::sync(default)),
    ]
}

fn property(call: &PipeCall) -> CallbackResult<Value> {
    match call.arg(0) {
        None => Ok(call.value.clone()),
        Some(Value::Text(path)) => Ok(call.value.lookup(path).cloned().unwrap_or_default()),
        Some(other) => Err(CallbackError::new(format!(
            "property path must be text, got {}",
            other.type_name()
        ))),
    }
}

fn json(call: &PipeCall) -> CallbackResult<Value> {
    let json = call.value.to_json();
    let pretty = call.arg(0).and_then(Value::as_bool).unwrap_or(false);
    let text = if pretty {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    };
    text.map(Value::Text)
        .map_err(|error| CallbackError::new(error.to_string()))
}

fn default(call: &PipeCall) -> CallbackResult<Value> {
    if call.value.is_null() {
        Ok(call.arg(0).cloned().unwrap_or_default())
    } else {
        Ok(call.value.clone())
    }
}
