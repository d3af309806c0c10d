//! Pipe chains: a value threaded through a sequence of pipes.
//!
//! A chain starts `Eager`: synchronous steps run inline and `value()` is
//! available immediately. The first deferred step flips it to `Deferred`;
//! from then on every step, synchronous or not, is queued and drained one
//! step per scheduler tick, in order. `then` receives the final value either
//! immediately (eager) or exactly once after the queue drains (deferred).
//!
//! A step that fails is logged according to the engine's `ErrorPolicy` and
//! passes `Value::Null` on to the next step.

use crate::error::{CallbackError, EngineError, ErrorPolicy};
use crate::parser::parse_arguments;
use crate::pipe::{Pipe, PipeCall, PipeFn, SyncPipeFn};
use crate::registry::{Registry, Tie};
use crate::scheduler::Scheduler;
use crate::value::Value;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Eager,
    Deferred,
}

struct Step {
    pipe: Rc<Pipe>,
    args: Vec<Value>,
    deps: IndexMap<String, Value>,
}

/// Where faults are reported from and whether they are logged.
#[derive(Debug, Clone)]
struct FaultContext {
    source: Option<Arc<str>>,
    policy: ErrorPolicy,
    ready: bool,
}

impl FaultContext {
    fn report(&self, pipe: &str, error: &CallbackError) {
        if !self.policy.should_log(self.ready) {
            return;
        }
        match &self.source {
            Some(tie) => log::error!("pipe '{pipe}' failed on tie '{tie}': {error}"),
            None => log::error!("pipe '{pipe}' failed: {error}"),
        }
    }
}

struct ChainState {
    mode: Mode,
    value: Value,
    queue: VecDeque<Step>,
    in_flight: bool,
    scheduled: bool,
    terminal: Option<Box<dyn FnOnce(Value)>>,
    faults: FaultContext,
}

pub struct Chain<'e> {
    registry: &'e Registry,
    scheduler: Scheduler,
    source: Option<Arc<str>>,
    state: Rc<RefCell<ChainState>>,
}

impl<'e> Chain<'e> {
    pub(crate) fn new(
        registry: &'e Registry,
        scheduler: Scheduler,
        source: Option<Arc<str>>,
        policy: ErrorPolicy,
        ready: bool,
        value: Value,
    ) -> Self {
        let state = ChainState {
            mode: Mode::Eager,
            value,
            queue: VecDeque::new(),
            in_flight: false,
            scheduled: false,
            terminal: None,
            faults: FaultContext {
                source: source.clone(),
                policy,
                ready,
            },
        };
        Self {
            registry,
            scheduler,
            source,
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Append the registered pipe `name`.
    pub fn pipe(
        self,
        name: &str,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<Self, EngineError> {
        let pipe = self
            .registry
            .pipe(name)
            .ok_or_else(|| EngineError::UnknownPipe(name.to_owned()))?;
        Ok(self.push_step(pipe, args.into_iter().collect()))
    }

    /// Append `name` with arguments in expression syntax, e.g. `'a', 2, #{user.id}`.
    ///
    /// `#{path}` references read the source tie's model.
    pub fn pipe_str(self, name: &str, raw_args: &str) -> Result<Self, EngineError> {
        let arguments = parse_arguments(raw_args)?;
        let model = self
            .source
            .as_deref()
            .and_then(|tie| self.registry.tie(tie))
            .map(Tie::model);
        let args: Vec<Value> = arguments.iter().map(|argument| argument.resolve(model)).collect();
        self.pipe(name, args)
    }

    /// Append a pipe that is not registered with the engine.
    pub fn pipe_with(self, pipe: Pipe, args: impl IntoIterator<Item = Value>) -> Self {
        self.push_step(Rc::new(pipe), args.into_iter().collect())
    }

    /// Deliver the final value: now if every step so far was synchronous,
    /// otherwise once, after the last queued step finishes.
    pub fn then(self, callback: impl FnOnce(Value) + 'static) {
        let mode = self.state.borrow().mode;
        match mode {
            Mode::Eager => {
                let value = std::mem::take(&mut self.state.borrow_mut().value);
                callback(value);
            }
            Mode::Deferred => {
                self.state.borrow_mut().terminal = Some(Box::new(callback));
                schedule(&self.state, &self.scheduler);
            }
        }
    }

    /// The current value while the chain is still synchronous.
    pub fn value(&self) -> Option<Value> {
        let state = self.state.borrow();
        match state.mode {
            Mode::Eager => Some(state.value.clone()),
            Mode::Deferred => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        self.state.borrow().mode == Mode::Deferred
    }

    fn push_step(self, pipe: Rc<Pipe>, args: Vec<Value>) -> Self {
        let deps = pipe
            .dependencies()
            .iter()
            .map(|name| {
                let snapshot = self
                    .registry
                    .tie(name)
                    .map(|tie| tie.model().snapshot())
                    .unwrap_or_default();
                (name.clone(), snapshot)
            })
            .collect();
        let mode = self.state.borrow().mode;
        let function = pipe.function().clone();
        match (mode, function) {
            (Mode::Eager, PipeFn::Sync(function)) => {
                let (value, faults) = {
                    let mut state = self.state.borrow_mut();
                    (std::mem::take(&mut state.value), state.faults.clone())
                };
                let call = PipeCall { value, args, deps };
                let output = run_sync(&function, pipe.name(), &call, &faults);
                self.state.borrow_mut().value = output;
            }
            _ => {
                {
                    let mut state = self.state.borrow_mut();
                    if state.mode == Mode::Eager {
                        log::trace!(
                            "pipe '{}' defers, chain continues asynchronously",
                            pipe.name()
                        );
                        state.mode = Mode::Deferred;
                    }
                    state.queue.push_back(Step { pipe, args, deps });
                }
                schedule(&self.state, &self.scheduler);
            }
        }
        self
    }
}

impl fmt::Debug for Chain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Chain")
            .field("source", &self.source)
            .field("mode", &state.mode)
            .field("queued", &state.queue.len())
            .field("in_flight", &state.in_flight)
            .finish()
    }
}

/// Continuation handed to a deferred pipe.
///
/// The chain stalls until `resume` or `fail` is called; dropping a `Next`
/// without calling either leaves the remaining steps queued forever.
pub struct Next {
    state: Rc<RefCell<ChainState>>,
    scheduler: Scheduler,
    pipe: String,
    faults: FaultContext,
}

impl Next {
    pub fn resume(self, value: Value) {
        finish(&self.state, &self.scheduler, value);
    }

    /// Report `error` and continue with `Value::Null`.
    pub fn fail(self, error: impl Into<CallbackError>) {
        self.faults.report(&self.pipe, &error.into());
        finish(&self.state, &self.scheduler, Value::Null);
    }

    /// The scheduler driving this chain, for resuming on a later tick.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").field("pipe", &self.pipe).finish()
    }
}

fn run_sync(function: &SyncPipeFn, pipe: &str, call: &PipeCall, faults: &FaultContext) -> Value {
    match function(call) {
        Ok(value) => value,
        Err(error) => {
            faults.report(pipe, &error);
            Value::Null
        }
    }
}

fn schedule(state: &Rc<RefCell<ChainState>>, scheduler: &Scheduler) {
    {
        let mut chain = state.borrow_mut();
        if chain.in_flight || chain.scheduled {
            return;
        }
        chain.scheduled = true;
    }
    let state = Rc::clone(state);
    let task_scheduler = scheduler.clone();
    scheduler.defer(move || advance(&state, &task_scheduler));
}

/// Run the next queued step, or deliver the final value once drained.
fn advance(state: &Rc<RefCell<ChainState>>, scheduler: &Scheduler) {
    let (step, value, faults) = {
        let mut chain = state.borrow_mut();
        chain.scheduled = false;
        if chain.in_flight {
            return;
        }
        match chain.queue.pop_front() {
            Some(step) => {
                chain.in_flight = true;
                (step, std::mem::take(&mut chain.value), chain.faults.clone())
            }
            None => {
                let terminal = chain.terminal.take();
                let value = chain.value.clone();
                drop(chain);
                if let Some(terminal) = terminal {
                    terminal(value);
                }
                return;
            }
        }
    };

    let Step { pipe, args, deps } = step;
    let call = PipeCall { value, args, deps };
    let function = pipe.function().clone();
    match function {
        PipeFn::Sync(function) => {
            let output = run_sync(&function, pipe.name(), &call, &faults);
            finish(state, scheduler, output);
        }
        PipeFn::Deferred(function) => function(
            call,
            Next {
                state: Rc::clone(state),
                scheduler: scheduler.clone(),
                pipe: pipe.name().to_owned(),
                faults,
            },
        ),
    }
}

fn finish(state: &Rc<RefCell<ChainState>>, scheduler: &Scheduler, value: Value) {
    {
        let mut chain = state.borrow_mut();
        chain.value = value;
        chain.in_flight = false;
    }
    schedule(state, scheduler);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .insert_pipe(Pipe::new(
                "double",
                PipeFn::sync(|call| Ok(Value::from(call.value.as_f64().unwrap_or(0.0) * 2.0))),
            ))
            .unwrap();
        registry
            .insert_pipe(Pipe::new(
                "later",
                PipeFn::deferred(|call, next| {
                    let scheduler = next.scheduler().clone();
                    scheduler.defer(move || next.resume(call.value));
                }),
            ))
            .unwrap();
        registry
            .insert_pipe(Pipe::new("broken", PipeFn::sync(|_| Err("boom".into()))))
            .unwrap();
        registry
    }

    fn chain<'a>(registry: &'a Registry, scheduler: &Scheduler, value: Value) -> Chain<'a> {
        Chain::new(registry, scheduler.clone(), None, ErrorPolicy::Silent, true, value)
    }

    #[test]
    fn synchronous_chain_has_an_immediate_value() {
        let registry = registry();
        let scheduler = Scheduler::new();
        let chain = chain(&registry, &scheduler, Value::from(2))
            .pipe("double", [])
            .unwrap()
            .pipe("double", [])
            .unwrap();
        assert_eq!(chain.value(), Some(Value::from(8)));
        assert!(scheduler.is_idle());
    }

    #[test]
    fn unknown_pipe_fails_immediately() {
        let registry = registry();
        let scheduler = Scheduler::new();
        let error = chain(&registry, &scheduler, Value::Null).pipe("missing", []).unwrap_err();
        assert!(matches!(error, EngineError::UnknownPipe(name) if name == "missing"));
    }

    #[test]
    fn failing_step_passes_null_on() {
        let registry = registry();
        let scheduler = Scheduler::new();
        let chain = chain(&registry, &scheduler, Value::from(1))
            .pipe("broken", [])
            .unwrap()
            .pipe("double", [])
            .unwrap();
        assert_eq!(chain.value(), Some(Value::from(0)));
    }

    #[test]
    fn deferred_chain_delivers_once_after_draining() {
        let registry = registry();
        let scheduler = Scheduler::new();
        let calls = Rc::new(Cell::new(0));
        let result = Rc::new(RefCell::new(Value::Null));

        let chain = chain(&registry, &scheduler, Value::from(3))
            .pipe("later", [])
            .unwrap()
            .pipe("double", [])
            .unwrap();
        assert!(chain.is_deferred());
        assert_eq!(chain.value(), None);

        {
            let calls = calls.clone();
            let result = result.clone();
            chain.then(move |value| {
                calls.set(calls.get() + 1);
                *result.borrow_mut() = value;
            });
        }
        assert_eq!(calls.get(), 0);

        scheduler.run_until_idle();
        assert_eq!(calls.get(), 1);
        assert_eq!(*result.borrow(), Value::from(6));
    }
}
