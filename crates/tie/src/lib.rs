//! Tie: a reactive model-binding engine.
//!
//! Named models ("ties") declare dependencies on each other and receive
//! `@name` back-references that stay in sync as their sources change.
//! Handles attach behavior to ties through `$name` properties, and pipe
//! chains transform values synchronously until a step defers.

pub mod bind;
pub mod capability;
pub mod chain;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod handle;
pub mod model;
pub mod observer;
pub mod parser;
pub mod pipe;
pub mod registry;
pub mod scheduler;
pub mod value;

pub use capability::{Observable, Readable, Resolvable};
pub use chain::{Chain, Next};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BreakerConfig, EngineConfig};
pub use engine::Engine;
pub use error::{CallbackError, CallbackResult, EngineError, ErrorPolicy};
pub use handle::{Handle, HandleScope};
pub use model::Model;
pub use observer::{Change, ChangeKind, ListDelta, Watcher};
pub use parser::{parse_expression, Argument, Expression, ParseFailure};
pub use pipe::{Pipe, PipeCall, PipeFn};
pub use registry::{Tie, TieSpec};
pub use scheduler::Scheduler;
pub use value::{Function, Value};
