//! Engine errors and the policy applied to user-callback faults.
//!
//! Structural mistakes (sealed names, unknown pipes, handle cycles, bad
//! patterns) are `EngineError`s returned to the caller. Faults raised by user
//! handles, pipes and watchers are `CallbackError`s; they never leave the
//! engine and only drop the effect of the step that raised them.

use crate::parser::ParseFailure;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot re-register sealed tie '{0}'")]
    SealedTie(String),
    #[error("cannot re-register sealed pipe '{0}'")]
    SealedPipe(String),
    #[error("cannot re-register sealed handle '{0}'")]
    SealedHandle(String),
    #[error("pipe name '{0}' may not start with '.'")]
    InvalidPipeName(String),
    #[error("unknown tie '{0}'")]
    UnknownTie(String),
    #[error("unknown pipe '{0}'")]
    UnknownPipe(String),
    #[error("unknown handle '{name}' required by '{required_by}'")]
    UnknownHandle { name: String, required_by: String },
    #[error("handle dependency cycle: {}", .0.join(" -> "))]
    HandleCycle(Vec<String>),
    #[error("invalid watcher pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseFailure),
    #[error("expression '{0}' names no tie and no context tie was given")]
    MissingContext(String),
    #[error("invalid engine configuration: {0}")]
    Config(#[from] toml::de::Error),
    #[error("cannot read engine configuration {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure reported by a user-supplied handle, pipe or watcher.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct CallbackError {
    message: String,
}

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for CallbackError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for CallbackError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Lets callbacks that drive the engine propagate its errors with `?`.
impl From<EngineError> for CallbackError {
    fn from(error: EngineError) -> Self {
        Self::new(error.to_string())
    }
}

pub type CallbackResult<T = ()> = Result<T, CallbackError>;

/// When callback faults are logged.
///
/// Faults on ties whose dependencies are still empty stubs are expected
/// during startup, so the default only logs once the tie is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    #[default]
    WhenReady,
    Always,
    Silent,
}

impl ErrorPolicy {
    pub fn should_log(self, ready: bool) -> bool {
        match self {
            ErrorPolicy::WhenReady => ready,
            ErrorPolicy::Always => true,
            ErrorPolicy::Silent => false,
        }
    }
}
