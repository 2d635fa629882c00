// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::types::{OperationId, OperationState};

/// Configuration errors reported synchronously to the caller.
///
/// Failures *inside* a work body are not reported through this type; they are
/// passed to `finish` as [`crate::operation::ExecutionError`] values.
#[derive(Error, Debug)]
pub enum OpQueueError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("operation {operation} cannot depend on itself")]
    SelfDependency { operation: String },

    #[error("Cycle detected in dependency graph: {0}")]
    DependencyCycle(String),

    #[error("operation {operation} was already submitted to a queue")]
    AlreadySubmitted { operation: String },

    #[error("operation {operation} is already finished")]
    AlreadyFinished { operation: String },

    #[error("finish called more than once on operation {operation}")]
    DuplicateFinish { operation: String },

    #[error("cannot {action} operation {operation} in state {state}")]
    InvalidState {
        operation: String,
        state: OperationState,
        action: &'static str,
    },

    #[error("max concurrent operation count must be >= 1 (got {0})")]
    InvalidConcurrency(usize),

    #[error("no tokio runtime available for the tokio dispatcher")]
    NoRuntime,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OpQueueError {
    /// Render an operation as `'name' (op#N)` for error messages.
    pub(crate) fn label(name: &str, id: OperationId) -> String {
        format!("'{name}' ({id})")
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, OpQueueError>;
