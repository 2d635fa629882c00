// src/operation/error.rs

//! Execution errors recorded on an operation at finish time.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Marker error for an operation that stopped because it was cancelled.
#[derive(Debug, Error)]
#[error("operation was cancelled")]
pub struct Cancelled;

/// An operation was vetoed because one of its dependencies failed.
#[derive(Debug, Error)]
#[error("dependency '{0}' finished with errors")]
pub struct DependencyFailed(pub String);

/// An error value produced by a work body and passed to `finish`.
///
/// Cheap to clone: the same error list is handed to the queue delegate, kept
/// on the operation, and returned from [`crate::Operation::errors`].
#[derive(Clone)]
pub struct ExecutionError {
    inner: Arc<anyhow::Error>,
}

impl ExecutionError {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::from(anyhow::Error::new(error))
    }

    /// Build an error from a plain message.
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self::from(anyhow::Error::msg(message))
    }

    pub fn cancelled() -> Self {
        Self::new(Cancelled)
    }

    pub fn dependency_failed(dependency: impl Into<String>) -> Self {
        Self::new(DependencyFailed(dependency.into()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.downcast_ref::<Cancelled>().is_some()
    }

    pub fn is_dependency_failure(&self) -> bool {
        self.downcast_ref::<DependencyFailed>().is_some()
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.inner.downcast_ref::<E>()
    }
}

impl From<anyhow::Error> for ExecutionError {
    fn from(error: anyhow::Error) -> Self {
        Self {
            inner: Arc::new(error),
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner, f)
    }
}

impl fmt::Debug for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}
