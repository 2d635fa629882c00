// src/operation/work.rs

//! The work-body capability and the context handed to it.

use std::fmt;

use crate::errors::Result;
use crate::operation::error::ExecutionError;
use crate::operation::handle::Operation;

/// A work body, invoked at most once when its operation starts executing.
///
/// The body must eventually call [`OperationContext::finish`] exactly once.
/// It may do so before returning, or later from any thread (a timer, an I/O
/// callback, a spawned task); the queue waits for `finish`, not for
/// `execute` to return.
///
/// Any `FnOnce(OperationContext) + Send + 'static` closure is a `Work`.
pub trait Work: Send + 'static {
    fn execute(self: Box<Self>, ctx: OperationContext);
}

impl<F> Work for F
where
    F: FnOnce(OperationContext) + Send + 'static,
{
    fn execute(self: Box<Self>, ctx: OperationContext) {
        (*self)(ctx)
    }
}

/// Handle given to a work body.
///
/// Cloneable and `Send`, so it can be moved into whatever eventually
/// completes the work.
#[derive(Clone)]
pub struct OperationContext {
    operation: Operation,
}

impl OperationContext {
    pub(crate) fn new(operation: Operation) -> Self {
        Self { operation }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Cooperative cancellation check.
    pub fn is_cancelled(&self) -> bool {
        self.operation.is_cancelled()
    }

    pub fn finish<I>(&self, errors: I) -> Result<()>
    where
        I: IntoIterator<Item = ExecutionError>,
    {
        self.operation.finish(errors)
    }

    pub fn finish_ok(&self) -> Result<()> {
        self.operation.finish(Vec::new())
    }

    pub fn finish_with_error(&self, error: impl Into<ExecutionError>) -> Result<()> {
        self.operation.finish([error.into()])
    }
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationContext")
            .field("operation", &self.operation)
            .finish()
    }
}
