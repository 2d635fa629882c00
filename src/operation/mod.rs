// src/operation/mod.rs

//! Operations: cancellable, finish-once units of work.
//!
//! - [`handle`] holds the shared [`Operation`] handle and its lifecycle
//!   state machine.
//! - [`work`] defines the [`Work`] capability a work body implements and the
//!   [`OperationContext`] it receives.
//! - [`error`] defines [`ExecutionError`], the values a work body reports
//!   through `finish`.

pub mod error;
pub mod handle;
pub mod work;

pub use error::{Cancelled, DependencyFailed, ExecutionError};
pub use handle::{CompletionCallback, Operation, WeakOperation};
pub use work::{OperationContext, Work};
