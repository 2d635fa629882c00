// src/exec/mod.rs

//! Execution layer.
//!
//! The queue never runs a work body itself; it hands a job to a
//! [`Dispatcher`] and learns about completion only through `finish`.
//!
//! - [`dispatch`] provides the `Dispatcher` trait and the tokio, thread and
//!   inline implementations.
//! - [`delayed`] provides `DelayedWork`, a work body that finishes after a
//!   timer fires (optionally with a simulated error).

pub mod delayed;
pub mod dispatch;

pub use delayed::DelayedWork;
pub use dispatch::{
    Dispatcher, InlineDispatcher, Job, ThreadDispatcher, TokioDispatcher, dispatcher_for,
};
