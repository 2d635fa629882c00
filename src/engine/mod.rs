// src/engine/mod.rs

//! Scheduling engine.
//!
//! - [`core`] is the pure bookkeeping state machine (membership, FIFO ready
//!   list, concurrency accounting).
//! - [`queue`] is the thread-safe [`OperationQueue`] around it, which
//!   dispatches work bodies and fires notifications outside its lock.
//! - [`delegate`] is the observer interface the queue notifies.

pub mod core;
pub mod delegate;
pub mod queue;

pub use core::QueueCore;
pub use delegate::OperationQueueDelegate;
pub use queue::OperationQueue;
