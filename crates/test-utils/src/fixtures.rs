use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use opqueue::exec::DelayedWork;
use opqueue::{Operation, OperationContext};

/// An operation that finishes after a delay, optionally with an error, and
/// records whether its work actually ran.
pub struct TestOperation {
    pub operation: Operation,
    did_execute: Arc<AtomicBool>,
}

impl TestOperation {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self::build(name, DelayedWork::new(delay))
    }

    pub fn failing(name: &str, delay: Duration, error: &str) -> Self {
        Self::build(name, DelayedWork::new(delay).with_error(error))
    }

    fn build(name: &str, work: DelayedWork) -> Self {
        let did_execute = work.executed_flag();
        Self {
            operation: Operation::new(name, work),
            did_execute,
        }
    }

    pub fn did_execute(&self) -> bool {
        self.did_execute.load(Ordering::Acquire)
    }

    pub fn did_execute_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.did_execute)
    }
}

/// Contexts of operations whose work started but has not been finished yet.
///
/// Work bodies built by [`ManualWork::operation`] park their context here so a
/// test can decide exactly when (and how) each one finishes.
#[derive(Clone, Default)]
pub struct ManualWork {
    started: Arc<Mutex<Vec<OperationContext>>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ManualWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operation(&self, name: &str) -> Operation {
        let started = Arc::clone(&self.started);
        let log = Arc::clone(&self.log);
        Operation::from_fn(name, move |ctx| {
            log.lock().unwrap().push(ctx.operation().name().to_string());
            started.lock().unwrap().push(ctx);
        })
    }

    /// Names of operations whose work has started, in start order.
    pub fn started_names(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Number of started-but-unfinished operations.
    pub fn in_flight(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    /// Take the parked context of the named operation.
    pub fn take(&self, name: &str) -> Option<OperationContext> {
        let mut started = self.started.lock().unwrap();
        let pos = started.iter().position(|c| c.operation().name() == name)?;
        Some(started.remove(pos))
    }

    /// Take the parked context at `index` (start order).
    pub fn take_at(&self, index: usize) -> Option<OperationContext> {
        let mut started = self.started.lock().unwrap();
        if index < started.len() {
            Some(started.remove(index))
        } else {
            None
        }
    }

    /// Finish the named operation successfully. Panics if it has not started.
    pub fn finish_ok(&self, name: &str) {
        let ctx = self
            .take(name)
            .unwrap_or_else(|| panic!("operation {name} has not started"));
        ctx.finish_ok().unwrap();
    }
}
