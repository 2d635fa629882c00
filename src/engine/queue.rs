// src/engine/queue.rs

//! Thread-safe operation queue.
//!
//! This is the shell around [`QueueCore`]: it holds the core behind a single
//! mutex, and performs everything that calls out of the crate (dispatching
//! work bodies, delegate hooks, completion callbacks) after releasing it.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::model::QueueSection;
use crate::dag::readiness::failed_dependencies;
use crate::engine::core::QueueCore;
use crate::engine::delegate::OperationQueueDelegate;
use crate::errors::{OpQueueError, Result};
use crate::exec::{Dispatcher, ThreadDispatcher, dispatcher_for};
use crate::operation::{ExecutionError, Operation, OperationContext};
use crate::types::{DependencyFailurePolicy, OperationState};

/// Scheduler owning a set of submitted operations.
///
/// Cheap to clone; clones share the same queue. Operations hold only a weak
/// link back to their queue, so dropping every handle drops the queue and
/// any operations that never started.
#[derive(Clone)]
pub struct OperationQueue {
    shared: Arc<QueueShared>,
}

pub(crate) struct QueueShared {
    name: String,
    core: Mutex<QueueCore>,
    /// Signalled whenever membership becomes empty.
    idle: Condvar,
    /// Current member count, for async waiters.
    members_tx: watch::Sender<usize>,
    delegate: RwLock<Option<Weak<dyn OperationQueueDelegate>>>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl OperationQueue {
    /// Unbounded queue running each work body on its own thread.
    pub fn new() -> Self {
        Self::with_dispatcher("opqueue", Arc::new(ThreadDispatcher::default()))
    }

    pub fn with_dispatcher(name: impl Into<String>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        let (members_tx, _) = watch::channel(0usize);
        Self {
            shared: Arc::new(QueueShared {
                name: name.into(),
                core: Mutex::new(QueueCore::new(None)),
                idle: Condvar::new(),
                members_tx,
                delegate: RwLock::new(None),
                dispatcher,
            }),
        }
    }

    /// Build a queue from a validated `[queue]` section.
    pub fn from_config(section: &QueueSection) -> Result<Self> {
        let dispatcher = dispatcher_for(section.dispatcher)?;
        let queue = Self::with_dispatcher(section.name.clone(), dispatcher);
        queue.set_max_concurrent_operation_count(section.max_concurrent_operations)?;
        Ok(queue)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Attach a delegate. Only a weak reference is kept.
    pub fn set_delegate<D>(&self, delegate: &Arc<D>)
    where
        D: OperationQueueDelegate + 'static,
    {
        let weak: Weak<D> = Arc::downgrade(delegate);
        let weak: Weak<dyn OperationQueueDelegate> = weak;
        *self.shared.write_delegate() = Some(weak);
        debug!(queue = %self.shared.name, "delegate attached");
    }

    /// Detach the delegate and run a scheduling pass.
    pub fn clear_delegate(&self) {
        *self.shared.write_delegate() = None;
        debug!(queue = %self.shared.name, "delegate detached");
        self.shared.pump();
    }

    /// The current delegate, if attached and still alive.
    pub fn delegate(&self) -> Option<Arc<dyn OperationQueueDelegate>> {
        self.shared.delegate()
    }

    /// `None` means unbounded.
    pub fn max_concurrent_operation_count(&self) -> Option<usize> {
        self.shared.lock_core().max_concurrent()
    }

    pub fn set_max_concurrent_operation_count(&self, max: Option<usize>) -> Result<()> {
        if max == Some(0) {
            return Err(OpQueueError::InvalidConcurrency(0));
        }
        self.shared.lock_core().set_max_concurrent(max);
        debug!(queue = %self.shared.name, ?max, "max concurrent operations changed");
        self.shared.pump();
        Ok(())
    }

    pub fn is_suspended(&self) -> bool {
        self.shared.lock_core().is_suspended()
    }

    /// While suspended, no further operations start; executing ones run on.
    pub fn set_suspended(&self, suspended: bool) {
        self.shared.lock_core().set_suspended(suspended);
        info!(queue = %self.shared.name, suspended, "queue suspension changed");
        if !suspended {
            self.shared.pump();
        }
    }

    /// Number of submitted operations that have not finished yet.
    pub fn operation_count(&self) -> usize {
        self.shared.lock_core().len()
    }

    pub fn executing_count(&self) -> usize {
        self.shared.lock_core().executing_count()
    }

    /// Unfinished members in submission order.
    pub fn operations(&self) -> Vec<Operation> {
        self.shared.lock_core().operations()
    }

    /// Submit an operation.
    ///
    /// Rejects operations that were already submitted (here or elsewhere) or
    /// that already finished. The delegate's `will_add_operation` runs before
    /// the operation becomes visible to scheduling.
    pub fn add_operation(&self, operation: &Operation) -> Result<()> {
        if let Err(err) = operation.mark_submitted(Arc::downgrade(&self.shared)) {
            warn!(queue = %self.shared.name, operation = %operation, error = %err, "submit rejected");
            return Err(err);
        }
        debug!(queue = %self.shared.name, operation = %operation, "operation submitted");

        if let Some(delegate) = self.delegate() {
            delegate.will_add_operation(self, operation);
        }

        let batch = {
            let mut core = self.shared.lock_core();
            core.register(operation.clone());
            self.shared.publish(&core);
            core.next_batch()
        };

        self.shared.dispatch(batch);
        Ok(())
    }

    /// Submit several operations in order.
    ///
    /// The whole batch is checked up front, so a batch containing an already
    /// submitted operation or the same operation twice submits nothing.
    pub fn add_operations<'a, I>(&self, operations: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Operation>,
    {
        let operations: Vec<&Operation> = operations.into_iter().collect();

        let mut seen = HashSet::new();
        for op in &operations {
            let state = op.state();
            if state == OperationState::Finished {
                return Err(OpQueueError::AlreadyFinished {
                    operation: op.label(),
                });
            }
            if state != OperationState::Initialized || !seen.insert(op.id()) {
                return Err(OpQueueError::AlreadySubmitted {
                    operation: op.label(),
                });
            }
        }

        for op in operations {
            self.add_operation(op)?;
        }
        Ok(())
    }

    /// Set the cancel flag on every unfinished member. Cooperative only:
    /// nothing is forced to finish.
    pub fn cancel_all_operations(&self) {
        let members = self.operations();
        info!(queue = %self.shared.name, count = members.len(), "cancelling all operations");
        for op in members {
            op.cancel();
        }
    }

    /// Wait until membership is empty.
    pub async fn wait_until_all_operations_are_finished(&self) {
        let mut rx = self.shared.members_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    /// Blocking variant for callers outside an async runtime.
    pub fn wait_until_all_operations_are_finished_blocking(&self) {
        let core = self.shared.lock_core();
        let _core = self
            .shared
            .idle
            .wait_while(core, |core| !core.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Blocking wait with an upper bound. Returns `true` if the queue drained.
    pub fn wait_until_all_operations_are_finished_timeout(&self, timeout: Duration) -> bool {
        let core = self.shared.lock_core();
        let (core, _result) = self
            .shared
            .idle
            .wait_timeout_while(core, timeout, |core| !core.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        core.is_empty()
    }
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationQueue")
            .field("name", &self.shared.name)
            .field("core", &*self.shared.lock_core())
            .field("dispatcher", &self.shared.dispatcher)
            .finish_non_exhaustive()
    }
}

impl QueueShared {
    fn lock_core(&self) -> MutexGuard<'_, QueueCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_delegate(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, Option<Weak<dyn OperationQueueDelegate>>> {
        self.delegate.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn delegate(&self) -> Option<Arc<dyn OperationQueueDelegate>> {
        self.delegate
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Publish the member count. Called with the core lock held so that
    /// concurrent updates cannot be observed out of order.
    fn publish(&self, core: &QueueCore) {
        let count = core.len();
        self.members_tx.send_replace(count);
        if count == 0 {
            self.idle.notify_all();
        }
    }

    /// Scheduling pass with nothing else changed.
    fn pump(self: &Arc<Self>) {
        let batch = self.lock_core().next_batch();
        self.dispatch(batch);
    }

    /// Hand each operation's job to the dispatcher.
    ///
    /// An operation the dispatcher refuses is finished with the dispatch
    /// error; operations started in the slots that frees are dispatched by
    /// this same loop.
    fn dispatch(self: &Arc<Self>, mut batch: Vec<Operation>) {
        while !batch.is_empty() {
            let mut freed = Vec::new();
            for op in batch {
                let shared = Arc::clone(self);
                let job_op = op.clone();
                let Err(err) = self.dispatcher.dispatch(Box::new(move || shared.run(job_op)))
                else {
                    continue;
                };

                error!(
                    queue = %self.name,
                    operation = %op,
                    error = %err,
                    "dispatch failed; finishing operation"
                );
                match op.begin_finish(vec![ExecutionError::new(err)]) {
                    Ok(_) => freed.extend(self.process_finish(&op)),
                    Err(e) => {
                        warn!(operation = %op, error = %e, "could not finish undispatched operation")
                    }
                }
            }
            batch = freed;
        }
    }

    /// Body of a dispatched job: runs on the dispatcher's execution context.
    fn run(&self, op: Operation) {
        if op.is_cancelled() {
            debug!(operation = %op, "cancelled before start; finishing without running");
            self.finish_unrun(&op, Vec::new());
            return;
        }

        if op.dependency_failure_policy() == DependencyFailurePolicy::Veto {
            if let Some(failed) = failed_dependencies(&op).first() {
                info!(operation = %op, dependency = %failed, "vetoed by failed dependency");
                self.finish_unrun(&op, vec![ExecutionError::dependency_failed(failed.name())]);
                return;
            }
        }

        match op.take_work() {
            Some(work) => {
                debug!(queue = %self.name, operation = %op, "executing work body");
                work.execute(OperationContext::new(op));
            }
            None => {
                warn!(operation = %op, "work body already consumed; finishing");
                self.finish_unrun(&op, Vec::new());
            }
        }
    }

    fn finish_unrun(&self, op: &Operation, errors: Vec<ExecutionError>) {
        if let Err(err) = op.finish(errors) {
            warn!(operation = %op, error = %err, "failed to finish skipped operation");
        }
    }

    /// Finish processing for a member that just moved to `Finishing`.
    ///
    /// Order: `Finished`, delegate, completion callback, then dependents are
    /// released and the freed slot is reused.
    pub(crate) fn complete(self: &Arc<Self>, op: &Operation) {
        let batch = self.process_finish(op);
        self.dispatch(batch);
    }

    /// Everything `complete` does except dispatching; returns the operations
    /// that were started in the freed slots.
    fn process_finish(self: &Arc<Self>, op: &Operation) -> Vec<Operation> {
        let (errors, callback) = op.finalize();
        info!(
            queue = %self.name,
            operation = %op,
            errors = errors.len(),
            cancelled = op.is_cancelled(),
            "operation finished"
        );

        if let Some(delegate) = self.delegate() {
            let queue = OperationQueue {
                shared: Arc::clone(self),
            };
            delegate.operation_did_finish(&queue, op, &errors);
        }

        if let Some(callback) = callback {
            callback();
        }

        let dependents = op.settle();

        let mut foreign = Vec::new();
        let batch = {
            let mut core = self.lock_core();
            core.remove(op.id());
            for dependent in dependents {
                if core.contains(dependent.id()) {
                    core.evaluate(&dependent);
                } else {
                    foreign.push(dependent);
                }
            }
            self.publish(&core);
            core.next_batch()
        };

        // Dependents living in other queues. Ones not submitted anywhere yet
        // are evaluated when they are.
        for dependent in foreign {
            if let Some(queue) = dependent.owner() {
                if !Arc::ptr_eq(&queue, self) {
                    queue.reevaluate(&dependent);
                }
            }
        }

        batch
    }

    /// Re-check one member after a dependency settled elsewhere.
    pub(crate) fn reevaluate(self: &Arc<Self>, op: &Operation) {
        let batch = {
            let mut core = self.lock_core();
            core.evaluate(op);
            core.next_batch()
        };
        self.dispatch(batch);
    }
}
