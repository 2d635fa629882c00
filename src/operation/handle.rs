// src/operation/handle.rs

//! The shared operation handle and its lifecycle state machine.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, warn};

use crate::dag::graph::would_create_cycle;
use crate::dag::readiness::dependencies_settled;
use crate::engine::queue::QueueShared;
use crate::errors::{OpQueueError, Result};
use crate::operation::error::ExecutionError;
use crate::operation::work::Work;
use crate::types::{DependencyFailurePolicy, OperationId, OperationState};

/// Serialises dependency edits across all operations.
static DEPENDENCY_EDIT: Mutex<()> = Mutex::new(());

/// Callback fired once after an operation's finish has been processed.
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// A cancellable, finish-once unit of work.
///
/// `Operation` is a cheap handle (`Arc` inside); clones refer to the same
/// operation. Equality and hashing are by identity.
#[derive(Clone)]
pub struct Operation {
    inner: Arc<OperationInner>,
}

/// Non-owning handle to an operation, for use inside its own callbacks.
#[derive(Clone)]
pub struct WeakOperation {
    inner: Weak<OperationInner>,
}

struct OperationInner {
    id: OperationId,
    name: String,
    cancelled: AtomicBool,
    /// Set once the finish has been fully processed (delegate notified,
    /// completion callback run). Only settled operations count as finished
    /// dependencies.
    settled: AtomicBool,
    core: Mutex<OperationCore>,
    work: Mutex<Option<Box<dyn Work>>>,
}

struct OperationCore {
    state: OperationState,
    dependencies: Vec<Operation>,
    dependents: Vec<WeakOperation>,
    errors: Vec<ExecutionError>,
    completion: Option<CompletionCallback>,
    owner: Option<Weak<QueueShared>>,
    policy: DependencyFailurePolicy,
}

impl Operation {
    pub fn new<W: Work>(name: impl Into<String>, work: W) -> Self {
        let work: Box<dyn Work> = Box::new(work);
        Self {
            inner: Arc::new(OperationInner {
                id: OperationId::next(),
                name: name.into(),
                cancelled: AtomicBool::new(false),
                settled: AtomicBool::new(false),
                core: Mutex::new(OperationCore {
                    state: OperationState::Initialized,
                    dependencies: Vec::new(),
                    dependents: Vec::new(),
                    errors: Vec::new(),
                    completion: None,
                    owner: None,
                    policy: DependencyFailurePolicy::default(),
                }),
                work: Mutex::new(Some(work)),
            }),
        }
    }

    /// Convenience for closure work bodies.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(crate::operation::OperationContext) + Send + 'static,
    {
        Self::new(name, f)
    }

    pub fn id(&self) -> OperationId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> OperationState {
        self.lock_core().state
    }

    pub fn is_executing(&self) -> bool {
        self.state() == OperationState::Executing
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Set the advisory cancel flag.
    ///
    /// Legal at any point before `Finished`; afterwards this is a no-op.
    /// The work body decides whether and how to stop.
    pub fn cancel(&self) {
        let core = self.lock_core();
        if core.state.is_terminal() {
            debug!(operation = %self, "cancel on finished operation ignored");
            return;
        }
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            debug!(operation = %self, state = %core.state, "operation cancelled");
        }
    }

    /// Errors recorded at finish (empty before finish, or on success).
    pub fn errors(&self) -> Vec<ExecutionError> {
        self.lock_core().errors.clone()
    }

    /// Dependencies in insertion order.
    pub fn dependencies(&self) -> Vec<Operation> {
        self.lock_core().dependencies.clone()
    }

    pub fn dependency_failure_policy(&self) -> DependencyFailurePolicy {
        self.lock_core().policy
    }

    pub fn set_dependency_failure_policy(&self, policy: DependencyFailurePolicy) {
        self.lock_core().policy = policy;
    }

    /// Make this operation wait until `other` has finished.
    ///
    /// Allowed while the operation is `Initialized` or `Pending`. Adding the
    /// same dependency twice is a no-op. Self-dependencies and dependencies
    /// that would close a cycle are rejected.
    pub fn add_dependency(&self, other: &Operation) -> Result<()> {
        if self == other {
            warn!(operation = %self, "rejected self-dependency");
            return Err(OpQueueError::SelfDependency {
                operation: self.label(),
            });
        }

        // Cycle check and insert happen under one process-wide lock, so two
        // opposite edges added concurrently cannot both pass the check.
        let _edit = DEPENDENCY_EDIT
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        {
            let core = self.lock_core();
            if !core.state.accepts_dependencies() {
                return Err(self.invalid_state(core.state, "add a dependency to"));
            }
            if core.dependencies.contains(other) {
                return Ok(());
            }
        }

        if would_create_cycle(self, other) {
            warn!(operation = %self, dependency = %other, "rejected dependency cycle");
            return Err(OpQueueError::DependencyCycle(format!(
                "{} already depends on {}",
                other.label(),
                self.label()
            )));
        }

        // Both links are written under both locks. A finish of `other` that
        // races with this either sees us as a dependent or has already
        // settled, which `try_promote` observes.
        let (mut core, mut other_core) = self.lock_pair(other);
        if !core.state.accepts_dependencies() {
            return Err(self.invalid_state(core.state, "add a dependency to"));
        }
        other_core.dependents.push(self.downgrade());
        core.dependencies.push(other.clone());
        debug!(operation = %self, dependency = %other, "dependency added");
        Ok(())
    }

    /// Replace the completion callback.
    ///
    /// The callback runs once, after the queue delegate has been told about
    /// the finish. Capture a [`WeakOperation`] rather than the operation
    /// itself to look at the outcome.
    pub fn set_completion_callback<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.lock_core().completion = Some(Box::new(callback));
    }

    pub fn downgrade(&self) -> WeakOperation {
        WeakOperation {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// End the executing phase and record the outcome.
    ///
    /// May be called from any thread. Only the first call while `Executing`
    /// counts; later calls return [`OpQueueError::DuplicateFinish`] and fire
    /// nothing.
    pub fn finish<I>(&self, errors: I) -> Result<()>
    where
        I: IntoIterator<Item = ExecutionError>,
    {
        match self.begin_finish(errors.into_iter().collect())? {
            Some(queue) => queue.complete(self),
            None => self.complete_detached(),
        }
        Ok(())
    }

    /// `Executing -> Finishing`, recording `errors`. Returns the owning queue
    /// if it is still alive.
    pub(crate) fn begin_finish(
        &self,
        errors: Vec<ExecutionError>,
    ) -> Result<Option<Arc<QueueShared>>> {
        let owner = {
            let mut core = self.lock_core();
            match core.state {
                OperationState::Executing => {
                    core.state = OperationState::Finishing;
                    core.errors = errors;
                    core.owner.clone()
                }
                OperationState::Finishing | OperationState::Finished => {
                    warn!(operation = %self, "finish called more than once; ignoring");
                    return Err(OpQueueError::DuplicateFinish {
                        operation: self.label(),
                    });
                }
                state => return Err(self.invalid_state(state, "finish")),
            }
        };

        debug!(operation = %self, "operation finishing");
        Ok(owner.and_then(|queue| queue.upgrade()))
    }

    /// Finish path for an operation whose queue has been dropped while it was
    /// executing: no delegate, but the callback and dependents still fire.
    fn complete_detached(&self) {
        let (_errors, callback) = self.finalize();
        if let Some(callback) = callback {
            callback();
        }
        for dependent in self.settle() {
            if let Some(queue) = dependent.owner() {
                queue.reevaluate(&dependent);
            }
        }
    }

    pub(crate) fn label(&self) -> String {
        OpQueueError::label(self.name(), self.id())
    }

    fn invalid_state(&self, state: OperationState, action: &'static str) -> OpQueueError {
        OpQueueError::InvalidState {
            operation: self.label(),
            state,
            action,
        }
    }

    /// Lock `self` and `other` in id order.
    fn lock_pair<'a>(
        &'a self,
        other: &'a Operation,
    ) -> (MutexGuard<'a, OperationCore>, MutexGuard<'a, OperationCore>) {
        if self.id() < other.id() {
            let mine = self.lock_core();
            (mine, other.lock_core())
        } else {
            let theirs = other.lock_core();
            (self.lock_core(), theirs)
        }
    }

    fn lock_core(&self) -> MutexGuard<'_, OperationCore> {
        self.inner
            .core
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// `Initialized -> Pending`, binding the operation to its queue.
    pub(crate) fn mark_submitted(&self, owner: Weak<QueueShared>) -> Result<()> {
        let mut core = self.lock_core();
        match core.state {
            OperationState::Initialized => {
                core.state = OperationState::Pending;
                core.owner = Some(owner);
                Ok(())
            }
            OperationState::Finished => Err(OpQueueError::AlreadyFinished {
                operation: self.label(),
            }),
            _ => Err(OpQueueError::AlreadySubmitted {
                operation: self.label(),
            }),
        }
    }

    pub(crate) fn owner(&self) -> Option<Arc<QueueShared>> {
        self.lock_core().owner.as_ref().and_then(Weak::upgrade)
    }

    /// Apply a single forward transition; returns `false` if the operation was
    /// not in `from`.
    pub(crate) fn transition(&self, from: OperationState, to: OperationState) -> bool {
        debug_assert!(from.can_transition_to(to));
        let mut core = self.lock_core();
        if core.state != from {
            return false;
        }
        core.state = to;
        debug!(operation = %self, %from, %to, "state transition");
        true
    }

    /// `Pending -> Ready` if every dependency has settled.
    ///
    /// Dependencies can still be added while `Pending`, so the snapshot is
    /// re-taken if the list grew between the check and the transition.
    pub(crate) fn try_promote(&self) -> bool {
        loop {
            let snapshot = {
                let core = self.lock_core();
                if core.state != OperationState::Pending {
                    return false;
                }
                core.dependencies.clone()
            };

            if !dependencies_settled(&snapshot) {
                return false;
            }

            let mut core = self.lock_core();
            if core.state != OperationState::Pending {
                return false;
            }
            if core.dependencies.len() == snapshot.len() {
                core.state = OperationState::Ready;
                debug!(operation = %self, "dependencies finished; ready");
                return true;
            }
        }
    }

    pub(crate) fn take_work(&self) -> Option<Box<dyn Work>> {
        self.inner
            .work
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// `Finishing -> Finished`; hands back the recorded errors and the
    /// completion callback (taken, so it can only fire once).
    pub(crate) fn finalize(&self) -> (Vec<ExecutionError>, Option<CompletionCallback>) {
        let mut core = self.lock_core();
        debug_assert_eq!(core.state, OperationState::Finishing);
        core.state = OperationState::Finished;
        (core.errors.clone(), core.completion.take())
    }

    /// Mark the finish as fully processed and return the live dependents that
    /// need their readiness re-checked.
    pub(crate) fn settle(&self) -> Vec<Operation> {
        let mut core = self.lock_core();
        self.inner.settled.store(true, Ordering::Release);
        std::mem::take(&mut core.dependents)
            .iter()
            .filter_map(WeakOperation::upgrade)
            .collect()
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.inner.settled.load(Ordering::Acquire)
    }
}

impl WeakOperation {
    pub fn upgrade(&self) -> Option<Operation> {
        self.inner.upgrade().map(|inner| Operation { inner })
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Operation {}

impl Hash for Operation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.inner.name, self.inner.id)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for WeakOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakOperation")
            .field(&self.upgrade())
            .finish()
    }
}
