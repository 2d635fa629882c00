// src/engine/core.rs

//! Pure scheduling core.
//!
//! `QueueCore` owns the bookkeeping for a single queue:
//! - membership (submitted, not yet finished), in submission order
//! - the FIFO list of `Ready` operations
//! - the executing count versus the concurrency limit
//! - suspension
//!
//! It has no locks, threads, or callbacks of its own. The shell
//! (`engine::queue`) holds it behind a mutex and performs dispatch and
//! notifications after releasing that mutex; every method here returns what
//! the shell should do next instead of doing it.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace};

use crate::dag::readiness::unfinished_dependencies;
use crate::operation::Operation;
use crate::types::{OperationId, OperationState};

#[derive(Debug)]
pub struct QueueCore {
    /// Monotonic submission counter; the FIFO tie-break.
    next_seq: u64,
    members: BTreeMap<u64, Operation>,
    index: HashMap<OperationId, u64>,
    ready: BTreeMap<u64, Operation>,
    executing: usize,
    /// `None` means unbounded.
    max_concurrent: Option<usize>,
    suspended: bool,
}

impl QueueCore {
    pub fn new(max_concurrent: Option<usize>) -> Self {
        Self {
            next_seq: 0,
            members: BTreeMap::new(),
            index: HashMap::new(),
            ready: BTreeMap::new(),
            executing: 0,
            max_concurrent,
            suspended: false,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: OperationId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn executing_count(&self) -> usize {
        self.executing
    }

    pub fn max_concurrent(&self) -> Option<usize> {
        self.max_concurrent
    }

    pub fn set_max_concurrent(&mut self, max: Option<usize>) {
        self.max_concurrent = max;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    /// Members in submission order.
    pub fn operations(&self) -> Vec<Operation> {
        self.members.values().cloned().collect()
    }

    /// Make a `Pending` operation visible to scheduling and evaluate it once.
    pub fn register(&mut self, op: Operation) {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.index.insert(op.id(), seq);
        self.members.insert(seq, op.clone());
        debug!(operation = %op, seq, members = self.members.len(), "registered");

        self.evaluate(&op);
    }

    /// Re-check a member's readiness, moving it onto the ready list if its
    /// dependencies have all settled. Returns `true` if it became ready.
    pub fn evaluate(&mut self, op: &Operation) -> bool {
        let Some(&seq) = self.index.get(&op.id()) else {
            trace!(operation = %op, "evaluate on non-member; ignoring");
            return false;
        };

        if op.try_promote() {
            self.ready.insert(seq, op.clone());
            true
        } else {
            trace!(operation = %op, waiting_on = ?unfinished_dependencies(op), "not ready");
            false
        }
    }

    fn has_free_slot(&self) -> bool {
        match self.max_concurrent {
            Some(max) => self.executing < max,
            None => true,
        }
    }

    /// Move as many ready operations as the limit allows to `Executing`, in
    /// submission order. The caller dispatches the returned operations.
    pub fn next_batch(&mut self) -> Vec<Operation> {
        let mut batch = Vec::new();

        while !self.suspended && self.has_free_slot() {
            let Some((seq, op)) = self.ready.pop_first() else {
                break;
            };

            if !op.transition(OperationState::Ready, OperationState::Executing) {
                trace!(operation = %op, seq, "ready entry no longer ready; dropping");
                continue;
            }

            self.executing += 1;
            debug!(
                operation = %op,
                seq,
                executing = self.executing,
                max = ?self.max_concurrent,
                "starting operation"
            );
            batch.push(op);
        }

        batch
    }

    /// Drop a finished member and give back its concurrency slot.
    pub fn remove(&mut self, id: OperationId) -> Option<Operation> {
        let seq = self.index.remove(&id)?;
        self.ready.remove(&seq);
        let op = self.members.remove(&seq)?;
        self.executing = self.executing.saturating_sub(1);
        debug!(
            operation = %op,
            executing = self.executing,
            members = self.members.len(),
            "removed finished operation"
        );
        Some(op)
    }
}
