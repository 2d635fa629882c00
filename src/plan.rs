// src/plan.rs

//! Turn a validated plan file into a queue plus wired-up operations.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::model::ConfigFile;
use crate::dag::DependencyGraph;
use crate::engine::{OperationQueue, OperationQueueDelegate};
use crate::errors::Result;
use crate::exec::DelayedWork;
use crate::operation::{ExecutionError, Operation};
use crate::types::{DispatcherKind, OperationId, OperationState};

/// Command-line overrides applied on top of the `[queue]` section.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueOverrides {
    pub max_concurrent: Option<usize>,
    pub dispatcher: Option<DispatcherKind>,
}

/// Operations built from a plan, in submission order, plus their queue.
#[derive(Debug)]
pub struct Plan {
    queue: OperationQueue,
    operations: Vec<Operation>,
    executed: HashMap<OperationId, Arc<AtomicBool>>,
}

/// Per-operation outcome after a run.
#[derive(Debug, Clone)]
pub struct OperationSummary {
    pub name: String,
    pub state: OperationState,
    pub executed: bool,
    pub cancelled: bool,
    pub errors: Vec<String>,
}

impl Plan {
    /// Build the queue and operations, applying `overrides` to the
    /// `[queue]` section first.
    pub fn from_config(cfg: &ConfigFile, overrides: QueueOverrides) -> Result<Self> {
        let mut section = cfg.queue.clone();
        if overrides.max_concurrent.is_some() {
            section.max_concurrent_operations = overrides.max_concurrent;
        }
        if let Some(kind) = overrides.dispatcher {
            section.dispatcher = kind;
        }
        let queue = OperationQueue::from_config(&section)?;

        let mut by_name: BTreeMap<&str, Operation> = BTreeMap::new();
        let mut executed = HashMap::new();

        for (name, oc) in cfg.operation.iter() {
            let mut work = DelayedWork::new(Duration::from_millis(oc.delay_ms));
            if let Some(ref message) = oc.error {
                work = work.with_error(message.clone());
            }
            let flag = work.executed_flag();

            let op = Operation::new(name.clone(), work);
            op.set_dependency_failure_policy(oc.on_failed_dependency);
            executed.insert(op.id(), flag);
            by_name.insert(name.as_str(), op);
        }

        for (name, oc) in cfg.operation.iter() {
            let op = &by_name[name.as_str()];
            for dep in oc.after.iter() {
                op.add_dependency(&by_name[dep.as_str()])?;
            }
        }

        // Dependencies first, so submission order reads like the DAG.
        let operations = DependencyGraph::from_roots(by_name.values()).topological_order()?;

        Ok(Self {
            queue,
            operations,
            executed,
        })
    }

    pub fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn submit(&self) -> Result<()> {
        self.queue.add_operations(&self.operations)
    }

    pub fn was_executed(&self, op: &Operation) -> bool {
        self.executed
            .get(&op.id())
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    pub fn summary(&self) -> Vec<OperationSummary> {
        self.operations
            .iter()
            .map(|op| OperationSummary {
                name: op.name().to_string(),
                state: op.state(),
                executed: self.was_executed(op),
                cancelled: op.is_cancelled(),
                errors: op.errors().iter().map(ToString::to_string).collect(),
            })
            .collect()
    }
}

/// Delegate that logs queue events and keeps running totals.
#[derive(Debug, Default)]
pub struct ReportingDelegate {
    added: AtomicUsize,
    finished: AtomicUsize,
    failed: AtomicUsize,
}

impl ReportingDelegate {
    pub fn added(&self) -> usize {
        self.added.load(Ordering::Acquire)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::Acquire)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Acquire)
    }
}

impl OperationQueueDelegate for ReportingDelegate {
    fn will_add_operation(&self, queue: &OperationQueue, operation: &Operation) {
        self.added.fetch_add(1, Ordering::AcqRel);
        info!(queue = queue.name(), operation = %operation, "adding operation");
    }

    fn operation_did_finish(
        &self,
        queue: &OperationQueue,
        operation: &Operation,
        errors: &[ExecutionError],
    ) {
        self.finished.fetch_add(1, Ordering::AcqRel);
        if errors.is_empty() {
            info!(queue = queue.name(), operation = %operation, "operation succeeded");
        } else {
            self.failed.fetch_add(1, Ordering::AcqRel);
            let errors: Vec<String> = errors.iter().map(ToString::to_string).collect();
            warn!(queue = queue.name(), operation = %operation, ?errors, "operation failed");
        }
    }
}
