// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graphmap::DiGraphMap;

use crate::errors::{OpQueueError, Result};
use crate::operation::Operation;
use crate::types::OperationId;

/// Snapshot of the dependency links between operations, used for cycle
/// checks and dependencies-first ordering.
///
/// Edge direction is dependency -> dependent, so for `b.add_dependency(&a)`
/// the graph holds `a -> b`.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraphMap<OperationId, ()>,
    operations: HashMap<OperationId, Operation>,
}

impl DependencyGraph {
    /// Build the graph of everything reachable from `roots` by following
    /// dependency links.
    pub fn from_roots<'a>(roots: impl IntoIterator<Item = &'a Operation>) -> Self {
        let mut this = Self::default();
        let mut stack: Vec<Operation> = roots.into_iter().cloned().collect();
        let mut visited: HashSet<OperationId> = HashSet::new();

        while let Some(op) = stack.pop() {
            if !visited.insert(op.id()) {
                continue;
            }
            this.graph.add_node(op.id());

            for dep in op.dependencies() {
                this.graph.add_edge(dep.id(), op.id(), ());
                stack.push(dep);
            }

            this.operations.insert(op.id(), op);
        }

        this
    }

    pub fn contains(&self, id: OperationId) -> bool {
        self.graph.contains_node(id)
    }

    /// Whether `dependent` (transitively) waits on `dependency`.
    pub fn depends_on(&self, dependent: OperationId, dependency: OperationId) -> bool {
        self.contains(dependent)
            && self.contains(dependency)
            && has_path_connecting(&self.graph, dependency, dependent, None)
    }

    /// Dependencies-first ordering of every operation in the snapshot.
    pub fn topological_order(&self) -> Result<Vec<Operation>> {
        match toposort(&self.graph, None) {
            Ok(order) => Ok(order
                .into_iter()
                .filter_map(|id| self.operations.get(&id).cloned())
                .collect()),
            Err(cycle) => {
                let id = cycle.node_id();
                let name = self
                    .operations
                    .get(&id)
                    .map(|op| op.name().to_string())
                    .unwrap_or_default();
                Err(OpQueueError::DependencyCycle(format!(
                    "cycle detected involving operation '{}' ({})",
                    name, id
                )))
            }
        }
    }
}

/// Whether making `dependent` wait on `dependency` would close a cycle, i.e.
/// `dependency` already (transitively) waits on `dependent`.
pub fn would_create_cycle(dependent: &Operation, dependency: &Operation) -> bool {
    let graph = DependencyGraph::from_roots([dependency]);
    graph.depends_on(dependency.id(), dependent.id())
}
