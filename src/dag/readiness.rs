// src/dag/readiness.rs

//! Readiness predicate.

use crate::operation::Operation;
use crate::types::OperationId;

/// An operation is ready once every dependency's finish has been fully
/// processed: state `Finished`, delegate notified, completion callback run.
///
/// Outcomes do not matter here; a failed dependency still counts. Vetoing on
/// failure is decided at dispatch (see [`failed_dependencies`]).
pub fn dependencies_settled(dependencies: &[Operation]) -> bool {
    dependencies.iter().all(Operation::is_settled)
}

/// Dependencies that finished with at least one error.
pub fn failed_dependencies(operation: &Operation) -> Vec<Operation> {
    operation
        .dependencies()
        .into_iter()
        .filter(|dep| dep.is_finished() && !dep.errors().is_empty())
        .collect()
}

/// Dependencies still holding `operation` back (diagnostics).
pub fn unfinished_dependencies(operation: &Operation) -> Vec<OperationId> {
    operation
        .dependencies()
        .iter()
        .filter(|dep| !dep.is_settled())
        .map(Operation::id)
        .collect()
}
