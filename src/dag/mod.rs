// src/dag/mod.rs

//! Dependency graph and readiness.
//!
//! - [`graph`] builds a petgraph view over the dependency links reachable
//!   from a set of operations (cycle detection, topological order).
//! - [`readiness`] holds the readiness predicate the queue applies when it
//!   re-evaluates an operation.

pub mod graph;
pub mod readiness;

pub use graph::{DependencyGraph, would_create_cycle};
pub use readiness::{dependencies_settled, failed_dependencies, unfinished_dependencies};
