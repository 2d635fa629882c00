// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{OpQueueError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = OpQueueError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.queue, raw.operation))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_operations(cfg)?;
    validate_queue_section(cfg)?;
    validate_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_operations(cfg: &RawConfigFile) -> Result<()> {
    if cfg.operation.is_empty() {
        return Err(OpQueueError::ConfigError(
            "plan must contain at least one [operation.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_queue_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.queue.max_concurrent_operations == Some(0) {
        return Err(OpQueueError::ConfigError(
            "[queue].max_concurrent_operations must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.queue.name.trim().is_empty() {
        return Err(OpQueueError::ConfigError(
            "[queue].name must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, op) in cfg.operation.iter() {
        for dep in op.after.iter() {
            if dep == name {
                return Err(OpQueueError::SelfDependency {
                    operation: format!("'{name}'"),
                });
            }
            if !cfg.operation.contains_key(dep) {
                return Err(OpQueueError::ConfigError(format!(
                    "operation '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> operation, so `after = ["A"]` on B adds A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.operation.keys() {
        graph.add_node(name.as_str());
    }

    for (name, op) in cfg.operation.iter() {
        for dep in op.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(OpQueueError::DependencyCycle(format!(
            "cycle detected in plan involving operation '{}'",
            cycle.node_id()
        ))),
    }
}
