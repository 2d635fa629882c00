// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::{DependencyFailurePolicy, DispatcherKind};

/// Plan file as read from TOML, before validation.
///
/// ```toml
/// [queue]
/// name = "demo"
/// max_concurrent_operations = 2
/// dispatcher = "tokio"
///
/// [operation.login]
/// delay_ms = 200
///
/// [operation.fetch]
/// delay_ms = 500
/// error = "network unreachable"
/// after = ["login"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub queue: QueueSection,

    /// Keys are operation names.
    #[serde(default)]
    pub operation: BTreeMap<String, OperationConfig>,
}

/// A validated plan. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub queue: QueueSection,
    pub operation: BTreeMap<String, OperationConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        queue: QueueSection,
        operation: BTreeMap<String, OperationConfig>,
    ) -> Self {
        Self { queue, operation }
    }
}

/// `[queue]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSection {
    #[serde(default = "default_queue_name")]
    pub name: String,

    /// Omitted means unbounded. Zero is rejected.
    #[serde(default)]
    pub max_concurrent_operations: Option<usize>,

    #[serde(default)]
    pub dispatcher: DispatcherKind,
}

fn default_queue_name() -> String {
    "opqueue".to_string()
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            max_concurrent_operations: None,
            dispatcher: DispatcherKind::default(),
        }
    }
}

/// `[operation.<name>]` section: a simulated unit of work.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationConfig {
    /// How long the work takes before it finishes.
    #[serde(default)]
    pub delay_ms: u64,

    /// If set, the operation finishes with this error.
    #[serde(default)]
    pub error: Option<String>,

    /// Operations that must finish first.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub on_failed_dependency: DependencyFailurePolicy,
}
