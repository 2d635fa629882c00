#![allow(dead_code)]

use std::collections::BTreeMap;
use opqueue::config::{ConfigFile, OperationConfig, QueueSection, RawConfigFile};
use opqueue::{DependencyFailurePolicy, DispatcherKind};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                queue: QueueSection::default(),
                operation: BTreeMap::new(),
            },
        }
    }

    pub fn with_operation(mut self, name: &str, op: OperationConfig) -> Self {
        self.config.operation.insert(name.to_string(), op);
        self
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.config.queue.max_concurrent_operations = Some(n);
        self
    }

    pub fn dispatcher(mut self, kind: DispatcherKind) -> Self {
        self.config.queue.dispatcher = kind;
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `OperationConfig`.
pub struct OperationConfigBuilder {
    op: OperationConfig,
}

impl OperationConfigBuilder {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            op: OperationConfig {
                delay_ms,
                ..OperationConfig::default()
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.op.after.push(dep.to_string());
        self
    }

    pub fn error(mut self, message: &str) -> Self {
        self.op.error = Some(message.to_string());
        self
    }

    pub fn veto_on_failed_dependency(mut self) -> Self {
        self.op.on_failed_dependency = DependencyFailurePolicy::Veto;
        self
    }

    pub fn build(self) -> OperationConfig {
        self.op
    }
}
