// src/types.rs

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;

/// Process-unique identity of an operation.
///
/// Operations have no value equality; two operations with identical names and
/// work bodies are still distinct because their ids differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationId(u64);

impl OperationId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        OperationId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Lifecycle state of an operation.
///
/// Transitions only ever move forward:
///
/// ```text
/// Initialized -> Pending -> Ready -> Executing -> Finishing -> Finished
/// ```
///
/// Cancellation is a separate flag and never changes the state by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationState {
    /// Constructed, not yet submitted to a queue.
    Initialized,
    /// Submitted; waiting for dependencies to finish.
    Pending,
    /// All dependencies finished; waiting for a concurrency slot.
    Ready,
    /// Work body dispatched; waiting for `finish`.
    Executing,
    /// `finish` was called; bookkeeping in progress.
    Finishing,
    /// Terminal.
    Finished,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationState::Finished)
    }

    /// Whether `next` is the single legal successor of `self`.
    pub fn can_transition_to(self, next: OperationState) -> bool {
        use OperationState::*;
        matches!(
            (self, next),
            (Initialized, Pending)
                | (Pending, Ready)
                | (Ready, Executing)
                | (Executing, Finishing)
                | (Finishing, Finished)
        )
    }

    /// Dependencies may still be attached in these states.
    pub fn accepts_dependencies(self) -> bool {
        matches!(self, OperationState::Initialized | OperationState::Pending)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationState::Initialized => "initialized",
            OperationState::Pending => "pending",
            OperationState::Ready => "ready",
            OperationState::Executing => "executing",
            OperationState::Finishing => "finishing",
            OperationState::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// Which execution contexts a queue hands work bodies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatcherKind {
    /// Tokio blocking pool of the current runtime.
    Tokio,
    /// One OS thread per work body.
    Thread,
    /// Run the work body on the thread that made it ready.
    Inline,
}

impl Default for DispatcherKind {
    fn default() -> Self {
        DispatcherKind::Thread
    }
}

impl FromStr for DispatcherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tokio" => Ok(DispatcherKind::Tokio),
            "thread" => Ok(DispatcherKind::Thread),
            "inline" => Ok(DispatcherKind::Inline),
            other => Err(format!(
                "invalid dispatcher: {other} (expected \"tokio\", \"thread\" or \"inline\")"
            )),
        }
    }
}

/// What a dependent does when one of its dependencies finished with errors.
///
/// - `Ignore`: run anyway; the work body may inspect predecessor errors itself.
/// - `Veto`: skip the work body and finish with a single
///   dependency-failed error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyFailurePolicy {
    Ignore,
    Veto,
}

impl Default for DependencyFailurePolicy {
    fn default() -> Self {
        DependencyFailurePolicy::Ignore
    }
}
