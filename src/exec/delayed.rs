// src/exec/delayed.rs

//! Timer-driven work body.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::operation::{ExecutionError, OperationContext, Work};

/// Work that starts a timer and finishes when it fires.
///
/// `execute` returns immediately; `finish` is called later from the timer's
/// context. If the operation was cancelled by then, it finishes with a single
/// cancellation error and does not count as executed.
///
/// The timer runs on the tokio runtime current at construction time, or on a
/// dedicated thread when there is none.
#[derive(Debug, Clone)]
pub struct DelayedWork {
    delay: Duration,
    error: Option<String>,
    executed: Arc<AtomicBool>,
    runtime: Option<Handle>,
}

impl DelayedWork {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            error: None,
            executed: Arc::new(AtomicBool::new(false)),
            runtime: Handle::try_current().ok(),
        }
    }

    /// Finish with this error instead of success.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Flag set once the delay elapsed without cancellation.
    pub fn executed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.executed)
    }

    fn complete(self, ctx: OperationContext) {
        let errors = if ctx.is_cancelled() {
            debug!(operation = %ctx.operation(), "cancelled while waiting; not executed");
            vec![ExecutionError::cancelled()]
        } else {
            self.executed.store(true, Ordering::Release);
            self.error.into_iter().map(ExecutionError::msg).collect()
        };

        if let Err(e) = ctx.finish(errors) {
            warn!(operation = %ctx.operation(), error = %e, "delayed finish rejected");
        }
    }
}

impl Work for DelayedWork {
    fn execute(self: Box<Self>, ctx: OperationContext) {
        let this = *self;
        match this.runtime.clone() {
            Some(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(this.delay).await;
                    this.complete(ctx);
                });
            }
            None => {
                std::thread::spawn(move || {
                    std::thread::sleep(this.delay);
                    this.complete(ctx);
                });
            }
        }
    }
}
