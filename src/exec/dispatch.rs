// src/exec/dispatch.rs

//! Pluggable dispatch backends.
//!
//! - `TokioDispatcher` runs jobs on the blocking pool of a tokio runtime, so
//!   work bodies may spawn tasks and timers on that runtime.
//! - `ThreadDispatcher` runs each job on a fresh OS thread.
//! - `InlineDispatcher` runs the job on the calling thread before `dispatch`
//!   returns. Jobs dispatched from inside a running inline job are queued on
//!   the thread and drained by the outermost call, so a chain of work bodies
//!   that finish synchronously runs in a loop rather than nesting.
//!
//! A dispatcher that cannot accept a job returns an error; the queue then
//! finishes the operation with that error instead of leaving it executing.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::runtime::Handle;

use crate::errors::{OpQueueError, Result};
use crate::types::DispatcherKind;

/// A unit of work handed to a dispatcher: starting one work body.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run a job on some execution context.
pub trait Dispatcher: Send + Sync + fmt::Debug {
    /// Run `job` somewhere. On error the job has been dropped without running.
    fn dispatch(&self, job: Job) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct TokioDispatcher {
    handle: Handle,
}

impl TokioDispatcher {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime this is called from.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| OpQueueError::NoRuntime)
    }
}

impl Dispatcher for TokioDispatcher {
    fn dispatch(&self, job: Job) -> Result<()> {
        // The JoinHandle is not needed: completion is reported via `finish`.
        drop(self.handle.spawn_blocking(job));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ThreadDispatcher {
    spawned: AtomicU64,
}

impl Dispatcher for ThreadDispatcher {
    fn dispatch(&self, job: Job) -> Result<()> {
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        std::thread::Builder::new()
            .name(format!("opqueue-worker-{n}"))
            .spawn(job)?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

thread_local! {
    /// Jobs waiting for the outermost inline dispatch on this thread.
    /// `None` while no inline job is running.
    static INLINE_JOBS: RefCell<Option<VecDeque<Job>>> = const { RefCell::new(None) };
}

/// Resets the thread's inline queue when the outermost drain ends, including
/// by unwinding out of a panicking job.
struct InlineDrain;

impl Drop for InlineDrain {
    fn drop(&mut self) {
        INLINE_JOBS.with(|jobs| jobs.borrow_mut().take());
    }
}

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, job: Job) -> Result<()> {
        let first = INLINE_JOBS.with(|jobs| {
            let mut jobs = jobs.borrow_mut();
            match jobs.as_mut() {
                Some(queued) => {
                    queued.push_back(job);
                    None
                }
                None => {
                    *jobs = Some(VecDeque::new());
                    Some(job)
                }
            }
        });

        let Some(first) = first else {
            return Ok(());
        };

        let _drain = InlineDrain;
        first();
        while let Some(job) =
            INLINE_JOBS.with(|jobs| jobs.borrow_mut().as_mut().and_then(VecDeque::pop_front))
        {
            job();
        }
        Ok(())
    }
}

/// Build the dispatcher named by a config value.
pub fn dispatcher_for(kind: DispatcherKind) -> Result<Arc<dyn Dispatcher>> {
    Ok(match kind {
        DispatcherKind::Tokio => Arc::new(TokioDispatcher::current()?),
        DispatcherKind::Thread => Arc::new(ThreadDispatcher::default()),
        DispatcherKind::Inline => Arc::new(InlineDispatcher),
    })
}
