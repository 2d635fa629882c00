use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use opqueue::{ExecutionError, Operation, OperationQueue, OperationQueueDelegate};

/// Event recorded by [`RecordingDelegate`] (and by tests, via
/// [`EventLog::push`], for completion callbacks).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    WillAdd(String),
    Started(String),
    DidFinish { name: String, errors: usize },
    Completed(String),
}

/// Shared, ordered log of events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events.lock().unwrap().iter().position(|e| e == event)
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events.lock().unwrap().iter().filter(|e| *e == event).count()
    }
}

/// Queue delegate that records what it was told.
#[derive(Default)]
pub struct RecordingDelegate {
    pub did_will_add_operation: AtomicBool,
    pub did_operation_did_finish: AtomicBool,
    pub number_of_errors_that_operation_did_finish: AtomicUsize,
    pub finished: AtomicUsize,
    pub log: EventLog,
}

impl RecordingDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_log(log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            ..Self::default()
        })
    }

    pub fn will_add_called(&self) -> bool {
        self.did_will_add_operation.load(Ordering::SeqCst)
    }

    pub fn did_finish_called(&self) -> bool {
        self.did_operation_did_finish.load(Ordering::SeqCst)
    }

    pub fn last_error_count(&self) -> usize {
        self.number_of_errors_that_operation_did_finish.load(Ordering::SeqCst)
    }

    pub fn finished_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

impl OperationQueueDelegate for RecordingDelegate {
    fn will_add_operation(&self, _queue: &OperationQueue, operation: &Operation) {
        self.did_will_add_operation.store(true, Ordering::SeqCst);
        self.log.push(Event::WillAdd(operation.name().to_string()));
    }

    fn operation_did_finish(
        &self,
        _queue: &OperationQueue,
        operation: &Operation,
        errors: &[ExecutionError],
    ) {
        self.did_operation_did_finish.store(true, Ordering::SeqCst);
        self.number_of_errors_that_operation_did_finish
            .store(errors.len(), Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
        self.log.push(Event::DidFinish {
            name: operation.name().to_string(),
            errors: errors.len(),
        });
    }
}
