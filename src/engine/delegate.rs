// src/engine/delegate.rs

use crate::engine::queue::OperationQueue;
use crate::operation::{ExecutionError, Operation};

/// Observer notified synchronously by an [`OperationQueue`].
///
/// The queue keeps only a weak reference: once the delegate is dropped,
/// notifications are skipped. Both hooks run with no queue lock held, so they
/// may call back into the queue.
///
/// For one operation the order is always: `will_add_operation`, then
/// `operation_did_finish`, then the operation's completion callback.
pub trait OperationQueueDelegate: Send + Sync {
    /// Called before `operation` becomes visible to scheduling; dependencies
    /// and completion callbacks can still be attached here.
    fn will_add_operation(&self, queue: &OperationQueue, operation: &Operation) {
        let _ = (queue, operation);
    }

    /// Called exactly once after `operation` reaches `Finished`, with the
    /// exact errors it was finished with.
    fn operation_did_finish(
        &self,
        queue: &OperationQueue,
        operation: &Operation,
        errors: &[ExecutionError],
    ) {
        let _ = (queue, operation, errors);
    }
}
