// tests/scheduling.rs

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use opqueue::dag::unfinished_dependencies;
use opqueue::exec::{Dispatcher, InlineDispatcher, Job, ThreadDispatcher};
use opqueue::{
    DependencyFailurePolicy, ExecutionError, OpQueueError, OpResult, Operation, OperationQueue,
    OperationState,
};
use opqueue_test_utils::fixtures::ManualWork;
use opqueue_test_utils::init_tracing;
use opqueue_test_utils::recording_delegate::RecordingDelegate;

fn inline_queue() -> OperationQueue {
    OperationQueue::with_dispatcher("inline", Arc::new(InlineDispatcher))
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn ready_operations_start_in_submission_order() {
    init_tracing();

    let queue = inline_queue();
    queue.set_max_concurrent_operation_count(Some(1)).unwrap();

    let manual = ManualWork::new();
    let ops: Vec<Operation> = ["A", "B", "C"]
        .iter()
        .map(|n| manual.operation(n))
        .collect();
    queue.add_operations(&ops).unwrap();

    assert_eq!(manual.started_names(), names(&["A"]));
    assert_eq!(ops[1].state(), OperationState::Ready);
    assert_eq!(queue.executing_count(), 1);

    manual.finish_ok("A");
    assert_eq!(manual.started_names(), names(&["A", "B"]));

    manual.finish_ok("B");
    assert_eq!(manual.started_names(), names(&["A", "B", "C"]));

    manual.finish_ok("C");
    assert_eq!(queue.operation_count(), 0);
    assert_eq!(queue.executing_count(), 0);
}

#[test]
fn concurrency_limit_holds_across_threads() {
    init_tracing();

    const LIMIT: usize = 2;
    let queue = OperationQueue::with_dispatcher("threads", Arc::new(ThreadDispatcher::default()));
    queue.set_max_concurrent_operation_count(Some(LIMIT)).unwrap();

    let current = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let ops: Vec<Operation> = (0..8)
        .map(|i| {
            let current = Arc::clone(&current);
            let max_seen = Arc::clone(&max_seen);
            Operation::from_fn(format!("op{i}"), move |ctx| {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                current.fetch_sub(1, Ordering::SeqCst);
                ctx.finish_ok().unwrap();
            })
        })
        .collect();

    queue.add_operations(&ops).unwrap();
    assert!(queue.wait_until_all_operations_are_finished_timeout(Duration::from_secs(5)));

    assert!(max_seen.load(Ordering::SeqCst) <= LIMIT);
    assert!(max_seen.load(Ordering::SeqCst) >= 1);
    assert!(ops.iter().all(Operation::is_finished));
}

#[test]
fn dependents_never_execute_before_dependencies_finish() {
    init_tracing();

    let queue = OperationQueue::with_dispatcher("threads", Arc::new(ThreadDispatcher::default()));

    let a = Operation::from_fn("A", |ctx| {
        std::thread::sleep(Duration::from_millis(30));
        ctx.finish_ok().unwrap();
    });

    let saw_a_finished = Arc::new(AtomicBool::new(false));
    let b = {
        let a = a.downgrade();
        let saw = Arc::clone(&saw_a_finished);
        Operation::from_fn("B", move |ctx| {
            let finished = a.upgrade().is_some_and(|a| a.is_finished());
            saw.store(finished, Ordering::SeqCst);
            ctx.finish_ok().unwrap();
        })
    };
    b.add_dependency(&a).unwrap();

    // Submit the dependent first: readiness, not submission order, decides.
    queue.add_operation(&b).unwrap();
    queue.add_operation(&a).unwrap();
    queue.wait_until_all_operations_are_finished_blocking();

    assert!(saw_a_finished.load(Ordering::SeqCst));
}

#[test]
fn finishing_releases_every_dependent() {
    init_tracing();

    let queue = inline_queue();
    let manual = ManualWork::new();
    let root = manual.operation("root");
    let left = manual.operation("left");
    let right = manual.operation("right");
    left.add_dependency(&root).unwrap();
    right.add_dependency(&root).unwrap();

    queue.add_operations([&root, &left, &right]).unwrap();
    assert_eq!(manual.started_names(), names(&["root"]));

    manual.finish_ok("root");
    assert_eq!(manual.started_names(), names(&["root", "left", "right"]));
}

#[test]
fn dependency_on_already_finished_operation_counts_immediately() {
    init_tracing();

    let queue = inline_queue();
    let manual = ManualWork::new();
    let a = manual.operation("A");
    queue.add_operation(&a).unwrap();
    manual.finish_ok("A");
    assert!(a.is_finished());

    let b = manual.operation("B");
    b.add_dependency(&a).unwrap();
    queue.add_operation(&b).unwrap();

    assert_eq!(b.state(), OperationState::Executing);
}

#[test]
fn failed_dependency_does_not_block_dependents_by_default() {
    init_tracing();

    let queue = inline_queue();
    let manual = ManualWork::new();
    let a = manual.operation("A");
    let b = manual.operation("B");
    b.add_dependency(&a).unwrap();
    queue.add_operations([&a, &b]).unwrap();

    manual
        .take("A")
        .unwrap()
        .finish_with_error(ExecutionError::msg("boom"))
        .unwrap();

    assert_eq!(b.state(), OperationState::Executing);
    assert_eq!(manual.started_names(), names(&["A", "B"]));
}

#[test]
fn veto_policy_skips_work_after_failed_dependency() {
    init_tracing();

    let queue = inline_queue();
    let manual = ManualWork::new();
    let a = manual.operation("A");
    let b = manual.operation("B");
    b.add_dependency(&a).unwrap();
    b.set_dependency_failure_policy(DependencyFailurePolicy::Veto);
    queue.add_operations([&a, &b]).unwrap();

    manual
        .take("A")
        .unwrap()
        .finish_with_error(ExecutionError::msg("boom"))
        .unwrap();

    assert!(b.is_finished());
    assert_eq!(manual.started_names(), names(&["A"]));
    let errors = b.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_dependency_failure());
}

#[test]
fn veto_policy_runs_normally_when_dependencies_succeed() {
    init_tracing();

    let queue = inline_queue();
    let manual = ManualWork::new();
    let a = manual.operation("A");
    let b = manual.operation("B");
    b.add_dependency(&a).unwrap();
    b.set_dependency_failure_policy(DependencyFailurePolicy::Veto);
    queue.add_operations([&a, &b]).unwrap();

    manual.finish_ok("A");
    assert_eq!(manual.started_names(), names(&["A", "B"]));
}

#[test]
fn dependency_in_another_queue_releases_dependent() {
    init_tracing();

    let first = inline_queue();
    let second = inline_queue();
    let manual = ManualWork::new();
    let a = manual.operation("A");
    let b = manual.operation("B");
    b.add_dependency(&a).unwrap();

    second.add_operation(&b).unwrap();
    first.add_operation(&a).unwrap();
    assert_eq!(b.state(), OperationState::Pending);

    manual.finish_ok("A");
    assert_eq!(b.state(), OperationState::Executing);
    assert_eq!(first.operation_count(), 0);
    assert_eq!(second.operation_count(), 1);
}

#[test]
fn dependency_never_submitted_keeps_dependent_pending() {
    init_tracing();

    let queue = inline_queue();
    let manual = ManualWork::new();
    let orphan = manual.operation("orphan");
    let b = manual.operation("B");
    b.add_dependency(&orphan).unwrap();
    queue.add_operation(&b).unwrap();

    assert_eq!(b.state(), OperationState::Pending);
    assert_eq!(unfinished_dependencies(&b), vec![orphan.id()]);
    assert!(!queue.wait_until_all_operations_are_finished_timeout(Duration::from_millis(50)));
}

#[test]
fn suspended_queue_starts_nothing_until_resumed() {
    init_tracing();

    let queue = inline_queue();
    queue.set_suspended(true);
    assert!(queue.is_suspended());

    let manual = ManualWork::new();
    let a = manual.operation("A");
    queue.add_operation(&a).unwrap();
    assert_eq!(a.state(), OperationState::Ready);
    assert!(manual.started_names().is_empty());

    queue.set_suspended(false);
    assert_eq!(a.state(), OperationState::Executing);
}

#[test]
fn raising_the_limit_starts_waiting_operations() {
    init_tracing();

    let queue = inline_queue();
    queue.set_max_concurrent_operation_count(Some(1)).unwrap();

    let manual = ManualWork::new();
    let ops: Vec<Operation> = ["A", "B", "C"]
        .iter()
        .map(|n| manual.operation(n))
        .collect();
    queue.add_operations(&ops).unwrap();
    assert_eq!(manual.in_flight(), 1);

    queue.set_max_concurrent_operation_count(None).unwrap();
    assert_eq!(manual.in_flight(), 3);
    assert_eq!(queue.max_concurrent_operation_count(), None);
}

#[test]
fn zero_concurrency_is_rejected() {
    let queue = inline_queue();
    assert!(matches!(
        queue.set_max_concurrent_operation_count(Some(0)),
        Err(OpQueueError::InvalidConcurrency(0))
    ));
    assert_eq!(queue.max_concurrent_operation_count(), None);
}

#[test]
fn operations_snapshot_is_in_submission_order() {
    init_tracing();

    let queue = inline_queue();
    queue.set_suspended(true);
    let manual = ManualWork::new();
    let ops: Vec<Operation> = ["C", "A", "B"]
        .iter()
        .map(|n| manual.operation(n))
        .collect();
    queue.add_operations(&ops).unwrap();

    assert_eq!(queue.operations(), ops);
    assert_eq!(queue.operation_count(), 3);
}

#[test]
fn blocking_wait_returns_after_completion_callbacks() {
    init_tracing();

    let queue = OperationQueue::with_dispatcher("threads", Arc::new(ThreadDispatcher::default()));
    let completed = Arc::new(Mutex::new(Vec::new()));

    for name in ["A", "B", "C"] {
        let op = Operation::from_fn(name, |ctx| {
            std::thread::sleep(Duration::from_millis(10));
            ctx.finish_ok().unwrap();
        });
        let completed = Arc::clone(&completed);
        op.set_completion_callback(move || {
            completed.lock().unwrap().push(name);
        });
        queue.add_operation(&op).unwrap();
    }

    queue.wait_until_all_operations_are_finished_blocking();
    assert_eq!(completed.lock().unwrap().len(), 3);
}

#[test]
fn finish_from_another_thread_is_the_synchronisation_point() {
    init_tracing();

    let queue = inline_queue();
    let op = Operation::from_fn("A", |ctx| {
        // The work body returns right away; finish happens later elsewhere.
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            ctx.finish_ok().unwrap();
        });
    });

    queue.add_operation(&op).unwrap();
    assert_eq!(op.state(), OperationState::Executing);
    assert_eq!(queue.operation_count(), 1);

    assert!(queue.wait_until_all_operations_are_finished_timeout(Duration::from_secs(5)));
    assert!(op.is_finished());
}

#[tokio::test]
async fn async_wait_returns_immediately_on_empty_queue() {
    init_tracing();

    let queue = inline_queue();
    opqueue_test_utils::with_timeout(queue.wait_until_all_operations_are_finished()).await;
    assert_eq!(queue.operation_count(), 0);
}

#[test]
fn inline_queue_drains_many_synchronous_finishes_without_nesting() {
    const COUNT: usize = 10_000;

    let queue = inline_queue();
    queue.set_max_concurrent_operation_count(Some(1)).unwrap();
    queue.set_suspended(true);

    let runs = Arc::new(AtomicUsize::new(0));
    let ops: Vec<Operation> = (0..COUNT)
        .map(|i| {
            let runs = Arc::clone(&runs);
            Operation::from_fn(format!("op{i}"), move |ctx| {
                runs.fetch_add(1, Ordering::SeqCst);
                ctx.finish_ok().unwrap();
            })
        })
        .collect();
    queue.add_operations(&ops).unwrap();

    queue.set_suspended(false);

    assert_eq!(runs.load(Ordering::SeqCst), COUNT);
    assert_eq!(queue.operation_count(), 0);
    assert!(ops.iter().all(Operation::is_finished));
}

#[test]
fn inline_queue_runs_a_long_dependency_chain_in_order() {
    const LENGTH: usize = 1_000;

    let queue = inline_queue();
    let order = Arc::new(Mutex::new(Vec::with_capacity(LENGTH)));

    let ops: Vec<Operation> = (0..LENGTH)
        .map(|i| {
            let order = Arc::clone(&order);
            Operation::from_fn(format!("link{i}"), move |ctx| {
                order.lock().unwrap().push(i);
                ctx.finish_ok().unwrap();
            })
        })
        .collect();
    for pair in ops.windows(2) {
        pair[1].add_dependency(&pair[0]).unwrap();
    }

    // Last link first, so every release happens from inside a finish.
    for op in ops.iter().rev() {
        queue.add_operation(op).unwrap();
    }

    let order = order.lock().unwrap();
    assert_eq!(*order, (0..LENGTH).collect::<Vec<_>>());
    assert_eq!(queue.operation_count(), 0);
}

/// Dispatcher that refuses every job, like a thread spawn that fails.
#[derive(Debug, Default)]
struct RefusingDispatcher {
    refused: AtomicUsize,
}

impl Dispatcher for RefusingDispatcher {
    fn dispatch(&self, _job: Job) -> OpResult<()> {
        self.refused.fetch_add(1, Ordering::SeqCst);
        Err(OpQueueError::IoError(std::io::Error::other(
            "no worker threads left",
        )))
    }
}

#[test]
fn refused_dispatch_finishes_the_operation_and_frees_its_slot() {
    init_tracing();

    let dispatcher = Arc::new(RefusingDispatcher::default());
    let queue = OperationQueue::with_dispatcher("refusing", dispatcher.clone());
    queue.set_max_concurrent_operation_count(Some(1)).unwrap();
    let delegate = RecordingDelegate::new();
    queue.set_delegate(&delegate);

    let ran = Arc::new(AtomicBool::new(false));
    let ops: Vec<Operation> = ["A", "B", "C"]
        .iter()
        .map(|name| {
            let ran = Arc::clone(&ran);
            Operation::from_fn(*name, move |ctx| {
                ran.store(true, Ordering::SeqCst);
                ctx.finish_ok().unwrap();
            })
        })
        .collect();
    ops[1].add_dependency(&ops[0]).unwrap();

    queue.add_operations(&ops).unwrap();

    assert!(queue.wait_until_all_operations_are_finished_timeout(Duration::from_secs(1)));
    assert_eq!(queue.executing_count(), 0);
    assert_eq!(dispatcher.refused.load(Ordering::SeqCst), 3);
    assert_eq!(delegate.finished_count(), 3);
    assert!(!ran.load(Ordering::SeqCst));

    for op in &ops {
        assert!(op.is_finished());
        let errors = op.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("no worker threads left"));
    }
}
