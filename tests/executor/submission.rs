//! Admission control and happy-path submission behavior.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courier_executor::{task_fn, CompletionHandle, RetryExecutor, SubmitError};
use tokio::sync::Semaphore;

async fn wait_done(handle: &CompletionHandle) {
    for _ in 0..500 {
        if handle.is_done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("handle never resolved");
}

async fn settle(executor: &RetryExecutor) {
    for _ in 0..500 {
        if executor.queued() == 0 && executor.running() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("executor never settled");
}

#[tokio::test]
async fn first_attempt_success_runs_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let runs_clone = Arc::clone(&runs);

    let executor = RetryExecutor::builder()
        .max_retries(3)
        .max_queue_size(10)
        .build();

    let handle = executor.submit(task_fn(move || {
        let runs = Arc::clone(&runs_clone);
        async move {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }));

    wait_done(&handle).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(!handle.is_canceled());

    settle(&executor).await;
}

#[tokio::test]
async fn third_concurrent_submission_is_refused() {
    let executor = RetryExecutor::builder()
        .worker_count(1)
        .max_queue_size(2)
        .build();

    // Two tasks that stay in the pool until released.
    let gate = Arc::new(Semaphore::new(0));
    let mut handles = Vec::new();
    for _ in 0..2 {
        let gate = Arc::clone(&gate);
        handles.push(executor.submit(task_fn(move || {
            let gate = Arc::clone(&gate);
            async move {
                let _permit = gate.acquire().await;
                Ok(())
            }
        })));
    }

    // Both slots taken: the third submission bounces with a canceled handle.
    let refused = executor.submit(task_fn(|| async { Ok(()) }));
    assert!(refused.is_canceled());
    assert!(refused.is_done());

    let err = executor
        .try_submit(task_fn(|| async { Ok(()) }))
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::QueueFull {
            max_queue_size: 2,
            ..
        }
    ));

    gate.add_permits(2);
    for handle in &handles {
        wait_done(handle).await;
        assert!(!handle.is_canceled());
    }
    settle(&executor).await;
}

#[tokio::test]
async fn admission_reopens_once_work_completes() {
    let executor = RetryExecutor::builder()
        .worker_count(1)
        .max_queue_size(1)
        .build();

    let gate = Arc::new(Semaphore::new(0));
    let release = Arc::clone(&gate);
    let first = executor.submit(task_fn(move || {
        let gate = Arc::clone(&release);
        async move {
            let _permit = gate.acquire().await;
            Ok(())
        }
    }));

    assert!(executor
        .try_submit(task_fn(|| async { Ok(()) }))
        .is_err());

    gate.add_permits(1);
    wait_done(&first).await;
    settle(&executor).await;

    let second = executor.submit(task_fn(|| async { Ok(()) }));
    wait_done(&second).await;
    assert!(!second.is_canceled());
}

#[tokio::test]
async fn canceling_a_queued_task_prevents_its_run() {
    let executor = RetryExecutor::builder()
        .worker_count(1)
        .max_queue_size(4)
        .build();

    // Occupy the single worker.
    let gate = Arc::new(Semaphore::new(0));
    let release = Arc::clone(&gate);
    let blocker = executor.submit(task_fn(move || {
        let gate = Arc::clone(&release);
        async move {
            let _permit = gate.acquire().await;
            Ok(())
        }
    }));

    for _ in 0..500 {
        if executor.running() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let runs = Arc::new(AtomicUsize::new(0));
    let runs_clone = Arc::clone(&runs);
    let queued = executor.submit(task_fn(move || {
        let runs = Arc::clone(&runs_clone);
        async move {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }));

    queued.cancel();
    gate.add_permits(1);

    wait_done(&blocker).await;
    wait_done(&queued).await;
    settle(&executor).await;

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(queued.is_canceled());
}
