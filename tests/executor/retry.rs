//! Retry scheduling: task hints, backoff fallback, and exhaustion.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use courier_executor::{
    BoxError, CompletionHandle, FixedDelay, FnBackoff, RetryExecutor, Task,
};
use futures::future::BoxFuture;

async fn wait_done(handle: &CompletionHandle) {
    for _ in 0..500 {
        if handle.is_done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("handle never resolved");
}

/// Fails its first `failures` runs, recording when each run started and
/// answering `retry_hint` from a per-failure table.
struct FlakyTask {
    failures: usize,
    runs: Arc<AtomicUsize>,
    instants: Arc<Mutex<Vec<Instant>>>,
    hints: Vec<Option<Duration>>,
}

impl Task for FlakyTask {
    fn run(&self) -> BoxFuture<'_, Result<(), BoxError>> {
        Box::pin(async move {
            self.instants.lock().unwrap().push(Instant::now());
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if run < self.failures {
                Err::<(), BoxError>("delivery failed".into())
            } else {
                Ok(())
            }
        })
    }

    fn retry_hint(&self) -> Option<Duration> {
        // Consulted after each failed run; `runs` already counts it.
        let failed = self.runs.load(Ordering::SeqCst);
        self.hints.get(failed.saturating_sub(1)).copied().flatten()
    }
}

#[tokio::test]
async fn retry_hints_override_backoff() {
    let backoff_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&backoff_calls);

    let executor = RetryExecutor::builder()
        .max_retries(3)
        .backoff(FnBackoff::new(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Duration::from_secs(10)
        }))
        .build();

    let runs = Arc::new(AtomicUsize::new(0));
    let instants = Arc::new(Mutex::new(Vec::new()));
    let handle = executor.submit(FlakyTask {
        failures: 2,
        runs: Arc::clone(&runs),
        instants: Arc::clone(&instants),
        hints: vec![
            Some(Duration::from_millis(500)),
            Some(Duration::from_millis(200)),
        ],
    });

    wait_done(&handle).await;
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(backoff_calls.load(Ordering::SeqCst), 0);

    let instants = instants.lock().unwrap();
    assert!(instants[1].duration_since(instants[0]) >= Duration::from_millis(500));
    assert!(instants[2].duration_since(instants[1]) >= Duration::from_millis(200));
}

#[tokio::test]
async fn backoff_drives_delays_when_no_hint() {
    let executor = RetryExecutor::builder()
        .max_retries(3)
        .backoff(FnBackoff::new(|attempt| {
            Duration::from_millis(u64::from(attempt + 1) * 10)
        }))
        .build();

    let runs = Arc::new(AtomicUsize::new(0));
    let instants = Arc::new(Mutex::new(Vec::new()));
    let handle = executor.submit(FlakyTask {
        failures: 3,
        runs: Arc::clone(&runs),
        instants: Arc::clone(&instants),
        hints: vec![None, None, None],
    });

    wait_done(&handle).await;
    assert_eq!(runs.load(Ordering::SeqCst), 4);

    let instants = instants.lock().unwrap();
    assert!(instants[1].duration_since(instants[0]) >= Duration::from_millis(10));
    assert!(instants[2].duration_since(instants[1]) >= Duration::from_millis(20));
    assert!(instants[3].duration_since(instants[2]) >= Duration::from_millis(30));
}

#[tokio::test]
async fn retries_exhausted_drops_the_task() {
    let exhausted_after = Arc::new(AtomicUsize::new(0));
    let exhausted = Arc::clone(&exhausted_after);

    let executor = RetryExecutor::builder()
        .max_retries(2)
        .backoff(FixedDelay::new(Duration::from_millis(10)))
        .on_exhausted(move |attempts| {
            exhausted.store(attempts as usize, Ordering::SeqCst);
        })
        .build();

    let runs = Arc::new(AtomicUsize::new(0));
    let handle = executor.submit(FlakyTask {
        failures: usize::MAX,
        runs: Arc::clone(&runs),
        instants: Arc::new(Mutex::new(Vec::new())),
        hints: Vec::new(),
    });

    wait_done(&handle).await;
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(exhausted_after.load(Ordering::SeqCst), 3);

    for _ in 0..500 {
        if executor.queued() == 0 && executor.running() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("executor never settled");
}

#[tokio::test]
async fn zero_hint_is_a_concrete_immediate_reschedule() {
    let backoff_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&backoff_calls);

    let executor = RetryExecutor::builder()
        .max_retries(1)
        .backoff(FnBackoff::new(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Duration::from_secs(10)
        }))
        .build();

    let runs = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();
    let handle = executor.submit(FlakyTask {
        failures: 1,
        runs: Arc::clone(&runs),
        instants: Arc::new(Mutex::new(Vec::new())),
        hints: vec![Some(Duration::ZERO)],
    });

    wait_done(&handle).await;
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    // A zero hint is not "no suggestion": the backoff stays out of it and
    // the reschedule is immediate.
    assert_eq!(backoff_calls.load(Ordering::SeqCst), 0);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn canceled_chain_schedules_no_further_attempts() {
    let executor = RetryExecutor::builder()
        .max_retries(5)
        .backoff(FixedDelay::new(Duration::from_millis(300)))
        .build();

    let runs = Arc::new(AtomicUsize::new(0));
    let handle = executor.submit(FlakyTask {
        failures: usize::MAX,
        runs: Arc::clone(&runs),
        instants: Arc::new(Mutex::new(Vec::new())),
        hints: Vec::new(),
    });

    for _ in 0..500 {
        if runs.load(Ordering::SeqCst) >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    // The chain is sitting out its backoff; cancel it there.
    handle.cancel();
    wait_done(&handle).await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(handle.is_canceled());
}
