use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use cronserver_core::traits::ExecutionOutput;
use cronserver_dispatcher::retry::{RetryController, RetryPolicy};

fn policy(retry_times: u32, interval_ms: u64) -> RetryPolicy {
    RetryPolicy {
        retry_times,
        retry_interval: Duration::from_millis(interval_ms),
    }
}

#[tokio::test]
async fn test_zero_retry_times_makes_exactly_one_attempt() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let cancel = CancellationToken::new();

    let result = RetryController::execute(&policy(0, 10), &cancel, move |_| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            ExecutionOutput::failure("总是失败")
        }
    })
    .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(result.attempts, 1);
    assert!(!result.output.success);
}

#[tokio::test]
async fn test_always_failing_attempt_runs_k_plus_one_times() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let cancel = CancellationToken::new();

    let result = RetryController::execute(&policy(3, 10), &cancel, move |_| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            ExecutionOutput::failure("总是失败")
        }
    })
    .await;

    // retry_times=3: 首次 + 3次重试
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    assert_eq!(result.attempts, 4);
    assert!(!result.output.success);
    assert_eq!(result.output.output, "总是失败");
}

#[tokio::test]
async fn test_success_stops_retrying() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let cancel = CancellationToken::new();

    let result = RetryController::execute(&policy(5, 10), &cancel, move |attempt_index| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            if attempt_index == 1 {
                ExecutionOutput::success("第二次成功")
            } else {
                ExecutionOutput::failure("首次失败")
            }
        }
    })
    .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(result.output.success);
    assert_eq!(result.output.output, "第二次成功");
}

#[tokio::test]
async fn test_attempts_are_spaced_by_retry_interval() {
    let cancel = CancellationToken::new();
    let started = Instant::now();

    let result = RetryController::execute(&policy(2, 100), &cancel, move |_| async move {
        ExecutionOutput::failure("失败")
    })
    .await;

    assert_eq!(result.attempts, 3);
    // 两次重试各等待100ms
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_cancellation_aborts_pending_retries_but_keeps_outcome() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let result = RetryController::execute(&policy(5, 10_000), &cancel, move |_| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            ExecutionOutput::failure("失败")
        }
    })
    .await;

    // 取消后不再排期重试，首次尝试的终态结果保留
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(!result.output.success);
    assert!(started.elapsed() < Duration::from_secs(5));
}
