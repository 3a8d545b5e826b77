//! Admission guard tests
//!
//! Message validation and fixed-window rate limiting

use chatrelay::services::{validate_message, AdmissionError, FixedWindowLimiter, MAX_MESSAGE_CHARS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

async fn wait_for_queue(limiter: &FixedWindowLimiter, expected: usize) {
    while limiter.queued() < expected {
        tokio::task::yield_now().await;
    }
}

#[test]
fn test_whitespace_only_messages_are_empty() {
    for input in ["", " ", "\n\n", " \t \r\n "] {
        assert_eq!(validate_message(Some(input)), Err(AdmissionError::EmptyMessage));
    }
    assert_eq!(validate_message(None), Err(AdmissionError::EmptyMessage));
}

#[test]
fn test_length_limit_applies_to_trimmed_text() {
    let exact = format!("  {}  ", "x".repeat(MAX_MESSAGE_CHARS));
    assert_eq!(validate_message(Some(&exact)).unwrap(), "x".repeat(MAX_MESSAGE_CHARS));

    let over = "x".repeat(MAX_MESSAGE_CHARS + 50);
    assert!(matches!(
        validate_message(Some(&over)),
        Err(AdmissionError::MessageTooLong { length: 2050, max: 2000 })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_thirteenth_request_rejected_until_window_resets() {
    let limiter = Arc::new(FixedWindowLimiter::new(10, Duration::from_secs(60), 2));

    for _ in 0..10 {
        assert!(limiter.acquire().await.is_ok());
    }

    let first_queued = tokio::spawn({
        let limiter = Arc::clone(&limiter);
        async move { limiter.acquire().await }
    });
    wait_for_queue(&limiter, 1).await;

    let second_queued = tokio::spawn({
        let limiter = Arc::clone(&limiter);
        async move { limiter.acquire().await }
    });
    wait_for_queue(&limiter, 2).await;

    assert_eq!(limiter.acquire().await, Err(AdmissionError::RateLimited));

    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(first_queued.await.unwrap().is_ok());
    assert!(second_queued.await.unwrap().is_ok());
    assert_eq!(limiter.queued(), 0);

    // The two queued callers used part of the new window
    for _ in 0..8 {
        assert!(limiter.acquire().await.is_ok());
    }
}

#[tokio::test(start_paused = true)]
async fn test_queue_is_served_oldest_first() {
    let limiter = Arc::new(FixedWindowLimiter::new(1, Duration::from_secs(60), 2));
    let start = Instant::now();
    assert!(limiter.acquire().await.is_ok());

    let (tx, mut rx) = mpsc::unbounded_channel();
    for (position, label) in ["first", "second"].into_iter().enumerate() {
        let task_limiter = Arc::clone(&limiter);
        let tx = tx.clone();
        tokio::spawn(async move {
            task_limiter.acquire().await.unwrap();
            tx.send((label, start.elapsed())).unwrap();
        });
        wait_for_queue(&limiter, position + 1).await;
    }
    drop(tx);

    let (label, elapsed) = rx.recv().await.unwrap();
    assert_eq!(label, "first");
    assert_eq!(elapsed, Duration::from_secs(60));

    let (label, elapsed) = rx.recv().await.unwrap();
    assert_eq!(label, "second");
    assert_eq!(elapsed, Duration::from_secs(120));
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_waiter_frees_its_slot() {
    let limiter = Arc::new(FixedWindowLimiter::new(1, Duration::from_secs(60), 1));
    assert!(limiter.acquire().await.is_ok());

    let abandoned = tokio::spawn({
        let limiter = Arc::clone(&limiter);
        async move { limiter.acquire().await }
    });
    wait_for_queue(&limiter, 1).await;
    abandoned.abort();
    let _ = abandoned.await;
    assert_eq!(limiter.queued(), 0);

    let waiting = tokio::spawn({
        let limiter = Arc::clone(&limiter);
        async move { limiter.acquire().await }
    });
    wait_for_queue(&limiter, 1).await;

    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(waiting.await.unwrap().is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_arrivals_never_exceed_limit() {
    let limiter = Arc::new(FixedWindowLimiter::new(10, Duration::from_secs(60), 0));

    let handles: Vec<_> = (0..64)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire().await })
        })
        .collect();

    let mut admitted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => admitted += 1,
            Err(AdmissionError::RateLimited) => rejected += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(admitted, 10);
    assert_eq!(rejected, 54);
}
