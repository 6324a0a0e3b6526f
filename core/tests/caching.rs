//! Integration tests for the cache policy
//!
//! The cache serves a repeated payload from the existing `data` instead of
//! re-invoking the caller, gated by a payload predicate and a validity
//! window measured from the last successful resolution.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use recall_core::{Repository, RepositoryConfig};
use recall_testing::{EventRecorder, StateRecorder, fail_with, respond_once, settle};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A caller that counts its invocations and doubles the payload.
fn counting_caller(
    calls: &Arc<AtomicUsize>,
) -> impl Fn(u32) -> recall_core::CallStream<u32> + Send + Sync + 'static {
    let calls = Arc::clone(calls);
    move |payload| {
        calls.fetch_add(1, Ordering::SeqCst);
        respond_once(payload * 2)
    }
}

/// P3: a repeated payload within the validity window invokes the caller
/// once; the second start is served from cache with no pending flash.
#[tokio::test]
async fn repeated_payload_is_served_from_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let repo = Repository::new(RepositoryConfig::new(counting_caller(&calls)).with_cache());
    let events = EventRecorder::attach(&repo);
    let states = StateRecorder::attach(&repo);

    repo.start(3).unwrap();
    settle().await;
    repo.start(3).unwrap();
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(events.start().await, vec![3, 3]);
    assert_eq!(events.success().await, vec![6]);
    assert_eq!(events.success_cached().await, vec![6]);
    // initial, pending, success only; the cache hit publishes nothing.
    assert_eq!(states.snapshots().await.len(), 3);
    assert_eq!(repo.snapshot().data, Some(6));
}

/// P4: past the validity window the same payload dispatches again.
#[tokio::test(start_paused = true)]
async fn cache_expires_after_the_validity_window() {
    let calls = Arc::new(AtomicUsize::new(0));
    let repo = Repository::new(
        RepositoryConfig::new(counting_caller(&calls))
            .with_cache()
            .with_cache_timeout(Duration::from_secs(1)),
    );

    repo.start(3).unwrap();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_millis(500)).await;
    repo.start(3).unwrap();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    repo.start(3).unwrap();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// A different payload always dispatches, even with caching enabled.
#[tokio::test]
async fn different_payload_always_dispatches() {
    let calls = Arc::new(AtomicUsize::new(0));
    let repo = Repository::new(RepositoryConfig::new(counting_caller(&calls)).with_cache());

    repo.start(1).unwrap();
    settle().await;
    repo.start(2).unwrap();
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(repo.snapshot().data, Some(4));
}

/// Without a cache policy, every start dispatches.
#[tokio::test]
async fn no_caching_by_default() {
    let calls = Arc::new(AtomicUsize::new(0));
    let repo = Repository::new(RepositoryConfig::new(counting_caller(&calls)));

    repo.start(3).unwrap();
    settle().await;
    repo.start(3).unwrap();
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// A custom predicate can ignore parts of the payload when deciding
/// equivalence.
#[tokio::test]
async fn custom_predicate_decides_equivalence() {
    #[derive(Debug, Clone)]
    struct Query {
        id: u32,
        trace: &'static str,
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let repo = Repository::new(
        RepositoryConfig::new(move |query: Query| {
            seen.fetch_add(1, Ordering::SeqCst);
            respond_once(query.id)
        })
        .with_should_cache(|prev, next| prev.id == next.id),
    );
    let events = EventRecorder::attach(&repo);

    repo.start(Query { id: 1, trace: "a" }).unwrap();
    settle().await;
    repo.start(Query { id: 1, trace: "b" }).unwrap();
    settle().await;
    repo.start(Query { id: 2, trace: "c" }).unwrap();
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(events.success_cached().await, vec![1]);
}

/// The comparison payload is the previous *accepted* one (recorded on every
/// dispatch, including failures), while the validity window is anchored to
/// the last *success*.
#[tokio::test]
async fn window_is_anchored_to_the_last_success() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let repo = Repository::new(
        RepositoryConfig::new(move |cmd: &'static str| {
            seen.fetch_add(1, Ordering::SeqCst);
            if cmd == "fail" {
                fail_with("nope")
            } else {
                respond_once(1u32)
            }
        })
        .with_cache(),
    );
    let events = EventRecorder::attach(&repo);

    repo.start("ok").unwrap();
    settle().await;
    repo.start("fail").unwrap();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // "fail" is now the previous accepted payload, and the window opened by
    // the "ok" success is still valid, so repeating it is a cache hit that
    // republishes the existing data.
    repo.start("fail").unwrap();
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(events.success_cached().await, vec![1]);
    assert_eq!(repo.snapshot().data, Some(1));
}

/// `reset` clears the cache bookkeeping: the same payload dispatches fresh.
#[tokio::test]
async fn reset_clears_the_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let repo = Repository::new(RepositoryConfig::new(counting_caller(&calls)).with_cache());

    repo.start(5).unwrap();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    repo.reset().unwrap();
    settle().await;
    assert_eq!(repo.snapshot().data, None);

    repo.start(5).unwrap();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(repo.snapshot().data, Some(10));
}
